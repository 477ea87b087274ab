// Migration tool - pedantic lints relaxed for CLI ergonomics
#![allow(clippy::pedantic)]

//! # Azure SQL Migration Tool
//!
//! `azsql-migrate` is a CLI tool and library that moves a set of Azure SQL
//! databases between servers through blob storage, then checks that both
//! sides agree.
//!
//! ## Phases
//!
//! | Phase | Gateway call |
//! |-------|--------------|
//! | Authenticate | `login` |
//! | Resolve storage keys | `select_subscription`, `storage_keys` |
//! | Credential | operator prompt |
//! | Export | `export` per pair, concurrently |
//! | Completion poll | `list_container_objects` |
//! | Bulk copy | `generate_sas_url`, `copy` |
//! | Import | `import` per pair, concurrently |
//! | Verification | `counts` per database, concurrently |
//!
//! ## Quick Start
//!
//! ```bash
//! # Uses Migration.Config.json and VerificationQueries.json
//! azsql-migrate
//!
//! azsql-migrate run --config migration.yaml --queries queries.yaml
//! ```
//!
//! ## Configuration Example
//!
//! ```yaml
//! source:
//!   resource_group: rg-src
//!   subscription: 00000000-0000-0000-0000-000000000001
//!   storage_account_url: https://contososrc.blob.core.windows.net
//!   container: migrationbackups
//!
//! target:
//!   resource_group: rg-dst
//!   subscription: 00000000-0000-0000-0000-000000000002
//!   storage_account_url: https://contosodst.blob.core.windows.net
//!   container: migrationbackups
//!
//! database_configs:
//!   - source_resource_group: rg-src
//!     source_server: sqlsrc.database.windows.net
//!     source_db: orders
//!     target_resource_group: rg-dst
//!     target_server: sqldst.database.windows.net
//!     target_db: orders
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod console;
pub mod credential;
pub mod error;
pub mod gateway;
pub mod mock;
pub mod pipeline;
pub mod progress;
pub mod ui;
pub mod verify;

pub use config::{
    DatabasePair, MigrationConfig, MigrationOptions, StorageEndpoint, VerificationQuerySet,
};
pub use console::{Console, TerminalConsole};
pub use credential::{Credential, CredentialProvider};
pub use error::{Error, Result};
pub use gateway::{AzCliGateway, CloudGateway, SqlServerVerifier, VerificationGateway};
pub use pipeline::{MigrationSummary, Pipeline, PipelineState};
pub use verify::{Mismatch, MismatchReport, Observation, VerificationEngine};
