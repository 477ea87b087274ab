//! Gateways to the external systems a migration drives.
//!
//! [`CloudGateway`] covers the cloud control plane and blob storage (login,
//! keys, export/import submission, SAS URLs, listing, bulk copy).
//! [`VerificationGateway`] runs scalar SQL probes against one database.
//! Production implementations live in [`az_cli`] and [`sql_server`]; the
//! [`crate::mock`] module provides scripted ones.

pub mod az_cli;
pub mod sql_server;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::config::{DatabasePair, StorageEndpoint};
use crate::credential::Credential;
use crate::error::Result;

pub use az_cli::AzCliGateway;
pub use sql_server::SqlServerVerifier;

/// One storage account access key as reported by the control plane.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageKey {
    /// Key name (`key1`, `key2`).
    #[serde(default)]
    pub key_name: String,
    /// Key value; may be absent or empty.
    #[serde(default)]
    pub value: Option<String>,
    /// Permissions string (`FULL`, `READ`).
    #[serde(default)]
    pub permissions: Option<String>,
}

impl StorageKey {
    /// Builds a key with the given name and value.
    pub fn new(key_name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key_name: key_name.into(),
            value: Some(value.into()),
            permissions: None,
        }
    }
}

impl fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageKey")
            .field("key_name", &self.key_name)
            .field("value", &self.value.as_ref().map(|_| "***"))
            .field("permissions", &self.permissions)
            .finish()
    }
}

/// Picks the first key with a non-empty value, regardless of position.
#[must_use]
pub fn first_usable_key(keys: &[StorageKey]) -> Option<&str> {
    keys.iter()
        .filter_map(|k| k.value.as_deref())
        .find(|v| !v.trim().is_empty())
}

/// Parameters of a database export or import submission.
#[derive(Clone, PartialEq, Eq)]
pub struct TransferRequest {
    /// SQL administrator login.
    pub admin_name: String,
    /// SQL administrator password.
    pub admin_password: String,
    /// Storage account key.
    pub storage_key: String,
    /// Storage key type (`StorageAccessKey`).
    pub storage_key_type: String,
    /// Snapshot blob URL.
    pub storage_uri: String,
    /// Authentication type (`SQL`).
    pub auth_type: String,
    /// Database name.
    pub database: String,
    /// Resource group of the server.
    pub resource_group: String,
    /// Short server name.
    pub server: String,
    /// Subscription of the server.
    pub subscription: String,
}

impl TransferRequest {
    /// Export of the pair's source database into `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the endpoint's key has not been resolved.
    pub fn export(
        pair: &DatabasePair,
        endpoint: &StorageEndpoint,
        credential: &Credential,
    ) -> Result<Self> {
        Ok(Self {
            admin_name: credential.admin_name().to_string(),
            admin_password: credential.admin_password().to_string(),
            storage_key: endpoint.storage_key()?.to_string(),
            storage_key_type: endpoint.storage_type.clone(),
            storage_uri: pair.blob_url(&endpoint.storage_url()),
            auth_type: endpoint.auth_type.clone(),
            database: pair.source_db.clone(),
            resource_group: pair.source_resource_group.clone(),
            server: pair.source_server_name(),
            subscription: endpoint.subscription.clone(),
        })
    }

    /// Import of the pair's snapshot from `endpoint` into the target database.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if the endpoint's key has not been resolved.
    pub fn import(
        pair: &DatabasePair,
        endpoint: &StorageEndpoint,
        credential: &Credential,
    ) -> Result<Self> {
        Ok(Self {
            admin_name: credential.admin_name().to_string(),
            admin_password: credential.admin_password().to_string(),
            storage_key: endpoint.storage_key()?.to_string(),
            storage_key_type: endpoint.storage_type.clone(),
            storage_uri: pair.blob_url(&endpoint.storage_url()),
            auth_type: endpoint.auth_type.clone(),
            database: pair.target_db.clone(),
            resource_group: pair.target_resource_group.clone(),
            server: pair.target_server_name(),
            subscription: endpoint.subscription.clone(),
        })
    }

    /// `server.database` label.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}.{}", self.server, self.database)
    }
}

impl fmt::Debug for TransferRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferRequest")
            .field("admin_name", &self.admin_name)
            .field("storage_key_type", &self.storage_key_type)
            .field("storage_uri", &self.storage_uri)
            .field("auth_type", &self.auth_type)
            .field("database", &self.database)
            .field("resource_group", &self.resource_group)
            .field("server", &self.server)
            .field("subscription", &self.subscription)
            .finish_non_exhaustive()
    }
}

/// A container-to-container bulk copy.
#[derive(Clone, PartialEq, Eq)]
pub struct CopyRequest {
    /// Pre-authenticated source container URL.
    pub source_url: String,
    /// Pre-authenticated target container URL.
    pub target_url: String,
    /// Copy the whole container tree.
    pub recursive: bool,
    /// Replace blobs that already exist at the target.
    pub overwrite: bool,
}

impl CopyRequest {
    /// Recursive copy that never replaces existing target blobs, so a rerun
    /// leaves already copied snapshots untouched.
    pub fn preserving(source_url: impl Into<String>, target_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            target_url: target_url.into(),
            recursive: true,
            overwrite: false,
        }
    }
}

impl fmt::Debug for CopyRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CopyRequest")
            .field("source_url", &strip_query(&self.source_url))
            .field("target_url", &strip_query(&self.target_url))
            .field("recursive", &self.recursive)
            .field("overwrite", &self.overwrite)
            .finish()
    }
}

/// Drops the query string (SAS token) from a URL for display.
#[must_use]
pub fn strip_query(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}

/// Cloud control plane and blob storage operations.
#[async_trait]
pub trait CloudGateway: Send + Sync {
    /// Interactive or cached sign-in.
    async fn login(&self) -> Result<()>;

    /// Makes `subscription` the active subscription.
    async fn select_subscription(&self, subscription: &str) -> Result<()>;

    /// Lists the access keys of a storage account.
    async fn storage_keys(&self, resource_group: &str, account_name: &str)
        -> Result<Vec<StorageKey>>;

    /// Submits a database export without waiting for it to finish.
    async fn export(&self, request: &TransferRequest) -> Result<()>;

    /// Submits a database import.
    async fn import(&self, request: &TransferRequest) -> Result<()>;

    /// Generates a SAS URL for a container, or for the whole account when
    /// `container` is `None`.
    async fn generate_sas_url(
        &self,
        account_name: &str,
        account_key: &str,
        account_url: &str,
        container: Option<&str>,
    ) -> Result<String>;

    /// Names of the blobs in a container.
    async fn list_container_objects(
        &self,
        account_name: &str,
        account_key: &str,
        account_url: &str,
        container: &str,
    ) -> Result<Vec<String>>;

    /// Runs one bulk copy between two pre-authenticated URLs.
    async fn copy(&self, request: &CopyRequest) -> Result<()>;
}

/// Integer result per probe text.
pub type QueryCounts = HashMap<String, i64>;

/// Scalar SQL probes against a single database.
#[async_trait]
pub trait VerificationGateway: Send + Sync {
    /// Opens a connection to `server`/`database` and runs every query,
    /// returning each query's scalar result.
    async fn counts(
        &self,
        server: &str,
        database: &str,
        credential: &Credential,
        queries: &[String],
    ) -> Result<QueryCounts>;
}
