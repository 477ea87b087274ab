//! Configuration types for azsql-migrate.
//!
//! Two documents drive a run: the migration config (database pairs plus the
//! source and target storage endpoints) and the verification query list.
//! Both are read once at startup. JSON files may use the PascalCase keys of
//! the historical `Migration.Config.json` layout.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};

/// Default migration config file name.
pub const DEFAULT_CONFIG_FILE: &str = "Migration.Config.json";

/// Default verification query file name.
pub const DEFAULT_QUERIES_FILE: &str = "VerificationQueries.json";

/// Longest accepted SAS validity, in hours (366 days).
pub const MAX_SAS_VALIDITY_HOURS: i64 = 24 * 366;

/// Main migration configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Database pairs to migrate.
    #[serde(alias = "DatabaseConfigs")]
    pub database_configs: Vec<DatabasePair>,
    /// Storage endpoint that receives the exports.
    #[serde(alias = "Source")]
    pub source: StorageEndpoint,
    /// Storage endpoint the imports read from.
    #[serde(alias = "Target")]
    pub target: StorageEndpoint,
    /// Run options.
    #[serde(default, alias = "Options")]
    pub options: MigrationOptions,
}

/// A storage account container used as a snapshot hand-off point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageEndpoint {
    /// Resource group owning the storage account.
    #[serde(alias = "ResourceGroup")]
    pub resource_group: String,
    /// Subscription name or id.
    #[serde(alias = "Subscription")]
    pub subscription: String,
    /// Account base URL, e.g. `https://contoso.blob.core.windows.net`.
    #[serde(alias = "StorageAccountUrl")]
    pub storage_account_url: String,
    /// Blob container holding the snapshots.
    #[serde(alias = "Container")]
    pub container: String,
    /// Authentication type passed to export/import.
    #[serde(default = "default_auth_type", alias = "AuthType")]
    pub auth_type: String,
    /// Storage key type passed to export/import.
    #[serde(default = "default_storage_type", alias = "StorageType")]
    pub storage_type: String,
    #[serde(skip)]
    storage_key: Option<String>,
}

/// One source database and its target counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabasePair {
    /// Source resource group.
    #[serde(alias = "SourceResourceGroup")]
    pub source_resource_group: String,
    /// Source server host, e.g. `srv.database.windows.net`.
    #[serde(alias = "SourceServer")]
    pub source_server: String,
    /// Source database name.
    #[serde(alias = "SourceDB")]
    pub source_db: String,
    /// Target resource group.
    #[serde(alias = "TargetResourceGroup")]
    pub target_resource_group: String,
    /// Target server host.
    #[serde(alias = "TargetServer")]
    pub target_server: String,
    /// Target database name.
    #[serde(alias = "TargetDB")]
    pub target_db: String,
}

/// Migration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationOptions {
    /// Seconds between export completion checks.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Upper bound for export completion polling. Unbounded when absent.
    #[serde(default)]
    pub poll_timeout_secs: Option<u64>,
    /// Path or name of the Azure CLI executable.
    #[serde(default = "default_az_path")]
    pub az_path: String,
    /// Path or name of the azcopy executable.
    #[serde(default = "default_azcopy_path")]
    pub azcopy_path: String,
    /// Validity of generated SAS tokens, in hours.
    #[serde(default = "default_sas_validity_hours")]
    pub sas_validity_hours: i64,
    /// SQL Server port used by verification probes.
    #[serde(default = "default_sql_port")]
    pub sql_port: u16,
    /// Accept the server certificate without validation.
    #[serde(default = "default_true")]
    pub trust_server_certificate: bool,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            poll_timeout_secs: None,
            az_path: default_az_path(),
            azcopy_path: default_azcopy_path(),
            sas_validity_hours: default_sas_validity_hours(),
            sql_port: default_sql_port(),
            trust_server_certificate: true,
        }
    }
}

impl MigrationOptions {
    /// Interval between export completion checks.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Optional bound on export completion polling.
    #[must_use]
    pub fn poll_timeout(&self) -> Option<Duration> {
        self.poll_timeout_secs.map(Duration::from_secs)
    }
}

fn default_auth_type() -> String {
    "SQL".to_string()
}

fn default_storage_type() -> String {
    "StorageAccessKey".to_string()
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_az_path() -> String {
    "az".to_string()
}

fn default_azcopy_path() -> String {
    "azcopy".to_string()
}

fn default_sas_validity_hours() -> i64 {
    24
}

fn default_sql_port() -> u16 {
    1433
}

fn default_true() -> bool {
    true
}

/// Returns the host part of `url` (or `url` itself when it has no scheme),
/// truncated before `keyword`.
pub(crate) fn extract_name(url: &str, keyword: &str) -> String {
    let host = if url.contains("://") {
        url::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| url.to_string())
    } else {
        url.to_string()
    };

    match host.find(keyword) {
        Some(idx) => host[..idx].to_string(),
        None => host,
    }
}

impl StorageEndpoint {
    /// Creates an endpoint with default auth and key types and no key.
    pub fn new(
        resource_group: impl Into<String>,
        subscription: impl Into<String>,
        storage_account_url: impl Into<String>,
        container: impl Into<String>,
    ) -> Self {
        Self {
            resource_group: resource_group.into(),
            subscription: subscription.into(),
            storage_account_url: storage_account_url.into(),
            container: container.into(),
            auth_type: default_auth_type(),
            storage_type: default_storage_type(),
            storage_key: None,
        }
    }

    /// Container URL with a trailing slash, e.g.
    /// `https://contoso.blob.core.windows.net/backups/`.
    #[must_use]
    pub fn storage_url(&self) -> String {
        let base = if self.storage_account_url.ends_with('/') {
            self.storage_account_url.clone()
        } else {
            format!("{}/", self.storage_account_url)
        };
        format!("{base}{}/", self.container)
    }

    /// Storage account name, i.e. the host label before `.blob`.
    #[must_use]
    pub fn storage_name(&self) -> String {
        extract_name(&self.storage_account_url, ".blob")
    }

    /// Assigns the resolved account key. A run assigns it exactly once.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if a key was already assigned.
    pub fn set_storage_key(&mut self, key: impl Into<String>) -> Result<()> {
        if self.storage_key.is_some() {
            return Err(Error::InvalidState(format!(
                "storage key for '{}' is already set",
                self.storage_name()
            )));
        }
        self.storage_key = Some(key.into());
        Ok(())
    }

    /// The resolved account key.
    ///
    /// # Errors
    ///
    /// Returns `InvalidState` if keys have not been resolved yet.
    pub fn storage_key(&self) -> Result<&str> {
        self.storage_key.as_deref().ok_or_else(|| {
            Error::InvalidState(format!(
                "storage key for '{}' has not been resolved",
                self.storage_name()
            ))
        })
    }

    fn validate(&self, side: &str) -> Result<()> {
        let required = [
            ("resource_group", &self.resource_group),
            ("subscription", &self.subscription),
            ("storage_account_url", &self.storage_account_url),
            ("container", &self.container),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("{side}.{field} cannot be empty")));
            }
        }
        if !self.storage_account_url.contains(".blob") {
            return Err(Error::Config(format!(
                "{side}.storage_account_url '{}' is not a blob endpoint",
                self.storage_account_url
            )));
        }
        Ok(())
    }
}

impl DatabasePair {
    /// Snapshot URL for this pair under `storage_url` (a container URL
    /// ending in `/`). Export and import use the same name.
    #[must_use]
    pub fn blob_url(&self, storage_url: &str) -> String {
        format!(
            "{storage_url}{}-{}.bacpac",
            self.source_resource_group, self.source_db
        )
    }

    /// Short source server name (label before `.database`).
    #[must_use]
    pub fn source_server_name(&self) -> String {
        extract_name(&self.source_server, ".database")
    }

    /// Short target server name (label before `.database`).
    #[must_use]
    pub fn target_server_name(&self) -> String {
        extract_name(&self.target_server, ".database")
    }

    /// `server.database` label for the source side.
    #[must_use]
    pub fn source_label(&self) -> String {
        format!("{}.{}", self.source_server_name(), self.source_db)
    }

    /// `server.database` label for the target side.
    #[must_use]
    pub fn target_label(&self) -> String {
        format!("{}.{}", self.target_server_name(), self.target_db)
    }
}

fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::Config(format!("{} is not found", path.display())));
        }
        Err(e) => return Err(e.into()),
    };

    if content.trim().is_empty() {
        return Err(Error::Config(format!("{} is empty", path.display())));
    }

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        Ok(serde_json::from_str(&content)?)
    } else {
        Ok(serde_yaml::from_str(&content)?)
    }
}

impl MigrationConfig {
    /// Load configuration from a JSON or YAML file (chosen by extension).
    ///
    /// # Errors
    ///
    /// Returns `Config` if the file is missing or empty, or a parse error.
    pub fn from_file(path: &Path) -> Result<Self> {
        read_document(path)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot start a run.
    pub fn validate(&self) -> Result<()> {
        if self.database_configs.is_empty() {
            return Err(Error::Config(
                "at least one database pair is required".to_string(),
            ));
        }
        self.source.validate("source")?;
        self.target.validate("target")?;

        for (idx, pair) in self.database_configs.iter().enumerate() {
            let required = [
                ("source_resource_group", &pair.source_resource_group),
                ("source_server", &pair.source_server),
                ("source_db", &pair.source_db),
                ("target_resource_group", &pair.target_resource_group),
                ("target_server", &pair.target_server),
                ("target_db", &pair.target_db),
            ];
            for (field, value) in required {
                if value.trim().is_empty() {
                    return Err(Error::Config(format!(
                        "database_configs[{idx}].{field} cannot be empty"
                    )));
                }
            }
        }

        if self.options.poll_interval_secs == 0 {
            return Err(Error::Config(
                "poll_interval_secs must be greater than 0".to_string(),
            ));
        }
        if !(1..=MAX_SAS_VALIDITY_HOURS).contains(&self.options.sas_validity_hours) {
            return Err(Error::Config(format!(
                "sas_validity_hours must be between 1 and {MAX_SAS_VALIDITY_HOURS}"
            )));
        }
        Ok(())
    }
}

/// Ordered verification probes, shared read-only across all pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationQuerySet {
    queries: Arc<[String]>,
}

impl VerificationQuerySet {
    /// Builds a query set from an ordered list.
    pub fn new(queries: Vec<String>) -> Self {
        Self {
            queries: queries.into(),
        }
    }

    /// Load the query list from a JSON array or YAML sequence.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the file is missing, empty or lists no queries.
    pub fn from_file(path: &Path) -> Result<Self> {
        let queries: Vec<String> = read_document(path)?;
        let queries: Vec<String> = queries
            .into_iter()
            .filter(|q| !q.trim().is_empty())
            .collect();
        if queries.is_empty() {
            return Err(Error::Config(format!(
                "{} contains no verification queries",
                path.display()
            )));
        }
        Ok(Self::new(queries))
    }

    /// The queries, in file order.
    #[must_use]
    pub fn queries(&self) -> &[String] {
        &self.queries
    }

    /// Number of queries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
