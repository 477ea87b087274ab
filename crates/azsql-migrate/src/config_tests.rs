//! Tests for `config` module

use super::*;
use std::io::Write;
use tempfile::NamedTempFile;

fn pair() -> DatabasePair {
    DatabasePair {
        source_resource_group: "rg-src".to_string(),
        source_server: "sqlsrc.database.windows.net".to_string(),
        source_db: "orders".to_string(),
        target_resource_group: "rg-dst".to_string(),
        target_server: "sqldst.database.windows.net".to_string(),
        target_db: "orders".to_string(),
    }
}

fn config() -> MigrationConfig {
    MigrationConfig {
        database_configs: vec![pair()],
        source: StorageEndpoint::new(
            "rg-src",
            "sub-src",
            "https://contososrc.blob.core.windows.net",
            "migrationbackups",
        ),
        target: StorageEndpoint::new(
            "rg-dst",
            "sub-dst",
            "https://contosodst.blob.core.windows.net/",
            "migrationbackups",
        ),
        options: MigrationOptions::default(),
    }
}

fn temp_file(suffix: &str, content: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_options_defaults() {
    let options = MigrationOptions::default();
    assert_eq!(options.poll_interval(), Duration::from_secs(5));
    assert!(options.poll_timeout().is_none());
    assert_eq!(options.az_path, "az");
    assert_eq!(options.azcopy_path, "azcopy");
    assert_eq!(options.sql_port, 1433);
    assert!(options.trust_server_certificate);
}

#[test]
fn test_storage_url_adds_single_separator() {
    let cfg = config();
    assert_eq!(
        cfg.source.storage_url(),
        "https://contososrc.blob.core.windows.net/migrationbackups/"
    );
    assert_eq!(
        cfg.target.storage_url(),
        "https://contosodst.blob.core.windows.net/migrationbackups/"
    );
}

#[test]
fn test_storage_name_from_url_and_bare_host() {
    let cfg = config();
    assert_eq!(cfg.source.storage_name(), "contososrc");

    let bare = StorageEndpoint::new("rg", "sub", "acct.blob.core.windows.net", "c");
    assert_eq!(bare.storage_name(), "acct");
}

#[test]
fn test_blob_url_is_deterministic_per_pair() {
    let cfg = config();
    let p = pair();

    let export = p.blob_url(&cfg.source.storage_url());
    let import = p.blob_url(&cfg.target.storage_url());

    assert_eq!(
        export,
        "https://contososrc.blob.core.windows.net/migrationbackups/rg-src-orders.bacpac"
    );
    assert_eq!(
        import,
        "https://contosodst.blob.core.windows.net/migrationbackups/rg-src-orders.bacpac"
    );
}

#[test]
fn test_server_names_strip_domain() {
    let p = pair();
    assert_eq!(p.source_server_name(), "sqlsrc");
    assert_eq!(p.target_server_name(), "sqldst");
    assert_eq!(p.source_label(), "sqlsrc.orders");
}

#[test]
fn test_storage_key_is_set_once() {
    let mut endpoint = config().source;
    assert!(endpoint.storage_key().is_err());

    endpoint.set_storage_key("k1").unwrap();
    let second = endpoint.set_storage_key("k2");

    assert!(matches!(second, Err(Error::InvalidState(_))));
    assert_eq!(endpoint.storage_key().unwrap(), "k1");
}

#[test]
fn test_validate_requires_pairs() {
    let mut cfg = config();
    cfg.database_configs.clear();
    assert!(matches!(cfg.validate(), Err(Error::Config(_))));
}

#[test]
fn test_validate_rejects_non_blob_url() {
    let mut cfg = config();
    cfg.target.storage_account_url = "https://example.com".to_string();
    let err = cfg.validate().unwrap_err();
    assert!(err.to_string().contains("target.storage_account_url"));
}

#[test]
fn test_validate_rejects_blank_pair_field() {
    let mut cfg = config();
    cfg.database_configs[0].target_db = " ".to_string();
    let err = cfg.validate().unwrap_err();
    assert!(err.to_string().contains("database_configs[0].target_db"));
}

#[test]
fn test_validate_bounds_sas_validity() {
    for hours in [0, -1, MAX_SAS_VALIDITY_HOURS + 1, 3_000_000_000, i64::MAX] {
        let mut cfg = config();
        cfg.options.sas_validity_hours = hours;

        let err = cfg.validate().unwrap_err();

        assert!(
            matches!(err, Error::Config(ref m) if m.contains("sas_validity_hours")),
            "{hours} accepted"
        );
    }

    let mut cfg = config();
    cfg.options.sas_validity_hours = MAX_SAS_VALIDITY_HOURS;
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_validate_ok() {
    assert!(config().validate().is_ok());
}

#[test]
fn test_legacy_json_layout_parses() {
    let json = r#"{
        "DatabaseConfigs": [{
            "SourceResourceGroup": "rg-src",
            "SourceServer": "sqlsrc.database.windows.net",
            "SourceDB": "orders",
            "TargetResourceGroup": "rg-dst",
            "TargetServer": "sqldst.database.windows.net",
            "TargetDB": "orders"
        }],
        "Source": {
            "ResourceGroup": "rg-src",
            "Subscription": "sub-src",
            "StorageAccountUrl": "https://contososrc.blob.core.windows.net",
            "Container": "migrationbackups"
        },
        "Target": {
            "ResourceGroup": "rg-dst",
            "Subscription": "sub-dst",
            "StorageAccountUrl": "https://contosodst.blob.core.windows.net",
            "Container": "migrationbackups",
            "AuthType": "ADPassword"
        }
    }"#;
    let file = temp_file(".json", json);

    let cfg = MigrationConfig::from_file(file.path()).unwrap();

    assert_eq!(cfg.database_configs, vec![pair()]);
    assert_eq!(cfg.source.auth_type, "SQL");
    assert_eq!(cfg.source.storage_type, "StorageAccessKey");
    assert_eq!(cfg.target.auth_type, "ADPassword");
    assert!(cfg.source.storage_key().is_err());
}

#[test]
fn test_yaml_config_parse() {
    let yaml = r#"
database_configs:
  - source_resource_group: rg-src
    source_server: sqlsrc.database.windows.net
    source_db: orders
    target_resource_group: rg-dst
    target_server: sqldst.database.windows.net
    target_db: orders
source:
  resource_group: rg-src
  subscription: sub-src
  storage_account_url: https://contososrc.blob.core.windows.net
  container: migrationbackups
target:
  resource_group: rg-dst
  subscription: sub-dst
  storage_account_url: https://contosodst.blob.core.windows.net
  container: migrationbackups
options:
  poll_interval_secs: 30
  poll_timeout_secs: 7200
"#;
    let file = temp_file(".yaml", yaml);

    let cfg = MigrationConfig::from_file(file.path()).unwrap();

    assert_eq!(cfg.options.poll_interval(), Duration::from_secs(30));
    assert_eq!(cfg.options.poll_timeout(), Some(Duration::from_secs(7200)));
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_missing_config_is_config_error() {
    let err = MigrationConfig::from_file(Path::new("/nonexistent/Migration.Config.json"))
        .unwrap_err();
    assert!(matches!(err, Error::Config(ref m) if m.contains("is not found")));
}

#[test]
fn test_empty_config_is_config_error() {
    let file = temp_file(".json", "   \n");
    let err = MigrationConfig::from_file(file.path()).unwrap_err();
    assert!(matches!(err, Error::Config(ref m) if m.contains("is empty")));
}

#[test]
fn test_query_set_keeps_order() {
    let file = temp_file(
        ".json",
        r#"["SELECT COUNT(*) FROM dbo.Orders", "SELECT COUNT(*) FROM dbo.Lines"]"#,
    );

    let set = VerificationQuerySet::from_file(file.path()).unwrap();

    assert_eq!(set.len(), 2);
    assert_eq!(set.queries()[0], "SELECT COUNT(*) FROM dbo.Orders");
    assert_eq!(set.queries()[1], "SELECT COUNT(*) FROM dbo.Lines");
}

#[test]
fn test_query_set_rejects_empty_list() {
    let file = temp_file(".json", "[]");
    let err = VerificationQuerySet::from_file(file.path()).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}
