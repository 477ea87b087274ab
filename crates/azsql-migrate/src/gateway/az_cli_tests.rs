//! Tests for the Azure CLI gateway.

use super::*;
use chrono::TimeZone;

fn request() -> TransferRequest {
    TransferRequest {
        admin_name: "sqladmin".to_string(),
        admin_password: "P@ssw0rd!".to_string(),
        storage_key: "c2VjcmV0a2V5".to_string(),
        storage_key_type: "StorageAccessKey".to_string(),
        storage_uri: "https://src.blob.core.windows.net/backups/rg-orders.bacpac".to_string(),
        auth_type: "SQL".to_string(),
        database: "orders".to_string(),
        resource_group: "rg".to_string(),
        server: "sqlsrc".to_string(),
        subscription: "sub-src".to_string(),
    }
}

fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

#[test]
fn test_export_args_submit_without_waiting() {
    let args = transfer_args("export", &request());

    assert_eq!(&args[..3], &["sql", "db", "export"]);
    assert!(args.contains(&"--no-wait".to_string()));
    assert_eq!(value_after(&args, "--admin-user"), Some("sqladmin"));
    assert_eq!(value_after(&args, "--storage-key-type"), Some("StorageAccessKey"));
    assert_eq!(
        value_after(&args, "--storage-uri"),
        Some("https://src.blob.core.windows.net/backups/rg-orders.bacpac")
    );
    assert_eq!(value_after(&args, "--name"), Some("orders"));
    assert_eq!(value_after(&args, "--server"), Some("sqlsrc"));
    assert_eq!(value_after(&args, "--subscription"), Some("sub-src"));
}

#[test]
fn test_import_args_wait_for_completion() {
    let args = transfer_args("import", &request());

    assert_eq!(args[2], "import");
    assert!(!args.contains(&"--no-wait".to_string()));
    assert_eq!(value_after(&args, "--auth-type"), Some("SQL"));
}

#[test]
fn test_copy_args_carry_flags() {
    let copy = CopyRequest::preserving("https://a/c?s=1", "https://b/c?s=2");

    let args = copy_args(&copy);

    assert_eq!(
        args,
        vec![
            "copy",
            "https://a/c?s=1",
            "https://b/c?s=2",
            "--recursive=true",
            "--overwrite=false"
        ]
    );
}

#[test]
fn test_command_line_masks_secret_arguments() {
    let req = request();

    let shown = command_line("az", &transfer_args("export", &req));

    assert!(!shown.contains("P@ssw0rd!"));
    assert!(!shown.contains("c2VjcmV0a2V5"));
    assert!(shown.contains("--admin-password *** --admin-user sqladmin"));
    assert!(shown.contains("--storage-key *** --storage-key-type StorageAccessKey"));
}

#[test]
fn test_command_line_masks_short_password_only_in_place() {
    let req = TransferRequest {
        admin_password: "a".to_string(),
        ..request()
    };

    let shown = command_line("az", &transfer_args("import", &req));

    assert!(shown.contains("--admin-password ***"));
    assert!(shown.contains("--storage-uri https://src.blob.core.windows.net/backups/rg-orders.bacpac"));
    assert!(shown.contains("--auth-type SQL"));
}

#[test]
fn test_command_line_drops_sas_tokens() {
    let copy = CopyRequest::preserving(
        "https://a.blob.core.windows.net/c?sv=1&sig=abc",
        "https://b.blob.core.windows.net/c?sv=1&sig=def",
    );

    let shown = command_line("azcopy", &copy_args(&copy));

    assert_eq!(
        shown,
        "azcopy copy https://a.blob.core.windows.net/c?*** \
         https://b.blob.core.windows.net/c?*** --recursive=true --overwrite=false"
    );
}

#[test]
fn test_redact_skips_short_secrets() {
    let text = "ERROR: storage key c2VjcmV0a2V5 rejected for account a";

    let masked = redact(text, &["c2VjcmV0a2V5", "a", ""]);

    assert_eq!(masked, "ERROR: storage key *** rejected for account a");
}

#[test]
fn test_sas_url_for_container_and_account() {
    assert_eq!(
        sas_url("https://a.blob.core.windows.net/", Some("backups"), "sv=1&sig=x\n"),
        "https://a.blob.core.windows.net/backups?sv=1&sig=x"
    );
    assert_eq!(
        sas_url("https://a.blob.core.windows.net", None, "\"sv=1&sig=x\""),
        "https://a.blob.core.windows.net/?sv=1&sig=x"
    );
}

#[test]
fn test_sas_window_starts_one_hour_back() {
    let gateway = AzCliGateway::new(&MigrationOptions::default()).unwrap();
    let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 30, 0).unwrap();

    let (start, expiry) = gateway.sas_window(now).unwrap();

    assert_eq!(start, "2024-03-10T11:30Z");
    assert_eq!(expiry, "2024-03-11T12:30Z");
}

#[test]
fn test_out_of_range_sas_validity_is_config_error() {
    for hours in [i64::MAX, 0] {
        let options = MigrationOptions {
            sas_validity_hours: hours,
            ..MigrationOptions::default()
        };

        assert!(matches!(AzCliGateway::new(&options), Err(Error::Config(_))));
    }
}

#[test]
fn test_sas_expiry_overflow_is_config_error() {
    let options = MigrationOptions {
        sas_validity_hours: 3_000_000_000,
        ..MigrationOptions::default()
    };
    let gateway = AzCliGateway::new(&options).unwrap();

    let err = gateway.sas_window(Utc::now()).unwrap_err();

    assert!(matches!(err, Error::Config(ref m) if m.contains("out of range")));
}

#[test]
fn test_container_sas_args_use_permissions() {
    let args = container_sas_args("acct", "key", "backups", "s", "e");

    assert_eq!(value_after(&args, "--permissions"), Some("racwl"));
    assert_eq!(value_after(&args, "--name"), Some("backups"));
    assert!(args.contains(&"--https-only".to_string()));
}

#[test]
fn test_account_sas_args_cover_blob_service() {
    let args = account_sas_args("acct", "key", "s", "e");

    assert_eq!(args[2], "generate-sas");
    assert_eq!(value_after(&args, "--services"), Some("b"));
    assert_eq!(value_after(&args, "--resource-types"), Some("sco"));
}

#[test]
fn test_listing_and_key_args() {
    let list = blob_list_args("acct", "key", "backups");
    assert_eq!(value_after(&list, "--container-name"), Some("backups"));
    assert_eq!(value_after(&list, "--query"), Some("[].name"));

    let keys = storage_keys_args("rg", "acct");
    assert_eq!(value_after(&keys, "--resource-group"), Some("rg"));
    assert_eq!(value_after(&keys, "--account-name"), Some("acct"));

    let sub = subscription_args("sub-1");
    assert_eq!(sub, vec!["account", "set", "--subscription", "sub-1"]);
}

#[tokio::test]
async fn test_missing_program_is_gateway_error() {
    let options = MigrationOptions {
        az_path: "/nonexistent/az-cli-binary".to_string(),
        ..MigrationOptions::default()
    };
    let gateway = AzCliGateway::new(&options).unwrap();

    let err = gateway.select_subscription("sub").await.unwrap_err();

    assert!(matches!(err, Error::Authentication(ref m) if m.contains("cannot start")));
}

#[cfg(unix)]
#[tokio::test]
async fn test_login_runs_attached_and_reports_status() {
    let ok = AzCliGateway::new(&MigrationOptions {
        az_path: "true".to_string(),
        ..MigrationOptions::default()
    })
    .unwrap();
    let failing = AzCliGateway::new(&MigrationOptions {
        az_path: "false".to_string(),
        ..MigrationOptions::default()
    })
    .unwrap();

    assert!(ok.login().await.is_ok());
    assert!(matches!(failing.login().await, Err(Error::Authentication(_))));
}

#[cfg(unix)]
#[tokio::test]
async fn test_copy_failure_is_command_error() {
    let gateway = AzCliGateway::new(&MigrationOptions {
        azcopy_path: "false".to_string(),
        ..MigrationOptions::default()
    })
    .unwrap();
    let copy = CopyRequest::preserving("https://a/c?s=1", "https://b/c?s=2");

    let err = gateway.copy(&copy).await.unwrap_err();

    assert!(matches!(err, Error::Command { ref program, .. } if program == "false"));
}
