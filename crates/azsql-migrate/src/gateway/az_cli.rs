//! [`CloudGateway`] backed by the Azure CLI (`az`) and `azcopy`.
//!
//! Every operation is one child process. Secrets passed on the command line
//! (SQL password, account key, SAS tokens) are masked in every log line and
//! error message. `az login` and `azcopy copy` run attached to the terminal so
//! device-code instructions and copy progress reach the operator.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

use super::{strip_query, CloudGateway, CopyRequest, StorageKey, TransferRequest};
use crate::config::MigrationOptions;
use crate::error::{Error, Result};

/// SAS permissions: read, add, create, write, list.
const SAS_PERMISSIONS: &str = "racwl";

const SAS_TIME_FORMAT: &str = "%Y-%m-%dT%H:%MZ";

/// Flags whose following argument is a secret.
const SECRET_FLAGS: &[&str] = &["--admin-password", "--storage-key", "--account-key"];

/// Secrets shorter than this are not searched for in command output; Azure
/// SQL passwords, account keys and SAS signatures are all longer.
const MIN_REDACTED_LEN: usize = 8;

/// Cloud gateway that shells out to `az` and `azcopy`.
#[derive(Debug, Clone)]
pub struct AzCliGateway {
    az: String,
    azcopy: String,
    sas_validity: TimeDelta,
}

#[derive(Deserialize)]
struct ContainerExists {
    exists: bool,
}

impl AzCliGateway {
    /// Creates a gateway using the executables and SAS validity in `options`.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the SAS validity is not a representable duration.
    pub fn new(options: &MigrationOptions) -> Result<Self> {
        let sas_validity = TimeDelta::try_hours(options.sas_validity_hours)
            .filter(|d| *d > TimeDelta::zero())
            .ok_or_else(|| {
                Error::Config(format!(
                    "sas_validity_hours {} is out of range",
                    options.sas_validity_hours
                ))
            })?;
        Ok(Self {
            az: options.az_path.clone(),
            azcopy: options.azcopy_path.clone(),
            sas_validity,
        })
    }

    /// Runs a command attached to the terminal, for commands that talk to
    /// the operator or report progress themselves.
    async fn run_attached(&self, program: &str, args: &[String]) -> Result<()> {
        debug!("Running {} (attached)", command_line(program, args));

        let status = Command::new(program)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| Error::Gateway(format!("cannot start `{program}`: {e}")))?;

        if status.success() {
            Ok(())
        } else {
            Err(Error::Command {
                program: program.to_string(),
                status: status.to_string(),
                stderr: "see terminal output".to_string(),
            })
        }
    }

    /// Runs a command and captures its output for parsing.
    async fn run(&self, program: &str, args: &[String], secrets: &[&str]) -> Result<String> {
        debug!("Running {}", command_line(program, args));

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::inherit())
            .output()
            .await
            .map_err(|e| Error::Gateway(format!("cannot start `{program}`: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if output.status.success() {
            Ok(stdout)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(Error::Command {
                program: program.to_string(),
                status: output.status.to_string(),
                stderr: redact(stderr.trim(), secrets),
            })
        }
    }

    async fn az(&self, args: Vec<String>, secrets: &[&str]) -> Result<String> {
        self.run(&self.az, &args, secrets).await
    }

    async fn ensure_container(&self, account_name: &str, account_key: &str, container: &str) -> Result<()> {
        let out = self
            .az(
                container_args("exists", account_name, account_key, container),
                &[account_key],
            )
            .await?;
        let status: ContainerExists = serde_json::from_str(&out)?;

        if !status.exists {
            info!("Container {} does not exist, creating it", container);
            self.az(
                container_args("create", account_name, account_key, container),
                &[account_key],
            )
            .await?;
        }
        Ok(())
    }

    fn sas_window(&self, now: DateTime<Utc>) -> Result<(String, String)> {
        let start = now.checked_sub_signed(TimeDelta::hours(1));
        let expiry = now.checked_add_signed(self.sas_validity);
        match (start, expiry) {
            (Some(start), Some(expiry)) => Ok((
                start.format(SAS_TIME_FORMAT).to_string(),
                expiry.format(SAS_TIME_FORMAT).to_string(),
            )),
            _ => Err(Error::Config(format!(
                "SAS expiry is out of range ({}h from {now})",
                self.sas_validity.num_hours()
            ))),
        }
    }
}

/// Replaces each secret of at least [`MIN_REDACTED_LEN`] characters in
/// command output with `***`.
pub(crate) fn redact(text: &str, secrets: &[&str]) -> String {
    secrets
        .iter()
        .filter(|s| s.len() >= MIN_REDACTED_LEN)
        .fold(text.to_string(), |acc, secret| acc.replace(secret, "***"))
}

/// Renders a command line for logs. Values following a secret flag are
/// masked by position, and URL query strings (SAS tokens) are dropped.
pub(crate) fn command_line(program: &str, args: &[String]) -> String {
    let mut shown = Vec::with_capacity(args.len() + 1);
    shown.push(program.to_string());
    let mut mask_next = false;
    for arg in args {
        if mask_next {
            shown.push("***".to_string());
            mask_next = false;
            continue;
        }
        mask_next = SECRET_FLAGS.contains(&arg.as_str());
        if arg.starts_with("https://") && arg.contains('?') {
            shown.push(format!("{}?***", strip_query(arg)));
        } else {
            shown.push(arg.clone());
        }
    }
    shown.join(" ")
}

fn owned(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| (*s).to_string()).collect()
}

pub(crate) fn subscription_args(subscription: &str) -> Vec<String> {
    owned(&["account", "set", "--subscription", subscription])
}

pub(crate) fn storage_keys_args(resource_group: &str, account_name: &str) -> Vec<String> {
    owned(&[
        "storage",
        "account",
        "keys",
        "list",
        "--resource-group",
        resource_group,
        "--account-name",
        account_name,
        "--output",
        "json",
    ])
}

/// `az sql db export|import` arguments. Exports are submitted with
/// `--no-wait`; imports block until the service reports completion.
pub(crate) fn transfer_args(operation: &str, request: &TransferRequest) -> Vec<String> {
    let mut args = owned(&[
        "sql",
        "db",
        operation,
        "--admin-password",
        &request.admin_password,
        "--admin-user",
        &request.admin_name,
        "--storage-key",
        &request.storage_key,
        "--storage-key-type",
        &request.storage_key_type,
        "--storage-uri",
        &request.storage_uri,
        "--auth-type",
        &request.auth_type,
        "--name",
        &request.database,
        "--resource-group",
        &request.resource_group,
        "--server",
        &request.server,
        "--subscription",
        &request.subscription,
    ]);
    if operation == "export" {
        args.push("--no-wait".to_string());
    }
    args
}

fn container_args(action: &str, account_name: &str, account_key: &str, container: &str) -> Vec<String> {
    owned(&[
        "storage",
        "container",
        action,
        "--name",
        container,
        "--account-name",
        account_name,
        "--account-key",
        account_key,
        "--output",
        "json",
    ])
}

pub(crate) fn container_sas_args(
    account_name: &str,
    account_key: &str,
    container: &str,
    start: &str,
    expiry: &str,
) -> Vec<String> {
    owned(&[
        "storage",
        "container",
        "generate-sas",
        "--name",
        container,
        "--account-name",
        account_name,
        "--account-key",
        account_key,
        "--permissions",
        SAS_PERMISSIONS,
        "--start",
        start,
        "--expiry",
        expiry,
        "--https-only",
        "--output",
        "tsv",
    ])
}

pub(crate) fn account_sas_args(account_name: &str, account_key: &str, start: &str, expiry: &str) -> Vec<String> {
    owned(&[
        "storage",
        "account",
        "generate-sas",
        "--account-name",
        account_name,
        "--account-key",
        account_key,
        "--services",
        "b",
        "--resource-types",
        "sco",
        "--permissions",
        SAS_PERMISSIONS,
        "--start",
        start,
        "--expiry",
        expiry,
        "--https-only",
        "--output",
        "tsv",
    ])
}

pub(crate) fn blob_list_args(account_name: &str, account_key: &str, container: &str) -> Vec<String> {
    owned(&[
        "storage",
        "blob",
        "list",
        "--container-name",
        container,
        "--account-name",
        account_name,
        "--account-key",
        account_key,
        "--num-results",
        "*",
        "--query",
        "[].name",
        "--output",
        "json",
    ])
}

pub(crate) fn copy_args(request: &CopyRequest) -> Vec<String> {
    vec![
        "copy".to_string(),
        request.source_url.clone(),
        request.target_url.clone(),
        format!("--recursive={}", request.recursive),
        format!("--overwrite={}", request.overwrite),
    ]
}

/// Joins an account URL, optional container and SAS token into a URL.
pub(crate) fn sas_url(account_url: &str, container: Option<&str>, token: &str) -> String {
    let base = account_url.trim_end_matches('/');
    let token = token.trim().trim_matches('"').trim_start_matches('?');
    match container {
        Some(container) => format!("{base}/{container}?{token}"),
        None => format!("{base}/?{token}"),
    }
}

#[async_trait]
impl CloudGateway for AzCliGateway {
    async fn login(&self) -> Result<()> {
        self.run_attached(&self.az, &owned(&["login", "--output", "none"]))
            .await
            .map_err(|e| Error::Authentication(e.to_string()))?;
        Ok(())
    }

    async fn select_subscription(&self, subscription: &str) -> Result<()> {
        self.az(subscription_args(subscription), &[])
            .await
            .map_err(|e| Error::Authentication(e.to_string()))?;
        Ok(())
    }

    async fn storage_keys(&self, resource_group: &str, account_name: &str) -> Result<Vec<StorageKey>> {
        let out = self
            .az(storage_keys_args(resource_group, account_name), &[])
            .await?;
        if out.trim().is_empty() {
            info!("Storage keys: empty output for {}", account_name);
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&out)?)
    }

    async fn export(&self, request: &TransferRequest) -> Result<()> {
        let secrets = [request.admin_password.as_str(), request.storage_key.as_str()];
        self.az(transfer_args("export", request), &secrets).await?;
        Ok(())
    }

    async fn import(&self, request: &TransferRequest) -> Result<()> {
        let secrets = [request.admin_password.as_str(), request.storage_key.as_str()];
        self.az(transfer_args("import", request), &secrets).await?;
        Ok(())
    }

    async fn generate_sas_url(
        &self,
        account_name: &str,
        account_key: &str,
        account_url: &str,
        container: Option<&str>,
    ) -> Result<String> {
        let (start, expiry) = self.sas_window(Utc::now())?;

        let token = match container.filter(|c| !c.trim().is_empty()) {
            Some(container) => {
                self.ensure_container(account_name, account_key, container)
                    .await?;
                self.az(
                    container_sas_args(account_name, account_key, container, &start, &expiry),
                    &[account_key],
                )
                .await?
            }
            None => {
                self.az(
                    account_sas_args(account_name, account_key, &start, &expiry),
                    &[account_key],
                )
                .await?
            }
        };

        if token.trim().is_empty() {
            return Err(Error::Gateway(format!(
                "empty SAS token for account '{account_name}'"
            )));
        }

        let url = sas_url(account_url, container, &token);
        info!("SAS URI generated for {}", strip_query(&url));
        Ok(url)
    }

    async fn list_container_objects(
        &self,
        account_name: &str,
        account_key: &str,
        _account_url: &str,
        container: &str,
    ) -> Result<Vec<String>> {
        let out = self
            .az(blob_list_args(account_name, account_key, container), &[account_key])
            .await?;
        if out.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&out)?)
    }

    async fn copy(&self, request: &CopyRequest) -> Result<()> {
        self.run_attached(&self.azcopy, &copy_args(request)).await?;
        info!(
            "Copied {} to {}",
            strip_query(&request.source_url),
            strip_query(&request.target_url)
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "az_cli_tests.rs"]
mod tests;
