//! Migration pipeline orchestration.
//!
//! A run walks the phases strictly in order: authenticate, resolve storage
//! keys, obtain the credential, export fan-out, completion poll, bulk copy,
//! import fan-out and verification. Any phase error ends the run in
//! [`PipelineState::Failed`]; there is no resume.

use futures::future::join_all;
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{MigrationConfig, StorageEndpoint, VerificationQuerySet};
use crate::console::Console;
use crate::credential::{Credential, CredentialProvider};
use crate::error::{Error, Result};
use crate::gateway::{
    first_usable_key, CloudGateway, CopyRequest, TransferRequest, VerificationGateway,
};
use crate::progress::ProgressGuard;
use crate::verify::{MismatchReport, VerificationEngine};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Not started.
    Idle,
    /// Signed in to the cloud control plane.
    Authenticated,
    /// Both storage account keys assigned.
    KeysResolved,
    /// Administrator credential collected.
    CredentialObtained,
    /// Every export submitted and every snapshot present.
    Exported,
    /// Snapshots copied to the target container.
    Transferred,
    /// Every import completed.
    Imported,
    /// Verification report produced.
    Verified,
    /// Run finished.
    Done,
    /// Run aborted.
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Authenticated => "authenticated",
            Self::KeysResolved => "keys resolved",
            Self::CredentialObtained => "credential obtained",
            Self::Exported => "exported",
            Self::Transferred => "transferred",
            Self::Imported => "imported",
            Self::Verified => "verified",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Default)]
pub struct MigrationSummary {
    /// Database pairs in the configuration.
    pub pairs: usize,
    /// Exports submitted.
    pub exported: usize,
    /// Imports completed.
    pub imported: usize,
    /// Verification result.
    pub report: MismatchReport,
    /// Duration in seconds.
    pub duration_secs: f64,
}

impl MigrationSummary {
    /// Number of verification mismatches.
    #[must_use]
    pub fn mismatches(&self) -> usize {
        self.report.len()
    }
}

/// Migration pipeline.
pub struct Pipeline {
    config: MigrationConfig,
    queries: VerificationQuerySet,
    cloud: Arc<dyn CloudGateway>,
    verifier: Arc<dyn VerificationGateway>,
    console: Arc<dyn Console>,
    credentials: CredentialProvider,
    history: Vec<PipelineState>,
    show_progress: bool,
}

impl Pipeline {
    /// Creates a pipeline over the given gateways and console.
    pub fn new(
        config: MigrationConfig,
        queries: VerificationQuerySet,
        cloud: Arc<dyn CloudGateway>,
        verifier: Arc<dyn VerificationGateway>,
        console: Arc<dyn Console>,
    ) -> Self {
        Self {
            config,
            queries,
            cloud,
            verifier,
            credentials: CredentialProvider::new(console.clone()),
            console,
            history: vec![PipelineState::Idle],
            show_progress: true,
        }
    }

    /// Enables or disables terminal spinners.
    #[must_use]
    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.history
            .last()
            .copied()
            .unwrap_or(PipelineState::Idle)
    }

    /// Every state visited so far, starting with `Idle`.
    #[must_use]
    pub fn history(&self) -> &[PipelineState] {
        &self.history
    }

    /// The configuration, including keys resolved during the run.
    #[must_use]
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Runs the migration from start to finish.
    ///
    /// # Errors
    ///
    /// Returns the first phase error. The pipeline is left in
    /// [`PipelineState::Failed`]. A pipeline runs at most once.
    pub async fn run(&mut self) -> Result<MigrationSummary> {
        if self.state() != PipelineState::Idle {
            return Err(Error::InvalidState(format!(
                "pipeline already ran (state: {})",
                self.state()
            )));
        }

        let start = Instant::now();
        info!(
            "Starting migration of {} database(s)",
            self.config.database_configs.len()
        );

        match self.execute().await {
            Ok(mut summary) => {
                summary.duration_secs = start.elapsed().as_secs_f64();
                self.enter(PipelineState::Done);
                info!(
                    "Migration complete: {} exported, {} imported, {} mismatch(es) in {:.2}s",
                    summary.exported,
                    summary.imported,
                    summary.mismatches(),
                    summary.duration_secs
                );
                Ok(summary)
            }
            Err(e) => {
                if e.is_operator_exit() {
                    info!("Operator exited during {}", self.state());
                } else {
                    error!("Migration failed after {}: {}", self.state(), e);
                }
                self.enter(PipelineState::Failed);
                Err(e)
            }
        }
    }

    async fn execute(&mut self) -> Result<MigrationSummary> {
        let pairs = self.config.database_configs.len();

        self.cloud.login().await?;
        self.enter(PipelineState::Authenticated);

        self.resolve_keys().await?;
        self.enter(PipelineState::KeysResolved);

        let credential = self.obtain_credential().await?;
        self.enter(PipelineState::CredentialObtained);

        let exported = self.export_all(&credential).await?;
        self.await_snapshots().await?;
        self.enter(PipelineState::Exported);

        self.transfer().await?;
        self.enter(PipelineState::Transferred);

        let imported = self.import_all(&credential).await?;
        self.enter(PipelineState::Imported);

        let report = self.verify(&credential).await;
        self.enter(PipelineState::Verified);

        Ok(MigrationSummary {
            pairs,
            exported,
            imported,
            report,
            duration_secs: 0.0,
        })
    }

    fn enter(&mut self, state: PipelineState) {
        debug!("Pipeline state: {} -> {}", self.state(), state);
        self.history.push(state);
    }

    fn progress(&self, message: impl Into<String>) -> ProgressGuard {
        if self.show_progress {
            ProgressGuard::start(message)
        } else {
            ProgressGuard::hidden(message)
        }
    }

    /// Runs the credential prompt on the blocking pool; console reads block.
    async fn obtain_credential(&mut self) -> Result<Credential> {
        let mut provider = std::mem::replace(
            &mut self.credentials,
            CredentialProvider::new(self.console.clone()),
        );
        let (provider, result) = tokio::task::spawn_blocking(move || {
            let result = provider.credential();
            (provider, result)
        })
        .await
        .map_err(|e| Error::Prompt(format!("credential prompt aborted: {e}")))?;
        self.credentials = provider;
        result
    }

    async fn resolve_keys(&mut self) -> Result<()> {
        resolve_key(self.cloud.as_ref(), "source", &mut self.config.source).await?;
        resolve_key(self.cloud.as_ref(), "target", &mut self.config.target).await
    }

    async fn export_all(&self, credential: &Credential) -> Result<usize> {
        let requests = self
            .config
            .database_configs
            .iter()
            .map(|pair| TransferRequest::export(pair, &self.config.source, credential))
            .collect::<Result<Vec<_>>>()?;

        let cloud = self.cloud.as_ref();
        let outcomes = join_all(
            requests
                .iter()
                .map(|request| async move { (request, cloud.export(request).await) }),
        )
        .await;

        self.settle("export", outcomes, |request| {
            format!("Export request raised for {}", request.label())
        })
    }

    /// Waits until the source container holds one snapshot per pair.
    async fn await_snapshots(&self) -> Result<()> {
        let source = &self.config.source;
        let expected = self.config.database_configs.len();
        let interval = self.config.options.poll_interval();
        let timeout = self.config.options.poll_timeout();
        let account = source.storage_name();
        let key = source.storage_key()?;

        let progress = self.progress(format!("Waiting for {expected} export(s)"));
        let started = Instant::now();
        loop {
            tokio::time::sleep(interval).await;

            let observed = self
                .cloud
                .list_container_objects(&account, key, &source.storage_account_url, &source.container)
                .await?
                .len();
            debug!("{}/{} snapshot(s) in {}", observed, expected, source.container);
            progress.set_message(format!(
                "{observed}/{expected} snapshot(s) in {}",
                source.container
            ));

            if observed == expected {
                break;
            }
            if let Some(limit) = timeout {
                if started.elapsed() >= limit {
                    return Err(Error::PollTimeout {
                        elapsed_secs: started.elapsed().as_secs(),
                        observed,
                        expected,
                    });
                }
            }
        }
        progress.finish();

        self.console.write_line("Export is completed", true);
        Ok(())
    }

    async fn transfer(&self) -> Result<()> {
        let source_url = container_sas(self.cloud.as_ref(), &self.config.source).await?;
        let target_url = container_sas(self.cloud.as_ref(), &self.config.target).await?;

        let request = CopyRequest::preserving(source_url, target_url);
        info!("Copying snapshots: {:?}", request);
        self.cloud.copy(&request).await?;

        self.console
            .write_line("Snapshots copied to the target storage account", true);
        Ok(())
    }

    async fn import_all(&self, credential: &Credential) -> Result<usize> {
        let requests = self
            .config
            .database_configs
            .iter()
            .map(|pair| TransferRequest::import(pair, &self.config.target, credential))
            .collect::<Result<Vec<_>>>()?;

        let progress = self.progress(format!("Importing {} database(s)", requests.len()));
        let cloud = self.cloud.as_ref();
        let outcomes = join_all(
            requests
                .iter()
                .map(|request| async move { (request, cloud.import(request).await) }),
        )
        .await;
        progress.finish();

        self.settle("import", outcomes, |request| {
            format!("Import is completed in {}", request.label())
        })
    }

    async fn verify(&self, credential: &Credential) -> MismatchReport {
        let progress = self.progress("Verifying row counts");
        let engine = VerificationEngine::new(self.verifier.clone());
        let report = engine
            .verify(credential, &self.config.database_configs, &self.queries)
            .await;
        progress.finish();

        for line in report.lines() {
            self.console.write_line(&line, true);
        }
        if report.is_clean() {
            self.console.write_line("Verification passed", true);
        } else {
            warn!("Verification found {} mismatch(es)", report.len());
        }
        report
    }

    /// Reports every fan-out outcome, then fails the phase if any unit failed.
    fn settle(
        &self,
        phase: &'static str,
        outcomes: Vec<(&TransferRequest, Result<()>)>,
        success: impl Fn(&TransferRequest) -> String,
    ) -> Result<usize> {
        let mut succeeded = 0;
        let mut failures = Vec::new();

        for (request, outcome) in outcomes {
            match outcome {
                Ok(()) => {
                    succeeded += 1;
                    self.console.write_line(&success(request), true);
                }
                Err(e) => {
                    warn!("{} failed for {}: {}", phase, request.label(), e);
                    failures.push(format!("{}: {}", request.label(), e));
                }
            }
        }

        if failures.is_empty() {
            Ok(succeeded)
        } else {
            Err(Error::FanOut { phase, failures })
        }
    }
}

async fn resolve_key(
    cloud: &dyn CloudGateway,
    side: &str,
    endpoint: &mut StorageEndpoint,
) -> Result<()> {
    let account = endpoint.storage_name();
    cloud.select_subscription(&endpoint.subscription).await?;
    let keys = cloud
        .storage_keys(&endpoint.resource_group, &account)
        .await?;

    let key = first_usable_key(&keys).ok_or_else(|| {
        Error::KeyResolution(format!(
            "no usable key for {side} storage account '{account}'"
        ))
    })?;
    endpoint.set_storage_key(key)?;
    info!("Resolved {} storage key for {}", side, account);
    Ok(())
}

async fn container_sas(cloud: &dyn CloudGateway, endpoint: &StorageEndpoint) -> Result<String> {
    cloud
        .generate_sas_url(
            &endpoint.storage_name(),
            endpoint.storage_key()?,
            &endpoint.storage_account_url,
            Some(&endpoint.container),
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatabasePair, MigrationOptions};
    use crate::gateway::StorageKey;
    use crate::mock::{GatewayCall, MockCloudGateway, MockVerifier, ScriptedConsole};

    fn config() -> MigrationConfig {
        MigrationConfig {
            database_configs: vec![DatabasePair {
                source_resource_group: "rg-src".to_string(),
                source_server: "sqlsrc.database.windows.net".to_string(),
                source_db: "orders".to_string(),
                target_resource_group: "rg-dst".to_string(),
                target_server: "sqldst.database.windows.net".to_string(),
                target_db: "orders".to_string(),
            }],
            source: StorageEndpoint::new(
                "rg-src",
                "sub-src",
                "https://contososrc.blob.core.windows.net",
                "migrationbackups",
            ),
            target: StorageEndpoint::new(
                "rg-dst",
                "sub-dst",
                "https://contosodst.blob.core.windows.net",
                "migrationbackups",
            ),
            options: MigrationOptions {
                poll_interval_secs: 1,
                ..MigrationOptions::default()
            },
        }
    }

    fn pipeline(cloud: MockCloudGateway, answers: &[&str]) -> (Arc<MockCloudGateway>, Pipeline) {
        let cloud = Arc::new(cloud);
        let pipeline = Pipeline::new(
            config(),
            VerificationQuerySet::new(vec!["SELECT 1".to_string()]),
            cloud.clone(),
            Arc::new(MockVerifier::new()),
            Arc::new(ScriptedConsole::new(answers.iter().copied())),
        )
        .with_progress(false);
        (cloud, pipeline)
    }

    #[tokio::test]
    async fn test_resolve_key_takes_first_non_empty() {
        // Arrange
        let cloud = MockCloudGateway::new().with_keys(
            "contososrc",
            vec![StorageKey::new("key1", ""), StorageKey::new("key2", "k2")],
        );
        let mut endpoint = config().source;

        // Act
        resolve_key(&cloud, "source", &mut endpoint).await.unwrap();

        // Assert
        assert_eq!(endpoint.storage_key().unwrap(), "k2");
        assert_eq!(
            cloud.calls(),
            vec![
                GatewayCall::SelectSubscription("sub-src".to_string()),
                GatewayCall::StorageKeys {
                    resource_group: "rg-src".to_string(),
                    account: "contososrc".to_string(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_resolve_key_without_usable_key_fails() {
        let cloud = MockCloudGateway::new().with_keys("contososrc", vec![StorageKey::new("key1", " ")]);
        let mut endpoint = config().source;

        let err = resolve_key(&cloud, "source", &mut endpoint).await.unwrap_err();

        assert!(matches!(err, Error::KeyResolution(ref m) if m.contains("contososrc")));
        assert!(endpoint.storage_key().is_err());
    }

    #[tokio::test]
    async fn test_login_failure_stops_before_any_other_call() {
        let (cloud, mut pipeline) = pipeline(MockCloudGateway::new().failing_login(), &[]);

        let err = pipeline.run().await.unwrap_err();

        assert!(matches!(err, Error::Authentication(_)));
        assert_eq!(cloud.call_names(), vec!["login"]);
        assert_eq!(
            pipeline.history(),
            &[PipelineState::Idle, PipelineState::Failed]
        );
    }

    #[tokio::test]
    async fn test_operator_exit_ends_in_failed_state() {
        let cloud = MockCloudGateway::new()
            .with_keys("contososrc", vec![StorageKey::new("key1", "a")])
            .with_keys("contosodst", vec![StorageKey::new("key1", "b")]);
        let (cloud, mut pipeline) = pipeline(cloud, &["", "Y"]);

        let err = pipeline.run().await.unwrap_err();

        assert!(err.is_operator_exit());
        assert_eq!(pipeline.state(), PipelineState::Failed);
        assert!(!cloud.call_names().contains(&"export"));
    }

    #[tokio::test]
    async fn test_credential_prompt_keeps_cache_across_calls() {
        // Arrange
        let console = Arc::new(ScriptedConsole::new(["sqladmin", "secret"]));
        let mut pipeline = Pipeline::new(
            config(),
            VerificationQuerySet::new(vec!["SELECT 1".to_string()]),
            Arc::new(MockCloudGateway::new()),
            Arc::new(MockVerifier::new()),
            console.clone(),
        )
        .with_progress(false);

        // Act
        let first = pipeline.obtain_credential().await.unwrap();
        let second = pipeline.obtain_credential().await.unwrap();

        // Assert
        assert_eq!(first.admin_name(), "sqladmin");
        assert_eq!(second.admin_password(), "secret");
        assert_eq!(console.prompt_count(), 2);
        assert_eq!(console.remaining_answers(), 0);
    }

    #[tokio::test]
    async fn test_pipeline_runs_once() {
        let (_, mut pipeline) = pipeline(MockCloudGateway::new().failing_login(), &[]);
        let _ = pipeline.run().await;

        let err = pipeline.run().await.unwrap_err();

        assert!(matches!(err, Error::InvalidState(_)));
    }

    #[test]
    fn test_state_display() {
        assert_eq!(PipelineState::KeysResolved.to_string(), "keys resolved");
        assert_eq!(PipelineState::Failed.to_string(), "failed");
    }
}
