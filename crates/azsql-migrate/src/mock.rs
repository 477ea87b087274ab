//! Scripted gateways and console for exercising the pipeline without a
//! cloud subscription or a SQL server.
//!
//! Every mock records the calls it receives so tests can assert on order and
//! arguments.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use crate::console::Console;
use crate::credential::Credential;
use crate::error::{Error, Result};
use crate::gateway::{
    CloudGateway, CopyRequest, QueryCounts, StorageKey, TransferRequest, VerificationGateway,
};

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// A call received by [`MockCloudGateway`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    /// `login`.
    Login,
    /// `select_subscription`.
    SelectSubscription(String),
    /// `storage_keys` for an account.
    StorageKeys {
        /// Resource group.
        resource_group: String,
        /// Account name.
        account: String,
    },
    /// `export`.
    Export(TransferRequest),
    /// `import`.
    Import(TransferRequest),
    /// `generate_sas_url`.
    GenerateSas {
        /// Account name.
        account: String,
        /// Container, if any.
        container: Option<String>,
    },
    /// `list_container_objects`.
    List {
        /// Account name.
        account: String,
        /// Container.
        container: String,
    },
    /// `copy`.
    Copy(CopyRequest),
}

impl GatewayCall {
    /// Short operation name, for order assertions.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::SelectSubscription(_) => "select_subscription",
            Self::StorageKeys { .. } => "storage_keys",
            Self::Export(_) => "export",
            Self::Import(_) => "import",
            Self::GenerateSas { .. } => "generate_sas_url",
            Self::List { .. } => "list_container_objects",
            Self::Copy(_) => "copy",
        }
    }
}

/// In-memory [`CloudGateway`].
///
/// Listings follow a script of object counts; once the script runs out the
/// last count repeats.
#[derive(Default)]
pub struct MockCloudGateway {
    calls: Mutex<Vec<GatewayCall>>,
    keys: HashMap<String, Vec<StorageKey>>,
    listing_counts: Mutex<VecDeque<usize>>,
    last_listing: Mutex<usize>,
    failing_exports: HashSet<String>,
    failing_imports: HashSet<String>,
    fail_login: bool,
    fail_copy: bool,
}

impl MockCloudGateway {
    /// Creates a gateway with no keys and empty listings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys returned for `account`.
    #[must_use]
    pub fn with_keys(mut self, account: &str, keys: Vec<StorageKey>) -> Self {
        self.keys.insert(account.to_string(), keys);
        self
    }

    /// Object counts returned by successive listings.
    #[must_use]
    pub fn with_listing_counts(self, counts: impl IntoIterator<Item = usize>) -> Self {
        *lock(&self.listing_counts) = counts.into_iter().collect();
        self
    }

    /// Makes the export of `database` fail.
    #[must_use]
    pub fn failing_export(mut self, database: &str) -> Self {
        self.failing_exports.insert(database.to_string());
        self
    }

    /// Makes the import of `database` fail.
    #[must_use]
    pub fn failing_import(mut self, database: &str) -> Self {
        self.failing_imports.insert(database.to_string());
        self
    }

    /// Makes `login` fail.
    #[must_use]
    pub fn failing_login(mut self) -> Self {
        self.fail_login = true;
        self
    }

    /// Makes `copy` fail.
    #[must_use]
    pub fn failing_copy(mut self) -> Self {
        self.fail_copy = true;
        self
    }

    /// All calls received so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<GatewayCall> {
        lock(&self.calls).clone()
    }

    /// Operation names received so far, in order.
    #[must_use]
    pub fn call_names(&self) -> Vec<&'static str> {
        lock(&self.calls).iter().map(GatewayCall::name).collect()
    }

    fn record(&self, call: GatewayCall) {
        lock(&self.calls).push(call);
    }
}

#[async_trait]
impl CloudGateway for MockCloudGateway {
    async fn login(&self) -> Result<()> {
        self.record(GatewayCall::Login);
        if self.fail_login {
            return Err(Error::Authentication("login rejected".to_string()));
        }
        Ok(())
    }

    async fn select_subscription(&self, subscription: &str) -> Result<()> {
        self.record(GatewayCall::SelectSubscription(subscription.to_string()));
        Ok(())
    }

    async fn storage_keys(&self, resource_group: &str, account_name: &str) -> Result<Vec<StorageKey>> {
        self.record(GatewayCall::StorageKeys {
            resource_group: resource_group.to_string(),
            account: account_name.to_string(),
        });
        Ok(self.keys.get(account_name).cloned().unwrap_or_default())
    }

    async fn export(&self, request: &TransferRequest) -> Result<()> {
        self.record(GatewayCall::Export(request.clone()));
        if self.failing_exports.contains(&request.database) {
            return Err(Error::Gateway(format!("export of {} rejected", request.database)));
        }
        Ok(())
    }

    async fn import(&self, request: &TransferRequest) -> Result<()> {
        self.record(GatewayCall::Import(request.clone()));
        if self.failing_imports.contains(&request.database) {
            return Err(Error::Gateway(format!("import of {} rejected", request.database)));
        }
        Ok(())
    }

    async fn generate_sas_url(
        &self,
        account_name: &str,
        _account_key: &str,
        account_url: &str,
        container: Option<&str>,
    ) -> Result<String> {
        self.record(GatewayCall::GenerateSas {
            account: account_name.to_string(),
            container: container.map(str::to_string),
        });
        let base = account_url.trim_end_matches('/');
        Ok(match container {
            Some(c) => format!("{base}/{c}?sig=mock"),
            None => format!("{base}/?sig=mock"),
        })
    }

    async fn list_container_objects(
        &self,
        account_name: &str,
        _account_key: &str,
        _account_url: &str,
        container: &str,
    ) -> Result<Vec<String>> {
        self.record(GatewayCall::List {
            account: account_name.to_string(),
            container: container.to_string(),
        });
        let count = {
            let mut last = lock(&self.last_listing);
            if let Some(next) = lock(&self.listing_counts).pop_front() {
                *last = next;
            }
            *last
        };
        Ok((0..count).map(|i| format!("snapshot-{i}.bacpac")).collect())
    }

    async fn copy(&self, request: &CopyRequest) -> Result<()> {
        self.record(GatewayCall::Copy(request.clone()));
        if self.fail_copy {
            return Err(Error::Gateway("copy rejected".to_string()));
        }
        Ok(())
    }
}

/// In-memory [`VerificationGateway`] keyed by `(server, database)`.
#[derive(Default)]
pub struct MockVerifier {
    counts: HashMap<(String, String), QueryCounts>,
    failing: HashSet<(String, String)>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockVerifier {
    /// Creates a verifier with no data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe results for one database.
    #[must_use]
    pub fn with_counts(mut self, server: &str, database: &str, counts: &[(&str, i64)]) -> Self {
        let map = counts.iter().map(|(q, v)| ((*q).to_string(), *v)).collect();
        self.counts
            .insert((server.to_string(), database.to_string()), map);
        self
    }

    /// Makes every probe against one database fail.
    #[must_use]
    pub fn failing(mut self, server: &str, database: &str) -> Self {
        self.failing
            .insert((server.to_string(), database.to_string()));
        self
    }

    /// `(server, database)` pairs queried so far.
    #[must_use]
    pub fn calls(&self) -> Vec<(String, String)> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl VerificationGateway for MockVerifier {
    async fn counts(
        &self,
        server: &str,
        database: &str,
        _credential: &Credential,
        queries: &[String],
    ) -> Result<QueryCounts> {
        let key = (server.to_string(), database.to_string());
        lock(&self.calls).push(key.clone());
        if self.failing.contains(&key) {
            return Err(Error::Sql(format!("cannot reach {server},{database}")));
        }
        let known = self.counts.get(&key).cloned().unwrap_or_default();
        Ok(known
            .into_iter()
            .filter(|(q, _)| queries.contains(q))
            .collect())
    }
}

/// What a [`ScriptedConsole`] saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleEvent {
    /// A visible prompt.
    Prompt(String),
    /// A masked prompt.
    SecretPrompt(String),
    /// An output line and its log flag.
    Output(String, bool),
}

/// [`Console`] that answers prompts from a fixed script.
#[derive(Default)]
pub struct ScriptedConsole {
    answers: Mutex<VecDeque<String>>,
    events: Mutex<Vec<ConsoleEvent>>,
}

impl ScriptedConsole {
    /// Creates a console answering prompts with `answers`, in order.
    pub fn new<S: Into<String>>(answers: impl IntoIterator<Item = S>) -> Self {
        Self {
            answers: Mutex::new(answers.into_iter().map(Into::into).collect()),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Everything the console saw, in order.
    #[must_use]
    pub fn events(&self) -> Vec<ConsoleEvent> {
        lock(&self.events).clone()
    }

    /// Output lines only.
    #[must_use]
    pub fn outputs(&self) -> Vec<String> {
        lock(&self.events)
            .iter()
            .filter_map(|e| match e {
                ConsoleEvent::Output(line, _) => Some(line.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of prompts (visible and masked) shown.
    #[must_use]
    pub fn prompt_count(&self) -> usize {
        lock(&self.events)
            .iter()
            .filter(|e| !matches!(e, ConsoleEvent::Output(..)))
            .count()
    }

    /// Answers not consumed yet.
    #[must_use]
    pub fn remaining_answers(&self) -> usize {
        lock(&self.answers).len()
    }

    fn next_answer(&self) -> Result<String> {
        lock(&self.answers)
            .pop_front()
            .ok_or_else(|| Error::Prompt("script exhausted".to_string()))
    }
}

impl Console for ScriptedConsole {
    fn read_line(&self, prompt: &str) -> Result<String> {
        lock(&self.events).push(ConsoleEvent::Prompt(prompt.to_string()));
        self.next_answer()
    }

    fn read_secret(&self, prompt: &str) -> Result<String> {
        lock(&self.events).push(ConsoleEvent::SecretPrompt(prompt.to_string()));
        self.next_answer()
    }

    fn write_line(&self, message: &str, log: bool) {
        lock(&self.events).push(ConsoleEvent::Output(message.to_string(), log));
    }
}
