//! Row-count parity between source and target databases.
//!
//! Every pair is verified concurrently, and within a pair the source and
//! target sides run concurrently. A side that fails (connection, query or
//! truncation error) makes every probe of that pair a mismatch; a probe
//! missing from one side's results is a mismatch too. Nothing is dropped.

use futures::future::join_all;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::{DatabasePair, VerificationQuerySet};
use crate::credential::Credential;
use crate::gateway::{QueryCounts, VerificationGateway};

/// What one side reported for one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// The probe returned this value.
    Count(i64),
    /// The side answered, but without this probe.
    Missing,
    /// The side could not be queried.
    Unavailable(String),
}

impl fmt::Display for Observation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(v) => write!(f, "{v}"),
            Self::Missing => write!(f, "no result"),
            Self::Unavailable(reason) => write!(f, "unavailable ({reason})"),
        }
    }
}

/// A probe whose source and target observations differ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    /// Probe text.
    pub query: String,
    /// Source server host.
    pub source_server: String,
    /// Source database.
    pub source_db: String,
    /// Source observation.
    pub source: Observation,
    /// Target server host.
    pub target_server: String,
    /// Target database.
    pub target_db: String,
    /// Target observation.
    pub target: Observation,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} count {},{} - {} is not matched with {},{} - {}",
            self.query,
            self.source_server,
            self.source_db,
            self.source,
            self.target_server,
            self.target_db,
            self.target
        )
    }
}

/// Outcome of a verification pass. Empty means full parity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MismatchReport {
    mismatches: Vec<Mismatch>,
}

impl MismatchReport {
    /// Whether every probe matched on every pair.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty()
    }

    /// Number of mismatches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mismatches.len()
    }

    /// Whether the report has no mismatches.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mismatches.is_empty()
    }

    /// The mismatches, in pair order then query order.
    #[must_use]
    pub fn mismatches(&self) -> &[Mismatch] {
        &self.mismatches
    }

    /// One human-readable line per mismatch.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.mismatches.iter().map(ToString::to_string).collect()
    }
}

fn observe(side: &Result<QueryCounts, String>, query: &str) -> Observation {
    match side {
        Ok(counts) => counts
            .get(query)
            .map_or(Observation::Missing, |v| Observation::Count(*v)),
        Err(reason) => Observation::Unavailable(reason.clone()),
    }
}

/// Compares one pair's two result sets over the full query list.
fn compare_pair(
    pair: &DatabasePair,
    queries: &[String],
    source: &Result<QueryCounts, String>,
    target: &Result<QueryCounts, String>,
) -> Vec<Mismatch> {
    queries
        .iter()
        .filter_map(|query| {
            let src = observe(source, query);
            let dst = observe(target, query);
            let matched = matches!((&src, &dst), (Observation::Count(a), Observation::Count(b)) if a == b);
            (!matched).then(|| Mismatch {
                query: query.clone(),
                source_server: pair.source_server.clone(),
                source_db: pair.source_db.clone(),
                source: src,
                target_server: pair.target_server.clone(),
                target_db: pair.target_db.clone(),
                target: dst,
            })
        })
        .collect()
}

/// Runs the verification probes across all pairs.
pub struct VerificationEngine {
    gateway: Arc<dyn VerificationGateway>,
}

impl VerificationEngine {
    /// Creates an engine over `gateway`.
    pub fn new(gateway: Arc<dyn VerificationGateway>) -> Self {
        Self { gateway }
    }

    async fn side(
        &self,
        server: &str,
        database: &str,
        credential: &Credential,
        queries: &[String],
    ) -> Result<QueryCounts, String> {
        self.gateway
            .counts(server, database, credential, queries)
            .await
            .map_err(|e| {
                warn!("Verification probes failed on {},{}: {}", server, database, e);
                e.to_string()
            })
    }

    async fn verify_pair(
        &self,
        credential: &Credential,
        pair: &DatabasePair,
        queries: &[String],
    ) -> Vec<Mismatch> {
        let (source, target) = tokio::join!(
            self.side(&pair.source_server, &pair.source_db, credential, queries),
            self.side(&pair.target_server, &pair.target_db, credential, queries),
        );
        let mismatches = compare_pair(pair, queries, &source, &target);
        debug!(
            "Verified {} -> {}: {} mismatch(es)",
            pair.source_label(),
            pair.target_label(),
            mismatches.len()
        );
        mismatches
    }

    /// Verifies every pair concurrently and returns once all have finished.
    pub async fn verify(
        &self,
        credential: &Credential,
        pairs: &[DatabasePair],
        queries: &VerificationQuerySet,
    ) -> MismatchReport {
        let per_pair = join_all(
            pairs
                .iter()
                .map(|pair| self.verify_pair(credential, pair, queries.queries())),
        )
        .await;

        MismatchReport {
            mismatches: per_pair.into_iter().flatten().collect(),
        }
    }
}

#[cfg(test)]
#[path = "verify_tests.rs"]
mod tests;
