//! Duplicate suppression against a ledger of previously seen candidates.
//!
//! A [`DedupKey`] fingerprints a candidate by `(title, organization,
//! source_link)`. The [`DedupFilter`] consults a [`ResultLedger`] for each
//! candidate and also remembers keys admitted earlier in the same batch, so
//! a duplicate inside one search is rejected even before the ledger write is
//! visible.

mod ledger;

pub use ledger::{InMemoryLedger, SqliteLedger};

use crate::matching::CandidateRecord;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Separator between fingerprinted fields (ASCII unit separator)
const FIELD_SEPARATOR: &str = "\u{1f}";

/// Stable fingerprint of a candidate: lowercase hex SHA-256.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DedupKey(String);

impl DedupKey {
    pub fn from_fields(title: &str, organization: &str, source_link: &str) -> Self {
        let digest = Sha256::new()
            .chain_update(title.trim())
            .chain_update(FIELD_SEPARATOR)
            .chain_update(organization.trim())
            .chain_update(FIELD_SEPARATOR)
            .chain_update(source_link.trim())
            .finalize();

        let hex: String = digest.iter().map(|byte| format!("{:02x}", byte)).collect();
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&CandidateRecord> for DedupKey {
    fn from(candidate: &CandidateRecord) -> Self {
        Self::from_fields(&candidate.title, &candidate.organization, &candidate.source_link)
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// External system of record for keys already delivered.
#[async_trait]
pub trait ResultLedger: Send + Sync {
    async fn exists(&self, key: &DedupKey) -> Result<bool>;

    async fn record(&self, key: &DedupKey) -> Result<()>;
}

/// Per-batch duplicate filter. Create one per search invocation.
pub struct DedupFilter {
    ledger: Arc<dyn ResultLedger>,
    seen: HashSet<DedupKey>,
}

impl DedupFilter {
    pub fn new(ledger: Arc<dyn ResultLedger>) -> Self {
        Self {
            ledger,
            seen: HashSet::new(),
        }
    }

    /// Returns `true` if the candidate is new, recording it in the ledger.
    ///
    /// Ledger failures are returned to the caller; the candidate is then
    /// neither admitted nor remembered.
    pub async fn admit(&mut self, candidate: &CandidateRecord) -> Result<bool> {
        let key = DedupKey::from(candidate);

        if self.seen.contains(&key) {
            debug!(candidate_id = %candidate.id, "Duplicate within batch");
            return Ok(false);
        }

        if self.ledger.exists(&key).await? {
            debug!(candidate_id = %candidate.id, "Already recorded in ledger");
            self.seen.insert(key);
            return Ok(false);
        }

        self.ledger.record(&key).await?;
        self.seen.insert(key);
        Ok(true)
    }

    /// Keys seen so far in this batch
    pub fn seen(&self) -> usize {
        self.seen.len()
    }
}
