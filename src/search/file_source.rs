//! Candidate source backed by a JSON file.

use super::{CandidateSource, SearchQuery};
use crate::matching::CandidateRecord;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use std::path::PathBuf;
use tracing::debug;

/// Serves records from a JSON array on disk, re-read on every search.
///
/// The query's keywords, location and posting window narrow the records
/// here; matching against requirements happens downstream. Records carry no
/// experience level or employment type, so those filters are not applied.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(path: PathBuf, query: SearchQuery) -> Result<Vec<CandidateRecord>> {
        let contents = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read candidates from {}", path.display()))?;
        let records: Vec<CandidateRecord> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse candidates in {}", path.display()))?;

        let total = records.len();
        let now = Utc::now();
        let selected: Vec<CandidateRecord> = records
            .into_iter()
            .filter(|record| query_selects(&query, record, now))
            .collect();

        debug!(path = %path.display(), total, selected = selected.len(), "Loaded candidate file");
        Ok(selected)
    }
}

impl CandidateSource for JsonFileSource {
    fn fetch(&self, query: &SearchQuery) -> BoxStream<'static, Result<CandidateRecord>> {
        let load = Self::load(self.path.clone(), query.clone());
        stream::once(load)
            .map_ok(|records| stream::iter(records.into_iter().map(Ok::<_, anyhow::Error>)))
            .try_flatten()
            .boxed()
    }

    fn name(&self) -> &str {
        "json_file"
    }
}

/// Every keyword term must appear in title, organization or description;
/// the location, when given, must appear in the record's location. A posting
/// window drops undated records.
fn query_selects(query: &SearchQuery, record: &CandidateRecord, now: DateTime<Utc>) -> bool {
    let haystack = format!(
        "{} {} {}",
        record.title, record.organization, record.description
    )
    .to_lowercase();

    let keywords_ok = query
        .keywords
        .split_whitespace()
        .all(|term| haystack.contains(&term.to_lowercase()));

    let location = query.location.trim().to_lowercase();
    let location_ok = location.is_empty() || record.location.to_lowercase().contains(&location);

    let date_ok = query
        .date_posted
        .map_or(true, |window| window.admits(record.posted_at, now));

    keywords_ok && location_ok && date_ok
}
