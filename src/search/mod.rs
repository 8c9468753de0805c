//! Search pipeline: pull candidates, score them, drop duplicates, rank.
//!
//! Candidates are pulled from a [`CandidateSource`] under a deadline. A
//! source that fails or stalls partway keeps whatever it already produced;
//! the outcome reports the failure alongside the results. The same holds
//! for the ledger: a failed lookup or write ends deduplication, and the
//! candidates admitted before it are still returned.

mod file_source;
mod filters;
mod tasks;

pub use file_source::JsonFileSource;
pub use filters::{DatePosted, EmploymentType, ExperienceLevel};
pub use tasks::{SearchTask, TaskRegistry, TaskStatus};

use crate::config::SearchConfig;
use crate::dedup::{DedupFilter, ResultLedger};
use crate::matching::{self, CandidateRecord, MatchCriteria, MatchResult};
use anyhow::Result;
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// What the source is asked for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub keywords: String,
    pub location: String,
    pub max_results: usize,
    pub experience_level: Option<ExperienceLevel>,
    pub employment_type: Option<EmploymentType>,
    pub date_posted: Option<DatePosted>,
}

/// Produces a finite, non-restartable sequence of candidates for a query.
///
/// The stream may yield an error partway; records yielded before it remain
/// usable.
pub trait CandidateSource: Send + Sync {
    fn fetch(&self, query: &SearchQuery) -> BoxStream<'static, Result<CandidateRecord>>;

    fn name(&self) -> &str;
}

/// Search request as accepted over HTTP.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub keywords: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub max_jobs: Option<usize>,
    #[serde(default)]
    pub filter_duplicates: Option<bool>,
    #[serde(default)]
    pub experience_level: Option<ExperienceLevel>,
    #[serde(default)]
    pub employment_type: Option<EmploymentType>,
    #[serde(default)]
    pub date_posted: Option<DatePosted>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub search_id: Uuid,
    /// Candidates pulled from the source
    pub fetched: usize,
    /// Candidates meeting the requirements
    pub matched: usize,
    /// Matching candidates dropped as already seen
    pub duplicates: usize,
    pub results: Vec<MatchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_error: Option<String>,
    /// Ledger failure that cut deduplication short
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_error: Option<String>,
    pub timed_out: bool,
    pub message: String,
}

pub struct SearchPipeline {
    source: Arc<dyn CandidateSource>,
    ledger: Arc<dyn ResultLedger>,
    config: SearchConfig,
    tasks: TaskRegistry,
}

impl SearchPipeline {
    pub fn new(
        source: Arc<dyn CandidateSource>,
        ledger: Arc<dyn ResultLedger>,
        config: SearchConfig,
    ) -> Self {
        let tasks = TaskRegistry::new(
            Duration::from_secs(config.task_retention_seconds),
            config.max_tasks,
        );
        Self {
            source,
            ledger,
            config,
            tasks,
        }
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Runs one search with the configured deadline.
    pub async fn run(&self, request: SearchRequest) -> SearchOutcome {
        self.run_with_deadline(request, Duration::from_secs(self.config.timeout_seconds))
            .await
    }

    /// Starts a search in the background and returns its task entry.
    pub fn submit(self: &Arc<Self>, request: SearchRequest) -> SearchTask {
        let task = self.tasks.start(request.clone());
        let task_id = task.task_id;
        let pipeline = Arc::clone(self);

        info!(%task_id, "Background search submitted");
        tokio::spawn(async move {
            let outcome = pipeline.run(request).await;
            pipeline.tasks.complete(task_id, outcome);
        });
        task
    }

    /// Current state of a background search, if still tracked.
    pub fn task(&self, task_id: Uuid) -> Option<SearchTask> {
        self.tasks.get(task_id)
    }

    /// Runs one search, pulling from the source for at most `deadline`.
    ///
    /// Never fails as a whole: source failures, the deadline and ledger
    /// failures are reported in the outcome next to the results kept.
    pub async fn run_with_deadline(&self, request: SearchRequest, deadline: Duration) -> SearchOutcome {
        let search_id = Uuid::now_v7();
        let criteria = MatchCriteria::new(request.requirements);
        let filter_duplicates = request
            .filter_duplicates
            .unwrap_or(self.config.filter_duplicates);

        let query = SearchQuery {
            keywords: request.keywords,
            location: request.location,
            max_results: self.config.effective_max_results(request.max_jobs),
            experience_level: request.experience_level,
            employment_type: request.employment_type,
            date_posted: request.date_posted,
        };

        info!(
            %search_id,
            source = self.source.name(),
            keywords = %query.keywords,
            location = %query.location,
            max_results = query.max_results,
            "Starting search"
        );

        let pulled = self.pull(&query, deadline).await;
        let fetched = pulled.candidates.len();

        let matches: Vec<MatchResult> = pulled
            .candidates
            .iter()
            .map(|candidate| matching::score(&criteria, candidate))
            .filter(|result| result.is_match)
            .collect();
        let matched = matches.len();

        // Dedup runs in arrival order so the first occurrence wins
        let mut duplicates = 0;
        let mut ledger_error = None;
        let mut results = if filter_duplicates {
            let mut filter = DedupFilter::new(Arc::clone(&self.ledger));
            let mut admitted = Vec::with_capacity(matched);
            for result in matches {
                match filter.admit(&result.candidate).await {
                    Ok(true) => admitted.push(result),
                    Ok(false) => duplicates += 1,
                    Err(e) => {
                        warn!(%search_id, error = %format!("{:#}", e), "Result ledger failed, keeping admitted candidates");
                        ledger_error = Some(format!("{:#}", e));
                        break;
                    }
                }
            }
            admitted
        } else {
            matches
        };

        matching::rank(&mut results);

        let mut message = summarize(fetched, matched, duplicates, filter_duplicates);
        if ledger_error.is_some() {
            message.push_str(", duplicate check interrupted");
        }
        info!(%search_id, fetched, matched, duplicates, timed_out = pulled.timed_out, "Search complete");

        SearchOutcome {
            search_id,
            fetched,
            matched,
            duplicates,
            results,
            source_error: pulled.error,
            ledger_error,
            timed_out: pulled.timed_out,
            message,
        }
    }

    async fn pull(&self, query: &SearchQuery, deadline: Duration) -> Pulled {
        let mut stream = self.source.fetch(query).take(query.max_results);
        let until = tokio::time::Instant::now() + deadline;
        let mut pulled = Pulled::default();

        loop {
            match tokio::time::timeout_at(until, stream.next()).await {
                Ok(Some(Ok(candidate))) => pulled.candidates.push(candidate),
                Ok(Some(Err(e))) => {
                    warn!(source = self.source.name(), error = %format!("{:#}", e), "Candidate source failed");
                    pulled.error = Some(format!("{:#}", e));
                    break;
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        source = self.source.name(),
                        deadline_ms = deadline.as_millis() as u64,
                        pulled = pulled.candidates.len(),
                        "Candidate source exceeded deadline"
                    );
                    pulled.timed_out = true;
                    break;
                }
            }
        }

        pulled
    }
}

#[derive(Default)]
struct Pulled {
    candidates: Vec<CandidateRecord>,
    error: Option<String>,
    timed_out: bool,
}

fn summarize(fetched: usize, matched: usize, duplicates: usize, filtered: bool) -> String {
    let mut message = format!("Found {} candidates", fetched);
    if matched < fetched {
        message.push_str(&format!(", {} matching your requirements", matched));
    }
    if filtered && duplicates > 0 {
        message.push_str(&format!(", {} already seen", duplicates));
    }
    message
}
