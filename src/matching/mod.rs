//! Requirement matching and ranking of candidate records.
//!
//! Matching is a case-insensitive substring test of each requirement keyword
//! against a candidate's title and description. Results are reported in
//! criteria order and ranked deterministically, so identical inputs always
//! produce identical output regardless of arrival order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Ordered list of required keywords.
///
/// Keywords are compared case-insensitively; the original spelling is kept
/// for reporting. An empty criteria set matches every candidate with score 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchCriteria {
    keywords: Vec<String>,
}

impl MatchCriteria {
    /// Builds criteria from raw keywords, dropping blank entries.
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| {
                let k: String = k.into();
                k.trim().to_string()
            })
            .filter(|k| !k.is_empty())
            .collect();
        Self { keywords }
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }
}

/// A record produced by a candidate source. Immutable once received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub id: String,
    pub title: String,
    pub organization: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub posted_at: Option<DateTime<Utc>>,
    pub source_link: String,
}

impl CandidateRecord {
    fn searchable_text(&self) -> String {
        format!("{} {}", self.title, self.description).to_lowercase()
    }
}

/// Outcome of scoring one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub candidate: CandidateRecord,
    pub score: usize,
    /// Keywords found, in criteria order
    pub matched_keywords: Vec<String>,
    pub is_match: bool,
    #[serde(skip)]
    criteria_len: usize,
}

impl MatchResult {
    /// Fraction of requirements found (0.0 for empty criteria).
    pub fn match_ratio(&self) -> f64 {
        if self.criteria_len == 0 {
            0.0
        } else {
            self.score as f64 / self.criteria_len as f64
        }
    }
}

/// Scores a candidate against the criteria.
pub fn score(criteria: &MatchCriteria, candidate: &CandidateRecord) -> MatchResult {
    let text = candidate.searchable_text();

    let matched_keywords: Vec<String> = criteria
        .keywords()
        .iter()
        .filter(|keyword| text.contains(&keyword.to_lowercase()))
        .cloned()
        .collect();

    let score = matched_keywords.len();
    let is_match = criteria.is_empty() || score > 0;

    MatchResult {
        candidate: candidate.clone(),
        score,
        matched_keywords,
        is_match,
        criteria_len: criteria.len(),
    }
}

/// Canonical ordering: score descending, then newest first (undated last),
/// then id, source link and title ascending.
pub fn compare(a: &MatchResult, b: &MatchResult) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| match (a.candidate.posted_at, b.candidate.posted_at) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.candidate.id.cmp(&b.candidate.id))
        .then_with(|| a.candidate.source_link.cmp(&b.candidate.source_link))
        .then_with(|| a.candidate.title.cmp(&b.candidate.title))
}

/// Sorts results into canonical order.
pub fn rank(results: &mut [MatchResult]) {
    results.sort_by(compare);
}

/// Scores and ranks a batch.
pub fn score_batch(criteria: &MatchCriteria, candidates: &[CandidateRecord]) -> Vec<MatchResult> {
    let mut results: Vec<MatchResult> = candidates.iter().map(|c| score(criteria, c)).collect();
    rank(&mut results);
    results
}
