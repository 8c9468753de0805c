//! Optional narrowing filters forwarded to candidate sources.
//!
//! Labels follow the job board's own vocabulary. Sources that cannot apply
//! a filter ignore it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExperienceLevel {
    Internship,
    Entry,
    Associate,
    Mid,
    Director,
    Executive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmploymentType {
    FullTime,
    PartTime,
    Contract,
    Temporary,
    Internship,
}

/// Posting age window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatePosted {
    #[serde(rename = "past 24 hours", alias = "past_24_hours")]
    Past24Hours,
    #[serde(rename = "past week", alias = "past_week")]
    PastWeek,
    #[serde(rename = "past month", alias = "past_month")]
    PastMonth,
}

impl DatePosted {
    pub fn window(self) -> Duration {
        match self {
            DatePosted::Past24Hours => Duration::days(1),
            DatePosted::PastWeek => Duration::days(7),
            DatePosted::PastMonth => Duration::days(30),
        }
    }

    /// Whether a posting time falls inside the window ending at `now`.
    /// Undated postings never do.
    pub fn admits(self, posted_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match posted_at {
            Some(posted_at) => posted_at >= now - self.window(),
            None => false,
        }
    }
}
