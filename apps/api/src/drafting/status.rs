use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Mobile job status as stored in `mobile_jobs.status`.
///
/// ```text
/// capturing ─▶ drafting ─▶ ready ─▶ submitted
///                 ▲  │       │
///                 │  ▼       │
///                failed ◀────┘ (regenerate goes ready ─▶ drafting)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Capturing,
    Drafting,
    Ready,
    Failed,
    Submitted,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Capturing,
        JobStatus::Drafting,
        JobStatus::Ready,
        JobStatus::Failed,
        JobStatus::Submitted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Capturing => "capturing",
            JobStatus::Drafting => "drafting",
            JobStatus::Ready => "ready",
            JobStatus::Failed => "failed",
            JobStatus::Submitted => "submitted",
        }
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Capturing, Drafting)
                | (Failed, Drafting)
                | (Ready, Drafting)
                | (Drafting, Ready)
                | (Drafting, Failed)
                | (Ready, Submitted)
        )
    }

    /// Statuses from which a draft run may be started.
    pub fn draft_sources() -> Vec<&'static str> {
        Self::ALL
            .into_iter()
            .filter(|s| s.can_transition_to(JobStatus::Drafting))
            .map(JobStatus::as_str)
            .collect()
    }

    /// Photos cannot change underneath a running draft or after submission.
    pub fn accepts_photos(self) -> bool {
        !matches!(self, JobStatus::Drafting | JobStatus::Submitted)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown job status '{s}'"))
    }
}

/// Per-photo analysis status as stored in `job_photos.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhotoStatus {
    Pending,
    Processing,
    Analyzed,
    Failed,
}

impl PhotoStatus {
    pub const ALL: [PhotoStatus; 4] = [
        PhotoStatus::Pending,
        PhotoStatus::Processing,
        PhotoStatus::Analyzed,
        PhotoStatus::Failed,
    ];

    /// The value bound into `job_photos.status` by the photo queries.
    pub fn as_str(self) -> &'static str {
        match self {
            PhotoStatus::Pending => "pending",
            PhotoStatus::Processing => "processing",
            PhotoStatus::Analyzed => "analyzed",
            PhotoStatus::Failed => "failed",
        }
    }

    /// Analyzed photos are never re-sent to the vision backend. A photo still
    /// marked `processing` when a run starts was interrupted and is redone.
    pub fn needs_analysis(self) -> bool {
        !matches!(self, PhotoStatus::Analyzed)
    }
}

impl FromStr for PhotoStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown photo status '{s}'"))
    }
}

#[cfg(test)]
mod tests {
    use super::JobStatus::*;
    use super::*;

    #[test]
    fn test_drafting_resolves_to_ready_or_failed() {
        assert!(Drafting.can_transition_to(Ready));
        assert!(Drafting.can_transition_to(Failed));
        assert!(!Drafting.can_transition_to(Submitted));
        assert!(!Drafting.can_transition_to(Drafting));
    }

    #[test]
    fn test_retry_and_regenerate() {
        assert!(Failed.can_transition_to(Drafting));
        assert!(Ready.can_transition_to(Drafting));
    }

    #[test]
    fn test_only_ready_can_submit() {
        for s in JobStatus::ALL {
            assert_eq!(s.can_transition_to(Submitted), s == Ready, "{s}");
        }
    }

    #[test]
    fn test_submitted_is_final() {
        for next in JobStatus::ALL {
            assert!(!Submitted.can_transition_to(next));
        }
    }

    #[test]
    fn test_draft_sources() {
        assert_eq!(
            JobStatus::draft_sources(),
            vec!["capturing", "ready", "failed"]
        );
    }

    #[test]
    fn test_photo_uploads_blocked_while_drafting() {
        assert!(Capturing.accepts_photos());
        assert!(Failed.accepts_photos());
        assert!(Ready.accepts_photos());
        assert!(!Drafting.accepts_photos());
        assert!(!Submitted.accepts_photos());
    }

    #[test]
    fn test_status_parse() {
        for s in JobStatus::ALL {
            assert_eq!(s.as_str().parse::<JobStatus>().unwrap(), s);
        }
        assert!("done".parse::<JobStatus>().is_err());
        assert_eq!("failed".parse::<PhotoStatus>().unwrap(), PhotoStatus::Failed);
    }

    #[test]
    fn test_photo_needs_analysis() {
        assert!(PhotoStatus::Pending.needs_analysis());
        assert!(PhotoStatus::Failed.needs_analysis());
        assert!(PhotoStatus::Processing.needs_analysis());
        assert!(!PhotoStatus::Analyzed.needs_analysis());
    }

    #[test]
    fn test_photo_status_round_trips() {
        for status in PhotoStatus::ALL {
            assert_eq!(status.as_str().parse::<PhotoStatus>(), Ok(status));
        }
        assert!("done".parse::<PhotoStatus>().is_err());
    }

    #[test]
    fn test_column_defaults_match_initial_statuses() {
        let schema = include_str!("../../migrations/20260101000000_init.sql");
        assert!(schema.contains(&format!(
            "status         TEXT NOT NULL DEFAULT '{}'",
            JobStatus::Capturing.as_str()
        )));
        assert!(schema.contains(&format!(
            "status            TEXT NOT NULL DEFAULT '{}'",
            PhotoStatus::Pending.as_str()
        )));
    }
}
