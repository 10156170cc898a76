/// Collection status definitions for session tracking
///
/// A collection moves `pending -> in-progress -> {completed | failed}` within a
/// session. Terminal statuses are final for that session.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the progress of one organization within a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CollectionStatus {
    /// Not yet started in this session
    #[default]
    Pending,

    /// Started; may have been interrupted mid-way
    InProgress,

    // ===== Terminal States =====
    /// Every repository was written
    Completed,

    /// The workload failed after exhausting retries
    Failed,
}

impl CollectionStatus {
    /// Returns true for `Completed` and `Failed`
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns true if moving from `self` to `next` is allowed
    ///
    /// Re-entering the same status is always allowed. Terminal statuses never
    /// change, and nothing moves back to `Pending`.
    pub fn can_transition_to(&self, next: Self) -> bool {
        if *self == next {
            return true;
        }
        match self {
            Self::Pending => true,
            Self::InProgress => next.is_terminal(),
            Self::Completed | Self::Failed => false,
        }
    }

    /// Converts the status to its persisted string form
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Returns all possible statuses
    pub fn all() -> [Self; 4] {
        [Self::Pending, Self::InProgress, Self::Completed, Self::Failed]
    }
}

impl fmt::Display for CollectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
