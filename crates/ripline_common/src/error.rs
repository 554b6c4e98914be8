//! Error types for Ripline.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RiplineError {
    #[error("Missing division: {0}")]
    MissingDivision(String),

    #[error("Invalid modifiers: {0}")]
    InvalidModifiers(String),

    #[error("Unknown division: {0}")]
    UnknownDivision(String),

    #[error("Unknown component: {division}/{component_id}")]
    UnknownComponent {
        division: String,
        component_id: String,
    },

    #[error("Unknown specialization track: {0}")]
    UnknownTrack(String),

    #[error("Unknown quest node: {0}")]
    UnknownQuest(String),

    #[error("Prerequisites not met for quest node: {0}")]
    PrerequisitesNotMet(String),

    #[error("Invalid quest graph: {0}")]
    InvalidGraph(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RiplineError {
    /// Stable numeric code for RPC-style surfaces and log correlation.
    pub fn code(&self) -> i32 {
        match self {
            RiplineError::MissingDivision(_) => -33001,
            RiplineError::InvalidModifiers(_) => -33002,
            RiplineError::UnknownDivision(_) => -33003,
            RiplineError::UnknownComponent { .. } => -33004,
            RiplineError::UnknownTrack(_) => -33005,
            RiplineError::UnknownQuest(_) => -33006,
            RiplineError::PrerequisitesNotMet(_) => -33007,
            RiplineError::InvalidGraph(_) => -33008,
            RiplineError::Storage(_) => -33100,
            RiplineError::Io(_) => -33101,
            RiplineError::Json(_) => -33102,
            RiplineError::Internal(_) => -33103,
        }
    }

    /// True for errors caused by caller input rather than engine state.
    ///
    /// Input errors are always detected before any write, so callers may
    /// surface them verbatim without worrying about partial effects.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            RiplineError::MissingDivision(_)
                | RiplineError::InvalidModifiers(_)
                | RiplineError::UnknownDivision(_)
                | RiplineError::UnknownComponent { .. }
                | RiplineError::UnknownTrack(_)
                | RiplineError::UnknownQuest(_)
                | RiplineError::PrerequisitesNotMet(_)
        )
    }
}
