use thiserror::Error;

/// Route dynamics error types
#[derive(Error, Debug)]
pub enum TrajectoryError {
    #[error("Route too short: {points} point(s), need at least 2")]
    RouteTooShort { points: usize },

    #[error("Invalid route point {index}: {reason}")]
    InvalidPoint { index: usize, reason: String },

    #[error("Speed limit count {limits} matches neither {points} points nor their segments")]
    SpeedLimitMismatch { limits: usize, points: usize },

    #[error("Invalid timestep: {0} (must be finite and > 0)")]
    InvalidTimestep(f64),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Physics engine failed: {0}")]
    Engine(String),

    #[error("All solvers failed (primary: {primary}; fallback: {fallback})")]
    EngineExhausted { primary: String, fallback: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TrajectoryError>;

impl TrajectoryError {
    /// True for errors caused by the caller's input rather than the pipeline itself.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            TrajectoryError::RouteTooShort { .. }
                | TrajectoryError::InvalidPoint { .. }
                | TrajectoryError::SpeedLimitMismatch { .. }
                | TrajectoryError::InvalidTimestep(_)
                | TrajectoryError::InvalidConfig(_)
        )
    }
}
