//! Error taxonomy for the pattern engine.
//!
//! Parameter validation never produces an error: out-of-range values are
//! clamped by the parameter store. The variants here cover the failures that
//! can still happen at runtime, all of which are contained by the lifecycle
//! manager and surface only as an invisible pattern.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PatternError {
    /// A colour string that is not `#rrggbb` / `rrggbb`.
    #[error("invalid colour '{0}', expected #rrggbb")]
    InvalidColor(String),

    /// Tessellation would emit more vertices than the configured budget.
    #[error("geometry needs {vertices} vertices, budget is {limit}")]
    GeometryBudget { vertices: usize, limit: usize },

    /// The backend could not create a resource set.
    #[error("failed to allocate resources for {label}: {reason}")]
    Allocation { label: String, reason: String },

    /// Live resources were requested from a surface that holds none.
    #[error("{0} holds no live resources")]
    NotInitialized(String),
}
