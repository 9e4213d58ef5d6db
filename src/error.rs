//! Central error handling for the surface engine
//!
//! Steady-state rendering never surfaces errors to the caller: imagery
//! failures fall back to ancestor textures and terrain failures are skipped.
//! The only fallible surface API is construction.

use thiserror::Error;

/// Result type alias for surface-engine operations
pub type SurfaceResult<T> = Result<T, SurfaceError>;

/// Errors raised by the surface engine itself
#[derive(Error, Debug)]
pub enum SurfaceError {
    /// A required collaborator was not supplied at construction.
    #[error("missing collaborator: {0}")]
    MissingCollaborator(&'static str),

    /// A construction parameter is out of range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),
}
