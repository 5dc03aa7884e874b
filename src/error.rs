use thiserror::Error;

/// Configuration problems detected before contouring starts.
///
/// Numerical trouble during contouring (rank-deficient QEFs, unbracketed
/// crossings, missing adjacency) is recovered from and never surfaces here.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("root half size must be finite and positive (got {0})")]
    InvalidRootExtent(f32),

    #[error("root center must be finite")]
    NonFiniteRootCenter,

    #[error("minimum half size must be finite and positive (got {0})")]
    InvalidMinHalfSize(f32),

    #[error("gradient delta must be finite and positive (got {0})")]
    InvalidGradientDelta(f32),

    #[error("singular value cutoff must be in [0, 1) (got {0})")]
    InvalidCutoff(f32),

    #[error("subdivision would need depth {needed}, but the lattice supports at most {max}")]
    DepthLimitExceeded { needed: u32, max: u8 },
}
