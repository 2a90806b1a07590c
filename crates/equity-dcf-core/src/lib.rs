pub mod benchmark;
pub mod checks;
pub mod error;
pub mod monte_carlo;
pub mod numeric;
pub mod orchestrator;
pub mod types;
pub mod valuation;

pub use error::ValuationError;
pub use types::*;

/// Standard result type for all valuation operations
pub type ValuationResult<T> = Result<T, ValuationError>;
