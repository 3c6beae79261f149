pub mod constraint;
pub mod exhaustive;
pub mod sampling;

pub use constraint::{run_constraint, ConstraintOutcome, ConstraintSettings, SolveMode};
pub use exhaustive::{run_exhaustive, ExhaustiveOutcome, ExhaustiveSettings};
pub use sampling::{run_sampling, SamplingOutcome, SamplingSettings};
