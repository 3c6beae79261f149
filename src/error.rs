use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PlannerError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("expense row {index} does not exist (ledger has {len} rows)")]
    LedgerIndex { index: usize, len: usize },
    #[error("solver error: {0}")]
    Solver(String),
}

impl PlannerError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }
}

pub type PlannerResult<T> = Result<T, PlannerError>;
