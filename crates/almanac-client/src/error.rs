use almanac_ical::error::TimezoneError;
use thiserror::Error;

use crate::evaluator::EvaluatorError;
use crate::store::StoreError;

/// Orchestrator-level errors.
///
/// Per-component failures never surface here: a component that cannot be
/// expanded is dropped and the batch continues. `Busy` is retried
/// internally and, at the ceiling, downgraded to an empty result rather
/// than an error.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Timezone(#[from] TimezoneError),

    #[error(transparent)]
    Evaluator(#[from] EvaluatorError),

    /// The cancellation token was observed; everything emitted before
    /// the observation stands.
    #[error("Operation cancelled")]
    Cancelled,
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;
