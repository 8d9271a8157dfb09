use thiserror::Error;

/// Error during timezone resolution.
#[derive(Error, Debug)]
pub enum TimezoneError {
    /// Identifier not resolvable by the cache, the well-known table, or
    /// the backing store.
    #[error("Unknown timezone: {0}")]
    NotFound(String),

    /// The backing store could not answer the lookup.
    #[error("Timezone store unavailable: {0}")]
    StoreUnavailable(String),
}

pub type TimezoneResult<T> = std::result::Result<T, TimezoneError>;

/// Model-level errors
#[derive(Error, Debug)]
pub enum IcalError {
    #[error(transparent)]
    Timezone(#[from] TimezoneError),

    #[error(transparent)]
    Core(#[from] almanac_core::error::CoreError),

    #[error("Parse error: {0}")]
    Parse(String),
}

pub type IcalResult<T> = std::result::Result<T, IcalError>;
