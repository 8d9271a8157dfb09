//! Component store collaborator contracts.
//!
//! The store is the external owner of raw components: the orchestrator
//! asks it either for everything overlapping a window or for every
//! component sharing one UID, and treats its answers as immutable input.

use almanac_ical::component::CalendarComponent;
use almanac_ical::datetime::TimeWindow;
use almanac_ical::error::{TimezoneError, TimezoneResult};
use almanac_ical::resolver::TimezoneSource;
use thiserror::Error;

/// Store-level failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Transient "try again" signal; retried by the orchestrator.
    #[error("Store busy")]
    Busy,

    #[error("Store not opened")]
    NotOpened,

    #[error("Repository offline")]
    RepositoryOffline,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Other(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Static capabilities a backend declares about its storage shape.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCapabilities {
    /// Recurring series are stored as already-expanded standalone
    /// components; no synthetic master exists to expand.
    pub recurrences_no_master: bool,
}

/// Blocking component store.
pub trait ComponentStore {
    /// ## Summary
    /// Fetches every component overlapping `window` (a time-range query).
    ///
    /// ## Errors
    /// `Busy` when the store is transiently unavailable; other variants
    /// are terminal for the operation.
    fn fetch_overlapping(&self, window: TimeWindow) -> StoreResult<Vec<CalendarComponent>>;

    /// ## Summary
    /// Fetches every component sharing `uid`: the master plus all of its
    /// detached instances.
    ///
    /// ## Errors
    /// Same contract as [`ComponentStore::fetch_overlapping`].
    fn fetch_by_uid(&self, uid: &str) -> StoreResult<Vec<CalendarComponent>>;

    /// ## Summary
    /// Fetches the textual timezone definition stored for `tzid`.
    ///
    /// ## Errors
    /// `NotFound` when the store carries no definition for it.
    fn lookup_timezone(&self, tzid: &str) -> StoreResult<String>;

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::default()
    }
}

/// Non-blocking component store.
///
/// Timezone lookup stays synchronous: resolution happens inside rule
/// evaluation, which is pure computation, and only one fetch is
/// outstanding at a time per orchestrator invocation.
pub trait AsyncComponentStore {
    /// ## Summary
    /// Fetches every component overlapping `window`.
    ///
    /// ## Errors
    /// Same contract as [`ComponentStore::fetch_overlapping`].
    fn fetch_overlapping(
        &self,
        window: TimeWindow,
    ) -> impl Future<Output = StoreResult<Vec<CalendarComponent>>> + Send;

    /// ## Summary
    /// Fetches every component sharing `uid`.
    ///
    /// ## Errors
    /// Same contract as [`ComponentStore::fetch_overlapping`].
    fn fetch_by_uid(
        &self,
        uid: &str,
    ) -> impl Future<Output = StoreResult<Vec<CalendarComponent>>> + Send;

    /// ## Summary
    /// Fetches the textual timezone definition stored for `tzid`.
    ///
    /// ## Errors
    /// `NotFound` when the store carries no definition for it.
    fn lookup_timezone(&self, tzid: &str) -> StoreResult<String>;

    fn capabilities(&self) -> StoreCapabilities {
        StoreCapabilities::default()
    }
}

pub(crate) fn store_error_to_timezone(tzid: &str, err: &StoreError) -> TimezoneError {
    match err {
        StoreError::NotFound(_) => TimezoneError::NotFound(tzid.to_string()),
        other => TimezoneError::StoreUnavailable(other.to_string()),
    }
}

/// Adapts a blocking store's timezone lookup to the resolver boundary.
pub struct StoreTimezones<'a, S>(pub &'a S);

impl<S: ComponentStore> TimezoneSource for StoreTimezones<'_, S> {
    fn timezone_text(&self, tzid: &str) -> TimezoneResult<String> {
        self.0
            .lookup_timezone(tzid)
            .map_err(|err| store_error_to_timezone(tzid, &err))
    }
}

/// Adapts an async store's (synchronous) timezone lookup to the
/// resolver boundary.
pub struct AsyncStoreTimezones<'a, S>(pub &'a S);

impl<S: AsyncComponentStore> TimezoneSource for AsyncStoreTimezones<'_, S> {
    fn timezone_text(&self, tzid: &str) -> TimezoneResult<String> {
        self.0
            .lookup_timezone(tzid)
            .map_err(|err| store_error_to_timezone(tzid, &err))
    }
}
