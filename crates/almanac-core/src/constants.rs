use std::time::Duration;

/// Maximum number of retries after a `Busy` answer from the component
/// store before giving up and continuing with an empty component set.
pub const BUSY_RETRY_LIMIT: u32 = 10;

/// Pause between `Busy` retries. The blocking convention sleeps for this
/// long; the async convention schedules its re-invocation after it.
pub const BUSY_RETRY_DELAY: Duration = Duration::from_micros(500);

/// Upper bound on occurrences expanded from a single recurring component
/// in one query. Guards against pathological unbounded rules.
pub const MAX_OCCURRENCES_PER_COMPONENT: u16 = u16::MAX;
