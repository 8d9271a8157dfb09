//! Calendar component model and timezone resolution.
//!
//! This crate defines the value types the occurrence engine operates on:
//! - Components, recurrence identifiers, occurrences, and time windows
//! - Timezone definitions with identity-preserving well-known substitution
//! - A lock-guarded, append-only timezone resolver shared by a session
//!
//! All model types are immutable values: reconciliation produces new
//! values rather than mutating shared ones.

pub mod component;
pub mod datetime;
pub mod error;
pub mod resolver;
pub mod timezone;

pub use component::{CalendarComponent, Occurrence, Payload, RangeType, RecurrenceId};
pub use datetime::{CalDateTime, TimeWindow};
pub use error::{IcalError, IcalResult, TimezoneError, TimezoneResult};
pub use resolver::{Session, TimezoneResolver, TimezoneSource};
pub use timezone::{TimezoneDefinition, TzRules};
