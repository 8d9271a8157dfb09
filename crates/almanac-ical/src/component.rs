use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::datetime::CalDateTime;

/// How far an override's effect extends relative to its anchor occurrence.
///
/// Only meaningful on a component that carries a recurrence id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RangeType {
    /// Exactly the anchored occurrence.
    Single,
    /// The anchored occurrence and all chronologically earlier ones.
    ThisPrior,
    /// The anchored occurrence and all chronologically later ones.
    ThisFuture,
}

/// Identifies which occurrence(s) of a recurring series a detached
/// component overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceId {
    pub range: RangeType,
    pub value: CalDateTime,
}

impl RecurrenceId {
    /// ## Summary
    /// Builds a `Single`-range recurrence id anchored at `value`.
    #[must_use]
    pub const fn single(value: CalDateTime) -> Self {
        Self {
            range: RangeType::Single,
            value,
        }
    }
}

/// Opaque component content. The engine never inspects it; overrides copy
/// it whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    /// Preserved properties the engine has no schema for, in input order.
    pub extra: Vec<(String, String)>,
}

impl Payload {
    /// ## Summary
    /// Builds a payload carrying only a summary.
    #[must_use]
    pub fn summary(text: impl Into<String>) -> Self {
        Self {
            summary: Some(text.into()),
            ..Self::default()
        }
    }
}

/// A recurring or non-recurring calendar item.
///
/// Constructed by the component store when answering a fetch; the engine
/// never mutates an input component, it only clones content into new
/// `Occurrence` values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarComponent {
    pub uid: String,
    /// Present on a detached instance, absent on a master.
    pub recurrence_id: Option<RecurrenceId>,
    pub dtstart: CalDateTime,
    pub dtend: Option<CalDateTime>,
    /// Recurrence rule expressions, in definition order.
    pub rrules: Vec<String>,
    /// Explicit extra occurrence dates.
    pub rdates: Vec<CalDateTime>,
    /// Excluded rule expressions.
    pub exrules: Vec<String>,
    /// Excluded occurrence dates.
    pub exdates: Vec<CalDateTime>,
    pub payload: Payload,
}

impl CalendarComponent {
    /// ## Summary
    /// Builds a minimal component with the given identity and start.
    #[must_use]
    pub fn new(uid: impl Into<String>, dtstart: CalDateTime) -> Self {
        Self {
            uid: uid.into(),
            recurrence_id: None,
            dtstart,
            dtend: None,
            rrules: Vec::new(),
            rdates: Vec::new(),
            exrules: Vec::new(),
            exdates: Vec::new(),
            payload: Payload::default(),
        }
    }

    #[must_use]
    pub fn with_dtend(mut self, dtend: CalDateTime) -> Self {
        self.dtend = Some(dtend);
        self
    }

    #[must_use]
    pub fn with_rrule(mut self, rrule: impl Into<String>) -> Self {
        self.rrules.push(rrule.into());
        self
    }

    #[must_use]
    pub fn with_exdate(mut self, exdate: CalDateTime) -> Self {
        self.exdates.push(exdate);
        self
    }

    #[must_use]
    pub fn with_rdate(mut self, rdate: CalDateTime) -> Self {
        self.rdates.push(rdate);
        self
    }

    #[must_use]
    pub fn with_recurrence_id(mut self, recurrence_id: RecurrenceId) -> Self {
        self.recurrence_id = Some(recurrence_id);
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// ## Summary
    /// Whether this component is a detached single-occurrence override of
    /// a recurring series.
    #[must_use]
    pub const fn is_detached_instance(&self) -> bool {
        self.recurrence_id.is_some()
    }

    /// ## Summary
    /// Whether this component defines any recurrence (rules or explicit
    /// extra dates).
    #[must_use]
    pub fn has_recurrences(&self) -> bool {
        !self.rrules.is_empty() || !self.rdates.is_empty()
    }
}

/// One concrete, time-bound materialization of a calendar component.
///
/// Produced fresh per query; ownership transfers to the caller on
/// emission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub component: CalendarComponent,
}
