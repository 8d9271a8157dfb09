//! Rule evaluation: expanding one master component into raw start/end
//! pairs inside a window.
//!
//! The engine treats the evaluator as a black box that may itself need
//! timezone resolution, so the session and source are passed through.

use almanac_core::constants::MAX_OCCURRENCES_PER_COMPONENT;
use almanac_ical::component::CalendarComponent;
use almanac_ical::datetime::TimeWindow;
use chrono::{DateTime, TimeDelta, Utc};
use rrule::{RRule, RRuleSet, Tz, Unvalidated};
use thiserror::Error;

use almanac_ical::resolver::{Session, TimezoneSource};

/// Error while evaluating a component's recurrence definition.
#[derive(Error, Debug)]
pub enum EvaluatorError {
    #[error("Invalid recurrence rule: {0}")]
    InvalidRule(String),
}

pub type EvaluatorResult<T> = std::result::Result<T, EvaluatorError>;

/// Expands one master component into raw `(start, end)` occurrence
/// pairs, honoring its rule list, extra dates, excluded rules, and
/// excluded dates, clipped to the window.
pub trait RuleEvaluator {
    /// ## Summary
    /// Yields every occurrence of `component` overlapping `window`, in
    /// rule order.
    ///
    /// ## Errors
    /// Returns an error when the component's recurrence definition is
    /// malformed; the caller drops that component and continues.
    fn expand(
        &self,
        component: &CalendarComponent,
        window: TimeWindow,
        session: &Session,
        source: &dyn TimezoneSource,
    ) -> EvaluatorResult<Vec<(DateTime<Utc>, DateTime<Utc>)>>;
}

/// Default evaluator backed by the `rrule` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct RruleEvaluator;

impl RuleEvaluator for RruleEvaluator {
    fn expand(
        &self,
        component: &CalendarComponent,
        window: TimeWindow,
        session: &Session,
        source: &dyn TimezoneSource,
    ) -> EvaluatorResult<Vec<(DateTime<Utc>, DateTime<Utc>)>> {
        let start = session.instant_of(&component.dtstart, source);
        let duration = occurrence_duration(component, start, session, source);

        if !component.has_recurrences() {
            // Non-recurring: the component's own interval is the single
            // candidate occurrence.
            let end = start + duration;
            if window.contains(start, end) {
                return Ok(vec![(start, end)]);
            }
            return Ok(Vec::new());
        }

        let set = build_rrule_set(component, start, session, source)?;

        // Widen the query so an occurrence that starts before the window
        // but overlaps it is still produced.
        let query_start = window.start - duration.max(TimeDelta::zero());
        let result = set
            .after(query_start.with_timezone(&Tz::UTC))
            .before(window.end.with_timezone(&Tz::UTC))
            .all(MAX_OCCURRENCES_PER_COMPONENT);

        if result.limited {
            tracing::warn!(
                uid = %component.uid,
                limit = MAX_OCCURRENCES_PER_COMPONENT,
                "occurrence expansion truncated at limit"
            );
        }

        Ok(result
            .dates
            .into_iter()
            .map(|occurrence_start| {
                let occurrence_start = occurrence_start.with_timezone(&Utc);
                (occurrence_start, occurrence_start + duration)
            })
            .filter(|(occurrence_start, occurrence_end)| {
                window.contains(*occurrence_start, *occurrence_end)
            })
            .collect())
    }
}

/// DTEND minus DTSTART; a date-valued start with no DTEND spans its day,
/// anything else without a DTEND has zero duration.
fn occurrence_duration(
    component: &CalendarComponent,
    start: DateTime<Utc>,
    session: &Session,
    source: &dyn TimezoneSource,
) -> TimeDelta {
    match &component.dtend {
        Some(dtend) => {
            let end = session.instant_of(dtend, source);
            (end - start).max(TimeDelta::zero())
        }
        None if component.dtstart.is_date => TimeDelta::days(1),
        None => TimeDelta::zero(),
    }
}

fn build_rrule_set(
    component: &CalendarComponent,
    start: DateTime<Utc>,
    session: &Session,
    source: &dyn TimezoneSource,
) -> EvaluatorResult<RRuleSet> {
    let dt_start = start.with_timezone(&Tz::UTC);
    let mut set = RRuleSet::new(dt_start);

    for text in &component.rrules {
        let rule: RRule<Unvalidated> = text
            .parse()
            .map_err(|err: rrule::RRuleError| EvaluatorError::InvalidRule(err.to_string()))?;
        let rule = rule
            .validate(dt_start)
            .map_err(|err| EvaluatorError::InvalidRule(err.to_string()))?;
        set = set.rrule(rule);
    }

    for text in &component.exrules {
        let rule: RRule<Unvalidated> = text
            .parse()
            .map_err(|err: rrule::RRuleError| EvaluatorError::InvalidRule(err.to_string()))?;
        let rule = rule
            .validate(dt_start)
            .map_err(|err| EvaluatorError::InvalidRule(err.to_string()))?;
        set = set.exrule(rule);
    }

    let rdates: Vec<chrono::DateTime<Tz>> = component
        .rdates
        .iter()
        .map(|dt| session.instant_of(dt, source).with_timezone(&Tz::UTC))
        .collect();
    if !rdates.is_empty() {
        set = set.set_rdates(rdates);
    }

    let exdates: Vec<chrono::DateTime<Tz>> = component
        .exdates
        .iter()
        .map(|dt| session.instant_of(dt, source).with_timezone(&Tz::UTC))
        .collect();
    if !exdates.is_empty() {
        set = set.set_exdates(exdates);
    }

    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use almanac_ical::datetime::CalDateTime;
    use almanac_ical::error::{TimezoneError, TimezoneResult};
    use chrono::TimeZone;

    struct NoZones;

    impl TimezoneSource for NoZones {
        fn timezone_text(&self, tzid: &str) -> TimezoneResult<String> {
            Err(TimezoneError::NotFound(tzid.to_string()))
        }
    }

    fn window(start_day: u32, end_day: u32) -> TimeWindow {
        TimeWindow::new(
            Utc.with_ymd_and_hms(2024, 1, start_day, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, end_day, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    fn daily_master() -> CalendarComponent {
        CalendarComponent::new("daily", CalDateTime::utc(2024, 1, 1, 9, 0, 0))
            .with_dtend(CalDateTime::utc(2024, 1, 1, 10, 0, 0))
            .with_rrule("FREQ=DAILY;COUNT=5")
    }

    #[test]
    fn test_expand_clips_to_window() {
        let session = Session::utc();
        let pairs = RruleEvaluator
            .expand(&daily_master(), window(2, 5), &session, &NoZones)
            .unwrap();

        let starts: Vec<_> = pairs.iter().map(|(s, _)| *s).collect();
        assert_eq!(
            starts,
            vec![
                Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 3, 9, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 4, 9, 0, 0).unwrap(),
            ]
        );
        for (s, e) in pairs {
            assert_eq!(e - s, TimeDelta::hours(1));
        }
    }

    #[test]
    fn test_expand_honors_exdate() {
        let session = Session::utc();
        let master = daily_master().with_exdate(CalDateTime::utc(2024, 1, 3, 9, 0, 0));
        let pairs = RruleEvaluator
            .expand(&master, window(2, 5), &session, &NoZones)
            .unwrap();
        assert_eq!(pairs.len(), 2);
        assert!(
            pairs
                .iter()
                .all(|(s, _)| *s != Utc.with_ymd_and_hms(2024, 1, 3, 9, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_expand_non_recurring() {
        let session = Session::utc();
        let comp = CalendarComponent::new("one-off", CalDateTime::utc(2024, 1, 3, 9, 0, 0))
            .with_dtend(CalDateTime::utc(2024, 1, 3, 10, 0, 0));

        let inside = RruleEvaluator
            .expand(&comp, window(2, 5), &session, &NoZones)
            .unwrap();
        assert_eq!(inside.len(), 1);

        let outside = RruleEvaluator
            .expand(&comp, window(10, 12), &session, &NoZones)
            .unwrap();
        assert!(outside.is_empty());
    }

    #[test]
    fn test_expand_invalid_rule() {
        let session = Session::utc();
        let master = CalendarComponent::new("bad", CalDateTime::utc(2024, 1, 1, 9, 0, 0))
            .with_rrule("FREQ=NEVERLY");
        let err = RruleEvaluator
            .expand(&master, window(1, 5), &session, &NoZones)
            .unwrap_err();
        assert!(matches!(err, EvaluatorError::InvalidRule(_)));
    }

    #[test]
    fn test_expand_rdate_adds_occurrence() {
        let session = Session::utc();
        let master = CalendarComponent::new("rdate", CalDateTime::utc(2024, 1, 1, 9, 0, 0))
            .with_dtend(CalDateTime::utc(2024, 1, 1, 10, 0, 0))
            .with_rrule("FREQ=WEEKLY;COUNT=1")
            .with_rdate(CalDateTime::utc(2024, 1, 4, 15, 0, 0));
        let pairs = RruleEvaluator
            .expand(&master, window(2, 6), &session, &NoZones)
            .unwrap();
        assert_eq!(
            pairs,
            vec![(
                Utc.with_ymd_and_hms(2024, 1, 4, 15, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 4, 16, 0, 0).unwrap(),
            )]
        );
    }
}
