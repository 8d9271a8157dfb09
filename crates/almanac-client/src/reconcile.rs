//! Instance reconciliation: merging detached overrides into the
//! occurrence set generated from recurring masters.
//!
//! Pure, synchronous computation. The only callouts are timezone
//! resolution and rule evaluation; a component that fails either is
//! dropped and the batch continues.

use almanac_ical::component::{CalendarComponent, Occurrence, RangeType, RecurrenceId};
use almanac_ical::datetime::{CalDateTime, TimeWindow};
use almanac_ical::resolver::{Session, TimezoneSource};
use chrono::{DateTime, Utc};

use crate::evaluator::RuleEvaluator;

/// A generated occurrence plus its resolved recurrence anchor.
struct Generated {
    occurrence: Occurrence,
    anchor: Option<DateTime<Utc>>,
}

/// A detached override with its interval and anchor precomputed.
struct Override {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    component: CalendarComponent,
    anchor: DateTime<Utc>,
    range: RangeType,
}

/// ## Summary
/// Produces the reconciled, time-ordered occurrence sequence for a
/// component set inside a window.
///
/// Masters are expanded through the evaluator and each generated
/// occurrence is tagged with a synthesized `Single` recurrence id at its
/// own zone-converted start. Detached instances then override generated
/// entries: an exact anchor match replaces the entry wholesale
/// (interval and content); a `ThisPrior`/`ThisFuture` range match
/// replaces content only, keeping the entry's own time identity. An
/// override never exactly matched is appended standalone, covering
/// one-off exceptions and overrides whose master is absent.
///
/// Output is sorted ascending by start, then uid, then anchor.
pub fn reconcile<E: RuleEvaluator>(
    components: Vec<CalendarComponent>,
    window: TimeWindow,
    session: &Session,
    evaluator: &E,
    source: &dyn TimezoneSource,
) -> Vec<Occurrence> {
    let mut generated: Vec<Generated> = Vec::new();
    let mut overrides: Vec<Override> = Vec::new();

    for component in components {
        if component.is_detached_instance() {
            if let Some(detached) = prepare_override(component, window, session, source) {
                overrides.push(detached);
            }
        } else {
            expand_master(&component, window, session, evaluator, source, &mut generated);
        }
    }

    merge_overrides(&mut generated, overrides);

    let mut occurrences: Vec<Occurrence> = generated
        .into_iter()
        .map(|entry| entry.occurrence)
        .collect();
    occurrences.sort_by(|a, b| {
        a.start
            .cmp(&b.start)
            .then_with(|| a.component.uid.cmp(&b.component.uid))
            .then_with(|| anchor_value(&a.component).cmp(&anchor_value(&b.component)))
    });
    occurrences
}

fn anchor_value(component: &CalendarComponent) -> Option<chrono::NaiveDateTime> {
    component.recurrence_id.as_ref().map(|rid| rid.value.value)
}

/// Computes a detached instance's own interval and keeps it only when it
/// overlaps the window.
fn prepare_override(
    component: CalendarComponent,
    window: TimeWindow,
    session: &Session,
    source: &dyn TimezoneSource,
) -> Option<Override> {
    let (start, end) = own_interval(&component, session, source);
    if !window.contains(start, end) {
        return None;
    }

    let recurrence_id = component.recurrence_id.as_ref()?;
    let anchor = session.instant_of(&recurrence_id.value, source);
    let range = recurrence_id.range;

    Some(Override {
        start,
        end,
        component,
        anchor,
        range,
    })
}

/// A component's own `(start, end)` from its dtstart/dtend. A missing
/// dtend spans the day for date values and is zero-length otherwise.
fn own_interval(
    component: &CalendarComponent,
    session: &Session,
    source: &dyn TimezoneSource,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = session.instant_of(&component.dtstart, source);
    let end = match &component.dtend {
        Some(dtend) => session.instant_of(dtend, source),
        None if component.dtstart.is_date => start + chrono::Duration::days(1),
        None => start,
    };
    (start, end)
}

fn expand_master<E: RuleEvaluator>(
    master: &CalendarComponent,
    window: TimeWindow,
    session: &Session,
    evaluator: &E,
    source: &dyn TimezoneSource,
    generated: &mut Vec<Generated>,
) {
    let pairs = match evaluator.expand(master, window, session, source) {
        Ok(pairs) => pairs,
        Err(err) => {
            // This master contributes nothing; the rest of the batch is
            // unaffected.
            tracing::warn!(uid = %master.uid, %err, "dropping unexpandable component");
            return;
        }
    };

    let start_zone = session.zone_of(&master.dtstart, source);

    for (start, end) in pairs {
        let mut component = master.clone();

        if master.has_recurrences() && master.recurrence_id.is_none() {
            let local_start = start_zone.from_utc(start);
            component.recurrence_id = Some(RecurrenceId::single(CalDateTime {
                value: local_start,
                tzid: master.dtstart.tzid.clone(),
                is_date: master.dtstart.is_date,
            }));
        }

        generated.push(Generated {
            occurrence: Occurrence {
                start,
                end,
                component,
            },
            anchor: Some(start),
        });
    }
}

/// The core tie-break pass: apply each override against the generated
/// list, then append the never-exactly-matched ones standalone.
fn merge_overrides(generated: &mut Vec<Generated>, overrides: Vec<Override>) {
    let mut unprocessed: Vec<Override> = Vec::new();

    for detached in overrides {
        let mut processed = false;

        for entry in &mut *generated {
            if entry.occurrence.component.uid != detached.component.uid {
                continue;
            }

            let Some(entry_rid) = entry.occurrence.component.recurrence_id.as_ref() else {
                // A same-uid entry without a recurrence id cannot be
                // compared against the override's anchor.
                tracing::warn!(
                    uid = %detached.component.uid,
                    "generated entry has no recurrence id, skipping comparison"
                );
                continue;
            };
            let Some(entry_anchor) = entry.anchor else {
                continue;
            };

            let exact = entry_anchor == detached.anchor
                && entry_rid.range == detached.range;

            if exact {
                // Full replace: interval and content both come from the
                // override.
                entry.occurrence.start = detached.start;
                entry.occurrence.end = detached.end;
                entry.occurrence.component = detached.component.clone();
                processed = true;
            } else {
                let in_range = match detached.range {
                    RangeType::ThisPrior => entry_anchor <= detached.anchor,
                    RangeType::ThisFuture => entry_anchor >= detached.anchor,
                    RangeType::Single => false,
                };
                if in_range {
                    // Content-only replace: the entry keeps its own
                    // recurrence id, and with it its time identity.
                    let mut component = detached.component.clone();
                    component.recurrence_id =
                        entry.occurrence.component.recurrence_id.clone();
                    entry.occurrence.component = component;
                }
            }
        }

        if !processed {
            unprocessed.push(detached);
        }
    }

    // Detached instances with no exactly-matching generated slot stand
    // alone: true one-off exceptions, or overrides whose master is
    // absent from the input set.
    for detached in unprocessed {
        generated.push(Generated {
            anchor: Some(detached.anchor),
            occurrence: Occurrence {
                start: detached.start,
                end: detached.end,
                component: detached.component,
            },
        });
    }
}
