//! End-to-end materialization over the in-memory store: expansion,
//! override reconciliation, uid queries, and the no-expansion paths.

mod support;

use almanac_client::client::CalClient;
use almanac_client::store::StoreCapabilities;
use almanac_ical::component::{
    CalendarComponent, Occurrence, Payload, RangeType, RecurrenceId,
};
use almanac_ical::datetime::CalDateTime;
use almanac_ical::resolver::Session;
use chrono::{TimeDelta, TimeZone, Utc};
use tokio_util::sync::CancellationToken;

use support::{MockStore, collect_into, january_window};

fn daily_master() -> CalendarComponent {
    CalendarComponent::new("series", CalDateTime::utc(2024, 1, 1, 9, 0, 0))
        .with_dtend(CalDateTime::utc(2024, 1, 1, 10, 0, 0))
        .with_rrule("FREQ=DAILY;COUNT=5")
        .with_payload(Payload::summary("standup"))
}

fn materialize(store: MockStore, start_day: u32, end_day: u32) -> Vec<Occurrence> {
    let client = CalClient::new(store, Session::utc());
    let mut occurrences = Vec::new();
    client
        .generate_instances(
            january_window(start_day, end_day),
            &CancellationToken::new(),
            collect_into(&mut occurrences),
        )
        .expect("materialization should succeed");
    occurrences
}

#[test_log::test]
fn daily_series_clipped_to_window() {
    let occurrences = materialize(MockStore::new(vec![daily_master()]), 2, 5);

    let starts: Vec<_> = occurrences.iter().map(|o| o.start).collect();
    assert_eq!(
        starts,
        vec![
            Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 3, 9, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 4, 9, 0, 0).unwrap(),
        ]
    );
    for occurrence in &occurrences {
        assert_eq!(occurrence.end - occurrence.start, TimeDelta::hours(1));
    }
}

#[test_log::test]
fn single_override_moves_one_slot() {
    let moved = CalendarComponent::new("series", CalDateTime::utc(2024, 1, 3, 11, 0, 0))
        .with_dtend(CalDateTime::utc(2024, 1, 3, 12, 0, 0))
        .with_recurrence_id(RecurrenceId::single(CalDateTime::utc(2024, 1, 3, 9, 0, 0)))
        .with_payload(Payload::summary("standup (moved)"));

    let occurrences = materialize(MockStore::new(vec![daily_master(), moved]), 2, 5);

    let starts: Vec<_> = occurrences.iter().map(|o| o.start).collect();
    assert_eq!(
        starts,
        vec![
            Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 3, 11, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 4, 9, 0, 0).unwrap(),
        ]
    );
    assert_eq!(
        occurrences[1].component.payload.summary.as_deref(),
        Some("standup (moved)")
    );
    assert_eq!(
        occurrences[1].end,
        Utc.with_ymd_and_hms(2024, 1, 3, 12, 0, 0).unwrap()
    );
}

#[test_log::test]
fn thisfuture_override_rewrites_payload_only() {
    let rewrite = CalendarComponent::new("series", CalDateTime::utc(2024, 1, 3, 9, 0, 0))
        .with_dtend(CalDateTime::utc(2024, 1, 3, 10, 0, 0))
        .with_recurrence_id(RecurrenceId {
            range: RangeType::ThisFuture,
            value: CalDateTime::utc(2024, 1, 3, 9, 0, 0),
        })
        .with_payload(Payload::summary("standup (new room)"));

    let occurrences = materialize(MockStore::new(vec![daily_master(), rewrite]), 2, 5);

    // The generated entries keep their own time identity; Jan 3 onward
    // carries the override's payload. The override itself, never matched
    // by exact anchor, additionally stands alone.
    let generated: Vec<_> = occurrences
        .iter()
        .filter(|o| {
            o.component
                .recurrence_id
                .as_ref()
                .is_some_and(|rid| rid.range == RangeType::Single)
        })
        .collect();
    assert_eq!(generated.len(), 3);

    let summary_of = |day: u32| {
        generated
            .iter()
            .find(|o| o.start == Utc.with_ymd_and_hms(2024, 1, day, 9, 0, 0).unwrap())
            .expect("generated entry")
            .component
            .payload
            .summary
            .clone()
    };
    assert_eq!(summary_of(2).as_deref(), Some("standup"));
    assert_eq!(summary_of(3).as_deref(), Some("standup (new room)"));
    assert_eq!(summary_of(4).as_deref(), Some("standup (new room)"));

    let standalone: Vec<_> = occurrences
        .iter()
        .filter(|o| {
            o.component
                .recurrence_id
                .as_ref()
                .is_some_and(|rid| rid.range == RangeType::ThisFuture)
        })
        .collect();
    assert_eq!(standalone.len(), 1);
}

#[test_log::test]
fn orphan_override_stands_alone() {
    let orphan = CalendarComponent::new("gone-series", CalDateTime::utc(2024, 1, 3, 14, 0, 0))
        .with_dtend(CalDateTime::utc(2024, 1, 3, 15, 0, 0))
        .with_recurrence_id(RecurrenceId::single(CalDateTime::utc(2024, 1, 3, 9, 0, 0)));

    let occurrences = materialize(MockStore::new(vec![orphan]), 2, 5);

    assert_eq!(occurrences.len(), 1);
    assert_eq!(occurrences[0].component.uid, "gone-series");
    assert_eq!(
        occurrences[0].start,
        Utc.with_ymd_and_hms(2024, 1, 3, 14, 0, 0).unwrap()
    );
}

#[test_log::test]
fn non_recurring_component_in_and_out_of_window() {
    let one_off = CalendarComponent::new("one-off", CalDateTime::utc(2024, 1, 3, 9, 0, 0))
        .with_dtend(CalDateTime::utc(2024, 1, 3, 10, 0, 0));

    let inside = materialize(MockStore::new(vec![one_off.clone()]), 2, 5);
    assert_eq!(inside.len(), 1);
    assert_eq!(
        (inside[0].start, inside[0].end),
        (
            Utc.with_ymd_and_hms(2024, 1, 3, 9, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 3, 10, 0, 0).unwrap(),
        )
    );

    let outside = materialize(MockStore::new(vec![one_off]), 10, 12);
    assert!(outside.is_empty());
}

#[test_log::test]
fn no_duplicate_identity_in_output() {
    let moved = CalendarComponent::new("series", CalDateTime::utc(2024, 1, 3, 11, 0, 0))
        .with_dtend(CalDateTime::utc(2024, 1, 3, 12, 0, 0))
        .with_recurrence_id(RecurrenceId::single(CalDateTime::utc(2024, 1, 3, 9, 0, 0)));
    let rewrite = CalendarComponent::new("series", CalDateTime::utc(2024, 1, 2, 9, 0, 0))
        .with_dtend(CalDateTime::utc(2024, 1, 2, 10, 0, 0))
        .with_recurrence_id(RecurrenceId {
            range: RangeType::ThisPrior,
            value: CalDateTime::utc(2024, 1, 2, 9, 0, 0),
        });

    let occurrences = materialize(MockStore::new(vec![daily_master(), moved, rewrite]), 1, 6);

    let mut identities: Vec<_> = occurrences
        .iter()
        .map(|o| {
            (
                o.component.uid.clone(),
                o.component
                    .recurrence_id
                    .as_ref()
                    .map(|rid| (rid.range, rid.value.value)),
            )
        })
        .collect();
    let total = identities.len();
    identities.sort();
    identities.dedup();
    assert_eq!(identities.len(), total, "duplicate (uid, recurrence id) emitted");
}

#[test_log::test]
fn every_emission_overlaps_the_window() {
    let occurrences = materialize(MockStore::new(vec![daily_master()]), 2, 5);
    let window = january_window(2, 5);
    assert!(!occurrences.is_empty());
    for occurrence in occurrences {
        assert!(window.contains(occurrence.start, occurrence.end));
    }
}

#[test_log::test]
fn uid_query_filters_to_target_recurrence_id() {
    let store = MockStore::new(vec![daily_master()]);
    let client = CalClient::new(store, Session::utc());

    let target = RecurrenceId::single(CalDateTime::utc(2024, 1, 3, 9, 0, 0));
    let mut occurrences = Vec::new();
    client
        .generate_instances_for_uid(
            "series",
            january_window(1, 6),
            Some(&target),
            &CancellationToken::new(),
            collect_into(&mut occurrences),
        )
        .expect("uid query should succeed");

    assert_eq!(occurrences.len(), 1);
    assert_eq!(
        occurrences[0].start,
        Utc.with_ymd_and_hms(2024, 1, 3, 9, 0, 0).unwrap()
    );
}

#[test_log::test]
fn uid_query_short_circuits_non_recurring_master() {
    let one_off = CalendarComponent::new("plain", CalDateTime::utc(2024, 1, 3, 9, 0, 0))
        .with_dtend(CalDateTime::utc(2024, 1, 3, 10, 0, 0));
    let store = MockStore::new(vec![one_off]);
    let client = CalClient::new(store, Session::utc());

    let mut occurrences = Vec::new();
    client
        .generate_instances_for_uid(
            "plain",
            january_window(2, 5),
            None,
            &CancellationToken::new(),
            collect_into(&mut occurrences),
        )
        .expect("uid query should succeed");

    assert_eq!(occurrences.len(), 1);
    // No expansion happened: no synthesized recurrence id.
    assert!(occurrences[0].component.recurrence_id.is_none());
}

#[test_log::test]
fn uid_query_target_is_ignored_on_short_circuit() {
    let one_off = CalendarComponent::new("plain", CalDateTime::utc(2024, 1, 3, 9, 0, 0))
        .with_dtend(CalDateTime::utc(2024, 1, 3, 10, 0, 0));
    let store = MockStore::new(vec![one_off]);
    let client = CalClient::new(store, Session::utc());

    // A target that matches nothing: the non-recurring path still emits
    // the component's own interval.
    let target = RecurrenceId::single(CalDateTime::utc(2024, 1, 4, 9, 0, 0));
    let mut occurrences = Vec::new();
    client
        .generate_instances_for_uid(
            "plain",
            january_window(2, 5),
            Some(&target),
            &CancellationToken::new(),
            collect_into(&mut occurrences),
        )
        .expect("uid query should succeed");

    assert_eq!(occurrences.len(), 1);
    assert_eq!(
        occurrences[0].start,
        Utc.with_ymd_and_hms(2024, 1, 3, 9, 0, 0).unwrap()
    );
}

#[test_log::test]
fn uid_query_honors_no_master_capability() {
    // A backend that stores the series pre-expanded: standalone
    // components sharing a uid, no master to expand.
    let first = CalendarComponent::new("expanded", CalDateTime::utc(2024, 1, 2, 9, 0, 0))
        .with_dtend(CalDateTime::utc(2024, 1, 2, 10, 0, 0));
    let second = CalendarComponent::new("expanded", CalDateTime::utc(2024, 1, 3, 9, 0, 0))
        .with_dtend(CalDateTime::utc(2024, 1, 3, 10, 0, 0));

    let store = MockStore::new(vec![first, second]).with_capabilities(StoreCapabilities {
        recurrences_no_master: true,
    });
    let client = CalClient::new(store, Session::utc());

    let mut occurrences = Vec::new();
    client
        .generate_instances_for_uid(
            "expanded",
            january_window(1, 6),
            None,
            &CancellationToken::new(),
            collect_into(&mut occurrences),
        )
        .expect("uid query should succeed");

    let starts: Vec<_> = occurrences.iter().map(|o| o.start).collect();
    assert_eq!(
        starts,
        vec![
            Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 3, 9, 0, 0).unwrap(),
        ]
    );
}

#[test_log::test]
fn zoned_component_resolves_through_store_timezone() {
    const PLANT_TZ: &str = "BEGIN:VTIMEZONE\nTZID:Custom/Plant\nBEGIN:STANDARD\nTZOFFSETTO:+0300\nEND:STANDARD\nEND:VTIMEZONE\n";

    let local = chrono::NaiveDate::from_ymd_opt(2024, 1, 3)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap();
    let comp = CalendarComponent::new("zoned", CalDateTime::zoned(local, "Custom/Plant"))
        .with_dtend(CalDateTime::zoned(local + TimeDelta::hours(1), "Custom/Plant"));

    let store = MockStore::new(vec![comp]).with_timezone("Custom/Plant", PLANT_TZ);
    let occurrences = {
        let client = CalClient::new(store, Session::utc());
        let mut collected = Vec::new();
        client
            .generate_instances(
                january_window(2, 5),
                &CancellationToken::new(),
                collect_into(&mut collected),
            )
            .expect("materialization should succeed");
        collected
    };

    assert_eq!(occurrences.len(), 1);
    // 12:00 at +0300 is 09:00 UTC
    assert_eq!(
        occurrences[0].start,
        Utc.with_ymd_and_hms(2024, 1, 3, 9, 0, 0).unwrap()
    );
}
