//! In-memory component store for orchestrator tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use almanac_client::store::{
    AsyncComponentStore, ComponentStore, StoreCapabilities, StoreError, StoreResult,
};
use almanac_ical::component::{CalendarComponent, Occurrence};
use almanac_ical::datetime::TimeWindow;
use chrono::{TimeZone, Utc};

pub struct MockStore {
    pub components: Vec<CalendarComponent>,
    pub timezones: HashMap<String, String>,
    pub capabilities: StoreCapabilities,
    /// Number of fetches answered `Busy` before succeeding.
    busy_remaining: AtomicU32,
    pub fetch_calls: AtomicU32,
}

impl MockStore {
    pub fn new(components: Vec<CalendarComponent>) -> Self {
        Self {
            components,
            timezones: HashMap::new(),
            capabilities: StoreCapabilities::default(),
            busy_remaining: AtomicU32::new(0),
            fetch_calls: AtomicU32::new(0),
        }
    }

    pub fn busy_for(self, answers: u32) -> Self {
        self.busy_remaining.store(answers, Ordering::SeqCst);
        self
    }

    pub fn with_timezone(mut self, tzid: &str, text: &str) -> Self {
        self.timezones.insert(tzid.to_string(), text.to_string());
        self
    }

    pub fn with_capabilities(mut self, capabilities: StoreCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn fetch_count(&self) -> u32 {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    fn answer(&self, components: Vec<CalendarComponent>) -> StoreResult<Vec<CalendarComponent>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let busy = self
            .busy_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if busy {
            return Err(StoreError::Busy);
        }
        Ok(components)
    }
}

impl ComponentStore for MockStore {
    fn fetch_overlapping(&self, _window: TimeWindow) -> StoreResult<Vec<CalendarComponent>> {
        self.answer(self.components.clone())
    }

    fn fetch_by_uid(&self, uid: &str) -> StoreResult<Vec<CalendarComponent>> {
        let matching = self
            .components
            .iter()
            .filter(|c| c.uid == uid)
            .cloned()
            .collect();
        self.answer(matching)
    }

    fn lookup_timezone(&self, tzid: &str) -> StoreResult<String> {
        self.timezones
            .get(tzid)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(tzid.to_string()))
    }

    fn capabilities(&self) -> StoreCapabilities {
        self.capabilities
    }
}

impl AsyncComponentStore for MockStore {
    async fn fetch_overlapping(&self, window: TimeWindow) -> StoreResult<Vec<CalendarComponent>> {
        ComponentStore::fetch_overlapping(self, window)
    }

    async fn fetch_by_uid(&self, uid: &str) -> StoreResult<Vec<CalendarComponent>> {
        ComponentStore::fetch_by_uid(self, uid)
    }

    fn lookup_timezone(&self, tzid: &str) -> StoreResult<String> {
        ComponentStore::lookup_timezone(self, tzid)
    }

    fn capabilities(&self) -> StoreCapabilities {
        self.capabilities
    }
}

pub fn january_window(start_day: u32, end_day: u32) -> TimeWindow {
    TimeWindow::new(
        Utc.with_ymd_and_hms(2024, 1, start_day, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 1, end_day, 0, 0, 0).unwrap(),
    )
    .unwrap()
}

pub fn collect_into(sink: &mut Vec<Occurrence>) -> impl FnMut(Occurrence) -> bool + '_ {
    move |occurrence| {
        sink.push(occurrence);
        true
    }
}
