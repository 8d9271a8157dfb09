//! Fetch orchestration around the reconciliation engine.
//!
//! Two calling conventions over the same retry/compose logic: a
//! blocking client that sleeps between `Busy` retries, and an async
//! client that schedules its re-invocation and cooperates with a
//! cancellation token. Only one fetch is outstanding at a time per
//! invocation, so either client is safe to drive from a single-threaded
//! event loop.

use std::time::Duration;

use almanac_core::config::Settings;
use almanac_core::constants::{BUSY_RETRY_DELAY, BUSY_RETRY_LIMIT};
use almanac_ical::component::{CalendarComponent, Occurrence, RecurrenceId};
use almanac_ical::datetime::TimeWindow;
use almanac_ical::resolver::{Session, TimezoneSource};
use tokio_util::sync::CancellationToken;

use crate::error::{ClientError, ClientResult};
use crate::evaluator::{RruleEvaluator, RuleEvaluator};
use crate::reconcile::reconcile;
use crate::store::{
    AsyncComponentStore, AsyncStoreTimezones, ComponentStore, StoreError, StoreResult,
    StoreTimezones,
};

/// Bounded retry behavior for transient `Busy` answers.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub limit: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            limit: BUSY_RETRY_LIMIT,
            delay: BUSY_RETRY_DELAY,
        }
    }
}

impl From<&Settings> for RetryPolicy {
    fn from(settings: &Settings) -> Self {
        Self {
            limit: settings.retry.limit,
            delay: settings.retry.delay(),
        }
    }
}

/// Blocking occurrence-materialization client over a component store.
pub struct CalClient<S, E = RruleEvaluator> {
    store: S,
    session: Session,
    retry: RetryPolicy,
    evaluator: E,
}

impl<S: ComponentStore> CalClient<S> {
    #[must_use]
    pub fn new(store: S, session: Session) -> Self {
        Self {
            store,
            session,
            retry: RetryPolicy::default(),
            evaluator: RruleEvaluator,
        }
    }
}

impl<S: ComponentStore, E: RuleEvaluator> CalClient<S, E> {
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_evaluator<E2: RuleEvaluator>(self, evaluator: E2) -> CalClient<S, E2> {
        CalClient {
            store: self.store,
            session: self.session,
            retry: self.retry,
            evaluator,
        }
    }

    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// ## Summary
    /// Materializes every occurrence overlapping `window` and feeds them
    /// to `consumer` in ascending start order. The consumer returning
    /// `false` stops emission; remaining occurrences are discarded.
    ///
    /// A store answering `Busy` is retried up to the policy ceiling;
    /// exhaustion degrades to an empty result rather than an error.
    ///
    /// ## Errors
    /// `Cancelled` when the token is observed; terminal store errors
    /// are propagated verbatim.
    pub fn generate_instances(
        &self,
        window: TimeWindow,
        cancel: &CancellationToken,
        consumer: impl FnMut(Occurrence) -> bool,
    ) -> ClientResult<()> {
        let components =
            self.fetch_with_retry(cancel, || self.store.fetch_overlapping(window))?;
        let source = StoreTimezones(&self.store);
        self.reconcile_and_emit(components, window, None, &source, cancel, consumer)
    }

    /// ## Summary
    /// Materializes the occurrences of one series: the master plus all
    /// of its detached instances, reconciled, optionally narrowed to the
    /// occurrence(s) matching `target`.
    ///
    /// When the master has no recurrence definition, or the backend
    /// stores series as already-expanded standalone components, the
    /// engine is skipped and each component's own interval is emitted
    /// directly; `target` is ignored on that path, since no expanded
    /// occurrence identities exist to match it against.
    ///
    /// ## Errors
    /// Same contract as [`CalClient::generate_instances`].
    pub fn generate_instances_for_uid(
        &self,
        uid: &str,
        window: TimeWindow,
        target: Option<&RecurrenceId>,
        cancel: &CancellationToken,
        consumer: impl FnMut(Occurrence) -> bool,
    ) -> ClientResult<()> {
        let components = self.fetch_with_retry(cancel, || self.store.fetch_by_uid(uid))?;
        let source = StoreTimezones(&self.store);

        if let Some(own) = short_circuit(
            &components,
            self.store.capabilities().recurrences_no_master,
            window,
            &self.session,
            &source,
        ) {
            // No expansion happened, so there are no per-occurrence
            // identities to narrow by; the target filter does not apply.
            return emit(own, None, &self.session, &source, cancel, consumer);
        }

        self.reconcile_and_emit(components, window, target, &source, cancel, consumer)
    }

    fn reconcile_and_emit(
        &self,
        components: Vec<CalendarComponent>,
        window: TimeWindow,
        target: Option<&RecurrenceId>,
        source: &dyn TimezoneSource,
        cancel: &CancellationToken,
        consumer: impl FnMut(Occurrence) -> bool,
    ) -> ClientResult<()> {
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        let occurrences = reconcile(components, window, &self.session, &self.evaluator, source);
        emit(occurrences, target, &self.session, source, cancel, consumer)
    }

    fn fetch_with_retry(
        &self,
        cancel: &CancellationToken,
        mut attempt: impl FnMut() -> StoreResult<Vec<CalendarComponent>>,
    ) -> ClientResult<Vec<CalendarComponent>> {
        let mut tries = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(ClientError::Cancelled);
            }
            match attempt() {
                Ok(components) => return Ok(components),
                Err(StoreError::Busy) if tries < self.retry.limit => {
                    tries += 1;
                    tracing::trace!(tries, "store busy, retrying fetch");
                    std::thread::sleep(self.retry.delay);
                }
                Err(StoreError::Busy) => {
                    // At the ceiling a still-busy store degrades to an
                    // empty component set, not an error. Existing
                    // callers rely on the non-error path.
                    tracing::warn!(
                        limit = self.retry.limit,
                        "store still busy at retry ceiling, continuing with empty set"
                    );
                    return Ok(Vec::new());
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

/// Async occurrence-materialization client over a component store.
pub struct AsyncCalClient<S, E = RruleEvaluator> {
    store: S,
    session: Session,
    retry: RetryPolicy,
    evaluator: E,
}

impl<S: AsyncComponentStore> AsyncCalClient<S> {
    #[must_use]
    pub fn new(store: S, session: Session) -> Self {
        Self {
            store,
            session,
            retry: RetryPolicy::default(),
            evaluator: RruleEvaluator,
        }
    }
}

impl<S: AsyncComponentStore, E: RuleEvaluator> AsyncCalClient<S, E> {
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// ## Summary
    /// Async counterpart of [`CalClient::generate_instances`]: the
    /// `Busy` retry is a scheduled re-invocation instead of a blocking
    /// sleep, and the token is checked before each attempt, before
    /// reconciliation, and between emissions.
    ///
    /// ## Errors
    /// Same contract as [`CalClient::generate_instances`].
    pub async fn generate_instances(
        &self,
        window: TimeWindow,
        cancel: &CancellationToken,
        consumer: impl FnMut(Occurrence) -> bool,
    ) -> ClientResult<()> {
        let components = self
            .fetch_with_retry(cancel, FetchKind::Window(window))
            .await?;
        self.reconcile_and_emit(components, window, None, cancel, consumer)
    }

    /// ## Summary
    /// Async counterpart of [`CalClient::generate_instances_for_uid`].
    ///
    /// ## Errors
    /// Same contract as [`CalClient::generate_instances`].
    pub async fn generate_instances_for_uid(
        &self,
        uid: &str,
        window: TimeWindow,
        target: Option<&RecurrenceId>,
        cancel: &CancellationToken,
        consumer: impl FnMut(Occurrence) -> bool,
    ) -> ClientResult<()> {
        let components = self.fetch_with_retry(cancel, FetchKind::Uid(uid)).await?;
        let source = AsyncStoreTimezones(&self.store);

        if let Some(own) = short_circuit(
            &components,
            self.store.capabilities().recurrences_no_master,
            window,
            &self.session,
            &source,
        ) {
            // No expansion happened, so there are no per-occurrence
            // identities to narrow by; the target filter does not apply.
            return emit(own, None, &self.session, &source, cancel, consumer);
        }

        self.reconcile_and_emit(components, window, target, cancel, consumer)
    }

    fn reconcile_and_emit(
        &self,
        components: Vec<CalendarComponent>,
        window: TimeWindow,
        target: Option<&RecurrenceId>,
        cancel: &CancellationToken,
        consumer: impl FnMut(Occurrence) -> bool,
    ) -> ClientResult<()> {
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }
        let source = AsyncStoreTimezones(&self.store);
        let occurrences = reconcile(components, window, &self.session, &self.evaluator, &source);
        emit(occurrences, target, &self.session, &source, cancel, consumer)
    }

    async fn fetch_with_retry(
        &self,
        cancel: &CancellationToken,
        kind: FetchKind<'_>,
    ) -> ClientResult<Vec<CalendarComponent>> {
        let mut tries = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(ClientError::Cancelled);
            }
            let attempt = match kind {
                FetchKind::Window(window) => self.store.fetch_overlapping(window).await,
                FetchKind::Uid(uid) => self.store.fetch_by_uid(uid).await,
            };
            match attempt {
                Ok(components) => return Ok(components),
                Err(StoreError::Busy) if tries < self.retry.limit => {
                    tries += 1;
                    tracing::trace!(tries, "store busy, retrying fetch");
                    tokio::time::sleep(self.retry.delay).await;
                }
                Err(StoreError::Busy) => {
                    tracing::warn!(
                        limit = self.retry.limit,
                        "store still busy at retry ceiling, continuing with empty set"
                    );
                    return Ok(Vec::new());
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

#[derive(Clone, Copy)]
enum FetchKind<'a> {
    Window(TimeWindow),
    Uid(&'a str),
}

/// The no-expansion path for a single-uid query: when the master carries
/// no recurrence definition, or the backend declared that series are
/// stored pre-expanded, each component's own interval is the occurrence.
fn short_circuit(
    components: &[CalendarComponent],
    recurrences_no_master: bool,
    window: TimeWindow,
    session: &Session,
    source: &dyn TimezoneSource,
) -> Option<Vec<Occurrence>> {
    let master = components.iter().find(|c| !c.is_detached_instance());

    let applies = recurrences_no_master
        || master.is_some_and(|m| !m.has_recurrences() && components.len() == 1);
    if !applies {
        return None;
    }

    let mut occurrences: Vec<Occurrence> = components
        .iter()
        .filter_map(|component| {
            let start = session.instant_of(&component.dtstart, source);
            let end = component.dtend.as_ref().map_or_else(
                || {
                    if component.dtstart.is_date {
                        start + chrono::Duration::days(1)
                    } else {
                        start
                    }
                },
                |dtend| session.instant_of(dtend, source),
            );
            window
                .contains(start, end)
                .then(|| Occurrence {
                    start,
                    end,
                    component: component.clone(),
                })
        })
        .collect();
    occurrences.sort_by(|a, b| a.start.cmp(&b.start));
    Some(occurrences)
}

/// Ordered hand-off to the consumer, with the cancellation token checked
/// between elements and the optional target recurrence-id filter applied.
fn emit(
    occurrences: Vec<Occurrence>,
    target: Option<&RecurrenceId>,
    session: &Session,
    source: &dyn TimezoneSource,
    cancel: &CancellationToken,
    mut consumer: impl FnMut(Occurrence) -> bool,
) -> ClientResult<()> {
    let target_anchor =
        target.map(|rid| (rid.range, session.instant_of(&rid.value, source)));

    for occurrence in occurrences {
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        if let Some((range, anchor)) = target_anchor {
            let matches = occurrence.component.recurrence_id.as_ref().is_some_and(|rid| {
                rid.range == range && session.instant_of(&rid.value, source) == anchor
            });
            if !matches {
                continue;
            }
        }

        if !consumer(occurrence) {
            break;
        }
    }
    Ok(())
}
