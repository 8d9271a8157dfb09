//! Caching timezone resolver and the session it lives in.
//!
//! The cache is the only mutable state shared across concurrent engine
//! invocations. It is guarded by a single lock and grows append-only for
//! the life of the session: entries are never evicted, so results
//! reflect whichever rule set was first resolved for an identifier.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex};

use chrono::{DateTime, Utc};

use crate::datetime::CalDateTime;
use crate::error::{TimezoneError, TimezoneResult};
use crate::timezone::{TimezoneDefinition, TzRules, match_well_known, parse_vtimezone};

static UTC_DEFINITION: LazyLock<Arc<TimezoneDefinition>> =
    LazyLock::new(|| Arc::new(TimezoneDefinition::new("UTC", TzRules::Utc)));

/// The component store's timezone-lookup capability, seen at this
/// crate's boundary.
pub trait TimezoneSource {
    /// ## Summary
    /// Fetches the textual definition stored for `tzid`.
    ///
    /// ## Errors
    /// `NotFound` when the store has no definition for the identifier,
    /// `StoreUnavailable` when the store could not answer at all.
    fn timezone_text(&self, tzid: &str) -> TimezoneResult<String>;
}

/// Resolves timezone identifiers to definitions through a lock-guarded,
/// append-only cache.
///
/// Safe to call concurrently; resolution is idempotent.
#[derive(Debug, Default)]
pub struct TimezoneResolver {
    cache: Mutex<HashMap<String, Arc<TimezoneDefinition>>>,
}

impl TimezoneResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// ## Summary
    /// Resolves `tzid` to a timezone definition.
    ///
    /// Resolution order: the literal `"UTC"` short-circuits without
    /// touching the cache; then the cache; then the well-known matching
    /// table, whose hit is re-labelled with the *requested* identifier
    /// so the returned definition answers to the caller's TZID; finally
    /// the source's stored definition text. The slow path runs outside
    /// the lock, accepting a benign duplicate resolution race.
    ///
    /// ## Errors
    /// `NotFound` when no path resolves the identifier (including a
    /// malformed stored definition), `StoreUnavailable` when the source
    /// fetch failed.
    pub fn resolve(
        &self,
        tzid: &str,
        source: &dyn TimezoneSource,
    ) -> TimezoneResult<Arc<TimezoneDefinition>> {
        if tzid == "UTC" {
            return Ok(Arc::clone(&UTC_DEFINITION));
        }

        {
            let mut cache = self.cache.lock().map_err(poisoned)?;
            if let Some(definition) = cache.get(tzid) {
                return Ok(Arc::clone(definition));
            }

            if let Some(tz) = match_well_known(tzid) {
                tracing::trace!(tzid, matched = %tz, "substituting well-known timezone");
                let definition = Arc::new(TimezoneDefinition::new(tzid, TzRules::Iana(tz)));
                cache.insert(tzid.to_string(), Arc::clone(&definition));
                return Ok(definition);
            }
        }

        // Slow path, outside the lock: ask the store for its stored text.
        let text = source.timezone_text(tzid)?;
        let definition = Arc::new(parse_vtimezone(&text)?);

        let mut cache = self.cache.lock().map_err(poisoned)?;
        let entry = cache
            .entry(definition.tzid().to_string())
            .or_insert_with(|| Arc::clone(&definition));
        Ok(Arc::clone(entry))
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> TimezoneError {
    TimezoneError::StoreUnavailable("timezone cache lock poisoned".to_string())
}

/// Caller-constructed per-session state: the timezone cache plus the
/// default zone applied to floating and date-valued times.
///
/// Passed explicitly into every resolver and orchestrator call; its
/// lifetime is caller-controlled rather than process-global.
#[derive(Debug)]
pub struct Session {
    resolver: TimezoneResolver,
    default_zone: Arc<TimezoneDefinition>,
}

impl Default for Session {
    fn default() -> Self {
        Self::utc()
    }
}

impl Session {
    /// ## Summary
    /// Builds a session whose default zone is UTC.
    #[must_use]
    pub fn utc() -> Self {
        Self {
            resolver: TimezoneResolver::new(),
            default_zone: Arc::clone(&UTC_DEFINITION),
        }
    }

    /// ## Summary
    /// Builds a session with a well-known default zone.
    ///
    /// ## Errors
    /// `NotFound` when the identifier is not in the well-known table.
    pub fn with_default_tzid(tzid: &str) -> TimezoneResult<Self> {
        if tzid == "UTC" {
            return Ok(Self::utc());
        }
        let tz = match_well_known(tzid).ok_or_else(|| TimezoneError::NotFound(tzid.to_string()))?;
        Ok(Self {
            resolver: TimezoneResolver::new(),
            default_zone: Arc::new(TimezoneDefinition::new(tzid, TzRules::Iana(tz))),
        })
    }

    #[must_use]
    pub const fn resolver(&self) -> &TimezoneResolver {
        &self.resolver
    }

    #[must_use]
    pub fn default_zone(&self) -> Arc<TimezoneDefinition> {
        Arc::clone(&self.default_zone)
    }

    /// ## Summary
    /// Returns the zone a component date-time is interpreted in: its own
    /// zone when it names one, the session default otherwise. An
    /// unresolvable identifier falls back to the default zone rather
    /// than failing the component.
    #[must_use]
    pub fn zone_of(
        &self,
        dt: &CalDateTime,
        source: &dyn TimezoneSource,
    ) -> Arc<TimezoneDefinition> {
        match &dt.tzid {
            Some(tzid) if !dt.is_date => {
                self.resolver.resolve(tzid, source).unwrap_or_else(|err| {
                    tracing::warn!(tzid, %err, "falling back to session default zone");
                    self.default_zone()
                })
            }
            _ => self.default_zone(),
        }
    }

    /// ## Summary
    /// Resolves a component date-time to a UTC instant.
    #[must_use]
    pub fn instant_of(&self, dt: &CalDateTime, source: &dyn TimezoneSource) -> DateTime<Utc> {
        self.zone_of(dt, source).to_utc(dt.value)
    }
}
