//! Timezone definitions and the well-known-timezone matching table.
//!
//! A `TimezoneDefinition` answers to a TZID and converts between local
//! and UTC instants. Under well-known substitution the definition's
//! identifier is the one the caller asked for, even though its rule data
//! came from the IANA database: returning a different TZID would break
//! the caller's components, which reference the original identifier.

use std::str::FromStr;

use chrono::{DateTime, FixedOffset, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{TimezoneError, TimezoneResult};

/// Rule data backing a timezone definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TzRules {
    Utc,
    /// An IANA zone from the bundled database.
    Iana(Tz),
    /// A single fixed offset, from a VTIMEZONE the store handed back.
    Fixed(FixedOffset),
}

/// A resolved timezone: an identifier plus the rules it answers with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimezoneDefinition {
    tzid: String,
    rules: TzRules,
}

impl TimezoneDefinition {
    #[must_use]
    pub fn new(tzid: impl Into<String>, rules: TzRules) -> Self {
        Self {
            tzid: tzid.into(),
            rules,
        }
    }

    /// The identifier this definition answers to.
    #[must_use]
    pub fn tzid(&self) -> &str {
        &self.tzid
    }

    #[must_use]
    pub const fn rules(&self) -> &TzRules {
        &self.rules
    }

    /// ## Summary
    /// Converts a local date-time in this zone to a UTC instant.
    ///
    /// On a DST fold the first occurrence is used (RFC 5545 convention);
    /// on a DST gap the time is shifted forward until it exists.
    #[must_use]
    pub fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        match &self.rules {
            TzRules::Utc => Utc.from_utc_datetime(&local),
            TzRules::Iana(tz) => local_to_utc_in(*tz, local),
            TzRules::Fixed(offset) => match offset.from_local_datetime(&local) {
                LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => {
                    dt.with_timezone(&Utc)
                }
                LocalResult::None => Utc.from_utc_datetime(&local),
            },
        }
    }

    /// ## Summary
    /// Renders a UTC instant as a local date-time in this zone.
    #[must_use]
    pub fn from_utc(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        match &self.rules {
            TzRules::Utc => instant.naive_utc(),
            TzRules::Iana(tz) => instant.with_timezone(tz).naive_local(),
            TzRules::Fixed(offset) => instant.with_timezone(offset).naive_local(),
        }
    }
}

fn local_to_utc_in(tz: Tz, local: NaiveDateTime) -> DateTime<Utc> {
    let mut candidate = local;
    loop {
        match tz.from_local_datetime(&candidate) {
            LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => {
                return dt.with_timezone(&Utc);
            }
            LocalResult::None => {
                // DST gap: shift forward and retry
                candidate += chrono::Duration::hours(1);
            }
        }
    }
}

/// Vendor prefixes stripped before well-known matching.
const VENDOR_PREFIXES: &[&str] = &["/mozilla.org/", "/softwarestudio.org/", "/citadel.org/"];

/// Windows display names mapped to IANA identifiers. Clients that sync
/// through Exchange-shaped backends emit these verbatim.
const WINDOWS_TZ_TABLE: &[(&str, &str)] = &[
    ("Eastern Standard Time", "America/New_York"),
    ("Central Standard Time", "America/Chicago"),
    ("Mountain Standard Time", "America/Denver"),
    ("Pacific Standard Time", "America/Los_Angeles"),
    ("GMT Standard Time", "Europe/London"),
    ("W. Europe Standard Time", "Europe/Berlin"),
    ("Romance Standard Time", "Europe/Paris"),
    ("Central Europe Standard Time", "Europe/Budapest"),
    ("Tokyo Standard Time", "Asia/Tokyo"),
    ("AUS Eastern Standard Time", "Australia/Sydney"),
];

/// ## Summary
/// Looks up a client-supplied identifier in the well-known timezone
/// matching table.
///
/// Strips vendor prefixes, maps Windows display names, then tries the
/// identifier as an IANA name. Returns the matched zone's rules; the
/// caller keeps the original identifier on the definition it builds.
#[must_use]
pub fn match_well_known(tzid: &str) -> Option<Tz> {
    let stripped = VENDOR_PREFIXES
        .iter()
        .find_map(|prefix| tzid.strip_prefix(prefix))
        .unwrap_or(tzid);

    if let Some((_, iana)) = WINDOWS_TZ_TABLE.iter().find(|(name, _)| *name == stripped) {
        return Tz::from_str(iana).ok();
    }

    Tz::from_str(stripped).ok()
}

/// ## Summary
/// Parses the textual timezone definition a component store hands back.
///
/// The accepted shape is a VTIMEZONE block: the `TZID` property names the
/// zone and the last `TZOFFSETTO` of the block supplies its offset.
///
/// ## Errors
/// Returns `TimezoneError::NotFound` when the text carries no usable
/// TZID or offset.
pub fn parse_vtimezone(text: &str) -> TimezoneResult<TimezoneDefinition> {
    let mut tzid: Option<&str> = None;
    let mut offset: Option<FixedOffset> = None;

    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(value) = line.strip_prefix("TZID:") {
            tzid.get_or_insert(value);
        } else if let Some(value) = line.strip_prefix("TZOFFSETTO:") {
            offset = parse_utc_offset(value);
        }
    }

    match (tzid, offset) {
        (Some(tzid), Some(offset)) => {
            // An IANA-named VTIMEZONE gets the fuller bundled rules.
            let rules = Tz::from_str(tzid).map_or(TzRules::Fixed(offset), TzRules::Iana);
            Ok(TimezoneDefinition::new(tzid, rules))
        }
        _ => Err(TimezoneError::NotFound(format!(
            "unparsable timezone definition ({} bytes)",
            text.len()
        ))),
    }
}

/// Parses `+HHMM`, `-HHMM`, or `+HHMMSS` offset strings.
fn parse_utc_offset(value: &str) -> Option<FixedOffset> {
    let (sign, digits) = match value.split_at_checked(1)? {
        ("+", rest) => (1, rest),
        ("-", rest) => (-1, rest),
        _ => return None,
    };
    if digits.len() != 4 && digits.len() != 6 {
        return None;
    }
    let hours: i32 = digits.get(0..2)?.parse().ok()?;
    let minutes: i32 = digits.get(2..4)?.parse().ok()?;
    let seconds: i32 = match digits.get(4..6) {
        Some(s) => s.parse().ok()?,
        None => 0,
    };
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60 + seconds))
}
