use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

const SECONDS_PER_DAY: i64 = 86_400;

// Naive layouts tried after RFC 3339; `%.f` also matches an absent fraction.
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
const DATE_FORMAT: &str = "%Y-%m-%d";

/// How a timestamp was written at the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampKind {
    /// Calendar date only, read as midnight.
    Date,
    /// Wall-clock date and time without an offset.
    Naive,
    /// Carried an explicit offset and has been converted to UTC.
    Aware,
}

impl TimestampKind {
    pub fn is_aware(self) -> bool {
        matches!(self, TimestampKind::Aware)
    }

    pub fn describe(self) -> &'static str {
        if self.is_aware() {
            "timezone-aware"
        } else {
            "timezone-naive"
        }
    }
}

/// A parsed instant in the single canonical representation used by the
/// pipeline: a UTC wall clock plus the kind it was parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    instant: NaiveDateTime,
    kind: TimestampKind,
}

impl Timestamp {
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();

        if let Ok(aware) = DateTime::parse_from_rfc3339(trimmed) {
            return Some(Self {
                instant: aware.with_timezone(&Utc).naive_utc(),
                kind: TimestampKind::Aware,
            });
        }

        for format in NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
                return Some(Self {
                    instant: naive,
                    kind: TimestampKind::Naive,
                });
            }
        }

        let date = NaiveDate::parse_from_str(trimmed, DATE_FORMAT).ok()?;
        Some(Self {
            instant: date.and_hms_opt(0, 0, 0)?,
            kind: TimestampKind::Date,
        })
    }

    pub fn instant(&self) -> NaiveDateTime {
        self.instant
    }

    pub fn kind(&self) -> TimestampKind {
        self.kind
    }

    /// A date-only snapshot is a calendar date and fits either representation.
    pub fn is_compatible_with(&self, data_kind: TimestampKind) -> bool {
        self.kind == TimestampKind::Date || self.kind.is_aware() == data_kind.is_aware()
    }

    /// Whole days from `earlier` to `self`, floored so that a snapshot a few
    /// hours before the latest transaction yields -1 rather than 0.
    pub fn days_since(&self, earlier: NaiveDateTime) -> i64 {
        (self.instant - earlier)
            .num_seconds()
            .div_euclid(SECONDS_PER_DAY)
    }
}
