//! Auto-refresh interval preference.
//!
//! Stored as a string: `"manual"` (or the legacy empty string) or one of the
//! preset millisecond values offered by the dashboard's interval picker.
//! Anything that does not parse falls back to [`Interval::Manual`].

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Millisecond values the interval picker offers.
pub const PRESET_INTERVALS_MS: [u64; 5] = [5_000, 15_000, 30_000, 60_000, 300_000];

const MANUAL: &str = "manual";

/// User-chosen auto-refresh cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Interval {
    /// No automatic refresh; panels only refresh on demand.
    #[default]
    Manual,
    /// Refresh every `Duration` (always non-zero).
    Every(Duration),
}

impl Interval {
    /// Build a periodic interval. Returns `None` for a zero duration.
    pub fn every(period: Duration) -> Option<Self> {
        if period.is_zero() {
            None
        } else {
            Some(Self::Every(period))
        }
    }

    /// Build a periodic interval from milliseconds. Returns `None` for zero.
    pub fn every_ms(ms: u64) -> Option<Self> {
        Self::every(Duration::from_millis(ms))
    }

    /// All values the picker offers, manual first.
    pub fn presets() -> Vec<Self> {
        std::iter::once(Self::Manual)
            .chain(
                PRESET_INTERVALS_MS
                    .iter()
                    .map(|ms| Self::Every(Duration::from_millis(*ms))),
            )
            .collect()
    }

    /// Parse a stored preference value. Unknown values are `Manual`.
    pub fn from_preference(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() || value.eq_ignore_ascii_case(MANUAL) {
            return Self::Manual;
        }

        match value.parse::<u64>() {
            Ok(ms) if PRESET_INTERVALS_MS.contains(&ms) => Self::Every(Duration::from_millis(ms)),
            _ => {
                tracing::warn!("Unknown refresh interval {:?}, using manual", value);
                Self::Manual
            }
        }
    }

    /// Value written to the preference store.
    pub fn to_preference(&self) -> String {
        match self {
            Self::Manual => MANUAL.to_string(),
            Self::Every(period) => period.as_millis().to_string(),
        }
    }

    /// The period, if any.
    pub fn period(&self) -> Option<Duration> {
        match self {
            Self::Manual => None,
            Self::Every(period) => Some(*period),
        }
    }

    pub fn is_manual(&self) -> bool {
        matches!(self, Self::Manual)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => write!(f, "Manual"),
            Self::Every(period) => {
                let secs = period.as_secs();
                if secs >= 60 && secs % 60 == 0 {
                    write!(f, "{} min", secs / 60)
                } else if period.subsec_millis() == 0 {
                    write!(f, "{} s", secs)
                } else {
                    write!(f, "{} ms", period.as_millis())
                }
            }
        }
    }
}

impl From<String> for Interval {
    fn from(value: String) -> Self {
        Self::from_preference(&value)
    }
}

impl From<Interval> for String {
    fn from(value: Interval) -> Self {
        value.to_preference()
    }
}
