//! Telemetry records: samples and log entries.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A set of labels (name-value pairs), sorted by name.
///
/// Names are unique: inserting a label that already exists replaces its value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Labels(Vec<(String, String)>);

/// Opaque reference to a series, returned by [`Appender::append`](super::Appender::append).
///
/// `SeriesRef(0)` means "no reference".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SeriesRef(pub u64);

/// A point in time.
///
/// This opaque type is currently a wrapper around [`SystemTime`],
/// but this could change in the future.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(SystemTime);

/// A numeric sample of a series.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub labels: Labels,
    pub timestamp: Timestamp,
    pub value: f64,
}

/// A log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub labels: Labels,
    pub timestamp: Timestamp,
    pub line: Vec<u8>,
}

/// Bit pattern of the NaN value that marks a series as stale.
///
/// It is a specific NaN, distinct from the NaN produced by arithmetic operations,
/// so that a stale marker is never confused with an actual measured NaN.
const STALE_NAN_BITS: u64 = 0x7ff0_0000_0000_0002;

impl Labels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a label set from pairs, in any order.
    pub fn from_pairs<K: Into<String>, V: Into<String>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        let mut labels = Labels::new();
        for (k, v) in pairs {
            labels.insert(k.into(), v.into());
        }
        labels
    }

    /// Inserts or replaces a label.
    pub fn insert(&mut self, name: String, value: String) {
        match self.0.binary_search_by(|(k, _)| k.as_str().cmp(&name)) {
            Ok(i) => self.0[i].1 = value,
            Err(i) => self.0.insert(i, (name, value)),
        }
    }

    /// Returns a copy of this label set with one more label.
    pub fn with(&self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let mut res = self.clone();
        res.insert(name.into(), value.into());
        res
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .binary_search_by(|(k, _)| k.as_str().cmp(name))
            .ok()
            .map(|i| self.0[i].1.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Labels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{k}={v:?}")?;
        }
        f.write_str("}")
    }
}

impl Timestamp {
    /// Returns a `Timestamp` representing the current system time.
    pub fn now() -> Self {
        Self(SystemTime::now())
    }

    pub fn from_unix_millis(millis: u64) -> Self {
        Self(UNIX_EPOCH + Duration::from_millis(millis))
    }

    /// Milliseconds since the UNIX epoch, 0 for instants before the epoch.
    pub fn to_unix_millis(&self) -> u64 {
        self.0
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

impl From<SystemTime> for Timestamp {
    fn from(value: SystemTime) -> Self {
        Self(value)
    }
}

impl From<Timestamp> for SystemTime {
    fn from(value: Timestamp) -> Self {
        value.0
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Sample {
    pub fn new(labels: Labels, timestamp: Timestamp, value: f64) -> Self {
        Self {
            labels,
            timestamp,
            value,
        }
    }

    /// Creates a staleness marker: the series `labels` has disappeared at `timestamp`.
    pub fn stale(labels: Labels, timestamp: Timestamp) -> Self {
        Self::new(labels, timestamp, stale_marker())
    }

    pub fn is_stale(&self) -> bool {
        is_stale_marker(self.value)
    }
}

/// The value used to mark a series as stale.
pub fn stale_marker() -> f64 {
    f64::from_bits(STALE_NAN_BITS)
}

/// Checks whether `value` is the stale marker.
pub fn is_stale_marker(value: f64) -> bool {
    value.to_bits() == STALE_NAN_BITS
}

impl LogEntry {
    pub fn new(labels: Labels, timestamp: Timestamp, line: impl Into<Vec<u8>>) -> Self {
        Self {
            labels,
            timestamp,
            line: line.into(),
        }
    }

    /// Returns the line as text, replacing invalid UTF-8 sequences.
    pub fn line_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.line)
    }
}
