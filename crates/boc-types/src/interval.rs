use std::fmt;

use serde::{Deserialize, Serialize};

/// Half-open time span `[start, end)` in milliseconds.
///
/// `end == None` means "no known end yet"; indices store it using their
/// maximum timestamp. A single instant is written as `start == end`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Interval {
    pub start: i64,
    pub end: Option<i64>,
}

impl Interval {
    /// A closed-on-the-left, open-on-the-right span.
    pub const fn new(start: i64, end: i64) -> Self {
        Self {
            start,
            end: Some(end),
        }
    }

    /// An interval with no known end.
    pub const fn open(start: i64) -> Self {
        Self { start, end: None }
    }

    /// A single instant, `start == end == at`.
    pub const fn point(at: i64) -> Self {
        Self {
            start: at,
            end: Some(at),
        }
    }

    /// Returns `true` if the interval has no known end.
    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// Returns `true` if this is a single-instant interval.
    pub fn is_point(&self) -> bool {
        self.end == Some(self.start)
    }

    /// The end, substituting `max` for an open end.
    pub fn end_or(&self, max: i64) -> i64 {
        self.end.unwrap_or(max)
    }

    /// Returns `true` if `at` falls inside the interval.
    ///
    /// Point intervals contain exactly their instant.
    pub fn contains(&self, at: i64) -> bool {
        match self.end {
            None => self.start <= at,
            Some(end) if end == self.start => at == end,
            Some(end) => self.start <= at && at < end,
        }
    }

    /// Close an open interval (or move the end of a closed one).
    pub fn closed_at(&self, end: i64) -> Self {
        Self {
            start: self.start,
            end: Some(end),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "[{}, {})", self.start, end),
            None => write!(f, "[{}, ..)", self.start),
        }
    }
}
