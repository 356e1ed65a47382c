//! Temporal extents.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Closed time interval `[start, end]`; an instant has `start == end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(with = "time::serde::rfc3339")]
    pub start: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end: OffsetDateTime,
}

impl TimeRange {
    pub fn new(start: OffsetDateTime, end: OffsetDateTime) -> Self {
        if end < start {
            Self {
                start: end,
                end: start,
            }
        } else {
            Self { start, end }
        }
    }

    pub fn instant(at: OffsetDateTime) -> Self {
        Self { start: at, end: at }
    }

    /// Builds a range from optional bounds, collapsing to an instant when
    /// only one bound is known.
    pub fn from_bounds(start: Option<OffsetDateTime>, end: Option<OffsetDateTime>) -> Option<Self> {
        match (start, end) {
            (Some(start), Some(end)) => Some(Self::new(start, end)),
            (Some(at), None) | (None, Some(at)) => Some(Self::instant(at)),
            (None, None) => None,
        }
    }

    pub fn expand_to_include(&mut self, other: &TimeRange) {
        self.start = self.start.min(other.start);
        self.end = self.end.max(other.end);
    }

    pub fn union(mut self, other: &TimeRange) -> Self {
        self.expand_to_include(other);
        self
    }

    pub fn contains(&self, other: &TimeRange) -> bool {
        self.start <= other.start && self.end >= other.end
    }
}

/// Folds optional ranges into their covering range.
pub fn covering<'a>(ranges: impl IntoIterator<Item = &'a TimeRange>) -> Option<TimeRange> {
    ranges
        .into_iter()
        .fold(None, |acc: Option<TimeRange>, range| match acc {
            Some(current) => Some(current.union(range)),
            None => Some(*range),
        })
}
