//! Expiry notice thresholds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A days-remaining mark at which the user is warned once per license.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoticeThreshold(u32);

impl NoticeThreshold {
    pub fn new(days: u32) -> Self {
        Self(days)
    }

    pub fn days(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for NoticeThreshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d", self.0)
    }
}

/// Ordered set of notice thresholds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoticeSchedule {
    /// Ascending, deduplicated.
    thresholds: Vec<NoticeThreshold>,
}

impl NoticeSchedule {
    pub fn new(days: impl IntoIterator<Item = u32>) -> Self {
        let mut thresholds: Vec<NoticeThreshold> =
            days.into_iter().map(NoticeThreshold::new).collect();
        thresholds.sort();
        thresholds.dedup();
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &[NoticeThreshold] {
        &self.thresholds
    }

    /// Largest threshold; licenses further out than this need no notice.
    pub fn widest(&self) -> Option<NoticeThreshold> {
        self.thresholds.last().copied()
    }

    /// The 0-day threshold, if scheduled. Sent as the window closes.
    pub fn closing(&self) -> Option<NoticeThreshold> {
        self.thresholds.first().copied().filter(|threshold| threshold.days() == 0)
    }

    /// The tightest threshold already crossed at `days_remaining`.
    ///
    /// Looser thresholds that were skipped (e.g. the process was down) are
    /// not sent retroactively.
    pub fn due(&self, days_remaining: u32) -> Option<NoticeThreshold> {
        self.thresholds
            .iter()
            .copied()
            .find(|threshold| days_remaining <= threshold.days())
    }
}

impl Default for NoticeSchedule {
    fn default() -> Self {
        Self::new([5, 1, 0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_tightest_crossed_threshold() {
        let schedule = NoticeSchedule::default();

        assert_eq!(schedule.due(6), None);
        assert_eq!(schedule.due(5), Some(NoticeThreshold::new(5)));
        assert_eq!(schedule.due(3), Some(NoticeThreshold::new(5)));
        assert_eq!(schedule.due(1), Some(NoticeThreshold::new(1)));
        assert_eq!(schedule.due(0), Some(NoticeThreshold::new(0)));
    }

    #[test]
    fn normalizes_unsorted_input() {
        let schedule = NoticeSchedule::new([1, 5, 0, 5]);

        assert_eq!(schedule.thresholds().len(), 3);
        assert_eq!(schedule.widest(), Some(NoticeThreshold::new(5)));
    }

    #[test]
    fn empty_schedule_never_fires() {
        let schedule = NoticeSchedule::new([]);
        assert_eq!(schedule.due(0), None);
        assert_eq!(schedule.widest(), None);
        assert_eq!(schedule.closing(), None);
    }

    #[test]
    fn closing_threshold_only_when_zero_is_scheduled() {
        assert_eq!(
            NoticeSchedule::default().closing(),
            Some(NoticeThreshold::new(0))
        );
        assert_eq!(NoticeSchedule::new([7, 1]).closing(), None);
    }
}
