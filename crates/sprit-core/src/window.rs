//! Exclusion time windows and manual window selection.

use crate::error::{HvsrError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A `[start, end]` interval in seconds from the record start.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Start offset in seconds.
    pub start: f64,
    /// End offset in seconds.
    pub end: f64,
}

impl TimeWindow {
    /// Create a window, rejecting reversed or non-finite bounds.
    pub fn new(start: f64, end: f64) -> Result<Self> {
        if !start.is_finite() || !end.is_finite() {
            return Err(HvsrError::invalid(
                "time_window",
                format!("bounds must be finite, got [{start}, {end}]"),
            ));
        }
        if end < start {
            return Err(HvsrError::invalid(
                "time_window",
                format!("end {end} is before start {start}"),
            ));
        }
        Ok(Self { start, end })
    }

    /// Length in seconds.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    /// True if the two windows share any instant.
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.3} s, {:.3} s]", self.start, self.end)
    }
}

/// Sort windows by start time and merge every pair where the earlier end
/// exceeds the later start.
pub fn merge_windows(windows: &[TimeWindow]) -> Vec<TimeWindow> {
    let mut sorted = windows.to_vec();
    sorted.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut merged: Vec<TimeWindow> = Vec::with_capacity(sorted.len());
    for w in sorted {
        match merged.last_mut() {
            Some(prev) if prev.end > w.start => {
                prev.end = prev.end.max(w.end);
            }
            _ => merged.push(w),
        }
    }
    merged
}

/// Validate user-specified windows: sorted by start, no pair may overlap.
///
/// Returns the sorted list, or [`HvsrError::OverlappingWindows`] naming the
/// first offending pair.
pub fn check_manual_windows(windows: &[TimeWindow]) -> Result<Vec<TimeWindow>> {
    let mut sorted = windows.to_vec();
    for w in &sorted {
        TimeWindow::new(w.start, w.end)?;
    }
    sorted.sort_by(|a, b| a.start.total_cmp(&b.start));
    for pair in sorted.windows(2) {
        if pair[0].end > pair[1].start {
            return Err(HvsrError::OverlappingWindows {
                first: pair[0],
                second: pair[1],
            });
        }
    }
    Ok(sorted)
}

/// A merged, sorted, non-overlapping list of exclusion windows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExclusionSet {
    windows: Vec<TimeWindow>,
}

impl ExclusionSet {
    /// Build from arbitrary windows, merging as needed.
    pub fn from_windows(windows: &[TimeWindow]) -> Self {
        Self {
            windows: merge_windows(windows),
        }
    }

    /// Add windows and re-merge.
    pub fn extend(&mut self, more: &[TimeWindow]) {
        let mut all = std::mem::take(&mut self.windows);
        all.extend_from_slice(more);
        self.windows = merge_windows(&all);
    }

    /// The merged windows.
    pub fn windows(&self) -> &[TimeWindow] {
        &self.windows
    }

    /// Number of merged windows.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// True if nothing is excluded.
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Total excluded time in seconds.
    pub fn total_duration(&self) -> f64 {
        self.windows.iter().map(TimeWindow::duration).sum()
    }

    /// True if any exclusion window overlaps `[start, end)`.
    pub fn overlaps_span(&self, start: f64, end: f64) -> bool {
        self.windows.iter().any(|w| w.start < end && w.end >= start)
    }
}

/// Mouse button of a selection click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickButton {
    /// Adds a window boundary.
    Left,
    /// Removes the most recently completed window.
    Right,
}

/// Interactive window-selection session.
///
/// Pairs of left clicks define windows; a right click drops the last
/// completed window (or a dangling start click). The session is plain data:
/// the pipeline only ever sees the list returned by [`finish`](Self::finish).
#[derive(Debug, Clone, Default)]
pub struct ManualSelection {
    pending: Option<f64>,
    windows: Vec<TimeWindow>,
}

impl ManualSelection {
    /// Start an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a click at `offset` seconds.
    pub fn click(&mut self, button: ClickButton, offset: f64) {
        match button {
            ClickButton::Left => match self.pending.take() {
                None => self.pending = Some(offset),
                Some(first) => {
                    let (start, end) = if offset < first {
                        (offset, first)
                    } else {
                        (first, offset)
                    };
                    self.windows.push(TimeWindow { start, end });
                }
            },
            ClickButton::Right => {
                if self.pending.take().is_none() {
                    self.windows.pop();
                }
            }
        }
    }

    /// Remove the last completed window, returning it.
    pub fn remove_last(&mut self) -> Option<TimeWindow> {
        self.windows.pop()
    }

    /// Windows completed so far.
    pub fn windows(&self) -> &[TimeWindow] {
        &self.windows
    }

    /// True while a start click awaits its end click.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// End the session. A dangling start click is discarded.
    pub fn finish(self) -> Vec<TimeWindow> {
        self.windows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn w(start: f64, end: f64) -> TimeWindow {
        TimeWindow { start, end }
    }

    #[test]
    fn merge_sorts_and_joins_overlaps() {
        let merged = merge_windows(&[w(50.0, 60.0), w(0.0, 10.0), w(5.0, 20.0), w(20.0, 25.0)]);
        // 20.0 end does not exceed 20.0 start, so those two stay apart
        assert_eq!(merged, vec![w(0.0, 20.0), w(20.0, 25.0), w(50.0, 60.0)]);
    }

    #[test]
    fn merge_keeps_containing_window() {
        let merged = merge_windows(&[w(0.0, 100.0), w(10.0, 20.0)]);
        assert_eq!(merged, vec![w(0.0, 100.0)]);
    }

    #[test]
    fn overlapping_manual_windows_are_rejected() {
        let err = check_manual_windows(&[w(30.0, 40.0), w(0.0, 35.0)]).unwrap_err();
        match err {
            HvsrError::OverlappingWindows { first, second } => {
                assert_eq!(first, w(0.0, 35.0));
                assert_eq!(second, w(30.0, 40.0));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn reversed_manual_window_is_rejected() {
        assert!(check_manual_windows(&[w(10.0, 5.0)]).is_err());
    }

    #[test]
    fn exclusion_set_span_overlap() {
        let set = ExclusionSet::from_windows(&[w(100.0, 110.0)]);
        assert!(set.overlaps_span(90.0, 101.0));
        assert!(set.overlaps_span(105.0, 200.0));
        assert!(!set.overlaps_span(0.0, 100.0));
        assert!(!set.overlaps_span(110.5, 200.0));
        assert_eq!(set.total_duration(), 10.0);
    }

    #[test]
    fn manual_session_pairs_clicks() {
        let mut session = ManualSelection::new();
        session.click(ClickButton::Left, 10.0);
        assert!(session.is_pending());
        session.click(ClickButton::Left, 5.0);
        session.click(ClickButton::Left, 20.0);
        session.click(ClickButton::Left, 30.0);
        session.click(ClickButton::Left, 40.0);
        session.click(ClickButton::Right, 0.0);
        assert_eq!(session.windows().len(), 2);
        session.click(ClickButton::Right, 0.0);
        assert_eq!(session.finish(), vec![w(5.0, 10.0)]);
    }
}
