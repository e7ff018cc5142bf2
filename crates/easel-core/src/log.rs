//! The per-room event log.
//!
//! An append-only ordered sequence of stroke events plus the range-removal
//! operation that undo relies on. The log never validates gesture shape:
//! double `Begin`s, orphan `Point`s, and strokes left open by a vanished
//! client are all accepted as-is, and undo is defined to cope with them.

use easel_protocol::StrokeEvent;
use serde::{Deserialize, Serialize};

/// Policy for the index range an undo removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UndoStrategy {
    /// Remove the whole inclusive `[Begin, End]` index range.
    ///
    /// When the stroke was left open the range extends to the end of the
    /// log, so events interleaved by *other* authors inside the range are
    /// removed too. Known limitation, kept for compatibility with clients
    /// that expect it.
    #[default]
    Span,
    /// Remove only the invoking author's events within that same range.
    AuthorOnly,
}

/// Result of an undo attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoOutcome {
    /// The log changed; this many events were removed.
    Removed(usize),
    /// The author had no stroke to undo. Not an error.
    NothingToUndo,
}

impl UndoOutcome {
    /// Whether the log was mutated.
    #[must_use]
    pub fn changed(&self) -> bool {
        matches!(self, UndoOutcome::Removed(_))
    }
}

/// One room's ordered stroke history.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<StrokeEvent>,
}

impl EventLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events in the log.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Append an event to the end of the log.
    ///
    /// Never fails and never validates; returns the new length.
    pub fn append(&mut self, event: StrokeEvent) -> usize {
        self.events.push(event);
        self.events.len()
    }

    /// Full ordered copy of the log.
    ///
    /// Callers must take the snapshot under the same exclusion that
    /// protects mutation; the copy itself never aliases internal state.
    #[must_use]
    pub fn snapshot(&self) -> Vec<StrokeEvent> {
        self.events.clone()
    }

    /// Replace the log with an empty sequence. Idempotent.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Remove the invoking author's most recent stroke.
    ///
    /// Scans backward for the author's most recent `Begin`, then forward
    /// for that author's first subsequent `End`. If the stroke was left
    /// open the range closes at the last index of the log. The `strategy`
    /// decides whether the whole inclusive range goes or only the author's
    /// own events within it.
    pub fn remove_last_stroke_by(&mut self, author: &str, strategy: UndoStrategy) -> UndoOutcome {
        let Some(begin) = self
            .events
            .iter()
            .rposition(|e| e.author == author && e.is_begin())
        else {
            return UndoOutcome::NothingToUndo;
        };

        let close = self.events[begin + 1..]
            .iter()
            .position(|e| e.author == author && e.is_end())
            .map_or(self.events.len() - 1, |offset| begin + 1 + offset);

        let removed = match strategy {
            UndoStrategy::Span => {
                self.events.drain(begin..=close);
                close - begin + 1
            }
            UndoStrategy::AuthorOnly => {
                let before = self.events.len();
                let mut index = 0;
                self.events.retain(|e| {
                    let keep = !(index >= begin && index <= close && e.author == author);
                    index += 1;
                    keep
                });
                before - self.events.len()
            }
        };

        UndoOutcome::Removed(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use easel_protocol::StrokeKind;

    fn ev(author: &str, kind: StrokeKind, x: f64, y: f64) -> StrokeEvent {
        StrokeEvent::new(author, kind, x, y, "#000000", 2.0)
    }

    #[test]
    fn test_append_returns_new_length() {
        let mut log = EventLog::new();
        assert_eq!(log.append(ev("a", StrokeKind::Begin, 0.0, 0.0)), 1);
        assert_eq!(log.append(ev("a", StrokeKind::End, 1.0, 1.0)), 2);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_append_accepts_malformed_sequences() {
        let mut log = EventLog::new();
        // Orphan point, then two consecutive begins. Nothing rejects them.
        log.append(ev("a", StrokeKind::Point, 0.0, 0.0));
        log.append(ev("a", StrokeKind::Begin, 1.0, 1.0));
        log.append(ev("a", StrokeKind::Begin, 2.0, 2.0));
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_snapshot_is_independent_copy() {
        let mut log = EventLog::new();
        log.append(ev("a", StrokeKind::Begin, 0.0, 0.0));
        let snap = log.snapshot();
        log.clear();
        assert_eq!(snap.len(), 1);
        assert!(log.is_empty());
    }

    #[test]
    fn test_undo_removes_exactly_one_closed_stroke() {
        // A draws a full stroke, then B; A undoes.
        let mut log = EventLog::new();
        log.append(ev("A", StrokeKind::Begin, 0.0, 0.0));
        log.append(ev("A", StrokeKind::Point, 1.0, 1.0));
        log.append(ev("A", StrokeKind::End, 2.0, 2.0));
        log.append(ev("B", StrokeKind::Begin, 5.0, 5.0));
        log.append(ev("B", StrokeKind::End, 6.0, 6.0));

        let outcome = log.remove_last_stroke_by("A", UndoStrategy::Span);
        assert_eq!(outcome, UndoOutcome::Removed(3));

        let snap = log.snapshot();
        assert_eq!(snap.len(), 2);
        assert!(snap.iter().all(|e| e.author == "B"));
        assert_eq!((snap[0].x, snap[1].x), (5.0, 6.0));
    }

    #[test]
    fn test_undo_open_stroke_spans_to_end_of_log() {
        // A's stroke is never closed; B draws in between. Span undo takes
        // everything from A's Begin through the end, B's events included.
        let mut log = EventLog::new();
        log.append(ev("B", StrokeKind::Begin, 0.0, 0.0));
        log.append(ev("B", StrokeKind::End, 1.0, 1.0));
        log.append(ev("A", StrokeKind::Begin, 2.0, 2.0));
        log.append(ev("B", StrokeKind::Begin, 3.0, 3.0));
        log.append(ev("B", StrokeKind::End, 4.0, 4.0));

        let outcome = log.remove_last_stroke_by("A", UndoStrategy::Span);
        assert_eq!(outcome, UndoOutcome::Removed(3));

        let snap = log.snapshot();
        assert_eq!(snap.len(), 2);
        assert!(snap.iter().all(|e| e.author == "B" && e.x <= 1.0));
    }

    #[test]
    fn test_undo_author_only_spares_interleaved_events() {
        let mut log = EventLog::new();
        log.append(ev("A", StrokeKind::Begin, 0.0, 0.0));
        log.append(ev("B", StrokeKind::Begin, 1.0, 1.0));
        log.append(ev("A", StrokeKind::Point, 2.0, 2.0));
        log.append(ev("B", StrokeKind::End, 3.0, 3.0));

        let outcome = log.remove_last_stroke_by("A", UndoStrategy::AuthorOnly);
        assert_eq!(outcome, UndoOutcome::Removed(2));

        let snap = log.snapshot();
        assert_eq!(snap.len(), 2);
        assert!(snap.iter().all(|e| e.author == "B"));
    }

    #[test]
    fn test_consecutive_undo_peels_strokes_then_noops() {
        let mut log = EventLog::new();
        log.append(ev("A", StrokeKind::Begin, 0.0, 0.0));
        log.append(ev("A", StrokeKind::End, 1.0, 1.0));
        log.append(ev("A", StrokeKind::Begin, 2.0, 2.0));
        log.append(ev("A", StrokeKind::End, 3.0, 3.0));

        assert!(log
            .remove_last_stroke_by("A", UndoStrategy::Span)
            .changed());
        assert_eq!(log.len(), 2);
        // Second undo removes the next-most-recent stroke.
        assert!(log
            .remove_last_stroke_by("A", UndoStrategy::Span)
            .changed());
        assert!(log.is_empty());
        // Third undo has nothing left; never re-removes an empty range.
        assert_eq!(
            log.remove_last_stroke_by("A", UndoStrategy::Span),
            UndoOutcome::NothingToUndo
        );
    }

    #[test]
    fn test_undo_with_no_matching_begin_is_noop() {
        let mut log = EventLog::new();
        log.append(ev("B", StrokeKind::Begin, 0.0, 0.0));
        log.append(ev("B", StrokeKind::End, 1.0, 1.0));

        assert_eq!(
            log.remove_last_stroke_by("A", UndoStrategy::Span),
            UndoOutcome::NothingToUndo
        );
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_undo_on_empty_log_is_noop() {
        let mut log = EventLog::new();
        assert_eq!(
            log.remove_last_stroke_by("A", UndoStrategy::Span),
            UndoOutcome::NothingToUndo
        );
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut log = EventLog::new();
        log.clear();
        assert!(log.is_empty());

        log.append(ev("a", StrokeKind::Begin, 0.0, 0.0));
        log.clear();
        assert!(log.is_empty());
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn test_undo_does_not_match_end_from_other_author() {
        // A's Begin followed by B's End: B's End must not close A's stroke.
        let mut log = EventLog::new();
        log.append(ev("A", StrokeKind::Begin, 0.0, 0.0));
        log.append(ev("B", StrokeKind::End, 1.0, 1.0));
        log.append(ev("A", StrokeKind::Point, 2.0, 2.0));

        let outcome = log.remove_last_stroke_by("A", UndoStrategy::Span);
        // Open stroke: span runs to end of log, removing all three.
        assert_eq!(outcome, UndoOutcome::Removed(3));
        assert!(log.is_empty());
    }
}
