//! Sliding time-window buffer over recent `FileEvent`s.
//!
//! Pruning is keyed to the newest event's own timestamp, not wall-clock
//! time, so a buffer fed from a recorded event log replays identically
//! regardless of how fast it is fed.

use std::collections::VecDeque;

use crate::event::FileEvent;

#[derive(Debug, Clone)]
pub struct WindowBuffer {
    window_size_secs: f64,
    events: VecDeque<FileEvent>,
}

impl WindowBuffer {
    pub fn new(window_size_secs: f64) -> Self {
        assert!(window_size_secs > 0.0, "window_size_secs must be positive");
        Self {
            window_size_secs,
            events: VecDeque::new(),
        }
    }

    /// Appends `event` and prunes everything older than
    /// `event.timestamp - window_size_secs`.
    pub fn push(&mut self, event: FileEvent) {
        let cutoff = event.timestamp - self.window_size_secs;
        self.events.push_back(event);
        while let Some(front) = self.events.front() {
            if front.timestamp < cutoff {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileEvent> {
        self.events.iter()
    }

    pub fn window_size_secs(&self) -> f64 {
        self.window_size_secs
    }

    /// Timestamp span currently covered by the buffer, or `0.0` if empty.
    pub fn span_secs(&self) -> f64 {
        match (self.events.front(), self.events.back()) {
            (Some(first), Some(last)) => last.timestamp - first.timestamp,
            _ => 0.0,
        }
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    fn ev(t: f64) -> FileEvent {
        FileEvent::new(t, EventKind::Modify, format!("/tmp/f{t}"))
    }

    #[test]
    fn prunes_events_older_than_window() {
        let mut w = WindowBuffer::new(10.0);
        w.push(ev(0.0));
        w.push(ev(5.0));
        w.push(ev(11.0));
        // cutoff = 11.0 - 10.0 = 1.0, so ev(0.0) is pruned, ev(5.0) stays
        assert_eq!(w.len(), 2);
        assert_eq!(w.iter().next().unwrap().timestamp, 5.0);
    }

    #[test]
    fn keeps_events_within_window() {
        let mut w = WindowBuffer::new(10.0);
        for i in 0..5 {
            w.push(ev(i as f64));
        }
        assert_eq!(w.len(), 5);
    }

    #[test]
    fn empty_buffer_has_zero_span() {
        let w = WindowBuffer::new(10.0);
        assert_eq!(w.span_secs(), 0.0);
        assert!(w.is_empty());
    }

    #[test]
    fn pruning_is_replay_deterministic() {
        // Feeding the same timestamped events twice, regardless of real
        // elapsed wall-clock time between pushes, yields the same state.
        let mut a = WindowBuffer::new(3.0);
        let mut b = WindowBuffer::new(3.0);
        let stamps = [0.0, 1.0, 2.0, 5.0, 5.5, 9.0];
        for &t in &stamps {
            a.push(ev(t));
        }
        for &t in &stamps {
            b.push(ev(t));
            std::thread::yield_now();
        }
        let a_stamps: Vec<f64> = a.iter().map(|e| e.timestamp).collect();
        let b_stamps: Vec<f64> = b.iter().map(|e| e.timestamp).collect();
        assert_eq!(a_stamps, b_stamps);
    }
}
