//! Single-slot "latest wins" admission control.
//!
//! At most one message is being processed and at most one is waiting.
//! A message that arrives while another is waiting replaces it; the
//! replaced one is handed back to the caller so it can be counted as
//! dropped.
//!
//! The queue only tracks state. Whoever receives [`Admission::Process`]
//! owns the processing turn and must call [`BackpressureQueue::complete`]
//! when done, draining iteratively:
//!
//! ```text
//! let mut next = Some(msg);
//! while let Some(msg) = next {
//!     process(msg);
//!     next = queue.complete();
//! }
//! ```

/// Outcome of [`BackpressureQueue::submit`].
#[derive(Debug, PartialEq, Eq)]
pub enum Admission<T> {
    /// The queue was idle: the caller now owns the processing turn.
    Process(T),
    /// The queue was busy and the slot was empty: the message waits.
    Pending,
    /// The queue was busy and the slot was full: the old occupant is returned.
    Replaced(T),
}

impl<T> Admission<T> {
    /// Whether the message arrived while another one was in flight.
    pub fn arrived_while_busy(&self) -> bool {
        !matches!(self, Admission::Process(_))
    }
}

/// The `processing` flag and pending slot.
#[derive(Debug)]
pub struct BackpressureQueue<T> {
    processing: bool,
    pending: Option<T>,
}

impl<T> BackpressureQueue<T> {
    pub fn new() -> Self {
        Self {
            processing: false,
            pending: None,
        }
    }

    /// Admit a new message.
    pub fn submit(&mut self, msg: T) -> Admission<T> {
        if !self.processing {
            self.processing = true;
            return Admission::Process(msg);
        }
        match self.pending.replace(msg) {
            Some(old) => Admission::Replaced(old),
            None => Admission::Pending,
        }
    }

    /// Finish the current turn.
    ///
    /// Returns the pending message, if any, with the processing turn
    /// still held; otherwise the queue goes idle.
    pub fn complete(&mut self) -> Option<T> {
        self.processing = false;
        let next = self.pending.take();
        if next.is_some() {
            self.processing = true;
        }
        next
    }

    pub fn is_processing(&self) -> bool {
        self.processing
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl<T> Default for BackpressureQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_queue_processes_immediately() {
        let mut q = BackpressureQueue::new();
        assert_eq!(q.submit(1), Admission::Process(1));
        assert!(q.is_processing());
        assert!(!q.has_pending());

        assert_eq!(q.complete(), None);
        assert!(!q.is_processing());
    }

    #[test]
    fn latest_wins_while_busy() {
        let mut q = BackpressureQueue::new();
        let mut busy = 0;
        let mut dropped = Vec::new();

        assert_eq!(q.submit("f1"), Admission::Process("f1"));
        for f in ["f2", "f3"] {
            let admission = q.submit(f);
            if admission.arrived_while_busy() {
                busy += 1;
            }
            if let Admission::Replaced(old) = admission {
                dropped.push(old);
            }
        }

        assert_eq!(busy, 2);
        assert_eq!(dropped, vec!["f2"]);
        assert_eq!(q.complete(), Some("f3"));
        assert!(q.is_processing());
        assert_eq!(q.complete(), None);
    }

    #[test]
    fn drain_loop_is_iterative() {
        let mut q = BackpressureQueue::new();
        let mut processed = Vec::new();

        let Admission::Process(first) = q.submit(0u32) else {
            panic!("idle queue must admit");
        };

        // Every processing step sees another arrival, as under sustained overload.
        let mut next = Some(first);
        let mut arrivals = 1..10_000u32;
        while let Some(msg) = next {
            processed.push(msg);
            if let Some(n) = arrivals.next() {
                assert!(q.submit(n).arrived_while_busy());
            }
            next = q.complete();
        }

        assert_eq!(processed.len(), 10_000);
        assert!(!q.is_processing());
    }

    #[test]
    fn submit_after_drain_starts_new_turn() {
        let mut q = BackpressureQueue::new();
        assert!(matches!(q.submit(1), Admission::Process(1)));
        assert_eq!(q.complete(), None);
        assert!(matches!(q.submit(2), Admission::Process(2)));
    }
}
