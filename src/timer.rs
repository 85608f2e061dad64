//! Virtual-time timer queue.
//!
//! Every scheduler in the crate (dynamics tick, fuel tick, turn clicks,
//! startup rev steps, load timeout) is a timer in one of these queues. Time
//! is an explicit millisecond counter, so a session can be driven by a
//! real-time loop, a WASM host, or an offline renderer with identical
//! results.

/// Handle for cancelling a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

#[derive(Debug, Clone)]
struct Entry<E> {
    id: TimerId,
    due_ms: u64,
    /// Repeat period; `None` for one-shot timers.
    period_ms: Option<u64>,
    event: E,
}

/// A small queue of one-shot and periodic timers.
///
/// Due timers pop in `(due time, creation order)` order. A periodic timer
/// keeps its id across repeats, so two periodic timers due at the same
/// instant always fire in the order they were created.
#[derive(Debug, Clone)]
pub struct Timers<E> {
    entries: Vec<Entry<E>>,
    next_id: u64,
    now_ms: u64,
}

impl<E: Copy> Timers<E> {
    pub fn new() -> Self {
        Timers {
            entries: Vec::new(),
            next_id: 0,
            now_ms: 0,
        }
    }

    /// Current virtual time.
    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    /// Fire `event` once, `delay_ms` from now.
    pub fn schedule_once(&mut self, delay_ms: u64, event: E) -> TimerId {
        self.insert(self.now_ms + delay_ms, None, event)
    }

    /// Fire `event` every `period_ms`, first after `first_delay_ms`.
    pub fn schedule_every(&mut self, first_delay_ms: u64, period_ms: u64, event: E) -> TimerId {
        debug_assert!(period_ms > 0, "periodic timer needs a non-zero period");
        self.insert(self.now_ms + first_delay_ms, Some(period_ms.max(1)), event)
    }

    fn insert(&mut self, due_ms: u64, period_ms: Option<u64>, event: E) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.entries.push(Entry {
            id,
            due_ms,
            period_ms,
            event,
        });
        id
    }

    /// Cancel a timer. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    pub fn cancel_all(&mut self) {
        self.entries.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Earliest pending deadline.
    pub fn next_deadline(&self) -> Option<u64> {
        self.entries.iter().map(|e| e.due_ms).min()
    }

    /// Pop the next timer due at or before `until_ms`, moving the clock to
    /// its deadline. Periodic timers are re-armed one period later.
    ///
    /// Call repeatedly until `None`, then [`Timers::set_now`] to `until_ms`.
    pub fn pop_due(&mut self, until_ms: u64) -> Option<(u64, E)> {
        let idx = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.due_ms <= until_ms)
            .min_by_key(|(_, e)| (e.due_ms, e.id.0))
            .map(|(i, _)| i)?;

        let due_ms = self.entries[idx].due_ms;
        let event = self.entries[idx].event;
        match self.entries[idx].period_ms {
            Some(period) => self.entries[idx].due_ms += period,
            None => {
                self.entries.swap_remove(idx);
            }
        }
        self.now_ms = self.now_ms.max(due_ms);
        Some((due_ms, event))
    }

    /// Move the clock forward without firing anything.
    pub fn set_now(&mut self, now_ms: u64) {
        self.now_ms = self.now_ms.max(now_ms);
    }
}

impl<E: Copy> Default for Timers<E> {
    fn default() -> Self {
        Self::new()
    }
}
