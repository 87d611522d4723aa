//! Deadline-ordered timer queue.
//!
//! Stands in for `setTimeout`-style callbacks: the owner schedules tasks at
//! absolute deadlines and pops them when its clock says they are due. Ties
//! pop in scheduling order.

use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct TimerQueue<T> {
    next_seq: u64,
    // (deadline, insertion sequence) keeps ties stable.
    entries: BTreeMap<(u64, u64), T>,
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self {
            next_seq: 0,
            entries: BTreeMap::new(),
        }
    }

    pub fn schedule_at(&mut self, deadline_ms: u64, task: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert((deadline_ms, seq), task);
    }

    /// Drop every pending task.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Keep only the tasks `keep` accepts.
    pub fn retain(&mut self, mut keep: impl FnMut(&T) -> bool) {
        self.entries.retain(|_, task| keep(task));
    }

    /// Pop the earliest task whose deadline is at or before `now_ms`.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<(u64, T)> {
        let entry = self.entries.first_entry()?;
        let (deadline, _) = *entry.key();
        if deadline > now_ms {
            return None;
        }
        Some((deadline, entry.remove()))
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.entries.keys().next().map(|&(deadline, _)| deadline)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
