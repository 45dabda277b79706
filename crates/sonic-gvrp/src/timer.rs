//! GARP timer contexts.
//!
//! Time is a monotonically increasing tick counter advanced by
//! [`GarpTimers::advance`]. Each context keeps its pending entries ordered by
//! deadline; entries with equal deadlines fire in the order they were
//! started.

use std::collections::VecDeque;

use crate::config::TimerConfig;
use crate::types::{PortNo, TimerKind, Vid};

/// Ordered timeout list of one context.
#[derive(Debug)]
pub struct TimerList<K> {
    period: u32,
    pending: VecDeque<(u64, K)>,
}

impl<K: Copy + PartialEq> TimerList<K> {
    pub fn new(period: u32) -> Self {
        Self {
            period,
            pending: VecDeque::new(),
        }
    }

    pub fn period(&self) -> u32 {
        self.period
    }

    /// New period; running timers keep their deadline.
    pub fn set_period(&mut self, period: u32) {
        self.period = period;
    }

    /// Starts the timer for `key` unless it is already running.
    pub fn start(&mut self, now: u64, key: K) -> bool {
        if self.is_running(key) {
            return false;
        }
        self.insert(now + u64::from(self.period), key);
        true
    }

    /// Starts the timer for `key` anew.
    pub fn restart(&mut self, now: u64, key: K) {
        self.cancel(key);
        self.insert(now + u64::from(self.period), key);
    }

    pub fn cancel(&mut self, key: K) -> bool {
        match self.pending.iter().position(|(_, k)| *k == key) {
            Some(index) => {
                self.pending.remove(index);
                true
            }
            None => false,
        }
    }

    /// Cancels every entry matching `pred`.
    pub fn cancel_where(&mut self, pred: impl Fn(&K) -> bool) {
        self.pending.retain(|(_, k)| !pred(k));
    }

    pub fn is_running(&self, key: K) -> bool {
        self.pending.iter().any(|(_, k)| *k == key)
    }

    pub fn deadline(&self, key: K) -> Option<u64> {
        self.pending
            .iter()
            .find(|(_, k)| *k == key)
            .map(|(deadline, _)| *deadline)
    }

    /// Removes and returns every entry due at `now`, in firing order.
    pub fn expire(&mut self, now: u64) -> Vec<K> {
        let due = self.pending.partition_point(|(deadline, _)| *deadline <= now);
        self.pending.drain(..due).map(|(_, k)| k).collect()
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.pending.front().map(|(deadline, _)| *deadline)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn insert(&mut self, deadline: u64, key: K) {
        let index = self.pending.partition_point(|(d, _)| *d <= deadline);
        self.pending.insert(index, (deadline, key));
    }
}

/// The three timer contexts and the shared tick clock.
#[derive(Debug)]
pub struct GarpTimers {
    now: u64,
    pub transmit: TimerList<PortNo>,
    pub leave: TimerList<(PortNo, Vid)>,
    pub leave_all: TimerList<PortNo>,
}

impl GarpTimers {
    pub fn new(config: &TimerConfig) -> Self {
        Self {
            now: 0,
            transmit: TimerList::new(config.join_time),
            leave: TimerList::new(config.leave_time),
            leave_all: TimerList::new(config.leave_all_time),
        }
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn advance(&mut self, elapsed: u32) -> u64 {
        self.now += u64::from(elapsed);
        self.now
    }

    pub fn set_period(&mut self, kind: TimerKind, period: u32) {
        match kind {
            TimerKind::TransmitPdu => self.transmit.set_period(period),
            TimerKind::Leave => self.leave.set_period(period),
            TimerKind::LeaveAll => self.leave_all.set_period(period),
        }
    }

    /// Ticks remaining until `deadline`.
    pub fn remaining(&self, deadline: u64) -> u32 {
        u32::try_from(deadline.saturating_sub(self.now)).unwrap_or(u32::MAX)
    }

    /// Ticks until the earliest pending deadline of any context.
    pub fn next_delay(&self) -> Option<u32> {
        [
            self.transmit.next_deadline(),
            self.leave.next_deadline(),
            self.leave_all.next_deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
        .map(|deadline| self.remaining(deadline))
    }
}
