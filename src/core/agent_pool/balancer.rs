//! Worker table and the load-balancing decisions made over it.
//!
//! Dispatch sends admitted work to the least-loaded worker, so idle workers are
//! always filled before anything is prefetched behind a running task. An idle
//! worker with an empty local queue steals from the tail of the busy worker
//! holding the most prefetched work.

use std::cmp::Reverse;
use std::collections::VecDeque;

use crate::core::task::{TaskId, WorkerId};

/// One row of the worker-availability table.
#[derive(Debug)]
pub(crate) struct WorkerSlot<T> {
    pub(crate) id: WorkerId,
    pub(crate) current: Option<TaskId>,
    pub(crate) local: VecDeque<T>,
}

impl<T> WorkerSlot<T> {
    pub(crate) const fn new(id: WorkerId) -> Self {
        Self {
            id,
            current: None,
            local: VecDeque::new(),
        }
    }

    pub(crate) const fn is_busy(&self) -> bool {
        self.current.is_some()
    }

    /// Running task plus prefetched tasks.
    pub(crate) fn load(&self) -> usize {
        self.local.len() + usize::from(self.is_busy())
    }
}

/// Worker that should receive the next admitted task, if any has room.
///
/// A worker has room while its load is below `1 + local_depth`. Ties go to the
/// lowest index so dispatch is deterministic.
pub(crate) fn dispatch_target<T>(workers: &[WorkerSlot<T>], local_depth: usize) -> Option<usize> {
    workers
        .iter()
        .enumerate()
        .filter(|(_, w)| w.load() < local_depth + 1)
        .min_by_key(|(_, w)| w.load())
        .map(|(index, _)| index)
}

/// Busy worker to steal from on behalf of `thief`: the one with the longest
/// local queue, lowest index on ties.
pub(crate) fn steal_victim<T>(workers: &[WorkerSlot<T>], thief: usize) -> Option<usize> {
    workers
        .iter()
        .enumerate()
        .filter(|(index, w)| *index != thief && w.is_busy() && !w.local.is_empty())
        .max_by_key(|(index, w)| (w.local.len(), Reverse(*index)))
        .map(|(index, _)| index)
}
