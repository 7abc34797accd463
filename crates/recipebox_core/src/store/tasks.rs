//! Deferred work queued by placeholder reads.
//!
//! The store is single-threaded: queued tasks run when the host calls
//! `Store::run_pending_tasks`, typically once per UI frame or event-loop turn.

use crate::store::error::StoreError;
use std::cell::RefCell;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundTask {
    RefreshRecipes,
    RefreshUsers,
}

impl BackgroundTask {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RefreshRecipes => "refresh_recipes",
            Self::RefreshUsers => "refresh_users",
        }
    }
}

/// FIFO of tasks; a task already queued is not queued twice.
#[derive(Debug, Default)]
pub(crate) struct TaskQueue {
    queue: RefCell<VecDeque<BackgroundTask>>,
}

impl TaskQueue {
    /// Queues `task`; returns `false` when it was already pending.
    pub(crate) fn schedule(&self, task: BackgroundTask) -> bool {
        let mut queue = self.queue.borrow_mut();
        if queue.contains(&task) {
            return false;
        }
        queue.push_back(task);
        true
    }

    pub(crate) fn pop(&self) -> Option<BackgroundTask> {
        self.queue.borrow_mut().pop_front()
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.borrow().len()
    }
}

/// Outcome of one `run_pending_tasks` pass.
#[derive(Debug, Default)]
pub struct BackgroundReport {
    pub completed: Vec<BackgroundTask>,
    pub failed: Vec<(BackgroundTask, StoreError)>,
}

impl BackgroundReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn ran(&self) -> usize {
        self.completed.len() + self.failed.len()
    }
}
