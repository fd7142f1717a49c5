use crate::worker::task::Task;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::Duration;
use tokio::sync::Notify;

/// A task waiting in the queue together with its insertion sequence number
pub struct QueuedTask {
    pub task: Task,
    seq: u64,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.task.priority == other.task.priority && self.seq == other.seq
    }
}

impl Eq for QueuedTask {}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first, then lower sequence number (FIFO)
        match self.task.priority.cmp(&other.task.priority) {
            Ordering::Equal => other.seq.cmp(&self.seq),
            ordering => ordering,
        }
    }
}

/// Priority queue shared by all workers
pub struct TaskQueue {
    heap: Mutex<BinaryHeap<QueuedTask>>,
    next_seq: AtomicU64,
    available: Notify,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            next_seq: AtomicU64::new(0),
            available: Notify::new(),
        }
    }

    /// Push a task and wake one waiting worker. Never blocks on capacity.
    pub fn push(&self, task: Task) {
        let seq = self.next_seq.fetch_add(1, AtomicOrdering::Relaxed);
        self.heap.lock().push(QueuedTask { task, seq });
        self.available.notify_one();
    }

    /// Put a popped task back in its original position
    pub fn requeue(&self, queued: QueuedTask) {
        self.heap.lock().push(queued);
        self.available.notify_one();
    }

    pub fn pop(&self) -> Option<QueuedTask> {
        self.heap.lock().pop()
    }

    /// Pop the next task, waiting at most `wait` for one to arrive
    pub async fn pop_wait(&self, wait: Duration) -> Option<QueuedTask> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let notified = self.available.notified();
            if let Some(queued) = self.pop() {
                return Some(queued);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return self.pop();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every queued task, returning how many were discarded
    pub fn clear(&self) -> usize {
        let mut heap = self.heap.lock();
        let discarded = heap.len();
        heap.clear();
        discarded
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
