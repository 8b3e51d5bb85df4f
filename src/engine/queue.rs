// src/engine/queue.rs

//! Admission queue between the lifecycle API and the supervisor workers.
//!
//! A bounded FIFO of task ids. Admission reserves a slot *before* the task is
//! persisted and only fills it once persistence succeeded, so a failed insert
//! never leaves a queue entry behind and a full queue never leaves an
//! orphaned `waiting` record.
//!
//! When the queue is full, [`WhenQueueFull`] decides whether `admit` waits
//! for a slot (backpressure on the caller) or fails with `QueueFull`.

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, OwnedPermit, error::TrySendError};

use crate::errors::{Result, TaskPoolError};
use crate::types::{TaskId, WhenQueueFull};

/// Producer side, owned by the lifecycle API.
#[derive(Debug)]
pub struct AdmissionQueue {
    tx: Mutex<Option<mpsc::Sender<TaskId>>>,
    capacity: usize,
    when_full: WhenQueueFull,
}

/// A reserved queue slot. Dropping it gives the slot back.
#[derive(Debug)]
pub struct AdmissionSlot {
    permit: OwnedPermit<TaskId>,
}

impl AdmissionSlot {
    pub fn enqueue(self, task_id: TaskId) {
        self.permit.send(task_id);
    }
}

/// Consumer side, shared by all supervisor workers.
#[derive(Debug)]
pub struct AdmissionReceiver {
    rx: tokio::sync::Mutex<mpsc::Receiver<TaskId>>,
}

impl AdmissionReceiver {
    /// Next admitted task id, or `None` once the queue is closed and drained.
    pub async fn next(&self) -> Option<TaskId> {
        self.rx.lock().await.recv().await
    }
}

impl AdmissionQueue {
    pub fn new(capacity: usize, when_full: WhenQueueFull) -> (Self, AdmissionReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let queue = Self {
            tx: Mutex::new(Some(tx)),
            capacity,
            when_full,
        };
        let receiver = AdmissionReceiver {
            rx: tokio::sync::Mutex::new(rx),
        };
        (queue, receiver)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn when_full(&self) -> WhenQueueFull {
        self.when_full
    }

    /// Reserve a slot according to the configured full-queue behaviour.
    pub async fn reserve(&self) -> Result<AdmissionSlot> {
        let tx = self.tx.lock().clone().ok_or(TaskPoolError::QueueClosed)?;

        let permit = match self.when_full {
            WhenQueueFull::Wait => tx
                .reserve_owned()
                .await
                .map_err(|_| TaskPoolError::QueueClosed)?,
            WhenQueueFull::Reject => match tx.try_reserve_owned() {
                Ok(permit) => permit,
                Err(TrySendError::Full(_)) => {
                    return Err(TaskPoolError::QueueFull {
                        capacity: self.capacity,
                    });
                }
                Err(TrySendError::Closed(_)) => return Err(TaskPoolError::QueueClosed),
            },
        };

        Ok(AdmissionSlot { permit })
    }

    /// Stop accepting admissions. Workers drain what is already queued.
    pub fn close(&self) {
        self.tx.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.lock().is_none()
    }
}
