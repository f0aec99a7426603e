//! FIFO of mutating units and its single consumer
//!
//! Callers only ever enqueue and get a [`Ticket`] back. One consumer pops
//! units in order and runs them with the watcher paused; an error or a panic
//! inside a unit is reported on that unit's ticket and the loop carries on.

use crate::errors::{CfgError, ErrorKind, Result};
use crate::publish::MetadataBoard;
use crate::queue::guard::FileWatcherGuard;
use crate::queue::{Operation, Outcome};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Executes dequeued operations; owned by the consumer
pub trait UnitExecutor: Send {
    fn execute(&mut self, operation: Operation) -> Result<Outcome>;
}

pub struct QueueUnit {
    pub id: Uuid,
    pub operation: Operation,
    pub status_label: String,
    reply: oneshot::Sender<Result<Outcome>>,
}

/// Receiving end of a unit's result
#[derive(Debug)]
pub struct Ticket {
    id: Uuid,
    reply: oneshot::Receiver<Result<Outcome>>,
}

impl Ticket {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Block until the unit has run
    ///
    /// Must not be called from inside an async runtime; use
    /// [`Ticket::outcome`] there.
    pub fn wait(self) -> Result<Outcome> {
        self.reply.blocking_recv().unwrap_or_else(|_| {
            Err(CfgError::Unexpected(
                "queue unit dropped before it ran".to_string(),
            ))
        })
    }

    pub async fn outcome(self) -> Result<Outcome> {
        self.reply.await.unwrap_or_else(|_| {
            Err(CfgError::Unexpected(
                "queue unit dropped before it ran".to_string(),
            ))
        })
    }

    /// Result if the unit has already run
    pub fn try_outcome(&mut self) -> Option<Result<Outcome>> {
        self.reply.try_recv().ok()
    }
}

/// Cloneable producer side of the queue
#[derive(Clone, Default)]
pub struct QueueHandle {
    units: Arc<Mutex<VecDeque<QueueUnit>>>,
}

impl QueueHandle {
    pub fn new() -> Self {
        Self::default()
    }

    fn units(&self) -> MutexGuard<'_, VecDeque<QueueUnit>> {
        self.units.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn enqueue(&self, operation: Operation, status_label: impl Into<String>) -> Ticket {
        let (tx, rx) = oneshot::channel();
        let id = Uuid::new_v4();
        let unit = QueueUnit {
            id,
            operation,
            status_label: status_label.into(),
            reply: tx,
        };
        debug!("[Queue] Enqueued {} ({})", unit.operation.describe(), id);
        self.units().push_back(unit);
        Ticket { id, reply: rx }
    }

    pub(crate) fn pop(&self) -> Option<QueueUnit> {
        self.units().pop_front()
    }

    pub fn len(&self) -> usize {
        self.units().len()
    }

    pub fn is_empty(&self) -> bool {
        self.units().is_empty()
    }
}

pub struct QueueConsumer<E: UnitExecutor> {
    queue: QueueHandle,
    guard: FileWatcherGuard,
    board: Arc<MetadataBoard>,
    executor: E,
    idle_sleep: Duration,
}

impl<E: UnitExecutor> QueueConsumer<E> {
    pub fn new(
        queue: QueueHandle,
        guard: FileWatcherGuard,
        board: Arc<MetadataBoard>,
        executor: E,
        idle_sleep: Duration,
    ) -> Self {
        Self {
            queue,
            guard,
            board,
            executor,
            idle_sleep,
        }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn executor_mut(&mut self) -> &mut E {
        &mut self.executor
    }

    fn process(&mut self, unit: QueueUnit) {
        let QueueUnit {
            id,
            operation,
            status_label,
            reply,
        } = unit;
        let description = operation.describe();
        debug!("[Queue] Running {} ({})", description, id);

        self.board.set_status(&status_label);
        self.guard.pause();

        let executor = &mut self.executor;
        let result = panic::catch_unwind(AssertUnwindSafe(|| executor.execute(operation)))
            .unwrap_or_else(|payload| {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(CfgError::Unexpected(format!("panic: {}", message)))
            });

        match &result {
            Ok(_) => debug!("[Queue] Finished {}", description),
            Err(e) if e.kind() == ErrorKind::Unexpected => {
                error!("[Queue] MAJOR: {} failed unexpectedly: {}", description, e)
            }
            Err(e) => warn!("[Queue] {} rejected: {}", description, e),
        }

        self.board.set_status("");
        self.guard.resume();

        // caller may have dropped its ticket
        let _ = reply.send(result);
    }

    /// Run the next unit if there is one
    pub fn run_one(&mut self) -> bool {
        match self.queue.pop() {
            Some(unit) => {
                self.process(unit);
                true
            }
            None => false,
        }
    }

    /// Run units until the queue is empty; returns how many ran
    pub fn run_pending(&mut self) -> usize {
        let mut count = 0;
        while self.run_one() {
            count += 1;
        }
        count
    }

    /// Consume until `shutdown` is set
    pub fn run(&mut self, shutdown: &AtomicBool) {
        while !shutdown.load(Ordering::SeqCst) {
            if !self.run_one() {
                thread::sleep(self.idle_sleep);
            }
        }
    }
}
