//! Per-message event ordering.
//!
//! Every [`MessageIdentity`] with pending work owns an unbounded channel and a
//! single worker task. Events for one key are handled strictly in arrival
//! order; different keys run concurrently. Workers are spawned on the first
//! push and exit as soon as their backlog drains, or after a retire request
//! once everything queued before it has been handled.
//!
//! Channels are unbounded: a key's backlog grows with the burst of reactions
//! that message receives while its previous event is still being handled.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};
use tokio::sync::mpsc::error::TryRecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use super::StarboardError;
use super::types::{MessageIdentity, StarboardEvent};
use crate::web::Metrics;

/// What the worker should do with its key after an event was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Continue,
    Retire,
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: StarboardEvent) -> Result<Disposition, StarboardError>;
}

#[derive(Debug)]
enum WorkerMessage {
    Event(StarboardEvent),
    /// Last message a worker receives: everything before it is handled first.
    Retire,
}

struct WorkerSlot {
    /// `None` once the key is retiring; a later push starts a new generation.
    tx: Option<mpsc::UnboundedSender<WorkerMessage>>,
    generation: u64,
    done: CancellationToken,
}

struct Shared {
    workers: Mutex<HashMap<MessageIdentity, WorkerSlot>>,
    handler: Arc<dyn EventHandler>,
    generations: AtomicU64,
    idle: Notify,
    shutdown: CancellationToken,
}

impl Shared {
    fn retire(&self, key: &MessageIdentity, generation: Option<u64>) -> bool {
        let mut workers = self.workers.lock();
        let Some(slot) = workers.get_mut(key) else {
            return false;
        };
        if generation.is_some_and(|generation| generation != slot.generation) {
            return false;
        }
        match slot.tx.take() {
            Some(tx) => {
                let _ = tx.send(WorkerMessage::Retire);
                true
            }
            None => false,
        }
    }

    /// Removes the slot if it still belongs to `generation` and no message
    /// slipped in. Returns the message that raced in, if any.
    fn release(
        &self,
        key: &MessageIdentity,
        generation: u64,
        rx: &mut mpsc::UnboundedReceiver<WorkerMessage>,
    ) -> Option<WorkerMessage> {
        let mut workers = self.workers.lock();
        if let Ok(message) = rx.try_recv() {
            return Some(message);
        }
        if workers
            .get(key)
            .is_some_and(|slot| slot.generation == generation)
        {
            workers.remove(key);
        }
        if workers.is_empty() {
            self.idle.notify_waiters();
        }
        None
    }
}

#[derive(Clone)]
pub struct EventQueue {
    shared: Arc<Shared>,
}

impl EventQueue {
    pub fn new(handler: Arc<dyn EventHandler>) -> Self {
        Self {
            shared: Arc::new(Shared {
                workers: Mutex::new(HashMap::new()),
                handler,
                generations: AtomicU64::new(0),
                idle: Notify::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Enqueues `event` under its target message, spawning a worker for the
    /// key when none is accepting work. Never blocks.
    pub fn push(&self, event: StarboardEvent) -> bool {
        if self.shared.shutdown.is_cancelled() {
            warn!(key = %event.target(), kind = event.kind(), "queue is shut down, dropping event");
            Metrics::event_dropped();
            return false;
        }

        let key = event.target().clone();
        let mut event = event;
        let mut predecessor = None;
        let mut workers = self.shared.workers.lock();

        if let Some(slot) = workers.get(&key) {
            match &slot.tx {
                Some(tx) => match tx.send(WorkerMessage::Event(event)) {
                    Ok(()) => {
                        Metrics::event_submitted();
                        return true;
                    }
                    Err(mpsc::error::SendError(returned)) => {
                        // The receiver is gone without releasing its slot.
                        error!(key = %key, "worker channel closed unexpectedly, restarting");
                        let WorkerMessage::Event(returned) = returned else {
                            return false;
                        };
                        event = returned;
                    }
                },
                None => predecessor = Some(slot.done.clone()),
            }
        }

        self.spawn_worker(&mut workers, key, event, predecessor)
    }

    /// Stops accepting work for `key`; the worker exits after draining what was
    /// already queued. A later push for the same key starts a fresh worker.
    pub fn retire(&self, key: &MessageIdentity) -> bool {
        self.shared.retire(key, None)
    }

    pub fn worker_count(&self) -> usize {
        self.shared.workers.lock().len()
    }

    pub fn has_worker(&self, key: &MessageIdentity) -> bool {
        self.shared.workers.lock().contains_key(key)
    }

    /// Resolves once no key has a worker.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.shared.workers.lock().is_empty() {
                return;
            }
            notified.await;
        }
    }

    /// Refuses new events and retires every key, then waits for the backlog.
    pub async fn shutdown(&self) {
        self.shared.shutdown.cancel();
        let keys: Vec<MessageIdentity> = self.shared.workers.lock().keys().cloned().collect();
        for key in &keys {
            self.shared.retire(key, None);
        }
        self.wait_idle().await;
    }

    fn spawn_worker(
        &self,
        workers: &mut HashMap<MessageIdentity, WorkerSlot>,
        key: MessageIdentity,
        event: StarboardEvent,
        predecessor: Option<CancellationToken>,
    ) -> bool {
        let (tx, rx) = mpsc::unbounded_channel();
        if tx.send(WorkerMessage::Event(event)).is_err() {
            return false;
        }

        let generation = self.shared.generations.fetch_add(1, Ordering::Relaxed);
        let done = CancellationToken::new();
        workers.insert(
            key.clone(),
            WorkerSlot {
                tx: Some(tx),
                generation,
                done: done.clone(),
            },
        );
        Metrics::event_submitted();
        Metrics::worker_started();
        debug!(key = %key, generation, "spawning message worker");

        let shared = self.shared.clone();
        tokio::spawn(async move {
            if let Some(predecessor) = predecessor {
                trace!(key = %key, generation, "waiting for retiring worker to drain");
                predecessor.cancelled().await;
            }
            run_worker(&shared, &key, generation, rx).await;
            done.cancel();
            Metrics::worker_stopped();
            debug!(key = %key, generation, "message worker stopped");
        });

        true
    }
}

async fn run_worker(
    shared: &Shared,
    key: &MessageIdentity,
    generation: u64,
    mut rx: mpsc::UnboundedReceiver<WorkerMessage>,
) {
    loop {
        let message = match rx.try_recv() {
            Ok(message) => message,
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => {
                match shared.release(key, generation, &mut rx) {
                    Some(message) => message,
                    None => return,
                }
            }
        };

        let event = match message {
            WorkerMessage::Event(event) => event,
            WorkerMessage::Retire => {
                trace!(key = %key, generation, "worker retired");
                // Retire is always the final message; release the slot.
                let _ = shared.release(key, generation, &mut rx);
                return;
            }
        };

        let kind = event.kind();
        let outcome = AssertUnwindSafe(shared.handler.handle(event))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(disposition)) => {
                Metrics::event_processed();
                if disposition == Disposition::Retire {
                    shared.retire(key, Some(generation));
                }
            }
            Ok(Err(err)) => {
                Metrics::event_failed();
                warn!(key = %key, kind, "failed to handle starboard event: {err}");
            }
            Err(_) => {
                Metrics::event_failed();
                error!(key = %key, kind, "starboard event handler panicked");
            }
        }
    }
}
