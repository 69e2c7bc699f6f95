//! Background threads
//!
//! - `Worker`: single thread that writes pending snapshots oldest first and
//!   runs the compaction cascade
//! - `FlushTimer`: flushes tier 0 every `flush_interval`
//!
//! Both report failures into the engine's background error slot, which the
//! next flush, `flush_wait`, or `close` hands to the caller.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::select;

use crate::error::{Result, TierError};

use super::{Shared, TIER_ZERO};

/// Work items for the flush worker
pub(crate) enum Task {
    /// Write every pending snapshot, publishing and compacting after each
    WritePending,
    /// Acknowledge once every earlier task has finished
    Barrier(Sender<()>),
    /// Stop after every earlier task has finished
    Shutdown,
}

/// Handle to the flush worker thread
pub(crate) struct Worker {
    sender: Sender<Task>,
    handle: JoinHandle<()>,
}

impl Worker {
    /// Start the worker on `receiver`; `sender` is kept for barriers and
    /// shutdown
    pub(crate) fn spawn(
        shared: Arc<Shared>,
        sender: Sender<Task>,
        receiver: Receiver<Task>,
    ) -> Result<Self> {
        let handle = thread::Builder::new()
            .name("tierkv-flush".to_string())
            .spawn(move || run(shared, receiver))?;

        Ok(Self { sender, handle })
    }

    /// Block until every task queued so far has run
    pub(crate) fn barrier(&self) -> Result<()> {
        let (ack_tx, ack_rx) = channel::bounded(1);
        self.sender
            .send(Task::Barrier(ack_tx))
            .map_err(|_| TierError::Shutdown)?;
        ack_rx.recv().map_err(|_| TierError::Shutdown)
    }

    /// Drain the queue and join the thread
    pub(crate) fn shutdown(self) -> Result<()> {
        // A closed channel means the thread already exited; join tells why
        let _ = self.sender.send(Task::Shutdown);
        self.handle
            .join()
            .map_err(|_| TierError::Background("flush worker panicked".to_string()))
    }
}

fn run(shared: Arc<Shared>, receiver: Receiver<Task>) {
    tracing::debug!("Flush worker started");

    for task in receiver.iter() {
        match task {
            Task::WritePending => {
                if let Err(e) = shared.write_pending() {
                    // Unwritten snapshots stay readable and are retried next flush
                    tracing::error!(error = %e, "Background flush failed");
                    shared.record_background_error(e);
                }
            }
            Task::Barrier(ack) => {
                let _ = ack.send(());
            }
            Task::Shutdown => break,
        }
    }

    tracing::debug!("Flush worker stopped");
}

/// Handle to the periodic flush thread
pub(crate) struct FlushTimer {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl FlushTimer {
    pub(crate) fn spawn(shared: Arc<Shared>, interval: Duration) -> Result<Self> {
        let (stop, stop_rx) = channel::bounded::<()>(1);

        let handle = thread::Builder::new()
            .name("tierkv-flush-timer".to_string())
            .spawn(move || {
                let ticker = channel::tick(interval);
                loop {
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => {
                            if let Err(e) = shared.flush(TIER_ZERO) {
                                tracing::error!(error = %e, "Periodic flush failed");
                                shared.record_background_error(e);
                            }
                        }
                    }
                }
            })?;

        Ok(Self { stop, handle })
    }

    /// Stop ticking and wait for an in-progress flush to finish
    pub(crate) fn stop(self) {
        let _ = self.stop.send(());
        if self.handle.join().is_err() {
            tracing::error!("Flush timer thread panicked");
        }
    }
}
