//! Fixed-capacity worker pool for blocking pipeline jobs.
//!
//! Jobs queue FIFO on an unbounded channel; one dispatcher task hands each
//! job a semaphore permit before moving it onto the blocking thread pool, so
//! at most `workers` jobs run at once.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use cabinet_core::CabinetError;
use metrics::{counter, histogram};
use tokio::sync::{mpsc, watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct WorkerPool {
    workers: usize,
    tx: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    /// Jobs submitted and not yet finished.
    pending: Arc<watch::Sender<usize>>,
}

/// Held for the lifetime of one running job; releases the worker slot and
/// the pending count even if the job panics.
struct Ticket {
    pending: Arc<watch::Sender<usize>>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for Ticket {
    fn drop(&mut self) {
        self.pending.send_modify(|n| *n = n.saturating_sub(1));
    }
}

impl WorkerPool {
    /// Must be called from within a Tokio runtime.
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let (pending, _) = watch::channel(0usize);
        let pending = Arc::new(pending);
        let permits = Arc::new(Semaphore::new(workers));
        let dispatcher = tokio::spawn(dispatch(rx, permits, Arc::clone(&pending)));
        debug!(workers, "worker pool started");
        Self { workers, tx: Mutex::new(Some(tx)), dispatcher: Mutex::new(Some(dispatcher)), pending }
    }

    pub fn workers(&self) -> usize { self.workers }
    pub fn pending(&self) -> usize { *self.pending.borrow() }

    /// Queue `job`. Fails once shutdown has begun.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> Result<(), CabinetError> {
        let guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        let tx = guard.as_ref().ok_or(CabinetError::ShuttingDown)?;
        self.pending.send_modify(|n| *n += 1);
        if tx.send(Box::new(job)).is_err() {
            self.pending.send_modify(|n| *n = n.saturating_sub(1));
            return Err(CabinetError::ShuttingDown);
        }
        counter!("ingest_jobs_total", 1u64);
        Ok(())
    }

    /// Resolve once every submitted job has finished.
    pub async fn wait_idle(&self) {
        let mut rx = self.pending.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Stop accepting work, then wait for queued and running jobs to finish.
    pub async fn shutdown(&self) {
        let tx = self.tx.lock().unwrap_or_else(|e| e.into_inner()).take();
        if tx.is_none() {
            return;
        }
        drop(tx);
        let dispatcher = self.dispatcher.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = dispatcher {
            let _ = handle.await;
        }
        self.wait_idle().await;
        info!(workers = self.workers, "worker pool drained");
    }
}

async fn dispatch(mut rx: mpsc::UnboundedReceiver<Job>, permits: Arc<Semaphore>, pending: Arc<watch::Sender<usize>>) {
    while let Some(job) = rx.recv().await {
        let permit = match Arc::clone(&permits).acquire_owned().await {
            Ok(p) => p,
            Err(_) => break,
        };
        let ticket = Ticket { pending: Arc::clone(&pending), _permit: permit };
        tokio::task::spawn_blocking(move || {
            let _ticket = ticket;
            let t0 = Instant::now();
            if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(job)) {
                error!(reason = %panic_message(panic.as_ref()), "ingest job panicked");
                counter!("ingest_job_failures_total", 1u64);
            }
            histogram!("ingest_job_ms", t0.elapsed().as_secs_f64() * 1000.0);
        });
    }
    debug!("job queue closed; dispatcher exiting");
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
