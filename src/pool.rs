//! Bounded worker pool: one reader thread pulls from a source sequence and
//! feeds `n` worker threads that apply a transform; results come back as a
//! new sequence.
//!
//! Output order follows input order only with a single worker. With more
//! workers the output is the unordered set of values transformed before the
//! first failure, followed by at most one failure.
//!
//! Shutdown is first-error-wins: whichever task fails first pushes its
//! failure and raises the pool's quit token, which unblocks every other
//! task. The distribution queue closes when the reader returns; the results
//! queue closes when the reader and every worker have returned.

use crate::config::PoolConfig;
use crate::error::{CancelCause, RecvError, SeqError};
use crate::io::base::{BaseRx, BaseTx};
use crate::io::mpmc::{MpmcChannel, MpmcReceiver, MpmcSender};
use crate::outcome::{Outcome, Slot};
use crate::sequence::Sequence;
use crate::utils::{CancelToken, JoinCount, Lease};
use anyhow::{Context, bail};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread;
use uuid::Uuid;

/// Pulls the source sequentially and fans values out to the workers.
struct Reader<S: Sequence, A> {
    source: S,
    dist_tx: MpmcSender<S::Item>,
    results: MpmcSender<Outcome<A>>,
    quit: CancelToken,
    _lease: Lease<()>,
}

impl<S, A> Reader<S, A>
where
    S: Sequence,
    S::Item: Clone + Send + 'static,
    A: Send + 'static,
{
    fn run(mut self) {
        let mut forwarded = 0usize;
        while !self.quit.is_cancelled() && self.source.advance() {
            let Some(v) = self.source.current().cloned() else {
                continue;
            };
            if let Err(err) = self.dist_tx.send(v, &self.quit, None) {
                tracing::debug!(reason = %err.reason, forwarded, "reader stopped early");
                return;
            }
            forwarded += 1;
        }

        match self.source.error().cloned() {
            Some(err) => {
                tracing::warn!(error = %err, forwarded, "source failed, stopping pool");
                let _ = self.results.send(Outcome::Failed(err), &self.quit, None);
                self.quit.cancel();
            }
            None => tracing::debug!(forwarded, "reader finished"),
        }
    }
}

/// Applies the transform to values taken off the distribution queue.
struct Worker<B, A, F> {
    id: usize,
    dist_rx: MpmcReceiver<B>,
    results: MpmcSender<Outcome<A>>,
    transform: Arc<F>,
    quit: CancelToken,
    _lease: Lease<()>,
}

impl<B, A, F> Worker<B, A, F>
where
    B: Send + 'static,
    A: Send + 'static,
    F: Fn(B) -> anyhow::Result<A>,
{
    fn run(mut self) {
        let transform = &*self.transform;
        let mut done = 0usize;

        while let Ok(v) = self.dist_rx.recv(&self.quit, None) {
            let outcome = match catch_unwind(AssertUnwindSafe(|| transform(v))) {
                Ok(res) => Outcome::from(res),
                Err(_) => Outcome::Failed(SeqError::msg(format!(
                    "transform panicked in worker {}",
                    self.id
                ))),
            };

            let failed = outcome.is_failed();
            let sent = self.results.send(outcome, &self.quit, None);
            if failed {
                tracing::warn!(worker = self.id, done, "transform failed, stopping pool");
                self.quit.cancel();
                return;
            }
            if sent.is_err() {
                break;
            }
            done += 1;
        }
        tracing::debug!(worker = self.id, done, "worker exited");
    }
}

/// Output sequence of a worker pool.
pub struct MapAsync<A> {
    rx: MpmcReceiver<Outcome<A>>,
    scope: CancelToken,
    quit: CancelToken,
    joins: JoinCount,
    slot: Slot<A>,
}

impl<A> MapAsync<A> {
    /// Reader and worker threads that have not returned yet.
    #[inline]
    pub fn outstanding(&self) -> usize {
        self.joins.outstanding()
    }

    /// Raise the pool's quit signal. Safe to call any number of times.
    /// Unless a failure is already queued, the output then ends with a
    /// [`CancelCause::Cancelled`] error.
    #[inline]
    pub fn quit(&self) {
        self.quit.cancel();
    }
}

impl<A: Send + 'static> MapAsync<A> {
    /// First failure still sitting in the results queue, skipping values.
    fn queued_failure(&mut self) -> Option<SeqError> {
        while let Ok(outcome) = self.rx.try_recv() {
            if let Outcome::Failed(err) = outcome {
                return Some(err);
            }
        }
        None
    }
}

impl<A: Send + 'static> Sequence for MapAsync<A> {
    type Item = A;

    fn advance(&mut self) -> bool {
        if self.slot.is_terminal() {
            return false;
        }

        // quit is a child of the scope, so it also fires on scope
        // cancellation and inherits the scope deadline.
        match self.rx.recv(&self.quit, None) {
            Ok(outcome) => {
                let ok = self.slot.accept(outcome);
                if !ok {
                    self.quit.cancel();
                }
                ok
            }
            Err(RecvError::Disconnected) => {
                // Any task that raises quit queues its failure first, so a
                // quit with nothing queued came from the scope or `quit()`.
                self.slot = match self.scope.cause().or_else(|| self.quit.cause()) {
                    Some(cause) => Slot::Failed(cause.into()),
                    None => Slot::Done,
                };
                false
            }
            Err(RecvError::Cancelled | RecvError::Timeout) => {
                // A task raises quit only after queueing its failure, so a
                // queued failure still wins over the bare cause.
                if let Some(err) = self.queued_failure() {
                    self.slot = Slot::Failed(err);
                    return false;
                }
                let cause = self
                    .scope
                    .cause()
                    .or_else(|| self.quit.cause())
                    .unwrap_or(CancelCause::Cancelled);
                tracing::debug!(%cause, "worker pool cancelled while waiting");
                self.slot = Slot::Failed(cause.into());
                false
            }
        }
    }

    fn current(&self) -> Option<&A> {
        self.slot.current()
    }

    fn error(&self) -> Option<&SeqError> {
        self.slot.error()
    }
}

impl<A> Drop for MapAsync<A> {
    fn drop(&mut self) {
        if !self.joins.is_joined() {
            self.quit.cancel();
        }
    }
}

/// Runs a transform over a sequence on a fixed number of worker threads.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    cfg: PoolConfig,
}

impl WorkerPool {
    pub fn new(cfg: PoolConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.cfg
    }

    /// Start the reader and workers under `scope`.
    ///
    /// Cancelling `scope` (or letting its deadline pass) stops every task
    /// and ends the output with the cancellation cause.
    pub fn map<S, A, F>(
        &self,
        scope: &CancelToken,
        source: S,
        transform: F,
    ) -> anyhow::Result<MapAsync<A>>
    where
        S: Sequence + Send + 'static,
        S::Item: Clone + Send + 'static,
        A: Send + 'static,
        F: Fn(S::Item) -> anyhow::Result<A> + Send + Sync + 'static,
    {
        let workers = self.cfg.workers;
        if workers == 0 {
            bail!("worker pool needs at least one worker");
        }
        let queue_capacity = self.cfg.queue_capacity.unwrap_or(workers);
        let results_capacity = self.cfg.results_capacity.unwrap_or(workers);
        let prefix = self.cfg.thread_name.as_deref().unwrap_or("pool");
        let pool_id = Uuid::new_v4().simple();

        let scope = scope.clone();
        let quit = scope.new_child();
        let (dist_tx, dist_rx) = MpmcChannel::bounded::<S::Item>(queue_capacity);
        let (results_tx, results_rx) = MpmcChannel::bounded::<Outcome<A>>(results_capacity);
        let joins = JoinCount::new();

        let reader = Reader {
            source,
            dist_tx,
            results: results_tx.clone(),
            quit: quit.clone(),
            _lease: joins.lease(()),
        };
        thread::Builder::new()
            .name(format!("{prefix}-{pool_id}-reader"))
            .spawn(move || reader.run())
            .with_context(|| format!("[{pool_id}] failed to spawn reader"))?;

        let transform = Arc::new(transform);
        for id in 0..workers {
            let worker = Worker {
                id,
                dist_rx: dist_rx.clone(),
                results: results_tx.clone(),
                transform: transform.clone(),
                quit: quit.clone(),
                _lease: joins.lease(()),
            };
            let spawned = thread::Builder::new()
                .name(format!("{prefix}-{pool_id}-worker-{id}"))
                .spawn(move || worker.run());

            if let Err(err) = spawned {
                tracing::error!("[{pool_id}] failed to spawn worker {id}: {err}");
                quit.cancel();
                return Err(err).with_context(|| format!("failed to spawn worker {id} of {workers}"));
            }
        }

        // Tasks own every remaining queue handle from here on.
        drop(dist_rx);
        drop(results_tx);
        tracing::debug!(
            "[{pool_id}] started reader and {workers} worker(s), queue {queue_capacity}, results {results_capacity}"
        );

        Ok(MapAsync {
            rx: results_rx,
            scope,
            quit,
            joins,
            slot: Slot::Pending,
        })
    }
}

/// Transform `source` on `workers` threads with default queue sizes.
pub fn map_async<S, A, F>(source: S, transform: F, workers: usize) -> anyhow::Result<MapAsync<A>>
where
    S: Sequence + Send + 'static,
    S::Item: Clone + Send + 'static,
    A: Send + 'static,
    F: Fn(S::Item) -> anyhow::Result<A> + Send + Sync + 'static,
{
    WorkerPool::new(PoolConfig::with_workers(workers)).map(&CancelToken::new_root(), source, transform)
}
