//! Fan-in bridge: many producer threads pushing into one pull-based sequence.
//!
//! Producers share one rendezvous queue, so a slow consumer back-pressures
//! every producer and nothing piles up in memory. The queue closes once the
//! last [`Sink`] is dropped, which happens when the last producer returns.
//!
//! When one producer fails, the consumer fires the bridge's token so blocked
//! and future sends give up. Values another producer had already handed over
//! are not taken back: with several producers the consumer may see a few
//! extra values around the failure.

use crate::config::BridgeConfig;
use crate::error::{CancelCause, RecvError, SendError, SeqError};
use crate::io::base::{BaseRx, BaseTx};
use crate::io::mpmc::{MpmcChannel, MpmcReceiver, MpmcSender};
use crate::outcome::{Outcome, Slot};
use crate::sequence::Sequence;
use crate::utils::{CancelToken, JoinCount, Lease};
use anyhow::Context;
use std::thread;
use std::time::Duration;
use uuid::Uuid;
use uuid::fmt::Simple;

/// Unit of concurrent work feeding a bridge. It owns its [`Sink`] and
/// signals completion by returning.
pub type Producer<E> = Box<dyn FnOnce(Sink<E>) + Send + 'static>;

/// Box a closure as a [`Producer`].
pub fn producer<E, F>(f: F) -> Producer<E>
where
    F: FnOnce(Sink<E>) + Send + 'static,
{
    Box::new(f)
}

/// Write-only, cancellation-aware handle given to each producer.
pub struct Sink<E> {
    tx: MpmcSender<Outcome<E>>,
    cancel: CancelToken,
    // Declared last: the sender above is dropped before the lease releases.
    _lease: Lease<()>,
}

impl<E: Send + 'static> Sink<E> {
    /// Hand one outcome to the consumer, waiting until it is taken.
    ///
    /// Fails with reason `Cancelled` once the bridge's token fires, or
    /// `Closed` if the consumer is gone. Either way the producer should
    /// return.
    pub fn send(&mut self, outcome: Outcome<E>) -> Result<(), SendError<Outcome<E>>> {
        let res = self.tx.send(outcome, &self.cancel, None);
        if let Err(ref err) = res {
            tracing::trace!(reason = %err.reason, "sink send abandoned");
        }
        res
    }

    #[inline]
    pub fn value(&mut self, v: E) -> Result<(), SendError<Outcome<E>>> {
        self.send(Outcome::Value(v))
    }

    /// Report a terminal failure for this stream.
    #[inline]
    pub fn fail(&mut self, err: impl Into<SeqError>) -> Result<(), SendError<Outcome<E>>> {
        self.send(Outcome::Failed(err.into()))
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Sleep that wakes early on cancellation. Returns true if the whole
    /// duration elapsed.
    #[inline]
    pub fn sleep(&self, d: Duration) -> bool {
        self.cancel.sleep_cancellable(d)
    }
}

/// Merged output of a set of producers.
pub struct FanIn<E> {
    rx: Option<MpmcReceiver<Outcome<E>>>,
    cancel: CancelToken,
    joins: JoinCount,
    slot: Slot<E>,
}

impl<E> FanIn<E> {
    fn empty() -> Self {
        Self {
            rx: None,
            cancel: CancelToken::new_root(),
            joins: JoinCount::new(),
            slot: Slot::Done,
        }
    }

    /// Producers that have not returned yet.
    #[inline]
    pub fn outstanding(&self) -> usize {
        self.joins.outstanding()
    }

    /// Stop every producer. The next `advance()` reports the cancellation
    /// unless the stream already ended.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl<E: Send + 'static> Sequence for FanIn<E> {
    type Item = E;

    fn advance(&mut self) -> bool {
        if self.slot.is_terminal() {
            return false;
        }
        let Some(rx) = self.rx.as_mut() else {
            self.slot = Slot::Done;
            return false;
        };

        match rx.recv(&self.cancel, None) {
            Ok(outcome) => {
                let ok = self.slot.accept(outcome);
                if !ok {
                    self.cancel.cancel();
                }
                ok
            }
            Err(RecvError::Disconnected) => {
                self.slot = Slot::Done;
                false
            }
            Err(RecvError::Cancelled | RecvError::Timeout) => {
                let cause = self.cancel.cause().unwrap_or(CancelCause::Cancelled);
                tracing::debug!(%cause, "fan-in cancelled while waiting");
                self.slot = Slot::Failed(cause.into());
                false
            }
        }
    }

    fn current(&self) -> Option<&E> {
        self.slot.current()
    }

    fn error(&self) -> Option<&SeqError> {
        self.slot.error()
    }
}

impl<E> Drop for FanIn<E> {
    fn drop(&mut self) {
        if !self.joins.is_joined() {
            self.cancel.cancel();
        }
    }
}

/// Spawns producers onto named threads and merges their output.
#[derive(Debug, Clone, Default)]
pub struct Bridge {
    cfg: BridgeConfig,
}

impl Bridge {
    pub fn new(cfg: BridgeConfig) -> Self {
        Self { cfg }
    }

    fn thread_name(&self, id: Simple, idx: usize) -> String {
        let prefix = self.cfg.thread_name.as_deref().unwrap_or("fan-in");
        format!("{prefix}-{id}-{idx}")
    }

    /// Start every producer under a child of `scope`.
    ///
    /// With no producers the result is already exhausted and nothing is
    /// spawned.
    pub fn spawn<E: Send + 'static>(
        &self,
        scope: &CancelToken,
        producers: Vec<Producer<E>>,
    ) -> anyhow::Result<FanIn<E>> {
        if producers.is_empty() {
            return Ok(FanIn::empty());
        }

        let cancel = scope.new_child();
        let (tx, rx) = MpmcChannel::rendezvous::<Outcome<E>>();
        let joins = JoinCount::new();
        let bridge_id = Uuid::new_v4().simple();
        let total = producers.len();

        for (idx, produce) in producers.into_iter().enumerate() {
            let sink = Sink {
                tx: tx.clone(),
                cancel: cancel.clone(),
                _lease: joins.lease(()),
            };

            let spawned = thread::Builder::new()
                .name(self.thread_name(bridge_id, idx))
                .spawn(move || {
                    tracing::debug!(producer = idx, "producer started");
                    produce(sink);
                    tracing::debug!(producer = idx, "producer returned");
                });

            if let Err(err) = spawned {
                tracing::error!("[{bridge_id}] failed to spawn producer {idx}: {err}");
                cancel.cancel();
                return Err(err)
                    .with_context(|| format!("failed to spawn producer {idx} of {total}"));
            }
        }

        // Only sinks hold senders from here on.
        drop(tx);
        tracing::debug!("[{bridge_id}] spawned {total} producer(s)");

        Ok(FanIn {
            rx: Some(rx),
            cancel,
            joins,
            slot: Slot::Pending,
        })
    }
}

/// [`Bridge::spawn`] with the default configuration.
pub fn fan_in<E: Send + 'static>(
    scope: &CancelToken,
    producers: Vec<Producer<E>>,
) -> anyhow::Result<FanIn<E>> {
    Bridge::default().spawn(scope, producers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SendFailReason;
    use crate::sequence::to_vec;
    use anyhow::anyhow;
    use std::sync::mpsc;
    use std::time::Instant;

    fn wait_joined<E>(seq: &FanIn<E>, within: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < within {
            if seq.outstanding() == 0 {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        false
    }

    fn forever(mut sink: Sink<u32>) {
        let mut i = 0;
        while sink.value(i).is_ok() {
            i += 1;
        }
    }

    #[test]
    fn failure_cancels_the_other_producers() {
        let (seen_tx, seen_rx) = mpsc::channel();
        let scope = CancelToken::new_root();
        let mut seq = fan_in(
            &scope,
            vec![
                producer(move |mut sink: Sink<u32>| {
                    let mut i = 0;
                    let reason = loop {
                        match sink.value(i) {
                            Ok(()) => i += 1,
                            Err(err) => break err.reason,
                        }
                    };
                    let _ = seen_tx.send(reason);
                }),
                producer(|mut sink: Sink<u32>| {
                    sink.sleep(Duration::from_millis(5));
                    let _ = sink.fail(anyhow!("producer two broke"));
                }),
            ],
        )
        .expect("spawn failed");

        let err = to_vec(&mut seq).expect_err("second producer fails");
        assert_eq!(err.to_string(), "producer two broke");
        let reason = seen_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("first producer never stopped");
        assert_eq!(reason, SendFailReason::Cancelled);
        assert!(wait_joined(&seq, Duration::from_secs(5)));
        assert!(!scope.is_cancelled());
    }

    #[test]
    fn external_cancel_surfaces_its_cause() {
        let scope = CancelToken::new_root();
        let mut seq = fan_in(&scope, vec![producer(|sink: Sink<u32>| {
            sink.sleep(Duration::from_secs(30));
        })])
        .expect("spawn failed");

        let remote = scope.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            remote.cancel();
        });

        assert!(!seq.advance());
        let err = seq.error().expect("cancellation is an error");
        assert_eq!(err.cancel_cause(), Some(CancelCause::Cancelled));
        assert!(!seq.advance());
        assert!(wait_joined(&seq, Duration::from_secs(5)));
    }

    #[test]
    fn deadline_ends_a_stalled_stream() {
        let scope = CancelToken::new_root().with_timeout(Duration::from_millis(20));
        let mut seq = fan_in(&scope, vec![producer(|mut sink: Sink<u32>| {
            let _ = sink.value(1);
            sink.sleep(Duration::from_secs(30));
        })])
        .expect("spawn failed");

        assert!(seq.advance());
        assert_eq!(seq.current(), Some(&1));
        assert!(!seq.advance());
        assert_eq!(
            seq.error().and_then(|e| e.cancel_cause()),
            Some(CancelCause::DeadlineExceeded)
        );
    }

    #[test]
    fn dropping_the_consumer_releases_producers() {
        let scope = CancelToken::new_root();
        let mut seq = fan_in(&scope, vec![producer(forever), producer(forever)]).expect("spawn failed");
        assert!(seq.advance());
        let joins = seq.joins.clone();
        drop(seq);

        let start = Instant::now();
        while !joins.is_joined() && start.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(joins.is_joined());
    }

    #[test]
    fn empty_bridge_spawns_nothing() {
        let mut seq = Bridge::new(BridgeConfig {
            thread_name: Some("unused".into()),
        })
        .spawn::<u8>(&CancelToken::new_root(), Vec::new())
        .expect("nothing to spawn");
        assert!(!seq.advance());
        assert!(seq.error().is_none());
        assert_eq!(seq.outstanding(), 0);
    }
}
