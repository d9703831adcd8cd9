use crate::error::{RecvError, SendError, TryRecvError};
use crate::utils::CancelToken;
use std::time::Duration;

/// Base trait for the sending half of a queue.
pub trait BaseTx: Send + 'static {
    /// Item type carried by this queue.
    type Item: Send + 'static;

    /// Non-blocking send. Returns `Err` if the queue is full or closed.
    fn try_send(&mut self, a: Self::Item) -> Result<(), SendError<Self::Item>>;

    /// Blocking send that gives up when `cancel` fires or `timeout` elapses.
    fn send(
        &mut self,
        a: Self::Item,
        cancel: &CancelToken,
        timeout: Option<Duration>,
    ) -> Result<(), SendError<Self::Item>>;
}

/// Base trait for the receiving half of a queue.
pub trait BaseRx: Send + 'static {
    /// Item type carried by this queue.
    type Item: Send + 'static;

    /// Non-blocking receive. Returns `Empty` if no data, `Disconnected` if
    /// every sender is gone and the queue is drained.
    fn try_recv(&mut self) -> Result<Self::Item, TryRecvError>;

    /// Blocking receive that gives up when `cancel` fires or `timeout` elapses.
    fn recv(
        &mut self,
        cancel: &CancelToken,
        timeout: Option<Duration>,
    ) -> Result<Self::Item, RecvError>;

    /// Drain up to `max` items that are already queued.
    fn drain(&mut self, max: usize) -> Vec<Self::Item> {
        let mut out = Vec::with_capacity(max.min(64));

        for _ in 0..max {
            match self.try_recv() {
                Ok(a) => out.push(a),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }
        out
    }
}
