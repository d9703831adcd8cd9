use crate::error::{CancelCause, RecvError, SendError, TryRecvError};
use crate::io::base::{BaseRx, BaseTx};
use crate::utils::CancelToken;
use crossbeam::channel as cbchan;
use std::time::Duration;

/// Multi-producer, multi-consumer queue over `crossbeam::channel`.
///
/// The queue closes when its last sender is dropped; receivers still see
/// every item accepted before that.
pub struct MpmcChannel;

impl MpmcChannel {
    #[inline]
    pub fn bounded<T: Send + 'static>(capacity: usize) -> (MpmcSender<T>, MpmcReceiver<T>) {
        let (tx, rx) = cbchan::bounded::<T>(capacity);
        (MpmcSender { tx }, MpmcReceiver { rx })
    }

    /// Zero-capacity queue: every send waits for a matching receive.
    #[inline]
    pub fn rendezvous<T: Send + 'static>() -> (MpmcSender<T>, MpmcReceiver<T>) {
        Self::bounded(0)
    }

    #[inline]
    pub fn unbounded<T: Send + 'static>() -> (MpmcSender<T>, MpmcReceiver<T>) {
        let (tx, rx) = cbchan::unbounded::<T>();
        (MpmcSender { tx }, MpmcReceiver { rx })
    }
}

/// Result of racing a queue operation against a token.
/// On `Ready` the caller must complete the selected operation.
enum Race<'a> {
    Ready(cbchan::SelectedOperation<'a>),
    Cancelled,
    Timeout,
}

fn race<'a>(
    sel: &mut cbchan::Select<'a>,
    op: usize,
    cancel: &'a CancelToken,
    expiry: &'a cbchan::Receiver<std::time::Instant>,
    timeout: Option<Duration>,
) -> Race<'a> {
    let op_done = sel.recv(cancel.done());
    let op_expiry = sel.recv(expiry);

    let oper = match timeout {
        Some(t) => match sel.select_timeout(t) {
            Ok(oper) => oper,
            Err(_) => return Race::Timeout,
        },
        None => sel.select(),
    };

    match oper.index() {
        i if i == op => Race::Ready(oper),
        i if i == op_done => {
            let _ = oper.recv(cancel.done());
            Race::Cancelled
        }
        i if i == op_expiry => {
            let _ = oper.recv(expiry);
            cancel.cancel_with(CancelCause::DeadlineExceeded);
            Race::Cancelled
        }
        _ => unreachable!("select returned an unregistered operation"),
    }
}

pub struct MpmcSender<E> {
    tx: cbchan::Sender<E>,
}

impl<E> Clone for MpmcSender<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<E: Send + 'static> BaseTx for MpmcSender<E> {
    type Item = E;

    #[inline]
    fn try_send(&mut self, a: E) -> Result<(), SendError<E>> {
        match self.tx.try_send(a) {
            Ok(()) => Ok(()),
            Err(cbchan::TrySendError::Full(v)) => Err(SendError::full(Some(v))),
            Err(cbchan::TrySendError::Disconnected(v)) => Err(SendError::closed(Some(v))),
        }
    }

    fn send(
        &mut self,
        a: E,
        cancel: &CancelToken,
        timeout: Option<Duration>,
    ) -> Result<(), SendError<E>> {
        if cancel.is_cancelled() {
            return Err(SendError::cancelled(Some(a)));
        }

        let expiry = cancel.expiry();
        let mut sel = cbchan::Select::new();
        let op_send = sel.send(&self.tx);

        match race(&mut sel, op_send, cancel, &expiry, timeout) {
            Race::Ready(oper) => oper
                .send(&self.tx, a)
                .map_err(|cbchan::SendError(v)| SendError::closed(Some(v))),
            Race::Cancelled => Err(SendError::cancelled(Some(a))),
            Race::Timeout => Err(SendError::timeout(Some(a))),
        }
    }
}

pub struct MpmcReceiver<E> {
    rx: cbchan::Receiver<E>,
}

impl<E> Clone for MpmcReceiver<E> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

impl<E> MpmcReceiver<E> {
    /// Items currently queued.
    #[inline]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl<E: Send + 'static> BaseRx for MpmcReceiver<E> {
    type Item = E;

    #[inline]
    fn try_recv(&mut self) -> Result<E, TryRecvError> {
        match self.rx.try_recv() {
            Ok(v) => Ok(v),
            Err(cbchan::TryRecvError::Empty) => Err(TryRecvError::Empty),
            Err(cbchan::TryRecvError::Disconnected) => Err(TryRecvError::Disconnected),
        }
    }

    fn recv(&mut self, cancel: &CancelToken, timeout: Option<Duration>) -> Result<E, RecvError> {
        if cancel.is_cancelled() {
            return Err(RecvError::Cancelled);
        }

        let expiry = cancel.expiry();
        let mut sel = cbchan::Select::new();
        let op_recv = sel.recv(&self.rx);

        match race(&mut sel, op_recv, cancel, &expiry, timeout) {
            Race::Ready(oper) => oper.recv(&self.rx).map_err(|_| RecvError::Disconnected),
            Race::Cancelled => Err(RecvError::Cancelled),
            Race::Timeout => Err(RecvError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SendFailReason;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn rendezvous_hands_off_between_threads() {
        let (mut tx, mut rx) = MpmcChannel::rendezvous::<u32>();
        let cancel = CancelToken::new_root();
        let sender_cancel = cancel.clone();
        let handle = thread::spawn(move || {
            for i in 0..3 {
                tx.send(i, &sender_cancel, None).expect("send failed");
            }
        });

        let got: Vec<u32> = (0..3)
            .map(|_| rx.recv(&cancel, None).expect("recv failed"))
            .collect();
        handle.join().expect("sender panicked");
        assert_eq!(got, vec![0, 1, 2]);
        assert_eq!(rx.recv(&cancel, None), Err(RecvError::Disconnected));
    }

    #[test]
    fn blocked_send_unblocks_on_cancel() {
        let (mut tx, _rx) = MpmcChannel::rendezvous::<u32>();
        let cancel = CancelToken::new_root();
        let remote = cancel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            remote.cancel();
        });

        let err = tx.send(7, &cancel, None).expect_err("send should be cancelled");
        assert_eq!(err.reason, SendFailReason::Cancelled);
        assert_eq!(err.value, Some(7));
    }

    #[test]
    fn blocked_recv_unblocks_on_deadline() {
        let (_tx, mut rx) = MpmcChannel::rendezvous::<u32>();
        let cancel = CancelToken::new_root().with_timeout(Duration::from_millis(15));
        let started = Instant::now();
        assert_eq!(rx.recv(&cancel, None), Err(RecvError::Cancelled));
        assert!(started.elapsed() >= Duration::from_millis(10));
        assert_eq!(cancel.cause(), Some(CancelCause::DeadlineExceeded));
    }

    #[test]
    fn timeout_is_not_cancellation() {
        let (mut tx, _rx) = MpmcChannel::rendezvous::<u32>();
        let cancel = CancelToken::new_root();
        let err = tx
            .send(1, &cancel, Some(Duration::from_millis(5)))
            .expect_err("nobody is receiving");
        assert_eq!(err.reason, SendFailReason::Timeout);
        assert!(!cancel.is_cancelled());
    }

    #[test]
    fn send_to_dropped_receiver_is_closed() {
        let (mut tx, rx) = MpmcChannel::bounded::<u32>(1);
        drop(rx);
        let err = tx
            .send(1, &CancelToken::new_root(), None)
            .expect_err("receiver is gone");
        assert!(err.is_closed());
    }

    #[test]
    fn drain_takes_only_what_is_queued() {
        let (mut tx, mut rx) = MpmcChannel::bounded::<u32>(8);
        for i in 0..5 {
            tx.try_send(i).expect("queue has room");
        }
        assert_eq!(rx.drain(3), vec![0, 1, 2]);
        assert_eq!(rx.drain(10), vec![3, 4]);
        assert!(rx.is_empty());
    }
}
