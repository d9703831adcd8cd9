use crate::error::CancelCause;
use crossbeam::channel as cbchan;
use parking_lot::Mutex;
use std::fmt;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::{Duration, Instant};

/// Internal cancellation state, shared via [`Arc`].
///
/// Firing closes `done_rx` for every observer by dropping the only sender,
/// then walks the registered children. Children are held weakly so a dropped
/// subtree does not keep its state alive.
struct CancelState {
    cancelled: AtomicBool,
    cause: OnceLock<CancelCause>,
    deadline: Option<Instant>,
    done_tx: Mutex<Option<cbchan::Sender<()>>>,
    done_rx: cbchan::Receiver<()>,
    children: Mutex<Vec<Weak<CancelState>>>,
}

impl CancelState {
    fn new(deadline: Option<Instant>) -> Arc<Self> {
        // Nothing is ever sent on this channel: it only ever disconnects.
        let (done_tx, done_rx) = cbchan::bounded::<()>(0);
        Arc::new(Self {
            cancelled: AtomicBool::new(false),
            cause: OnceLock::new(),
            deadline,
            done_tx: Mutex::new(Some(done_tx)),
            done_rx,
            children: Mutex::new(Vec::new()),
        })
    }

    /// Create a child linked to `parent`. If the parent already fired the
    /// child is born cancelled with the same cause.
    fn child_of(parent: &Arc<CancelState>, deadline: Option<Instant>) -> Arc<Self> {
        let deadline = match (parent.deadline, deadline) {
            (Some(p), Some(c)) => Some(p.min(c)),
            (p, c) => p.or(c),
        };
        let child = Self::new(deadline);

        let mut children = parent.children.lock();
        if parent.cancelled.load(Ordering::Acquire) {
            drop(children);
            child.fire(parent.cause.get().copied().unwrap_or(CancelCause::Cancelled));
        } else {
            children.retain(|w| w.strong_count() > 0);
            children.push(Arc::downgrade(&child));
        }
        child
    }

    /// Fire once. Returns false if the state had already fired.
    fn fire(&self, cause: CancelCause) -> bool {
        // The cause cell is the one-shot guard; the flag is published after it
        // so any reader that sees the flag also sees the cause.
        if self.cause.set(cause).is_err() {
            return false;
        }
        self.cancelled.store(true, Ordering::Release);
        drop(self.done_tx.lock().take());

        let children = std::mem::take(&mut *self.children.lock());
        for child in children.iter().filter_map(Weak::upgrade) {
            child.fire(cause);
        }
        true
    }

    #[inline]
    fn is_cancelled(&self) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            return true;
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            self.fire(CancelCause::DeadlineExceeded);
            return true;
        }
        false
    }
}

/// Hierarchical, one-shot cancellation token.
///
/// A `CancelToken` can be cloned cheaply; all clones observe the same state.
/// Cancelling a token cancels all of its descendants, never its ancestors.
/// Firing is idempotent: only the first call records a [`CancelCause`].
#[derive(Clone)]
pub struct CancelToken {
    state: Arc<CancelState>,
}

impl Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("is_cancelled", &self.is_cancelled())
            .field("cause", &self.cause())
            .field("deadline", &self.state.deadline)
            .finish()
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new_root()
    }
}

impl CancelToken {
    /// Create a new root cancellation token.
    #[inline]
    pub fn new_root() -> Self {
        Self {
            state: CancelState::new(None),
        }
    }

    /// Cancel this token (and propagate to all children).
    #[inline]
    pub fn cancel(&self) {
        self.cancel_with(CancelCause::Cancelled);
    }

    /// Cancel with an explicit cause. Returns true only for the call that
    /// actually fired the token.
    #[inline]
    pub fn cancel_with(&self, cause: CancelCause) -> bool {
        let fired = self.state.fire(cause);
        if fired {
            tracing::debug!(%cause, "cancel token fired");
        }
        fired
    }

    /// Check if this token (or any ancestor) has been cancelled, or its
    /// deadline has passed.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.state.is_cancelled()
    }

    /// Cause recorded by the first cancellation, if any.
    #[inline]
    pub fn cause(&self) -> Option<CancelCause> {
        if self.is_cancelled() {
            self.state.cause.get().copied()
        } else {
            None
        }
    }

    #[inline]
    pub fn deadline(&self) -> Option<Instant> {
        self.state.deadline
    }

    /// Create a new child token linked to this one.
    #[inline]
    pub fn new_child(&self) -> Self {
        Self {
            state: CancelState::child_of(&self.state, None),
        }
    }

    /// Child token that fires with [`CancelCause::DeadlineExceeded`] at
    /// `deadline` (or earlier, if an ancestor's deadline comes first).
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        Self {
            state: CancelState::child_of(&self.state, Some(deadline)),
        }
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Done signal for use inside a [`crossbeam::channel::Select`]. A receive
    /// on it becomes ready (with a disconnect error) once the token fires.
    ///
    /// The deadline is not reflected here; pair it with [`Self::expiry`].
    #[inline]
    pub fn done(&self) -> &cbchan::Receiver<()> {
        &self.state.done_rx
    }

    /// Channel that delivers once the deadline passes, or never.
    pub fn expiry(&self) -> cbchan::Receiver<Instant> {
        match self.state.deadline {
            Some(deadline) => cbchan::at(deadline),
            None => cbchan::never(),
        }
    }

    /// Block until the token fires.
    pub fn wait(&self) {
        let _ = self.wait_until(None);
    }

    /// Block until the token fires or `timeout` elapses. Returns true if the
    /// token fired.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.wait_until(Some(Instant::now() + timeout))
    }

    fn wait_until(&self, until: Option<Instant>) -> bool {
        if self.is_cancelled() {
            return true;
        }
        let expiry = self.expiry();
        let limit = until.map(cbchan::at).unwrap_or_else(cbchan::never);
        cbchan::select! {
            recv(self.state.done_rx) -> _ => true,
            recv(expiry) -> _ => {
                self.cancel_with(CancelCause::DeadlineExceeded);
                true
            }
            recv(limit) -> _ => self.is_cancelled(),
        }
    }

    /// Sleep until the token is cancelled or the specified duration has elapsed.
    /// If the token is cancelled, return false, otherwise return true.
    #[inline]
    pub fn sleep_cancellable(&self, total: Duration) -> bool {
        !self.wait_timeout(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn child_follows_parent_but_not_the_other_way() {
        let root = CancelToken::new_root();
        let child = root.new_child();
        let grandchild = child.new_child();

        grandchild.cancel();
        assert!(grandchild.is_cancelled());
        assert!(!child.is_cancelled());
        assert!(!root.is_cancelled());

        let sibling = child.new_child();
        root.cancel();
        assert!(child.is_cancelled());
        assert!(sibling.is_cancelled());
        assert_eq!(sibling.cause(), Some(CancelCause::Cancelled));
    }

    #[test]
    fn child_of_cancelled_parent_is_born_cancelled() {
        let root = CancelToken::new_root();
        root.cancel_with(CancelCause::DeadlineExceeded);
        let child = root.new_child();
        assert!(child.is_cancelled());
        assert_eq!(child.cause(), Some(CancelCause::DeadlineExceeded));
        assert!(child.wait_timeout(Duration::from_millis(1)));
    }

    #[test]
    fn first_cause_wins() {
        let token = CancelToken::new_root();
        assert!(token.cancel_with(CancelCause::DeadlineExceeded));
        assert!(!token.cancel_with(CancelCause::Cancelled));
        token.cancel();
        assert_eq!(token.cause(), Some(CancelCause::DeadlineExceeded));
    }

    #[test]
    fn concurrent_cancel_is_idempotent() {
        let token = CancelToken::new_root();
        let child = token.new_child();
        let fired: usize = thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|_| s.spawn(|| token.cancel_with(CancelCause::Cancelled) as usize))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap_or(0)).sum()
        });
        assert_eq!(fired, 1);
        assert!(child.is_cancelled());
    }

    #[test]
    fn deadline_fires_with_its_own_cause() {
        let root = CancelToken::new_root();
        let token = root.with_timeout(Duration::from_millis(20));
        assert!(!token.is_cancelled());
        token.wait();
        assert_eq!(token.cause(), Some(CancelCause::DeadlineExceeded));
        assert!(!root.is_cancelled());
    }

    #[test]
    fn child_inherits_earlier_deadline() {
        let root = CancelToken::new_root();
        let near = root.with_timeout(Duration::from_millis(10));
        let far = near.with_timeout(Duration::from_secs(60));
        assert_eq!(far.deadline(), near.deadline());
    }

    #[test]
    fn wait_wakes_on_cancel_from_another_thread() {
        let token = CancelToken::new_root();
        let remote = token.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            remote.cancel();
        });
        assert!(token.wait_timeout(Duration::from_secs(5)));
        handle.join().expect("cancel thread panicked");
    }

    #[test]
    fn sleep_cancellable_reports_full_sleep() {
        let token = CancelToken::new_root();
        assert!(token.sleep_cancellable(Duration::from_millis(5)));
        token.cancel();
        assert!(!token.sleep_cancellable(Duration::from_secs(5)));
    }
}
