// error.rs
use std::sync::Arc;
use std::{error::Error, fmt};

const ERR_MSG_QUEUE_FULL: &str = "queue is full";
const ERR_MSG_QUEUE_CLOSED: &str = "queue is closed";
const ERR_MSG_TIMEOUT: &str = "operation timed out";
const ERR_MSG_DISCONNECTED: &str = "queue disconnected";
const ERR_MSG_CANCELLED: &str = "operation cancelled";
const ERR_MSG_DEADLINE: &str = "deadline exceeded";

/// Why a [`CancelToken`](crate::utils::CancelToken) fired.
///
/// Carried inside a [`SeqError`] when a sequence ends because its scope was
/// cancelled rather than because a producer or transform failed.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum CancelCause {
    /// Explicit `cancel()` on the token or one of its ancestors.
    Cancelled,
    /// The token's deadline passed.
    DeadlineExceeded,
}

impl fmt::Display for CancelCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelCause::Cancelled => write!(f, "{ERR_MSG_CANCELLED}"),
            CancelCause::DeadlineExceeded => write!(f, "{ERR_MSG_DEADLINE}"),
        }
    }
}

impl Error for CancelCause {}

/// Terminal failure of a sequence.
///
/// Cheap to clone: the wrapped [`anyhow::Error`] is shared, so a failure can
/// be forwarded downstream while the original sequence keeps reporting it.
#[derive(Clone)]
pub struct SeqError(Arc<anyhow::Error>);

impl SeqError {
    pub fn new<E>(err: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self(Arc::new(anyhow::Error::new(err)))
    }

    pub fn msg<M>(msg: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self(Arc::new(anyhow::Error::msg(msg)))
    }

    /// Borrow the underlying error as a concrete type, if it is one.
    pub fn downcast_ref<T>(&self) -> Option<&T>
    where
        T: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.0.downcast_ref::<T>()
    }

    /// Returns the cancellation cause when the sequence ended because its
    /// scope fired.
    pub fn cancel_cause(&self) -> Option<CancelCause> {
        self.downcast_ref::<CancelCause>().copied()
    }

    #[inline]
    pub fn is_cancellation(&self) -> bool {
        self.cancel_cause().is_some()
    }

    pub fn as_anyhow(&self) -> &anyhow::Error {
        &self.0
    }
}

impl fmt::Debug for SeqError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for SeqError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl Error for SeqError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.0.source()
    }
}

impl From<anyhow::Error> for SeqError {
    fn from(err: anyhow::Error) -> Self {
        Self(Arc::new(err))
    }
}

impl From<CancelCause> for SeqError {
    fn from(cause: CancelCause) -> Self {
        Self::new(cause)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SendFailReason {
    Timeout,
    Cancelled,
    Full,   // bounded queue at capacity
    Closed, // every receiver dropped
}

impl fmt::Display for SendFailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendFailReason::Timeout => write!(f, "{ERR_MSG_TIMEOUT}"),
            SendFailReason::Cancelled => write!(f, "{ERR_MSG_CANCELLED}"),
            SendFailReason::Full => write!(f, "{ERR_MSG_QUEUE_FULL}"),
            SendFailReason::Closed => write!(f, "{ERR_MSG_QUEUE_CLOSED}"),
        }
    }
}

/// Failed send. The value is handed back so the caller can decide what to do
/// with it.
#[derive(Debug)]
pub struct SendError<T> {
    pub value: Option<T>,
    pub reason: SendFailReason,
}

impl<T> SendError<T> {
    pub fn full(value: Option<T>) -> Self {
        Self {
            value,
            reason: SendFailReason::Full,
        }
    }

    pub fn closed(value: Option<T>) -> Self {
        Self {
            value,
            reason: SendFailReason::Closed,
        }
    }

    pub fn cancelled(value: Option<T>) -> Self {
        Self {
            value,
            reason: SendFailReason::Cancelled,
        }
    }

    pub fn timeout(value: Option<T>) -> Self {
        Self {
            value,
            reason: SendFailReason::Timeout,
        }
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.reason == SendFailReason::Cancelled
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.reason == SendFailReason::Closed
    }

    pub fn into_value(self) -> Option<T> {
        self.value
    }
}

impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.reason, f)
    }
}

impl<T: fmt::Debug> Error for SendError<T> {}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TryRecvError {
    Empty,
    Disconnected,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum RecvError {
    Timeout,
    Disconnected,
    Cancelled,
}

impl Error for RecvError {}

impl fmt::Display for RecvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecvError::Timeout => write!(f, "{ERR_MSG_TIMEOUT}"),
            RecvError::Disconnected => write!(f, "{ERR_MSG_DISCONNECTED}"),
            RecvError::Cancelled => write!(f, "{ERR_MSG_CANCELLED}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Boom(u32);

    impl fmt::Display for Boom {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "boom {}", self.0)
        }
    }

    impl Error for Boom {}

    #[test]
    fn seq_error_keeps_payload_across_clones() {
        let err = SeqError::new(Boom(7));
        let copy = err.clone();
        assert_eq!(copy.downcast_ref::<Boom>(), Some(&Boom(7)));
        assert_eq!(copy.to_string(), "boom 7");
        assert!(!copy.is_cancellation());
    }

    #[test]
    fn cancel_cause_round_trips_through_seq_error() {
        let err = SeqError::from(CancelCause::DeadlineExceeded);
        assert_eq!(err.cancel_cause(), Some(CancelCause::DeadlineExceeded));
        assert_eq!(err.to_string(), ERR_MSG_DEADLINE);
    }

    #[test]
    fn send_error_hands_value_back() {
        let err = SendError::cancelled(Some(5u8));
        assert!(err.is_cancelled());
        assert_eq!(err.to_string(), ERR_MSG_CANCELLED);
        assert_eq!(err.into_value(), Some(5));
    }
}
