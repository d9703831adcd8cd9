//! Value-or-failure envelope shipped from concurrent tasks to the consumer,
//! and the consumer-side slot that remembers the last one received.

use crate::error::SeqError;

/// One unit of work crossing a thread boundary: either a produced value or a
/// terminal failure. A failure ends that stream's transmission.
#[derive(Debug, Clone)]
pub enum Outcome<E> {
    Value(E),
    Failed(SeqError),
}

impl<E> Outcome<E> {
    #[inline]
    pub fn value(v: E) -> Self {
        Outcome::Value(v)
    }

    #[inline]
    pub fn failed(err: impl Into<SeqError>) -> Self {
        Outcome::Failed(err.into())
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    pub fn into_result(self) -> Result<E, SeqError> {
        match self {
            Outcome::Value(v) => Ok(v),
            Outcome::Failed(err) => Err(err),
        }
    }
}

impl<E> From<anyhow::Result<E>> for Outcome<E> {
    fn from(res: anyhow::Result<E>) -> Self {
        match res {
            Ok(v) => Outcome::Value(v),
            Err(err) => Outcome::Failed(err.into()),
        }
    }
}

impl<E> From<Result<E, SeqError>> for Outcome<E> {
    fn from(res: Result<E, SeqError>) -> Self {
        match res {
            Ok(v) => Outcome::Value(v),
            Err(err) => Outcome::Failed(err),
        }
    }
}

/// Consumer-side buffer behind `current()` / `error()`.
///
/// `Done` and `Failed` are both terminal; only `Failed` carries an error, so
/// ordinary exhaustion never looks like a failure.
#[derive(Debug)]
pub(crate) enum Slot<E> {
    Pending,
    Value(E),
    Failed(SeqError),
    Done,
}

impl<E> Slot<E> {
    #[inline]
    pub(crate) fn is_terminal(&self) -> bool {
        matches!(self, Slot::Failed(_) | Slot::Done)
    }

    #[inline]
    pub(crate) fn current(&self) -> Option<&E> {
        match self {
            Slot::Value(v) => Some(v),
            _ => None,
        }
    }

    #[inline]
    pub(crate) fn error(&self) -> Option<&SeqError> {
        match self {
            Slot::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Store an outcome; returns true when it carried a value.
    #[inline]
    pub(crate) fn accept(&mut self, outcome: Outcome<E>) -> bool {
        match outcome {
            Outcome::Value(v) => {
                *self = Slot::Value(v);
                true
            }
            Outcome::Failed(err) => {
                *self = Slot::Failed(err);
                false
            }
        }
    }
}
