//! Pull-based lazy sequences.
//!
//! The basic consuming loop:
//!
//! ```
//! use seqbridge::sequence::{Sequence, range};
//!
//! let mut seq = range(0, 3);
//! let mut seen = Vec::new();
//! while seq.advance() {
//!     if let Some(v) = seq.current() {
//!         seen.push(*v);
//!     }
//! }
//! assert!(seq.error().is_none());
//! assert_eq!(seen, vec![0, 1, 2]);
//! ```
//!
//! A sequence has a single consumer. None of the implementations in this
//! crate tolerate concurrent `advance()` calls on the same instance.

mod adapters;

pub use adapters::*;

use crate::error::SeqError;

/// Pull-iteration contract implemented by every source, combinator and
/// concurrent bridge in this crate.
pub trait Sequence {
    type Item;

    /// Move to the next value. `true` means [`current`](Self::current) holds
    /// a value; `false` means the sequence is exhausted or failed, check
    /// [`error`](Self::error) to tell which.
    fn advance(&mut self) -> bool;

    /// Value produced by the last successful `advance()`. Stays the same
    /// until the next `advance()`. `None` before the first `advance()` and
    /// after one that returned `false`.
    fn current(&self) -> Option<&Self::Item>;

    /// Terminal failure. Only set after `advance()` returned `false`, and
    /// sticky from then on.
    fn error(&self) -> Option<&SeqError>;
}

impl<S: Sequence + ?Sized> Sequence for Box<S> {
    type Item = S::Item;

    #[inline]
    fn advance(&mut self) -> bool {
        (**self).advance()
    }

    #[inline]
    fn current(&self) -> Option<&Self::Item> {
        (**self).current()
    }

    #[inline]
    fn error(&self) -> Option<&SeqError> {
        (**self).error()
    }
}

impl<S: Sequence + ?Sized> Sequence for &mut S {
    type Item = S::Item;

    #[inline]
    fn advance(&mut self) -> bool {
        (**self).advance()
    }

    #[inline]
    fn current(&self) -> Option<&Self::Item> {
        (**self).current()
    }

    #[inline]
    fn error(&self) -> Option<&SeqError> {
        (**self).error()
    }
}

#[inline]
fn finish<T, S: Sequence + ?Sized>(seq: &S, ok: T) -> Result<T, SeqError> {
    match seq.error() {
        Some(err) => Err(err.clone()),
        None => Ok(ok),
    }
}

/// Read every remaining value. Only use on sequences known to terminate;
/// see [`take_n`] otherwise.
pub fn to_vec<S>(seq: &mut S) -> Result<Vec<S::Item>, SeqError>
where
    S: Sequence + ?Sized,
    S::Item: Clone,
{
    let mut out = Vec::new();
    while seq.advance() {
        out.extend(seq.current().cloned());
    }
    finish(seq, out)
}

/// Read up to `n` values. The result is shorter when the sequence ends
/// first.
pub fn take_n<S>(seq: &mut S, n: usize) -> Result<Vec<S::Item>, SeqError>
where
    S: Sequence + ?Sized,
    S::Item: Clone,
{
    let mut out = Vec::with_capacity(n.min(1024));
    while out.len() < n && seq.advance() {
        out.extend(seq.current().cloned());
    }
    finish(seq, out)
}

/// Left fold over the remaining values.
pub fn fold<S, A, F>(seq: &mut S, init: A, mut f: F) -> Result<A, SeqError>
where
    S: Sequence + ?Sized,
    F: FnMut(A, &S::Item) -> A,
{
    let mut acc = init;
    while seq.advance() {
        if let Some(v) = seq.current() {
            acc = f(acc, v);
        }
    }
    finish(seq, acc)
}

/// Fold using the first value as the seed. `Ok(None)` for an empty sequence.
pub fn reduce<S, F>(seq: &mut S, mut f: F) -> Result<Option<S::Item>, SeqError>
where
    S: Sequence + ?Sized,
    S::Item: Clone,
    F: FnMut(S::Item, &S::Item) -> S::Item,
{
    let mut acc: Option<S::Item> = None;
    while seq.advance() {
        if let Some(v) = seq.current() {
            acc = Some(match acc {
                Some(a) => f(a, v),
                None => v.clone(),
            });
        }
    }
    finish(seq, acc)
}

/// True if `pred` holds for every value. Stops at the first value that
/// fails it; a source error is reported only if no value failed first.
pub fn all<S, P>(seq: &mut S, mut pred: P) -> Result<bool, SeqError>
where
    S: Sequence + ?Sized,
    P: FnMut(&S::Item) -> bool,
{
    while seq.advance() {
        if let Some(v) = seq.current()
            && !pred(v)
        {
            return Ok(false);
        }
    }
    finish(seq, true)
}

/// True if `pred` holds for some value. Stops at the first match.
pub fn any<S, P>(seq: &mut S, mut pred: P) -> Result<bool, SeqError>
where
    S: Sequence + ?Sized,
    P: FnMut(&S::Item) -> bool,
{
    while seq.advance() {
        if let Some(v) = seq.current()
            && pred(v)
        {
            return Ok(true);
        }
    }
    finish(seq, false)
}

/// [`Iterator`] view of a sequence. Yields `Ok` for each value and, if the
/// sequence failed, one final `Err`.
pub struct SeqIter<S> {
    seq: S,
    finished: bool,
}

impl<S: Sequence> SeqIter<S> {
    pub fn new(seq: S) -> Self {
        Self {
            seq,
            finished: false,
        }
    }

    pub fn into_inner(self) -> S {
        self.seq
    }
}

impl<S> Iterator for SeqIter<S>
where
    S: Sequence,
    S::Item: Clone,
{
    type Item = Result<S::Item, SeqError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if self.seq.advance() {
            return self.seq.current().cloned().map(Ok);
        }
        self.finished = true;
        self.seq.error().cloned().map(Err)
    }
}

/// Extension methods available on every sequence.
pub trait SequenceExt: Sequence + Sized {
    fn filter<P>(self, test: P) -> Filter<Self, P>
    where
        P: FnMut(&Self::Item) -> bool,
    {
        Filter::new(self, test)
    }

    fn map<U, F>(self, convert: F) -> Map<Self, U, F>
    where
        F: FnMut(&Self::Item) -> U,
    {
        Map::new(self, convert)
    }

    fn filter_map<U, F>(self, test_update: F) -> FilterMap<Self, U, F>
    where
        F: FnMut(&Self::Item) -> Option<U>,
    {
        FilterMap::new(self, test_update)
    }

    fn limit(self, max: usize) -> Limit<Self> {
        Limit::new(self, max)
    }

    fn into_results(self) -> SeqIter<Self> {
        SeqIter::new(self)
    }
}

impl<S: Sequence> SequenceExt for S {}
