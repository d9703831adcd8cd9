use crate::error::SeqError;
use crate::outcome::Slot;
use crate::sequence::Sequence;
use std::marker::PhantomData;

/// Sequence that is exhausted from the start and never fails.
pub struct Empty<T>(PhantomData<fn() -> T>);

impl<T> Empty<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for Empty<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Sequence for Empty<T> {
    type Item = T;

    fn advance(&mut self) -> bool {
        false
    }

    fn current(&self) -> Option<&T> {
        None
    }

    fn error(&self) -> Option<&SeqError> {
        None
    }
}

/// Adapts any [`Iterator`] into a sequence that never fails.
pub struct IterSeq<I: Iterator> {
    iter: I,
    current: Option<I::Item>,
}

impl<I: Iterator> IterSeq<I> {
    pub fn new(iter: impl IntoIterator<IntoIter = I>) -> Self {
        Self {
            iter: iter.into_iter(),
            current: None,
        }
    }
}

impl<I: Iterator> Sequence for IterSeq<I> {
    type Item = I::Item;

    fn advance(&mut self) -> bool {
        self.current = self.iter.next();
        self.current.is_some()
    }

    fn current(&self) -> Option<&I::Item> {
        self.current.as_ref()
    }

    fn error(&self) -> Option<&SeqError> {
        None
    }
}

/// Owned values of a `Vec` as a sequence.
pub type SliceSeq<T> = IterSeq<std::vec::IntoIter<T>>;

pub fn from_vec<T>(items: Vec<T>) -> SliceSeq<T> {
    IterSeq::new(items)
}

/// Half-open range `[start, end)`.
pub fn range<T>(start: T, end: T) -> IterSeq<std::ops::Range<T>>
where
    std::ops::Range<T>: Iterator<Item = T>,
{
    IterSeq::new(start..end)
}

/// Passes through only the values for which `test` returns true.
pub struct Filter<S, P> {
    inner: S,
    test: P,
}

impl<S, P> Filter<S, P> {
    pub fn new(inner: S, test: P) -> Self {
        Self { inner, test }
    }
}

impl<S, P> Sequence for Filter<S, P>
where
    S: Sequence,
    P: FnMut(&S::Item) -> bool,
{
    type Item = S::Item;

    fn advance(&mut self) -> bool {
        while self.inner.advance() {
            if let Some(v) = self.inner.current()
                && (self.test)(v)
            {
                return true;
            }
        }
        false
    }

    fn current(&self) -> Option<&S::Item> {
        self.inner.current()
    }

    fn error(&self) -> Option<&SeqError> {
        self.inner.error()
    }
}

/// Converts every value. The converted value is computed once per
/// `advance()`, so `current()` stays stable.
pub struct Map<S, U, F> {
    inner: S,
    convert: F,
    current: Option<U>,
}

impl<S, U, F> Map<S, U, F> {
    pub fn new(inner: S, convert: F) -> Self {
        Self {
            inner,
            convert,
            current: None,
        }
    }
}

impl<S, U, F> Sequence for Map<S, U, F>
where
    S: Sequence,
    F: FnMut(&S::Item) -> U,
{
    type Item = U;

    fn advance(&mut self) -> bool {
        if !self.inner.advance() {
            self.current = None;
            return false;
        }
        self.current = self.inner.current().map(|v| (self.convert)(v));
        self.current.is_some()
    }

    fn current(&self) -> Option<&U> {
        self.current.as_ref()
    }

    fn error(&self) -> Option<&SeqError> {
        self.inner.error()
    }
}

/// Filter and convert in one step: `None` drops the value.
pub struct FilterMap<S, U, F> {
    inner: S,
    test_update: F,
    current: Option<U>,
}

impl<S, U, F> FilterMap<S, U, F> {
    pub fn new(inner: S, test_update: F) -> Self {
        Self {
            inner,
            test_update,
            current: None,
        }
    }
}

impl<S, U, F> Sequence for FilterMap<S, U, F>
where
    S: Sequence,
    F: FnMut(&S::Item) -> Option<U>,
{
    type Item = U;

    fn advance(&mut self) -> bool {
        while self.inner.advance() {
            self.current = self.inner.current().and_then(|v| (self.test_update)(v));
            if self.current.is_some() {
                return true;
            }
        }
        self.current = None;
        false
    }

    fn current(&self) -> Option<&U> {
        self.current.as_ref()
    }

    fn error(&self) -> Option<&SeqError> {
        self.inner.error()
    }
}

/// Yields at most `max` values of the inner sequence.
pub struct Limit<S> {
    inner: S,
    max: usize,
    count: usize,
    live: bool,
}

impl<S> Limit<S> {
    pub fn new(inner: S, max: usize) -> Self {
        Self {
            inner,
            max,
            count: 0,
            live: false,
        }
    }
}

impl<S: Sequence> Sequence for Limit<S> {
    type Item = S::Item;

    fn advance(&mut self) -> bool {
        self.live = self.count < self.max && self.inner.advance();
        if self.live {
            self.count += 1;
        }
        self.live
    }

    fn current(&self) -> Option<&S::Item> {
        if self.live { self.inner.current() } else { None }
    }

    fn error(&self) -> Option<&SeqError> {
        self.inner.error()
    }
}

/// Values computed from their index: `generate(0)`, `generate(1)`, ...
/// An `Err` ends the sequence with that error.
pub struct Generator<T, F> {
    generate: F,
    index: usize,
    slot: Slot<T>,
}

impl<T, F> Generator<T, F>
where
    F: FnMut(usize) -> anyhow::Result<T>,
{
    pub fn new(generate: F) -> Self {
        Self {
            generate,
            index: 0,
            slot: Slot::Pending,
        }
    }
}

impl<T, F> Sequence for Generator<T, F>
where
    F: FnMut(usize) -> anyhow::Result<T>,
{
    type Item = T;

    fn advance(&mut self) -> bool {
        if self.slot.is_terminal() {
            return false;
        }
        match (self.generate)(self.index) {
            Ok(v) => {
                self.index += 1;
                self.slot = Slot::Value(v);
                true
            }
            Err(err) => {
                self.slot = Slot::Failed(err.into());
                false
            }
        }
    }

    fn current(&self) -> Option<&T> {
        self.slot.current()
    }

    fn error(&self) -> Option<&SeqError> {
        self.slot.error()
    }
}

/// Advances every inner sequence in lock-step and joins their current
/// values. Ends as soon as any inner sequence ends.
pub struct Combine<S: Sequence, U, F> {
    inners: Vec<S>,
    join: F,
    current: Option<U>,
}

impl<S, U, F> Combine<S, U, F>
where
    S: Sequence,
    F: FnMut(&[&S::Item]) -> U,
{
    pub fn new(inners: Vec<S>, join: F) -> Self {
        Self {
            inners,
            join,
            current: None,
        }
    }
}

impl<S, U, F> Sequence for Combine<S, U, F>
where
    S: Sequence,
    F: FnMut(&[&S::Item]) -> U,
{
    type Item = U;

    fn advance(&mut self) -> bool {
        self.current = None;
        if self.inners.is_empty() || !self.inners.iter_mut().all(|s| s.advance()) {
            return false;
        }
        let values: Option<Vec<&S::Item>> = self.inners.iter().map(|s| s.current()).collect();
        self.current = values.map(|vals| (self.join)(&vals));
        self.current.is_some()
    }

    fn current(&self) -> Option<&U> {
        self.current.as_ref()
    }

    fn error(&self) -> Option<&SeqError> {
        self.inners.iter().find_map(|s| s.error())
    }
}

/// The same value, forever.
pub struct Repeat<T> {
    value: T,
    started: bool,
}

impl<T> Repeat<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            started: false,
        }
    }
}

impl<T> Sequence for Repeat<T> {
    type Item = T;

    fn advance(&mut self) -> bool {
        self.started = true;
        true
    }

    fn current(&self) -> Option<&T> {
        self.started.then_some(&self.value)
    }

    fn error(&self) -> Option<&SeqError> {
        None
    }
}
