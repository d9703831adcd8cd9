use crossbeam::utils::CachePadded;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Countdown of tasks that still hold a writer on a shared queue.
///
/// Every task receives one [`Lease`]; dropping the lease releases whatever it
/// guards (usually a queue sender) and then decrements the count, so the
/// count reaching zero implies every guarded sender is already gone.
#[derive(Clone)]
#[repr(transparent)]
pub struct JoinCount(Arc<CachePadded<AtomicUsize>>);

impl JoinCount {
    #[inline]
    pub fn new() -> Self {
        Self(Arc::new(CachePadded::new(AtomicUsize::new(0))))
    }

    /// Register one more task and hand back its lease.
    #[inline]
    pub fn lease<T>(&self, guarded: T) -> Lease<T> {
        self.0.fetch_add(1, Ordering::AcqRel);
        Lease {
            guarded: Some(guarded),
            count: self.clone(),
        }
    }

    /// Number of leases not yet dropped.
    #[inline]
    pub fn outstanding(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_joined(&self) -> bool {
        self.outstanding() == 0
    }
}

impl Default for JoinCount {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for JoinCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinCount")
            .field("outstanding", &self.outstanding())
            .finish()
    }
}

/// Per-task share of a [`JoinCount`]. Releases exactly once, on drop.
pub struct Lease<T> {
    guarded: Option<T>,
    count: JoinCount,
}

impl<T> Lease<T> {
    #[inline]
    pub fn get(&self) -> Option<&T> {
        self.guarded.as_ref()
    }

    #[inline]
    pub fn get_mut(&mut self) -> Option<&mut T> {
        self.guarded.as_mut()
    }
}

impl<T> Drop for Lease<T> {
    fn drop(&mut self) {
        drop(self.guarded.take());
        if self.count.0.fetch_sub(1, Ordering::AcqRel) == 1 {
            tracing::debug!("join barrier reached, last writer released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel;
    use std::thread;

    #[test]
    fn count_tracks_live_leases() {
        let joins = JoinCount::new();
        let a = joins.lease(());
        let b = joins.lease(());
        assert_eq!(joins.outstanding(), 2);
        drop(a);
        assert!(!joins.is_joined());
        drop(b);
        assert!(joins.is_joined());
    }

    #[test]
    fn guarded_sender_is_dropped_before_count_hits_zero() {
        let joins = JoinCount::new();
        let (tx, rx) = channel::unbounded::<u8>();
        let leases: Vec<_> = (0..4).map(|_| joins.lease(tx.clone())).collect();
        drop(tx);

        let handles: Vec<_> = leases
            .into_iter()
            .map(|mut lease| {
                thread::spawn(move || {
                    if let Some(tx) = lease.get_mut() {
                        let _ = tx.send(1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().expect("lease thread panicked");
        }

        assert!(joins.is_joined());
        assert_eq!(rx.iter().count(), 4);
    }
}
