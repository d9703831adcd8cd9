use seqbridge::error::SeqError;
use seqbridge::prelude::*;
use seqbridge::sequence::Combine;
use std::time::Duration;

/// Endless Fibonacci numbers as a hand-written sequence.
struct Fib {
    next: u64,
    prev: u64,
}

impl Fib {
    fn new() -> Self {
        Self { next: 0, prev: 1 }
    }

    fn shifted() -> Self {
        Self { next: 1, prev: 0 }
    }
}

impl Sequence for Fib {
    type Item = u64;

    fn advance(&mut self) -> bool {
        (self.next, self.prev) = (self.next.wrapping_add(self.prev), self.next);
        true
    }

    fn current(&self) -> Option<&u64> {
        Some(&self.next)
    }

    fn error(&self) -> Option<&SeqError> {
        None
    }
}

pub fn main() -> anyhow::Result<()> {
    let _guard = LoggerConfig::from_env().init()?;

    let nums = take_n(&mut Fib::new(), 10)?;
    println!("{nums:?}");

    // consecutive ratios converge on the golden ratio
    let mut ratios = Combine::new(vec![Fib::new(), Fib::shifted()], |vals: &[&u64]| {
        *vals[1] as f64 / *vals[0] as f64
    });
    for r in take_n(&mut ratios, 20)? {
        println!("{r:.6}");
    }

    // three producers stream their own slice of the sequence concurrently
    let scope = CancelToken::new_root().with_timeout(Duration::from_secs(5));
    let producers = (0..3u64)
        .map(|offset| {
            producer(move |mut sink: Sink<(u64, u64)>| {
                let mut fib = Fib::new();
                for i in 0..30u64 {
                    fib.advance();
                    if i % 3 == offset && sink.value((i, fib.next)).is_err() {
                        return;
                    }
                }
            })
        })
        .collect();
    let mut merged = to_vec(&mut fan_in(&scope, producers)?)?;
    merged.sort_unstable();
    println!("merged {} values, last {:?}", merged.len(), merged.last());

    // and a pool checks which of them are even
    let evens = map_async(Fib::new().limit(40), |v| Ok((v, v % 2 == 0)), 4)?;
    let count = fold(&mut evens.filter(|(_, even)| *even), 0usize, |n, _| n + 1)?;
    println!("{count} even values in the first 40");

    Ok(())
}
