use std::sync::atomic::{AtomicU64, Ordering};

/// A lock-free floating-point accumulator. Budgets are denominated in
/// currency (a float), but `std` has no `AtomicF64`; this stores the bit
/// pattern in an `AtomicU64` and adds via a compare-exchange retry loop,
/// the usual way to get atomic float arithmetic without a mutex per
/// counter (see the "atomics for counters" design note — budget.rs and
/// limits.rs on the teacher side only ever run under `&mut self`, so this
/// generalizes their arithmetic to the concurrent-write contract the
/// governance store requires).
#[derive(Debug)]
pub struct AtomicCurrency(AtomicU64);

impl AtomicCurrency {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::SeqCst))
    }

    pub fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::SeqCst);
    }

    /// Atomically adds `delta`, returning the new value.
    pub fn fetch_add(&self, delta: f64) -> f64 {
        let mut current = self.0.load(Ordering::SeqCst);
        loop {
            let next = f64::from_bits(current) + delta;
            match self.0.compare_exchange_weak(
                current,
                next.to_bits(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return next,
                Err(observed) => current = observed,
            }
        }
    }
}

/// An `Option<u64>` that can be read and written atomically: `u64::MAX` is
/// the sentinel for "unconstrained" (no real rate-limit or budget maximum
/// is ever that large). Used for the `Option`-typed rate-limit maximums.
#[derive(Debug)]
pub struct AtomicOptionU64(AtomicU64);

const UNSET: u64 = u64::MAX;

impl AtomicOptionU64 {
    pub fn new(value: Option<u64>) -> Self {
        Self(AtomicU64::new(value.unwrap_or(UNSET)))
    }

    pub fn load(&self) -> Option<u64> {
        match self.0.load(Ordering::SeqCst) {
            UNSET => None,
            value => Some(value),
        }
    }

    pub fn store(&self, value: Option<u64>) {
        self.0.store(value.unwrap_or(UNSET), Ordering::SeqCst);
    }
}
