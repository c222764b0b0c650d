//! Monetary budget gate for paid provider calls.

use std::sync::atomic::{AtomicU64, Ordering};

use prospector_shared::Cents;

/// A remaining-balance counter that never goes negative.
///
/// Reservations are made before a call is issued and are not refunded if
/// the call later fails.
#[derive(Debug)]
pub struct BudgetLedger {
    initial: Cents,
    remaining: AtomicU64,
}

impl BudgetLedger {
    pub fn new(initial: Cents) -> Self {
        Self {
            initial,
            remaining: AtomicU64::new(initial.get()),
        }
    }

    /// Reserve `amount` if the balance covers it.
    ///
    /// Returns `false` and leaves the balance untouched otherwise. Zero-cost
    /// reservations always succeed.
    pub fn try_reserve(&self, amount: Cents) -> bool {
        if amount.is_zero() {
            return true;
        }

        self.remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |remaining| {
                remaining.checked_sub(amount.get())
            })
            .is_ok()
    }

    pub fn remaining(&self) -> Cents {
        Cents(self.remaining.load(Ordering::Acquire))
    }

    pub fn initial(&self) -> Cents {
        self.initial
    }

    pub fn spent(&self) -> Cents {
        Cents(self.initial.get().saturating_sub(self.remaining().get()))
    }
}
