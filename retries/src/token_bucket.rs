//! Retry budget (token bucket circuit breaker)
//!
//! Each scope owns a bucket. Retries withdraw from it, successful calls put
//! a little back. Bursts of failures drain the bucket quickly and open the
//! circuit for that scope; only successes close it again. There is no
//! time-based refill.
//!
//! First attempts never touch the bucket.

use crate::scope_map::ScopeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Default capacity of a freshly created bucket.
pub const DEFAULT_INITIAL_CAPACITY: u32 = 500;

/// Default cost of one retry.
pub const DEFAULT_RETRY_COST: u32 = 5;

/// Default amount credited back by a successful call.
pub const DEFAULT_SUCCESS_CREDIT: u32 = 1;

/// How much a successful call credits back to its scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuccessCredit {
    /// Always credit `success_credit`, however many retries the call made.
    #[default]
    Fixed,
    /// Credit `max(success_credit, token.budget_debited())`, repaying what
    /// the call withdrew.
    RepayDebited,
}

/// Sizing of per-scope retry budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudgetConfig {
    /// Starting capacity and ceiling of every bucket.
    pub initial_capacity: u32,
    pub retry_cost: u32,
    pub success_credit: u32,
    pub success_credit_policy: SuccessCredit,
}

impl Default for RetryBudgetConfig {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            retry_cost: DEFAULT_RETRY_COST,
            success_credit: DEFAULT_SUCCESS_CREDIT,
            success_credit_policy: SuccessCredit::Fixed,
        }
    }
}

impl RetryBudgetConfig {
    /// Amount to credit for a successful call whose token withdrew
    /// `budget_debited`.
    pub fn credit_for(&self, budget_debited: u32) -> u32 {
        match self.success_credit_policy {
            SuccessCredit::Fixed => self.success_credit,
            SuccessCredit::RepayDebited => self.success_credit.max(budget_debited),
        }
    }
}

/// A single scope's budget.
///
/// Capacity always stays within `[0, max_capacity]`, including under
/// concurrent withdraw/credit.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: AtomicU32,
    max_capacity: u32,
}

impl TokenBucket {
    /// A full bucket.
    pub fn new(max_capacity: u32) -> Self {
        Self {
            capacity: AtomicU32::new(max_capacity),
            max_capacity,
        }
    }

    /// Withdraw `cost` if enough capacity is left. Leaves the bucket
    /// untouched and returns `false` otherwise.
    pub fn try_acquire(&self, cost: u32) -> bool {
        let acquired = self
            .capacity
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_sub(cost)
            })
            .is_ok();
        tracing::trace!(cost, acquired, "token bucket withdraw");
        acquired
    }

    /// Credit `amount`, capped at `max_capacity`. Returns the new capacity.
    pub fn release(&self, amount: u32) -> u32 {
        let max = self.max_capacity;
        let refill = |current: u32| current.saturating_add(amount).min(max);
        let previous = match self
            .capacity
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(refill(current))
            }) {
            Ok(previous) | Err(previous) => previous,
        };
        let updated = refill(previous);
        tracing::trace!(amount, capacity = updated, "token bucket credit");
        updated
    }

    pub fn available(&self) -> u32 {
        self.capacity.load(Ordering::Acquire)
    }

    pub fn max_capacity(&self) -> u32 {
        self.max_capacity
    }
}

/// Buckets keyed by scope, created full on first use.
#[derive(Debug)]
pub(crate) struct TokenBucketStore {
    max_capacity: u32,
    buckets: ScopeMap<TokenBucket>,
}

impl TokenBucketStore {
    pub(crate) fn new(max_capacity: u32) -> Self {
        Self {
            max_capacity,
            buckets: ScopeMap::new(),
        }
    }

    pub(crate) fn bucket(&self, scope: &str) -> Arc<TokenBucket> {
        let max_capacity = self.max_capacity;
        self.buckets
            .get_or_insert_with(scope, || TokenBucket::new(max_capacity))
    }

    /// Current capacity for `scope`. A scope that was never used reports a
    /// full bucket without creating one.
    pub(crate) fn available(&self, scope: &str) -> u32 {
        match self.buckets.get(scope) {
            Some(bucket) => bucket.available(),
            None => self.max_capacity,
        }
    }

    pub(crate) fn evict(&self, scope: &str) -> bool {
        self.buckets.remove(scope)
    }
}
