//! Search budgets: wall-clock limit, iteration limit and external cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared flag used to stop a running search from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Termination criteria checked by improvement loops between moves.
///
/// Once any criterion is met the search stops and keeps the best tour found.
#[derive(Debug, Clone)]
pub struct Termination {
    started: Instant,
    time_limit: Option<Duration>,
    max_iterations: Option<usize>,
    token: CancellationToken,
}

impl Termination {
    pub fn new(time_limit: Option<Duration>, max_iterations: Option<usize>, token: CancellationToken) -> Self {
        Termination {
            started: Instant::now(),
            time_limit,
            max_iterations,
            token,
        }
    }

    /// Never terminates on its own.
    pub fn unlimited() -> Self {
        Self::new(None, None, CancellationToken::new())
    }

    /// True when the time budget is spent or cancellation was requested.
    pub fn is_terminated(&self) -> bool {
        if self.token.is_cancelled() {
            return true;
        }
        self.time_limit
            .map_or(false, |limit| self.started.elapsed() >= limit)
    }

    /// Like [`is_terminated`](Self::is_terminated), also checking the iteration budget.
    pub fn is_terminated_at(&self, iteration: usize) -> bool {
        self.max_iterations.map_or(false, |max| iteration >= max) || self.is_terminated()
    }
}

impl Default for Termination {
    fn default() -> Self {
        Self::unlimited()
    }
}
