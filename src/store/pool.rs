//! Fixed-size session pool. Sessions are checked out per operation and
//! returned on drop; a session is never visible to two requests at once.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

#[derive(Debug)]
pub struct Session {
    pub id: u64,
    last_used: Instant,
}

impl Session {
    fn touch(&mut self) {
        self.last_used = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_used.elapsed()
    }
}

#[derive(Debug)]
struct PoolState {
    idle: Vec<Session>,
    checked_out: usize,
}

#[derive(Debug)]
struct PoolInner {
    state: Mutex<PoolState>,
    returned: Condvar,
    checkout_timeout: Duration,
}

/// Concurrent checkout/return over a bounded set of sessions. Checkout blocks
/// up to `checkout_timeout` when every session is busy, then reports the pool
/// exhausted rather than queueing without bound.
#[derive(Debug, Clone)]
pub struct SessionPool {
    inner: Arc<PoolInner>,
    size: usize,
}

impl SessionPool {
    pub fn new(size: usize, checkout_timeout: Duration) -> Self {
        let now = Instant::now();
        let idle = (0..size as u64)
            .map(|id| Session { id, last_used: now })
            .collect();
        Self {
            inner: Arc::new(PoolInner {
                state: Mutex::new(PoolState {
                    idle,
                    checked_out: 0,
                }),
                returned: Condvar::new(),
                checkout_timeout,
            }),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn checked_out(&self) -> usize {
        self.inner.state.lock().expect("pool lock").checked_out
    }

    /// Refreshes idle sessions older than `max_idle`, the keep-alive the
    /// backing store expects from long-lived pools.
    pub fn ping(&self, max_idle: Duration) {
        let mut state = self.inner.state.lock().expect("pool lock");
        for session in state.idle.iter_mut() {
            if session.idle_for() >= max_idle {
                session.touch();
            }
        }
    }

    pub fn checkout(&self) -> Result<PooledSession> {
        let deadline = Instant::now() + self.inner.checkout_timeout;
        let mut state = self.inner.state.lock().expect("pool lock");
        loop {
            if let Some(mut session) = state.idle.pop() {
                session.touch();
                state.checked_out += 1;
                return Ok(PooledSession {
                    session: Some(session),
                    pool: Arc::clone(&self.inner),
                });
            }
            let wait = deadline.saturating_duration_since(Instant::now());
            if wait.is_zero() {
                return Err(Error::Unavailable("session pool exhausted"));
            }
            let (next, timeout) = self
                .inner
                .returned
                .wait_timeout(state, wait)
                .expect("pool lock");
            state = next;
            if timeout.timed_out() && state.idle.is_empty() {
                return Err(Error::Unavailable("session pool exhausted"));
            }
        }
    }
}

/// RAII handle; returns the session on drop and wakes one waiter.
#[derive(Debug)]
pub struct PooledSession {
    session: Option<Session>,
    pool: Arc<PoolInner>,
}

impl PooledSession {
    pub fn id(&self) -> u64 {
        self.session.as_ref().expect("session present").id
    }
}

impl Drop for PooledSession {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            let mut state = self.pool.state.lock().expect("pool lock");
            state.idle.push(session);
            state.checked_out = state.checked_out.saturating_sub(1);
            self.pool.returned.notify_one();
        }
    }
}
