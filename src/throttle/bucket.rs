//! Token-bucket rate limiting.
//!
//! One bucket protects one resource; the default deployment keeps a single
//! bucket for LLM calls. Refill is lazy (computed on acquire) and callers
//! are serialised FIFO: the bucket's mutex is held across the refill wait,
//! so whoever arrived first drains first.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// A capacity-bounded, time-refilled counter.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_second: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// A bucket holding `capacity` tokens, refilled at `refill_per_second`.
    /// Starts full.
    pub fn new(capacity: u32, refill_per_second: f64) -> Self {
        Self {
            capacity: f64::from(capacity),
            refill_per_second,
            state: Mutex::new(BucketState {
                tokens: f64::from(capacity),
                last_refill: Instant::now(),
            }),
        }
    }

    /// A bucket sized for a requests-per-minute budget: capacity `rpm`,
    /// refilling `rpm / 60` tokens per second.
    pub fn per_minute(rpm: u32) -> Self {
        Self::new(rpm, f64::from(rpm) / 60.0)
    }

    /// Take `n` tokens, suspending until the bucket has refilled enough.
    ///
    /// Never fails; cancellation is honoured by dropping the returned
    /// future. `n` must not exceed the bucket capacity, otherwise the call
    /// could never be satisfied.
    pub async fn acquire(&self, n: u32) {
        let need = f64::from(n);
        debug_assert!(need <= self.capacity, "acquire({n}) exceeds bucket capacity");

        let mut state = self.state.lock().await;
        loop {
            let now = Instant::now();
            let elapsed = now.duration_since(state.last_refill).as_secs_f64();
            state.tokens = (state.tokens + elapsed * self.refill_per_second).min(self.capacity);
            state.last_refill = now;

            if state.tokens >= need {
                state.tokens -= need;
                return;
            }

            let wait = (need - state.tokens) / self.refill_per_second;
            tokio::time::sleep(Duration::from_secs_f64(wait)).await;
        }
    }

    /// Currently available tokens, after a lazy refill. Observation only.
    pub async fn available(&self) -> f64 {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_second).min(self.capacity);
        state.last_refill = now;
        state.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn burst_up_to_capacity_is_immediate() {
        let bucket = TokenBucket::per_minute(10);
        let before = Instant::now();
        for _ in 0..10 {
            bucket.acquire(1).await;
        }
        assert_eq!(before.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn eleventh_acquire_waits_for_refill() {
        let bucket = TokenBucket::per_minute(10);
        for _ in 0..10 {
            bucket.acquire(1).await;
        }
        let before = Instant::now();
        bucket.acquire(1).await;
        // one token refills every 6 seconds at 10 rpm
        assert!(before.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn tokens_never_exceed_capacity() {
        let bucket = TokenBucket::new(5, 100.0);
        bucket.acquire(5).await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        let available = bucket.available().await;
        assert!(available <= 5.0 + f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_acquires_are_serialised() {
        let bucket = Arc::new(TokenBucket::per_minute(60));
        bucket.acquire(60).await;

        let mut handles = Vec::new();
        for _ in 0..5 {
            let bucket = Arc::clone(&bucket);
            handles.push(tokio::spawn(async move {
                let before = Instant::now();
                bucket.acquire(1).await;
                before.elapsed()
            }));
        }

        let mut waits: Vec<Duration> = Vec::new();
        for handle in handles {
            waits.push(handle.await.unwrap());
        }
        waits.sort();
        // 60 rpm refills one token per second; five waiters drain one each
        assert!(waits[4] >= Duration::from_secs(5));
    }

    proptest::proptest! {
        #[test]
        fn refill_is_capped(capacity in 1u32..100, idle_secs in 0u64..10_000) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(true)
                .build()
                .unwrap();
            let available = runtime.block_on(async {
                let bucket = TokenBucket::new(capacity, 10.0);
                tokio::time::sleep(Duration::from_secs(idle_secs)).await;
                bucket.available().await
            });
            proptest::prop_assert!(available <= f64::from(capacity) + f64::EPSILON);
        }
    }
}
