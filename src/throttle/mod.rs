//! Global backpressure: the token bucket and the batched executor.
//!
//! The bucket is the sole global rate source; the executor's semaphore
//! bounds how many tasks it ever presents to the LLM client at once.

mod bucket;
mod executor;

pub use bucket::TokenBucket;
pub use executor::{BatchExecutor, ExecError};
