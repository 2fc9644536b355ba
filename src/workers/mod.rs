pub mod backoff;
pub mod retry;

pub use backoff::RetryDecision;
pub use retry::{DeliveryJob, RetryQueue, RetryWorker};
