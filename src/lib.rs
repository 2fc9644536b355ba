#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod workers;

pub use config::{ApnsConfig, FcmConfig, ProviderConfig, PushConfig};
pub use domain::device::{Device, Platform};
pub use domain::notification::Notification;
pub use error::{PushError, Result};
pub use services::delivery::{DeliveryCoordinator, DeliveryHook, DeliveryOutcome};
pub use services::{PushService, ServiceRegistry, ServiceResolver};
pub use workers::{DeliveryJob, RetryQueue, RetryWorker};
