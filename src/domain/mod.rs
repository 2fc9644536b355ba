pub mod device;
pub mod notification;

pub use device::{Device, Platform};
pub use notification::{Notification, PayloadMap};
