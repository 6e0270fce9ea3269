pub mod images;
pub mod notifications;

pub use images::{ImageJobs, ResizeRequest};
pub use notifications::NotificationJobs;
