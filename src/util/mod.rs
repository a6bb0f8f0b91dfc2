pub mod subscribe;

pub use subscribe::{Subscription, Unsubscribe};
