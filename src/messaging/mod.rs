//! # Messaging adapter
//!
//! Push-notification channel: notification permission, the device token and
//! its refreshes, topic subscriptions, and delivery of incoming messages.
//!
//! The adapter drives a [`PushTransport`]. [`LocalPushTransport`] issues
//! tokens locally; platform glue supplies its own transport and feeds
//! received messages to [`MessagingAdapter::dispatch`].

mod api;
pub mod error;
mod subscription;
mod transport;
mod types;

#[doc(inline)]
pub use api::{MessagingAdapter, MessagingConnection};

#[doc(inline)]
pub use error::{MessagingAdapterError, MessagingAdapterErrorCode, MessagingResult};

#[doc(inline)]
pub use transport::{LocalPushTransport, PushTransport};

#[doc(inline)]
pub use types::{
    MessageHandler, MessageOrigin, MessagePayload, MessageStream, NotificationPayload,
    PermissionState, TokenStream,
};
