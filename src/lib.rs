//! # firebase-adapters
//!
//! Thin async adapters over three Firebase data services:
//!
//! - [`database::DatabaseAdapter`]: the Realtime Database, a JSON tree
//!   addressed by slash-separated paths, with value and child-event streams.
//! - [`firestore::FirestoreAdapter`]: Firestore documents addressed by
//!   `(collection, id)`, with queries and watches.
//! - [`messaging::MessagingAdapter`]: Cloud Messaging permission, device
//!   token, topics and incoming messages.
//!
//! Each adapter is constructed explicitly, initialized once from
//! [`app::FirebaseOptions`], and forwards every operation to a pluggable
//! backend (an in-memory store or the service's REST API). Failures come back
//! as the adapter's own error type; nothing is retried or cached.

pub mod app;
pub mod database;
pub mod firestore;
pub mod messaging;
pub mod platform;
pub mod util;
