//! # Realtime Database adapter
//!
//! A thin adapter over a hierarchical key-value tree addressed by
//! slash-separated paths. Each operation forwards one call to a
//! [`TreeBackend`] and returns plain [`Node`] values.
//!
//! Two backends ship with the crate:
//!
//! - [`InMemoryTreeBackend`], used when no `database_url` is configured.
//! - [`RestTreeBackend`], the Realtime Database REST API (hosted or emulator).
//!
//! Subscriptions are streams fed by writes made through the same adapter. The
//! first item of [`DatabaseAdapter::subscribe`] is the current value.
//!
//! ## Example
//!
//! ```no_run
//! use firebase_adapters::app::FirebaseOptions;
//! use firebase_adapters::database::DatabaseAdapter;
//! use futures::StreamExt;
//! use serde_json::json;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let database = DatabaseAdapter::new();
//!     database.initialize(&FirebaseOptions::default()).await?;
//!
//!     let mut counter = database.subscribe("counters/c1").await?;
//!     database.replace("counters/c1", json!(1)).await?;
//!
//!     while let Some(node) = counter.next().await {
//!         println!("counter is now {:?}", node?.value());
//!     }
//!     Ok(())
//! }
//! ```

mod api;
mod backend;
pub mod error;
mod listeners;
mod node;
mod path;
mod push_id;
mod server_value;

#[doc(inline)]
pub use api::{ChildEventSubscriptions, DatabaseAdapter, DatabaseConnection};

#[doc(inline)]
pub use backend::{InMemoryTreeBackend, RestTreeBackend, RestTreeBackendBuilder, TreeBackend};

#[doc(inline)]
pub use error::{DatabaseAdapterError, DatabaseAdapterErrorCode, DatabaseResult};

#[doc(inline)]
pub use listeners::{ChildEvent, ChildEventKind, ChildEventStream, NodeStream};

#[doc(inline)]
pub use node::Node;

#[doc(inline)]
pub use server_value::{increment, server_timestamp};
