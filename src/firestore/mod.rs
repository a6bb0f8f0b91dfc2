//! # Firestore adapter
//!
//! Document CRUD, queries and watches over `(collection, id)` addresses.
//! Field maps are plain `serde_json` objects; [`FirestoreDocument::decode`]
//! turns them into typed records.
//!
//! The adapter talks to a [`Datastore`]: [`HttpDatastore`] for the Firestore
//! v1 REST API (production or emulator) or [`InMemoryDatastore`] for local
//! use. [`FirestoreSettings`] picks one on `initialize`.
//!
//! ```no_run
//! use firebase_adapters::app::FirebaseOptions;
//! use firebase_adapters::firestore::{FilterOperator, FirestoreAdapter, FirestoreSettings, Query};
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let options = FirebaseOptions {
//!     project_id: Some("demo-project".into()),
//!     ..Default::default()
//! };
//! let firestore = FirestoreAdapter::new();
//! firestore
//!     .initialize_with_settings(&options, FirestoreSettings::in_memory())
//!     .await?;
//!
//! let fields = json!({"name": "Ada", "age": 36});
//! firestore
//!     .set("users", "u1", fields.as_object().cloned().unwrap_or_default())
//!     .await?;
//!
//! let adults = firestore
//!     .get_many(
//!         "users",
//!         Some(Box::new(|query: Query| {
//!             query.where_field("age", FilterOperator::GreaterThanOrEqual, 18)
//!         })),
//!     )
//!     .await?;
//! assert_eq!(adults.len(), 1);
//! # Ok(())
//! # }
//! ```

mod api;
mod document;
pub mod error;
mod listeners;
mod model;
mod query;
mod query_evaluator;
pub mod remote;
mod settings;

#[doc(inline)]
pub use api::{FirestoreAdapter, FirestoreConnection};

#[doc(inline)]
pub use document::{FirestoreCollection, FirestoreDocument};

#[doc(inline)]
pub use error::{FirestoreAdapterError, FirestoreAdapterErrorCode, FirestoreResult};

#[doc(inline)]
pub use listeners::{DocumentStream, QueryStream};

#[doc(inline)]
pub use model::{CollectionPath, DocumentKey, FieldPath};

#[doc(inline)]
pub use query::{FieldFilter, FilterOperator, OrderBy, OrderDirection, Query, QueryModifier};

#[doc(inline)]
pub use remote::{Datastore, HttpDatastore, HttpDatastoreBuilder, InMemoryDatastore};

#[doc(inline)]
pub use settings::{FirestoreBackendKind, FirestoreSettings, DEFAULT_DATABASE_ID};
