pub mod connection;
pub mod datastore;
pub mod rpc_error;
pub mod serializer;

pub use connection::{Connection, ConnectionBuilder, RequestContext};
pub use datastore::{Datastore, HttpDatastore, HttpDatastoreBuilder, InMemoryDatastore};
pub use rpc_error::map_http_error;
pub use serializer::RestSerializer;
