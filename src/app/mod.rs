//! Options and lifecycle state shared by the adapters.

mod state;
mod types;

#[doc(inline)]
pub use state::AdapterState;

pub(crate) use state::StateCell;

#[doc(inline)]
pub use types::FirebaseOptions;
