//! Process environment and credential plumbing shared by the adapters.

pub mod environment;
pub mod token;

pub use environment::FirebaseDefaults;
pub use token::{
    AsyncTokenProvider, NoopTokenProvider, StaticTokenProvider, TokenError, TokenProviderArc,
};
