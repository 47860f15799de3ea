//! Matrix client runtime: long-poll sync loop and idempotent event sending.
//!
//! The HTTP exchange is abstracted behind [`Exchange`] so the loop and the
//! sender can be driven by any transport; [`HttpExchange`] is the `reqwest`
//! implementation used against a real homeserver.

/// Authenticated client and request/response plumbing.
pub mod client;
/// Environment-backed configuration.
pub mod config;
/// Filter registration.
pub mod filter;
/// Event handler trait invoked by the sync loop.
pub mod handler;
/// Password login and session introspection.
pub mod login;
/// Room membership calls.
pub mod room;
/// Event sender.
pub mod send;
/// Long-poll sync loop.
pub mod sync;
/// Protocol exchange adapter.
pub mod transport;

#[cfg(test)]
mod testing;

pub use client::{MatrixClient, Session};
pub use config::{ClientConfig, ConfigError, Credentials};
pub use handler::{EventHandler, FnHandler, from_fn};
pub use login::{WhoAmI, login};
pub use sync::{SyncConfig, SyncHandle, SyncLoop};
pub use transport::{Exchange, ExchangeRequest, ExchangeResponse, HttpExchange, Method};
