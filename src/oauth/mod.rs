//! OAuth 2.0 plumbing shared by the connection API and the token accessor.
//!
//! - [`provider`]: endpoint definitions and client credentials per provider
//! - [`exchange`]: the token endpoint client (code exchange, refresh grant)
//! - [`state_manager`]: single-use CSRF states for the authorization redirect

pub mod exchange;
pub mod provider;
pub mod state_manager;

pub use exchange::exchange_code_for_token;
pub use provider::{configured_providers, provider_names, ProviderConfig, BUILTIN_PROVIDERS};
pub use state_manager::{run_state_cleanup, StateEntry, StateManager};
