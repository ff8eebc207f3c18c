//! OAuth token lifecycle: expiry checks, refresh, and the accessor that
//! composes them over a [`TokenStore`](crate::credentials::TokenStore).
//!
//! ```text
//!            authorize (callback)
//! NoCredential ───────────────────▶ Valid
//!                                     │ expires_at - margin passes
//!                                     ▼
//!             refresh ok ◀──────── Expired ────────▶ RefreshFailed
//!             (persisted)                refresh err   (slot untouched,
//!                                                       retried next call)
//! ```

mod accessor;
mod error;
mod refresher;
mod validator;

pub use accessor::TokenAccessor;
pub use error::{AccessError, RefreshError};
pub use refresher::Refresher;
pub use validator::{is_expired, is_expired_within};

use serde::{Deserialize, Serialize};

/// Lifecycle state of one credential slot
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenState {
    /// Never authorized, disconnected, or unreadable
    NoCredential,
    Valid,
    /// Needs a refresh on next access
    Expired,
    /// Expired, and the last refresh attempt failed
    RefreshFailed,
}

impl TokenState {
    /// Whether the caller should send the user through authorization again
    pub fn needs_authorization(&self) -> bool {
        matches!(self, TokenState::NoCredential | TokenState::RefreshFailed)
    }
}
