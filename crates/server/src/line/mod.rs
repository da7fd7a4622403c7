//! LINE Messaging API integration.
//!
//! Two pieces:
//! - [`LineClient`] talks HTTP to the API (token exchange, push message)
//! - [`ChannelTokenCache`] keeps one access token per channel until shortly
//!   before it expires
//!
//! Both sit behind [`MessagingChannel`] so the notification dispatcher can be
//! exercised without network access.

mod cache;
mod client;
mod error;

use std::future::Future;

use secrecy::SecretString;

pub use cache::{ChannelTokenCache, EXPIRY_MARGIN_SECS};
pub use client::LineClient;
pub use error::LineError;

/// Credentials of one messaging channel.
///
/// Implements `Debug` manually to redact the secret.
#[derive(Clone)]
pub struct ChannelCredentials {
    pub channel_id: String,
    pub channel_secret: SecretString,
}

impl ChannelCredentials {
    #[must_use]
    pub const fn new(channel_id: String, channel_secret: SecretString) -> Self {
        Self {
            channel_id,
            channel_secret,
        }
    }
}

impl std::fmt::Debug for ChannelCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelCredentials")
            .field("channel_id", &self.channel_id)
            .field("channel_secret", &"[REDACTED]")
            .finish()
    }
}

/// A freshly issued channel access token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub access_token: SecretString,
    /// Lifetime reported by the issuer, in seconds.
    pub expires_in: u64,
}

/// Outbound messaging channel.
pub trait MessagingChannel: Send + Sync + 'static {
    /// Exchange channel credentials for an access token.
    fn exchange_token(
        &self,
        credentials: &ChannelCredentials,
    ) -> impl Future<Output = Result<IssuedToken, LineError>> + Send;

    /// Push a plain-text message to one recipient.
    fn push_text(
        &self,
        access_token: &SecretString,
        recipient: &str,
        text: &str,
    ) -> impl Future<Output = Result<(), LineError>> + Send;
}
