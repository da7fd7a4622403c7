//! Channel access token cache.
//!
//! One instance is built at startup and shared by every dispatch. Tokens are
//! keyed by channel id and evicted [`EXPIRY_MARGIN_SECS`] before the lifetime
//! the issuer reported. Two concurrent misses for the same channel may both
//! exchange; the exchange is idempotent, so the later insert simply wins.

use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::Expiry;
use moka::future::Cache;
use secrecy::SecretString;
use tracing::{debug, instrument, warn};

use super::{ChannelCredentials, MessagingChannel};

/// Seconds shaved off every reported token lifetime.
pub const EXPIRY_MARGIN_SECS: u64 = 300;

#[derive(Clone)]
struct CachedToken {
    token: SecretString,
    ttl: Duration,
}

/// Per-entry expiry taken from the token's own lifetime.
struct TokenExpiry;

impl Expiry<String, CachedToken> for TokenExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedToken,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// Caches channel access tokens in front of a [`MessagingChannel`].
pub struct ChannelTokenCache<C> {
    inner: Arc<ChannelTokenCacheInner<C>>,
}

struct ChannelTokenCacheInner<C> {
    channel: C,
    tokens: Cache<String, CachedToken>,
}

impl<C> Clone for ChannelTokenCache<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: MessagingChannel> ChannelTokenCache<C> {
    #[must_use]
    pub fn new(channel: C) -> Self {
        let tokens = Cache::builder()
            .max_capacity(64)
            .expire_after(TokenExpiry)
            .build();

        Self {
            inner: Arc::new(ChannelTokenCacheInner { channel, tokens }),
        }
    }

    /// The wrapped channel, for sending with a token from [`Self::get_token`].
    #[must_use]
    pub fn channel(&self) -> &C {
        &self.inner.channel
    }

    /// Return a valid token for the channel, exchanging credentials on a miss.
    ///
    /// Returns `None` when the exchange fails; the failure is logged and the
    /// caller treats notifications on that channel as unavailable.
    #[instrument(skip(self, credentials), fields(channel_id = %credentials.channel_id))]
    pub async fn get_token(&self, credentials: &ChannelCredentials) -> Option<SecretString> {
        if let Some(cached) = self.inner.tokens.get(&credentials.channel_id).await {
            return Some(cached.token);
        }

        match self.inner.channel.exchange_token(credentials).await {
            Ok(issued) => {
                let ttl = issued.expires_in.saturating_sub(EXPIRY_MARGIN_SECS);
                if ttl > 0 {
                    self.inner
                        .tokens
                        .insert(
                            credentials.channel_id.clone(),
                            CachedToken {
                                token: issued.access_token.clone(),
                                ttl: Duration::from_secs(ttl),
                            },
                        )
                        .await;
                } else {
                    debug!(
                        expires_in = issued.expires_in,
                        "Token lifetime inside expiry margin, not caching"
                    );
                }
                Some(issued.access_token)
            }
            Err(e) => {
                warn!(error = %e, "Notification unavailable: channel token exchange failed");
                None
            }
        }
    }

    /// Drop the cached token for a channel, e.g. after the API rejected it.
    pub async fn invalidate(&self, channel_id: &str) {
        self.inner.tokens.invalidate(channel_id).await;
    }
}
