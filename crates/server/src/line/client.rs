//! LINE Messaging API client.
//!
//! Issues short-lived channel access tokens and pushes text messages.

use std::time::Duration;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use url::Url;

use super::{ChannelCredentials, IssuedToken, LineError, MessagingChannel};

const TOKEN_PATH: &str = "/v2/oauth/accessToken";
const PUSH_PATH: &str = "/v2/bot/message/push";

/// HTTP client for the LINE Messaging API.
///
/// Every request carries the configured timeout; a send that exceeds it is
/// abandoned, never retried.
#[derive(Debug, Clone)]
pub struct LineClient {
    client: Client,
    api_base: Url,
}

/// Response from the token endpoint.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Token lifetime in seconds.
    expires_in: u64,
}

/// Error body returned by either endpoint.
#[derive(Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Serialize)]
struct PushRequest<'a> {
    to: &'a str,
    messages: [TextMessage<'a>; 1],
}

#[derive(Serialize)]
struct TextMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

impl LineClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns `LineError::Request` if the HTTP client cannot be built.
    pub fn new(api_base: Url, timeout: Duration) -> Result<Self, LineError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, api_base })
    }

    fn endpoint(&self, path: &str) -> Result<Url, LineError> {
        self.api_base
            .join(path)
            .map_err(|e| LineError::Config(format!("invalid endpoint {path}: {e}")))
    }

    async fn api_error(response: reqwest::Response) -> LineError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        let message = serde_json::from_str::<ErrorResponse>(&body)
            .ok()
            .and_then(|e| e.message.or(e.error_description).or(e.error))
            .unwrap_or(body);

        LineError::Api { status, message }
    }
}

impl MessagingChannel for LineClient {
    #[instrument(skip(self, credentials), fields(channel_id = %credentials.channel_id))]
    async fn exchange_token(
        &self,
        credentials: &ChannelCredentials,
    ) -> Result<IssuedToken, LineError> {
        let response = self
            .client
            .post(self.endpoint(TOKEN_PATH)?)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", credentials.channel_id.as_str()),
                ("client_secret", credentials.channel_secret.expose_secret()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        let token: TokenResponse = response.json().await?;
        debug!(expires_in = token.expires_in, "Channel access token issued");

        Ok(IssuedToken {
            access_token: SecretString::from(token.access_token),
            expires_in: token.expires_in,
        })
    }

    #[instrument(skip(self, access_token, text), fields(recipient = %recipient))]
    async fn push_text(
        &self,
        access_token: &SecretString,
        recipient: &str,
        text: &str,
    ) -> Result<(), LineError> {
        let body = PushRequest {
            to: recipient,
            messages: [TextMessage { kind: "text", text }],
        };

        let response = self
            .client
            .post(self.endpoint(PUSH_PATH)?)
            .bearer_auth(access_token.expose_secret())
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::api_error(response).await);
        }

        debug!("LINE message pushed");
        Ok(())
    }
}
