use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};

use crate::hub::HubConnection;
use crate::SdkError;

const CONTROL_PREFIX: &str = "api/v1/serverHub/ServerController";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    user_name: &'a str,
    password: &'a str,
}

/// Notification body accepted by the control API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationBody {
    pub content: String,
    pub value: Option<f64>,
    #[serde(default)]
    pub quality: bool,
}

pub struct RelayClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl RelayClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::builder()
                .no_proxy()
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Request a token and keep it for later calls.
    pub async fn login(&mut self, user_name: &str, password: &str) -> Result<String, SdkError> {
        let resp = self
            .client
            .post(format!("{}/api/v1/Auth/login", self.base_url))
            .json(&LoginRequest {
                user_name,
                password,
            })
            .send()
            .await?;

        let token: String = Self::ok(resp).await?.json().await?;
        self.token = Some(token.clone());
        Ok(token)
    }

    pub async fn ping(&self) -> Result<String, SdkError> {
        let resp = self
            .authorized(self.client.get(format!("{}/{}/ping", self.base_url, CONTROL_PREFIX)))
            .send()
            .await?;
        Ok(Self::ok(resp).await?.json().await?)
    }

    /// Broadcast `message` to every session (`Receive` target).
    pub async fn send_all(&self, message: &str) -> Result<(), SdkError> {
        let resp = self
            .authorized(
                self.client
                    .post(format!("{}/{}/send-message-to-all", self.base_url, CONTROL_PREFIX)),
            )
            .json(&message)
            .send()
            .await?;
        Self::ok(resp).await?;
        Ok(())
    }

    /// Send a notification to one connection (`Notify` target). Returns the connection id.
    pub async fn notify(
        &self,
        connection_id: &str,
        notification: &NotificationBody,
    ) -> Result<String, SdkError> {
        let resp = self
            .authorized(self.client.post(format!(
                "{}/{}/send-notification-by/{}",
                self.base_url, CONTROL_PREFIX, connection_id
            )))
            .json(notification)
            .send()
            .await?;
        Ok(Self::ok(resp).await?.json().await?)
    }

    /// Open a hub session at `route` with the stored token.
    pub async fn connect_hub(&self, route: &str) -> Result<HubConnection, SdkError> {
        let token = self.token.as_deref().ok_or("login first")?;
        let ws_base = self
            .base_url
            .replacen("https://", "wss://", 1)
            .replacen("http://", "ws://", 1);
        HubConnection::connect(&format!("{}{}", ws_base, route), token).await
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn ok(resp: Response) -> Result<Response, SdkError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let text = resp.text().await.unwrap_or_default();
        Err(format!("relay returned error status {}: {}", status, text).into())
    }
}
