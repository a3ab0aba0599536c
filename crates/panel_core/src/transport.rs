use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::Serialize;
use shared::{
    error::{ApiError, ApiException, ErrorCode},
    protocol::{CustomCommandRequest, PrintHeadCommand, ToolCommand},
};
use url::Url;

use crate::{
    config::Settings,
    error::{PanelError, PanelResult},
    tree::{ControlNode, ControlsDocument},
};

const API_KEY_HEADER: &str = "X-Api-Key";

/// Outbound side of the panel. Calls are fire-and-forget from the tree's
/// point of view: no retries, no idempotency keys.
#[async_trait]
pub trait PrinterTransport: Send + Sync {
    async fn fetch_controls(&self) -> PanelResult<Vec<ControlNode>>;
    async fn send_custom_command(&self, request: &CustomCommandRequest) -> PanelResult<()>;
    async fn send_tool_command(&self, command: &ToolCommand) -> PanelResult<()>;
    async fn send_printhead_command(&self, command: &PrintHeadCommand) -> PanelResult<()>;
}

pub struct HttpTransport {
    http: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn new(server_url: &str, api_key: Option<String>) -> PanelResult<Self> {
        Ok(Self {
            http: Client::new(),
            base_url: parse_base_url(server_url)?,
            api_key,
        })
    }

    pub fn from_settings(settings: &Settings) -> PanelResult<Self> {
        Self::new(&settings.server_url, settings.api_key.clone())
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> PanelResult<Url> {
        self.base_url
            .join(path)
            .map_err(|source| PanelError::InvalidServerUrl {
                url: format!("{}{path}", self.base_url),
                source,
            })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header(API_KEY_HEADER, key),
            None => request,
        }
    }

    async fn post_json<T: Serialize + Sync>(&self, path: &str, body: &T) -> PanelResult<()> {
        let url = self.endpoint(path)?;
        let response = self.authorize(self.http.post(url)).json(body).send().await?;
        check_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl PrinterTransport for HttpTransport {
    async fn fetch_controls(&self) -> PanelResult<Vec<ControlNode>> {
        let url = self.endpoint("api/printer/command/custom")?;
        let response = self.authorize(self.http.get(url)).send().await?;
        let document: ControlsDocument = check_status(response).await?.json().await?;
        Ok(document.controls)
    }

    async fn send_custom_command(&self, request: &CustomCommandRequest) -> PanelResult<()> {
        self.post_json("api/printer/command", request).await
    }

    async fn send_tool_command(&self, command: &ToolCommand) -> PanelResult<()> {
        self.post_json("api/printer/tool", command).await
    }

    async fn send_printhead_command(&self, command: &PrintHeadCommand) -> PanelResult<()> {
        self.post_json("api/printer/printhead", command).await
    }
}

/// Ensures a trailing slash so relative joins append instead of replacing the last segment.
pub(crate) fn parse_base_url(server_url: &str) -> PanelResult<Url> {
    let trimmed = server_url.trim();
    let with_slash = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{trimmed}/")
    };
    Url::parse(&with_slash).map_err(|source| PanelError::InvalidServerUrl {
        url: server_url.to_string(),
        source,
    })
}

async fn check_status(response: Response) -> PanelResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let exception = match serde_json::from_str::<ApiError>(&body) {
        Ok(api_error) => ApiException::from(api_error),
        Err(_) => {
            let message = if body.trim().is_empty() {
                status.to_string()
            } else {
                body.trim().to_string()
            };
            ApiException::new(ErrorCode::from_status(status.as_u16()), message)
        }
    };
    Err(PanelError::Api(exception))
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
