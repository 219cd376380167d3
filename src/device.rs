use crate::config::DeviceConfig;
use crate::error::{CollectorError, DeviceError};
use crate::model::Reading;
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use std::sync::Arc;

/// Something that can produce one panel [`Reading`] per call.
#[async_trait]
pub trait PanelSource: Send + Sync {
    async fn fetch(&self) -> Result<Reading, DeviceError>;
}

#[async_trait]
impl<T: PanelSource + ?Sized> PanelSource for Arc<T> {
    async fn fetch(&self) -> Result<Reading, DeviceError> {
        (**self).fetch().await
    }
}

/// HTTP client for the SPAN panel's local API.
pub struct SpanClient {
    http: reqwest::Client,
    url: String,
    token: String,
}

impl SpanClient {
    pub fn new(cfg: &DeviceConfig) -> Result<Self, CollectorError> {
        let http = reqwest::Client::builder()
            .timeout(cfg.request_timeout())
            .connect_timeout(cfg.request_timeout())
            // the panel lives on the local network
            .no_proxy()
            .build()?;
        Ok(Self {
            http,
            url: panel_url(&cfg.host),
            token: cfg.api_key.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PanelSource for SpanClient {
    async fn fetch(&self) -> Result<Reading, DeviceError> {
        let res = self
            .http
            .get(&self.url)
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/json")
            .send()
            .await?;
        let status = res.status();
        let body = res.bytes().await?;
        if status != StatusCode::OK {
            return Err(DeviceError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }
        Reading::from_slice(&body)
    }
}

/// `http://<host>/api/v1/panel`; a host that already carries a scheme is used as is.
pub fn panel_url(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.contains("://") {
        format!("{host}/api/v1/panel")
    } else {
        format!("http://{host}/api/v1/panel")
    }
}
