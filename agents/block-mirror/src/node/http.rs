use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde::Deserialize;
use tracing::{instrument, trace};
use url::Url;

use crate::error::{MirrorError, MirrorResult};
use crate::node::BlockSource;
use crate::settings::NodeConf;

#[derive(Debug, Deserialize)]
struct HeightResponse {
    height: u64,
}

/// HTTP client for the node's REST API.
#[derive(Debug, Clone)]
pub struct NodeClient {
    http: Client,
    base: Url,
}

impl NodeClient {
    pub fn new(conf: &NodeConf) -> MirrorResult<Self> {
        let http = Client::builder()
            .user_agent(conf.user_agent.clone())
            .timeout(Duration::from_millis(conf.request_timeout_ms))
            .build()?;
        Ok(Self {
            http,
            base: conf.url.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> MirrorResult<Url> {
        // keep any path prefix the node is mounted under
        let base = self.base.as_str().trim_end_matches('/');
        Url::parse(&format!("{base}{path}"))
            .map_err(|err| MirrorError::Network(format!("invalid node url: {err}")))
    }

    async fn get_text(&self, url: Url) -> MirrorResult<String> {
        let response = self
            .http
            .get(url.clone())
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MirrorError::Network(format!(
                "node answered {status} for {url}"
            )));
        }
        Ok(response.text().await?)
    }
}

#[async_trait]
impl BlockSource for NodeClient {
    #[instrument(skip(self), err)]
    async fn height(&self) -> MirrorResult<u64> {
        let body = self.get_text(self.endpoint("/blocks/height")?).await?;
        let parsed: HeightResponse = serde_json::from_str(&body)
            .map_err(|err| MirrorError::Protocol(format!("unexpected height response: {err}")))?;
        trace!(height = parsed.height, "Fetched node height");
        Ok(parsed.height)
    }

    #[instrument(skip(self), err)]
    async fn blocks_raw(&self, start: u64, end: u64) -> MirrorResult<String> {
        self.get_text(self.endpoint(&format!("/blocks/seq/{start}/{end}"))?)
            .await
    }
}
