//! Rendering delegated to a remote service.
//!
//! The service takes the target page and the readiness selector as query
//! parameters and answers with JSON whose `data` array holds the rendered
//! HTML as its first element.
//!
//! The service polls the page itself, so one call may take as long as a
//! local render. It is sent once, bounded by the render timeout rather than
//! the plain-HTTP one; a retry would launch another browser on the far side.

use super::PageRenderer;
use crate::acquisition::http_client::{HttpClient, ResponseData};
use crate::error::RenderFailure;
use async_trait::async_trait;
use std::time::Duration;
use url::Url;

/// Client for a remote rendering service.
#[derive(Clone)]
pub struct RemoteRenderer {
    endpoint: Url,
    client: HttpClient,
    /// Bound for one service call: navigation plus readiness polling.
    timeout: Duration,
}

impl RemoteRenderer {
    pub fn new(endpoint: Url, client: HttpClient, timeout: Duration) -> Self {
        Self {
            endpoint,
            client,
            timeout,
        }
    }

    /// Service URL for one render, with `url` and `selector` encoded.
    pub fn request_url(&self, url: &str, selector: &str) -> Url {
        let mut request = self.endpoint.clone();
        request
            .query_pairs_mut()
            .append_pair("url", url)
            .append_pair("selector", selector);
        request
    }
}

/// Pull `data[0]` out of a service response; missing means empty.
fn extract_content(data: &ResponseData) -> Result<String, RenderFailure> {
    let json = data
        .as_json()
        .ok_or_else(|| RenderFailure::Service("response is not JSON".to_string()))?;

    Ok(json
        .get("data")
        .and_then(|d| d.get(0))
        .and_then(|first| first.as_str())
        .unwrap_or_default()
        .to_string())
}

#[async_trait]
impl PageRenderer for RemoteRenderer {
    async fn render(&self, url: &str, selector: &str) -> Result<String, RenderFailure> {
        let request = self.request_url(url, selector);
        let resp = self
            .client
            .get_once(request.as_str(), self.timeout)
            .await
            .map_err(|e| RenderFailure::Service(e.to_string()))?;
        extract_content(&resp.data)
    }
}
