//! VK API adapter: reads source walls (`wall.get`) and publishes to the destination
//! wall (`wall.post`).

mod api;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use wallrelay_core::{
    config::Config,
    domain::{AccessToken, Post, SourceGroup, TargetGroup},
    errors::Error,
    ports::{PublishedPost, Publisher, SourceFetcher},
    utils::truncate_chars,
    Result,
};

use api::{parse_envelope, wall_selector, WallGetResponse, WallPostResponse};

#[derive(Clone, Debug)]
pub struct VkClient {
    http: reqwest::Client,
    base: String,
    version: String,
}

impl VkClient {
    pub fn new(
        base: impl Into<String>,
        version: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build http client: {e}")))?;
        Ok(Self {
            http,
            base: base.into().trim_end_matches('/').to_string(),
            version: version.into(),
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(&cfg.vk_api_base, &cfg.vk_api_version, cfg.vk_http_timeout)
    }

    fn url(&self, method: &str) -> String {
        format!("{}/{method}", self.base)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        req: reqwest::RequestBuilder,
    ) -> std::result::Result<T, String> {
        let resp = req.send().await.map_err(|e| format!("request error: {e}"))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| format!("failed to read response: {e}"))?;
        if !status.is_success() {
            return Err(format!("http {status}: {}", truncate_chars(&body, 200)));
        }
        parse_envelope(&body)
    }

    /// One page of a group's wall, newest first.
    pub async fn wall_get(
        &self,
        token: &AccessToken,
        group: &SourceGroup,
        offset: u32,
        count: u32,
    ) -> Result<Vec<Post>> {
        let (selector, value) = wall_selector(group);
        tracing::debug!(%group, offset, count, "wall.get");

        let req = self.http.get(self.url("wall.get")).query(&[
            ("access_token", token.expose()),
            ("v", self.version.as_str()),
            (selector, value.as_str()),
            ("offset", offset.to_string().as_str()),
            ("count", count.to_string().as_str()),
        ]);

        let resp: WallGetResponse = self
            .send(req)
            .await
            .map_err(|reason| Error::retrieval(group.as_str(), reason))?;
        Ok(resp.items.into_iter().map(Post::from).collect())
    }

    /// Publish `message` on `owner`'s wall on behalf of the community.
    pub async fn wall_post(
        &self,
        token: &AccessToken,
        owner: TargetGroup,
        message: &str,
    ) -> Result<PublishedPost> {
        tracing::debug!(owner_id = owner.0, len = message.chars().count(), "wall.post");

        // Form body: long messages do not fit in a query string.
        let req = self.http.post(self.url("wall.post")).form(&[
            ("access_token", token.expose()),
            ("v", self.version.as_str()),
            ("owner_id", owner.0.to_string().as_str()),
            ("from_group", "1"),
            ("message", message),
        ]);

        let resp: WallPostResponse = self.send(req).await.map_err(Error::Publish)?;
        Ok(PublishedPost {
            post_id: resp.post_id,
        })
    }
}

#[async_trait]
impl SourceFetcher for VkClient {
    async fn fetch_page(
        &self,
        credentials: &AccessToken,
        group: &SourceGroup,
        offset: u32,
        count: u32,
    ) -> Result<Vec<Post>> {
        self.wall_get(credentials, group, offset, count).await
    }
}

/// [`Publisher`] bound to the destination group.
#[derive(Clone, Debug)]
pub struct VkPublisher {
    client: Arc<VkClient>,
    target: TargetGroup,
}

impl VkPublisher {
    pub fn new(client: Arc<VkClient>, target: TargetGroup) -> Self {
        Self { client, target }
    }
}

#[async_trait]
impl Publisher for VkPublisher {
    async fn publish(&self, text: &str, credentials: &AccessToken) -> Result<PublishedPost> {
        self.client.wall_post(credentials, self.target, text).await
    }
}
