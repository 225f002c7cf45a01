use async_trait::async_trait;

use crate::{
    domain::{AccessToken, Post, SourceGroup},
    Result,
};

/// Hexagonal port for reading a group's wall.
///
/// Posts come back in upstream order, newest first (a pinned post may lead regardless of age).
/// An empty page is a valid result; transport or upstream failures are `Error::Retrieval`.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch_page(
        &self,
        credentials: &AccessToken,
        group: &SourceGroup,
        offset: u32,
        count: u32,
    ) -> Result<Vec<Post>>;

    /// The `limit` most recent posts.
    async fn fetch_recent(
        &self,
        credentials: &AccessToken,
        group: &SourceGroup,
        limit: u32,
    ) -> Result<Vec<Post>> {
        self.fetch_page(credentials, group, 0, limit).await
    }
}

/// Result of a successful publish on the destination wall.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublishedPost {
    pub post_id: i64,
}

/// Hexagonal port for writing to the destination group.
///
/// Posts are attributed to the group itself where the platform supports it. Implementations
/// must not retry internally; failures are `Error::Publish`.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, text: &str, credentials: &AccessToken) -> Result<PublishedPost>;
}
