use async_trait::async_trait;

use crate::{Comment, CommentId, Error, Feed, NewComment, PostId, Scope};

#[derive(Clone, Copy, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

/// The hosted backend storing comments
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Top-level comments of `post` in creation order, with their replies embedded
    async fn fetch_comments(&self, post: PostId, page: Page) -> Result<Vec<Comment>, Error>;

    /// Replies to `parent` in creation order
    async fn fetch_replies(&self, parent: CommentId, page: Page) -> Result<Vec<Comment>, Error>;

    async fn create_comment(&self, c: NewComment) -> Result<Comment, Error>;

    /// Sets the content of comment `id` and marks it edited
    async fn update_comment(&self, id: CommentId, content: String) -> Result<Comment, Error>;

    /// Soft-deletes comment `id`
    async fn delete_comment(&self, id: CommentId) -> Result<Comment, Error>;

    async fn subscribe(&self, scope: Scope) -> Result<Feed, Error>;
}
