pub mod memory;
pub mod pg;

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    models::{
        comment::{Comment, ModerateComment, NewComment},
        comment_options::CommentOptions,
    },
    target::{ContentTypeTag, Target, TargetLoader},
};

pub use memory::MemoryStore;
pub use pg::PgStore;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("could not get a database connection: {0}")]
    Pool(String),
}

/// Narrows the admin comment listing.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CommentFilter {
    pub content_type_id: Option<i32>,
    pub object_id: Option<i32>,
    pub is_public: Option<bool>,
    pub is_removed: Option<bool>,
}

impl CommentFilter {
    pub fn matches(&self, comment: &Comment) -> bool {
        self.content_type_id
            .is_none_or(|ct| comment.content_type_id == ct)
            && self.object_id.is_none_or(|id| comment.object_id == id)
            && self.is_public.is_none_or(|p| comment.is_public == p)
            && self.is_removed.is_none_or(|r| comment.is_removed == r)
    }
}

#[async_trait]
pub trait CommentStore: Send + Sync {
    /// A loader resolving publishables of the given content type.
    fn publishable_loader(&self, content_type: &ContentTypeTag) -> Arc<dyn TargetLoader>;

    async fn comment_options(&self, target: &Target) -> Result<Option<CommentOptions>, StoreError>;

    /// Creates or updates the single options row of a target.
    async fn upsert_comment_options(
        &self,
        target: &Target,
        blocked: bool,
    ) -> Result<CommentOptions, StoreError>;

    /// Public, non-removed comments of a target in creation order.
    async fn visible_comments(&self, target: &Target) -> Result<Vec<Comment>, StoreError>;

    async fn get_comment(&self, id: i32) -> Result<Option<Comment>, StoreError>;

    async fn insert_comment(&self, comment: NewComment) -> Result<Comment, StoreError>;

    async fn count_comments(&self, filter: &CommentFilter) -> Result<i64, StoreError>;

    /// Newest first.
    async fn list_comments(
        &self,
        filter: &CommentFilter,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Comment>, StoreError>;

    async fn moderate_comment(
        &self,
        id: i32,
        changes: &ModerateComment,
    ) -> Result<Option<Comment>, StoreError>;
}
