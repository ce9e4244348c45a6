use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    models::{
        comment::{Comment, ModerateComment, NewComment},
        comment_options::CommentOptions,
        content_type::ContentType,
        publishable::Publishable,
    },
    target::{ContentTypeTag, Target, TargetLoader},
};

use super::{CommentFilter, CommentStore, StoreError};

#[derive(Default)]
struct MemoryState {
    content_types: Vec<ContentType>,
    publishables: Vec<Publishable>,
    comments: Vec<Comment>,
    options: Vec<CommentOptions>,
}

impl MemoryState {
    fn content_type(&self, tag: &ContentTypeTag) -> Option<&ContentType> {
        self.content_types
            .iter()
            .find(|ct| ct.app_label == tag.app_label && ct.model == tag.model)
    }
}

/// Process-local store used in development when no database is configured,
/// and by the test suite.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_publishable(
        &self,
        content_type: &ContentTypeTag,
        title: &str,
        slug: &str,
    ) -> Publishable {
        let mut state = self.state.lock().await;

        let content_type_id = match state.content_type(content_type) {
            Some(ct) => ct.id,
            None => {
                let id = state.content_types.len() as i32 + 1;
                state.content_types.push(ContentType {
                    id,
                    app_label: content_type.app_label.clone(),
                    model: content_type.model.clone(),
                });
                id
            }
        };

        let publishable = Publishable {
            id: state.publishables.len() as i32 + 1,
            content_type_id,
            title: title.to_string(),
            slug: slug.to_string(),
        };
        state.publishables.push(publishable.clone());
        publishable
    }
}

struct MemoryPublishableLoader {
    state: Arc<Mutex<MemoryState>>,
    content_type: ContentTypeTag,
}

#[async_trait]
impl TargetLoader for MemoryPublishableLoader {
    async fn load(&self, object_id: i32) -> Result<Option<Target>, StoreError> {
        let state = self.state.lock().await;

        let Some(content_type) = state.content_type(&self.content_type) else {
            return Ok(None);
        };

        Ok(state
            .publishables
            .iter()
            .find(|p| p.id == object_id && p.content_type_id == content_type.id)
            .map(|p| Target {
                content_type: self.content_type.clone(),
                content_type_id: content_type.id,
                object_id: p.id,
                title: p.title.clone(),
                slug: p.slug.clone(),
            }))
    }
}

#[async_trait]
impl CommentStore for MemoryStore {
    fn publishable_loader(&self, content_type: &ContentTypeTag) -> Arc<dyn TargetLoader> {
        Arc::new(MemoryPublishableLoader {
            state: self.state.clone(),
            content_type: content_type.clone(),
        })
    }

    async fn comment_options(&self, target: &Target) -> Result<Option<CommentOptions>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .options
            .iter()
            .find(|o| o.target_ct_id == target.content_type_id && o.target_id == target.object_id)
            .cloned())
    }

    async fn upsert_comment_options(
        &self,
        target: &Target,
        blocked: bool,
    ) -> Result<CommentOptions, StoreError> {
        let mut state = self.state.lock().await;

        if let Some(options) = state
            .options
            .iter_mut()
            .find(|o| o.target_ct_id == target.content_type_id && o.target_id == target.object_id)
        {
            options.blocked = blocked;
            return Ok(options.clone());
        }

        let options = CommentOptions {
            id: state.options.len() as i32 + 1,
            target_ct_id: target.content_type_id,
            target_id: target.object_id,
            blocked,
        };
        state.options.push(options.clone());
        Ok(options)
    }

    async fn visible_comments(&self, target: &Target) -> Result<Vec<Comment>, StoreError> {
        let state = self.state.lock().await;

        let mut comments: Vec<Comment> = state
            .comments
            .iter()
            .filter(|c| c.belongs_to(target.content_type_id, target.object_id) && c.is_visible())
            .cloned()
            .collect();
        comments.sort_by_key(|c| (c.submit_date, c.id));

        Ok(comments)
    }

    async fn get_comment(&self, id: i32) -> Result<Option<Comment>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.comments.iter().find(|c| c.id == id).cloned())
    }

    async fn insert_comment(&self, comment: NewComment) -> Result<Comment, StoreError> {
        let mut state = self.state.lock().await;

        let comment = Comment {
            id: state.comments.len() as i32 + 1,
            content_type_id: comment.content_type_id,
            object_id: comment.object_id,
            parent_id: comment.parent_id,
            site_id: comment.site_id,
            user_name: comment.user_name,
            user_email: comment.user_email,
            user_url: comment.user_url,
            comment: comment.comment,
            submit_date: comment.submit_date,
            ip_address: comment.ip_address,
            is_public: comment.is_public,
            is_removed: comment.is_removed,
        };
        state.comments.push(comment.clone());

        Ok(comment)
    }

    async fn count_comments(&self, filter: &CommentFilter) -> Result<i64, StoreError> {
        let state = self.state.lock().await;
        Ok(state.comments.iter().filter(|c| filter.matches(c)).count() as i64)
    }

    async fn list_comments(
        &self,
        filter: &CommentFilter,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Comment>, StoreError> {
        let state = self.state.lock().await;

        let mut comments: Vec<Comment> = state
            .comments
            .iter()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        comments.sort_by_key(|c| std::cmp::Reverse((c.submit_date, c.id)));

        Ok(comments
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn moderate_comment(
        &self,
        id: i32,
        changes: &ModerateComment,
    ) -> Result<Option<Comment>, StoreError> {
        let mut state = self.state.lock().await;

        Ok(state.comments.iter_mut().find(|c| c.id == id).map(|c| {
            changes.apply(c);
            c.clone()
        }))
    }
}
