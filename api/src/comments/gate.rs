use serde::Deserialize;

use crate::{
    App,
    error::AppError,
    store::{CommentStore, StoreError},
    target::{ContentTypeTag, Target, TargetRef},
};

/// `/{content_type}/{object_id}` as captured from the URL. Both parts are
/// kept as strings so a malformed one is answered like a missing target.
#[derive(Deserialize, Debug, Clone)]
pub struct TargetPath {
    pub content_type: String,
    pub object_id: String,
}

impl TargetPath {
    pub fn target_ref(&self) -> Option<TargetRef> {
        Some(TargetRef {
            content_type: self.content_type.parse::<ContentTypeTag>().ok()?,
            object_id: self.object_id.parse().ok()?,
        })
    }
}

pub async fn is_blocked(store: &dyn CommentStore, target: &Target) -> Result<bool, StoreError> {
    Ok(store
        .comment_options(target)
        .await?
        .is_some_and(|options| options.blocked))
}

/// Resolves a target whose content type accepts comments. Blocking is not
/// considered.
pub async fn lookup_target(ctx: &App, path: &TargetPath) -> Result<Target, AppError> {
    let Some(target_ref) = path.target_ref() else {
        return Err(AppError::not_found("No such object"));
    };

    ctx.targets
        .resolve(&target_ref)
        .await?
        .ok_or_else(|| AppError::not_found("No such object"))
}

/// Resolves a target for the public comment views. A blocked target looks
/// exactly like a missing one.
pub async fn open_target(ctx: &App, path: &TargetPath) -> Result<Target, AppError> {
    let target = lookup_target(ctx, path).await?;

    if is_blocked(ctx.store.as_ref(), &target).await? {
        tracing::debug!(
            content_type = %target.content_type,
            object_id = target.object_id,
            "comments are blocked"
        );
        return Err(AppError::not_found("No such object"));
    }

    Ok(target)
}
