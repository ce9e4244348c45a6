use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::get,
};
use serde::{Deserialize, Serialize};

use crate::{
    App,
    comments::{
        gate::{TargetPath, lookup_target},
        paginate::{PageInfo, page_number},
    },
    error::{AppError, request_error},
    extract,
    models::comment::{Comment, ModerateComment},
    store::CommentFilter,
    target::Target,
};

use super::{AdminSite, AdminUser, COMMENT_OPTIONS};

pub fn route() -> Router<App> {
    Router::<App>::new()
        .route("/registry", get(registry))
        .route("/comments", get(list_comments))
        .route(
            "/comments/{comment_id}",
            get(get_comment).patch(moderate_comment),
        )
        .route(
            "/{content_type}/{object_id}/comment-options",
            get(get_comment_options).put(put_comment_options),
        )
}

async fn registry(State(ctx): State<App>, _: AdminUser) -> Json<AdminSite> {
    Json(ctx.admin.as_ref().clone())
}

/// A comment with the fields hidden from the public views.
#[derive(Serialize)]
pub struct AdminComment {
    #[serde(flatten)]
    comment: Comment,
    user_email: String,
    ip_address: Option<String>,
}

impl From<Comment> for AdminComment {
    fn from(comment: Comment) -> Self {
        AdminComment {
            user_email: comment.user_email.clone(),
            ip_address: comment.ip_address.clone(),
            comment,
        }
    }
}

#[derive(Deserialize, Debug, Default)]
pub struct AdminCommentsQuery {
    ct: Option<String>,
    object_id: Option<String>,
    is_public: Option<bool>,
    is_removed: Option<bool>,
    p: Option<String>,
}

#[derive(Serialize)]
pub struct AdminCommentList {
    comment_list: Vec<AdminComment>,
    page: PageInfo,
}

async fn list_comments(
    State(ctx): State<App>,
    _: AdminUser,
    Query(query): Query<AdminCommentsQuery>,
) -> Result<Json<AdminCommentList>, AppError> {
    let mut filter = CommentFilter {
        is_public: query.is_public,
        is_removed: query.is_removed,
        ..Default::default()
    };

    match (query.ct, query.object_id) {
        (Some(content_type), Some(object_id)) => {
            let target = lookup_target(&ctx, &TargetPath {
                content_type,
                object_id,
            })
            .await?;
            filter.content_type_id = Some(target.content_type_id);
            filter.object_id = Some(target.object_id);
        }
        (None, None) => {}
        _ => {
            return Err(AppError::bad_request(
                "Filtering by target needs both `ct` and `object_id`",
            ));
        }
    }

    let count = ctx.store.count_comments(&filter).await?;
    let page = PageInfo::new(
        count as usize,
        page_number(query.p.as_deref()),
        ctx.config.comments.paginate_by,
    )
    .map_err(request_error)?;

    let range = page.range();
    let comments = ctx
        .store
        .list_comments(&filter, range.start as i64, page.per_page as i64)
        .await?;

    Ok(Json(AdminCommentList {
        comment_list: comments.into_iter().map(AdminComment::from).collect(),
        page,
    }))
}

async fn get_comment(
    State(ctx): State<App>,
    _: AdminUser,
    Path(comment_id): Path<i32>,
) -> Result<Json<AdminComment>, AppError> {
    ctx.store
        .get_comment(comment_id)
        .await?
        .map(|c| Json(c.into()))
        .ok_or_else(|| AppError::not_found("No such comment"))
}

async fn moderate_comment(
    State(ctx): State<App>,
    _: AdminUser,
    Path(comment_id): Path<i32>,
    extract::Json(changes): extract::Json<ModerateComment>,
) -> Result<Json<AdminComment>, AppError> {
    if changes.is_empty() {
        return Err(AppError::bad_request(
            "Nothing to change, expected `is_public` or `is_removed`",
        ));
    }

    let comment = ctx
        .store
        .moderate_comment(comment_id, &changes)
        .await?
        .ok_or_else(|| AppError::not_found("No such comment"))?;

    tracing::info!(
        comment_id,
        is_public = comment.is_public,
        is_removed = comment.is_removed,
        "comment moderated"
    );

    Ok(Json(comment.into()))
}

#[derive(Serialize)]
pub struct CommentOptionsView {
    object: Target,
    id: Option<i32>,
    blocked: bool,
}

#[derive(Deserialize, Debug)]
pub struct CommentOptionsUpdate {
    blocked: bool,
}

/// Resolves a target whose admin page carries the options inline.
async fn options_target(ctx: &App, path: &TargetPath) -> Result<Target, AppError> {
    let target = lookup_target(ctx, path).await?;
    if !ctx.admin.has_inline(&target.content_type, COMMENT_OPTIONS) {
        return Err(AppError::not_found("No such object"));
    }
    Ok(target)
}

async fn get_comment_options(
    State(ctx): State<App>,
    _: AdminUser,
    Path(path): Path<TargetPath>,
) -> Result<Json<CommentOptionsView>, AppError> {
    let target = options_target(&ctx, &path).await?;
    let options = ctx.store.comment_options(&target).await?;

    Ok(Json(CommentOptionsView {
        object: target,
        id: options.as_ref().map(|o| o.id),
        blocked: options.is_some_and(|o| o.blocked),
    }))
}

async fn put_comment_options(
    State(ctx): State<App>,
    _: AdminUser,
    Path(path): Path<TargetPath>,
    extract::Json(update): extract::Json<CommentOptionsUpdate>,
) -> Result<Json<CommentOptionsView>, AppError> {
    let target = options_target(&ctx, &path).await?;
    let options = ctx
        .store
        .upsert_comment_options(&target, update.blocked)
        .await?;

    tracing::info!(
        content_type = %target.content_type,
        object_id = target.object_id,
        blocked = options.blocked,
        "comment options updated"
    );

    Ok(Json(CommentOptionsView {
        object: target,
        id: Some(options.id),
        blocked: options.blocked,
    }))
}
