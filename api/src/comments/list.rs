use axum::{
    Json,
    extract::{Path, State},
};
use axum_extra::extract::Query;
use serde::{Deserialize, Serialize};

use crate::{
    App,
    context::{MaybeCacheKey, RenderContext, render},
    error::{AppError, request_error},
    target::Target,
};

use super::{
    gate::{TargetPath, open_target},
    paginate::{PageInfo, page_number, paginate},
    tree::{ThreadedComment, threaded_order},
};

#[derive(Deserialize, Debug, Default)]
pub struct ListQuery {
    p: Option<String>,

    /// Branch roots, either repeated (`ids=1&ids=5`) or comma separated.
    #[serde(default)]
    ids: Vec<String>,
}

impl ListQuery {
    /// `None` when no branch was asked for. Ids that aren't numbers can't
    /// match any comment and are dropped.
    fn branches(&self) -> Option<Vec<i32>> {
        if self.ids.iter().all(|ids| ids.trim().is_empty()) {
            return None;
        }

        Some(
            self.ids
                .iter()
                .flat_map(|ids| ids.split(','))
                .filter_map(|id| id.trim().parse().ok())
                .collect(),
        )
    }
}

#[derive(Serialize)]
pub struct CommentListView {
    pub object: Target,
    pub comment_list: Vec<ThreadedComment>,
    pub page: PageInfo,
    pub is_paginated: bool,
}

pub async fn list_comments(
    State(ctx): State<App>,
    Path(path): Path<TargetPath>,
    Query(query): Query<ListQuery>,
    cache_key: MaybeCacheKey,
) -> Result<Json<RenderContext<CommentListView>>, AppError> {
    let target = open_target(&ctx, &path).await?;

    let comments = ctx.store.visible_comments(&target).await?;
    let branches = query.branches();
    let ordered = threaded_order(
        comments,
        branches.as_deref(),
        ctx.config.comments.orphans,
    );

    let page = paginate(
        ordered,
        page_number(query.p.as_deref()),
        ctx.config.comments.paginate_by,
    )
    .map_err(request_error)?;

    Ok(render(
        &ctx.config,
        &cache_key,
        CommentListView {
            object: target,
            is_paginated: page.info.num_pages > 1,
            comment_list: page.items,
            page: page.info,
        },
    ))
}
