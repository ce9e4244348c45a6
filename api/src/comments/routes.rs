use axum::{Router, middleware, routing::get};

use crate::{App, cache::page_cache};

use super::{
    list::list_comments,
    submit::{comment_posted, get_form, get_reply_form, post_comment, post_reply},
};

pub fn route(ctx: &App) -> Router<App> {
    // only the listing is cached, forms carry a fresh timestamp
    let listing = Router::<App>::new()
        .route("/{content_type}/{object_id}/comments", get(list_comments))
        .route_layer(middleware::from_fn_with_state(ctx.clone(), page_cache));

    Router::<App>::new()
        .route(
            "/{content_type}/{object_id}/comments/new",
            get(get_form).post(post_comment),
        )
        .route(
            "/{content_type}/{object_id}/comments/new/{parent_id}",
            get(get_reply_form).post(post_reply),
        )
        .route(
            "/{content_type}/{object_id}/comments/posted",
            get(comment_posted),
        )
        .merge(listing)
}
