use std::{collections::BTreeMap, net::IpAddr};

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::{
    App,
    config::Env,
    context::{MaybeCacheKey, RenderContext, render},
    error::{AppError, request_error},
    extract::Form,
    models::comment::{Comment, NewComment},
    real_ip::ClientIp,
    target::Target,
    utils::now_timestamp,
};

use super::{
    gate::{TargetPath, open_target},
    security::{SecurityData, SubmittedSecurity},
};

const MAX_NAME_LENGTH: usize = 50;
const MAX_EMAIL_LENGTH: usize = 100;
const MAX_URL_LENGTH: usize = 200;

pub type FieldErrors = BTreeMap<&'static str, Vec<String>>;

/// The comment form as posted by the browser.
#[derive(Deserialize, Serialize, Debug, Default, Clone)]
#[serde(default)]
pub struct CommentSubmission {
    pub name: String,
    pub email: String,
    pub url: String,
    pub comment: String,
    pub parent: Option<String>,
    pub content_type: Option<String>,
    pub object_pk: Option<String>,
    pub timestamp: Option<String>,
    pub security_hash: Option<String>,
    pub honeypot: Option<String>,
}

/// Field values that passed validation, normalized.
#[derive(Debug, PartialEq)]
pub struct CleanComment {
    pub name: String,
    pub email: String,
    pub url: String,
    pub comment: String,
}

impl CommentSubmission {
    pub fn security(&self) -> SubmittedSecurity<'_> {
        SubmittedSecurity {
            content_type: self.content_type.as_deref(),
            object_pk: self.object_pk.as_deref(),
            timestamp: self.timestamp.as_deref(),
            security_hash: self.security_hash.as_deref(),
            honeypot: self.honeypot.as_deref(),
        }
    }

    /// The parent from the form body wins over the one in the URL.
    pub fn parent_id(&self, path_parent: Option<i32>) -> Result<Option<i32>, String> {
        match self.parent.as_deref().map(str::trim) {
            Some(parent) if !parent.is_empty() => parent
                .parse()
                .map(Some)
                .map_err(|_| format!("`{parent}` is not a comment id")),
            _ => Ok(path_parent),
        }
    }

    pub fn clean(&self, max_length: usize) -> Result<CleanComment, FieldErrors> {
        let mut errors = FieldErrors::new();
        let mut error = |field: &'static str, msg: String| {
            errors.entry(field).or_default().push(msg);
        };

        let name = self.name.trim().to_string();
        if name.is_empty() {
            error("name", "This field is required.".into());
        } else if name.chars().count() > MAX_NAME_LENGTH {
            error(
                "name",
                format!("Ensure this value has at most {MAX_NAME_LENGTH} characters."),
            );
        }

        let email = self.email.trim().to_lowercase();
        if email.is_empty() {
            error("email", "This field is required.".into());
        } else if email.chars().count() > MAX_EMAIL_LENGTH {
            error(
                "email",
                format!("Ensure this value has at most {MAX_EMAIL_LENGTH} characters."),
            );
        } else if !email.contains('@') {
            error("email", "Enter a valid email address.".into());
        }

        let url = match clean_url(&self.url) {
            Ok(url) => url,
            Err(msg) => {
                error("url", msg);
                String::new()
            }
        };

        let comment = self.comment.trim().to_string();
        if comment.is_empty() {
            error("comment", "This field is required.".into());
        } else if comment.chars().count() > max_length {
            error(
                "comment",
                format!("Ensure your comment has at most {max_length} characters."),
            );
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(CleanComment {
            name,
            email,
            url,
            comment,
        })
    }
}

// an address without a scheme is taken as http
fn clean_url(raw: &str) -> Result<String, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(String::new());
    }

    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };

    match url::Url::parse(&candidate) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => {
            let url = url.to_string();
            if url.chars().count() > MAX_URL_LENGTH {
                return Err(format!(
                    "Ensure this value has at most {MAX_URL_LENGTH} characters."
                ));
            }
            Ok(url)
        }
        _ => Err("Enter a valid URL.".into()),
    }
}

/// What a comment form is rendered with: the security data plus the fields
/// the browser must send back untouched.
#[derive(Serialize, Debug)]
pub struct CommentForm {
    #[serde(flatten)]
    pub security: SecurityData,
    pub parent: Option<i32>,
    pub honeypot: String,
}

#[derive(Serialize)]
pub struct FormView {
    pub object: Target,
    pub form: CommentForm,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<Comment>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ReplyPath {
    pub content_type: String,
    pub object_id: String,
    pub parent_id: String,
}

impl ReplyPath {
    fn split(self) -> (TargetPath, String) {
        (
            TargetPath {
                content_type: self.content_type,
                object_id: self.object_id,
            },
            self.parent_id,
        )
    }
}

/// A comment that can be replied to: visible and on the same target.
async fn find_parent(
    ctx: &App,
    target: &Target,
    parent_id: i32,
) -> Result<Option<Comment>, AppError> {
    let parent = ctx.store.get_comment(parent_id).await?;

    Ok(parent.filter(|c| c.belongs_to(target.content_type_id, target.object_id) && c.is_visible()))
}

fn form_view(ctx: &App, target: Target, parent: Option<Comment>) -> FormView {
    let parent_id = parent.as_ref().map(|p| p.id);
    FormView {
        form: CommentForm {
            security: ctx.signer.generate(&target, parent_id, now_timestamp()),
            parent: parent_id,
            honeypot: String::new(),
        },
        object: target,
        parent,
    }
}

pub async fn get_form(
    State(ctx): State<App>,
    Path(path): Path<TargetPath>,
    cache_key: MaybeCacheKey,
) -> Result<Json<RenderContext<FormView>>, AppError> {
    let target = open_target(&ctx, &path).await?;

    Ok(render(&ctx.config, &cache_key, form_view(&ctx, target, None)))
}

pub async fn get_reply_form(
    State(ctx): State<App>,
    Path(path): Path<ReplyPath>,
    cache_key: MaybeCacheKey,
) -> Result<Json<RenderContext<FormView>>, AppError> {
    let (path, parent_id) = path.split();
    let target = open_target(&ctx, &path).await?;

    let parent = match parent_id.parse() {
        Ok(parent_id) => find_parent(&ctx, &target, parent_id).await?,
        Err(_) => None,
    };
    let Some(parent) = parent else {
        return Err(AppError::not_found("The comment you're replying to does not exist"));
    };

    Ok(render(
        &ctx.config,
        &cache_key,
        form_view(&ctx, target, Some(parent)),
    ))
}

pub async fn post_comment(
    State(ctx): State<App>,
    Path(path): Path<TargetPath>,
    ClientIp(ip): ClientIp,
    submission: Result<Form<CommentSubmission>, AppError>,
) -> Result<Response, AppError> {
    submit(ctx, path, None, ip, submission).await
}

pub async fn post_reply(
    State(ctx): State<App>,
    Path(path): Path<ReplyPath>,
    ClientIp(ip): ClientIp,
    submission: Result<Form<CommentSubmission>, AppError>,
) -> Result<Response, AppError> {
    let (path, parent_id) = path.split();
    let parent_id: i32 = parent_id
        .parse()
        .map_err(|_| AppError::not_found("The comment you're replying to does not exist"))?;

    submit(ctx, path, Some(parent_id), ip, submission).await
}

async fn submit(
    ctx: App,
    path: TargetPath,
    path_parent: Option<i32>,
    ip: IpAddr,
    submission: Result<Form<CommentSubmission>, AppError>,
) -> Result<Response, AppError> {
    let target = open_target(&ctx, &path).await?;
    let Form(submission) = submission?;

    // Adds the submitted form to a rejection while developing
    let debug_form = |err: AppError| -> AppError {
        if ctx.config.env == Env::Dev {
            err.with_debug_info(
                "form_data",
                serde_json::to_value(&submission).unwrap_or_default(),
            )
        } else {
            err
        }
    };

    let parent_id = submission
        .parent_id(path_parent)
        .map_err(|msg| debug_form(AppError::bad_request(msg)))?;

    ctx.signer
        .verify(&target, parent_id, &submission.security(), now_timestamp())
        .map_err(|e| debug_form(request_error(e)))?;

    let clean = submission
        .clean(ctx.config.comments.max_length)
        .map_err(|errors| {
            debug_form(
                AppError::bad_request("The comment form has errors")
                    .with_debug_info("form_errors", serde_json::json!(errors)),
            )
        })?;

    if let Some(parent_id) = parent_id {
        if find_parent(&ctx, &target, parent_id).await?.is_none() {
            return Err(debug_form(AppError::bad_request(
                "You're replying to a comment that does not belong to this object",
            )));
        }
    }

    let comment = ctx
        .store
        .insert_comment(NewComment {
            content_type_id: target.content_type_id,
            object_id: target.object_id,
            parent_id,
            site_id: ctx.config.site.id,
            user_name: clean.name,
            user_email: clean.email,
            user_url: clean.url,
            comment: clean.comment,
            submit_date: chrono::Utc::now().naive_utc(),
            ip_address: Some(ip.to_string()),
            is_public: true,
            is_removed: false,
        })
        .await?;

    tracing::info!(
        comment_id = comment.id,
        parent_id = ?comment.parent_id,
        content_type = %target.content_type,
        object_id = target.object_id,
        %ip,
        "comment posted"
    );

    let location = format!("{}/posted?c={}", target.comments_path(), comment.id);
    Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
}

#[derive(Deserialize, Debug)]
pub struct PostedQuery {
    c: Option<String>,
}

#[derive(Serialize)]
pub struct PostedView {
    pub object: Target,
    pub comment: Comment,
}

pub async fn comment_posted(
    State(ctx): State<App>,
    Path(path): Path<TargetPath>,
    Query(query): Query<PostedQuery>,
    cache_key: MaybeCacheKey,
) -> Result<Json<RenderContext<PostedView>>, AppError> {
    let target = open_target(&ctx, &path).await?;

    let comment = match query.c.as_deref().map(|c| c.trim().parse::<i32>()) {
        Some(Ok(id)) => ctx
            .store
            .get_comment(id)
            .await?
            .filter(|c| c.belongs_to(target.content_type_id, target.object_id)),
        _ => None,
    };
    let Some(comment) = comment else {
        return Err(AppError::not_found("No such comment"));
    };

    Ok(render(
        &ctx.config,
        &cache_key,
        PostedView {
            object: target,
            comment,
        },
    ))
}
