use std::collections::BTreeMap;

use axum::http::{StatusCode, header, request::Parts};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::{
    App,
    error::{ApiRequestError, AppError, request_error},
    target::ContentTypeTag,
};

pub mod routes;

pub const COMMENT: &str = "comments.comment";
pub const COMMENT_OPTIONS: &str = "comments.commentoptions";

/// An inline editor shown on another model's admin page.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct InlineAdmin {
    pub model: &'static str,
    /// How many rows one parent object may have.
    pub max_num: usize,
}

#[derive(Serialize, Debug, Clone, Default, PartialEq)]
pub struct ModelAdmin {
    pub list_filter: Vec<&'static str>,
    pub editable_fields: Vec<&'static str>,
    pub inlines: Vec<InlineAdmin>,
}

/// What the admin exposes, keyed by `app_label.model`.
#[derive(Serialize, Debug, Clone, Default)]
pub struct AdminSite {
    models: BTreeMap<String, ModelAdmin>,
}

impl AdminSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, model: impl Into<String>, admin: ModelAdmin) {
        let model = model.into();
        tracing::debug!(%model, "registering admin");
        self.models.insert(model, admin);
    }

    /// Adds `inline` to each model, registering a plain admin for models
    /// that don't have one yet. Appending twice is a no-op.
    pub fn append_inline<'a>(
        &mut self,
        models: impl IntoIterator<Item = &'a ContentTypeTag>,
        inline: InlineAdmin,
    ) {
        for model in models {
            let admin = self.models.entry(model.to_string()).or_default();
            if !admin.inlines.iter().any(|i| i.model == inline.model) {
                admin.inlines.push(inline.clone());
            }
        }
    }

    pub fn get(&self, model: &str) -> Option<&ModelAdmin> {
        self.models.get(model)
    }

    pub fn has_inline(&self, model: &ContentTypeTag, inline: &str) -> bool {
        self.models
            .get(&model.to_string())
            .is_some_and(|admin| admin.inlines.iter().any(|i| i.model == inline))
    }

    /// The comment admin plus a single-row options inline on every
    /// commentable content type.
    pub fn for_comments(models_with_comments: &[ContentTypeTag]) -> Self {
        let mut site = AdminSite::new();
        site.register(
            COMMENT,
            ModelAdmin {
                list_filter: vec!["content_type", "object_id", "is_public", "is_removed"],
                editable_fields: vec!["is_public", "is_removed"],
                inlines: vec![],
            },
        );
        site.append_inline(
            models_with_comments,
            InlineAdmin {
                model: COMMENT_OPTIONS,
                max_num: 1,
            },
        );
        site
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("Admin authentication required, no bearer token found in headers")]
    NoToken,

    #[error("Invalid admin token")]
    Invalid,
}

impl ApiRequestError for AuthError {
    fn status_code(&self) -> StatusCode {
        StatusCode::UNAUTHORIZED
    }
}

/// A request carrying `Authorization: Bearer {ADMIN_TOKEN}`.
pub struct AdminUser;

impl axum::extract::FromRequestParts<App> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &App) -> Result<Self, Self::Rejection> {
        let Some(expected) = state.config.admin_token.as_deref() else {
            return Err(request_error(AuthError::Invalid));
        };

        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| request_error(AuthError::NoToken))?;

        if Sha256::digest(token.trim().as_bytes()) != Sha256::digest(expected.as_bytes()) {
            tracing::warn!("rejected admin request with an invalid token");
            return Err(request_error(AuthError::Invalid));
        }

        Ok(AdminUser)
    }
}
