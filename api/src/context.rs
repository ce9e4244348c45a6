use axum::{Json, extract::FromRequestParts, http::request::Parts};
use serde::Serialize;
use serde_json::Value;

use crate::{
    cache::CacheKey,
    config::{ServerConfig, SiteConfig},
    utils::slugify,
};

/// Values every rendered page gets, whatever the view.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SiteContext {
    #[serde(rename = "MEDIA_URL")]
    pub media_url: String,

    #[serde(rename = "VERSION")]
    pub version: Value,

    #[serde(rename = "SERVER_INFO")]
    pub server_info: Value,

    #[serde(rename = "SITE_NAME")]
    pub site_name: String,

    #[serde(rename = "CURRENT_SITE")]
    pub current_site: SiteConfig,

    #[serde(rename = "ECACHE_INFO", skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
}

impl SiteContext {
    pub fn new(config: &ServerConfig, cache_key: Option<&CacheKey>) -> Self {
        SiteContext {
            media_url: config.context.media_url.clone(),
            version: config.context.version.clone(),
            server_info: config.context.server_info.clone(),
            site_name: slugify(&config.site.name),
            current_site: config.site.clone(),
            cache_key: cache_key.map(|k| k.0.clone()),
        }
    }
}

/// The cache key of the current request, present only when the page cache
/// middleware handled it.
pub struct MaybeCacheKey(pub Option<CacheKey>);

impl<S> FromRequestParts<S> for MaybeCacheKey
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeCacheKey(parts.extensions.get::<CacheKey>().cloned()))
    }
}

/// A view's own context merged with the site context.
#[derive(Serialize)]
pub struct RenderContext<T: Serialize> {
    #[serde(flatten)]
    pub site: SiteContext,

    #[serde(flatten)]
    pub view: T,
}

pub fn render<T: Serialize>(
    config: &ServerConfig,
    cache_key: &MaybeCacheKey,
    view: T,
) -> Json<RenderContext<T>> {
    Json(RenderContext {
        site: SiteContext::new(config, cache_key.0.as_ref()),
        view,
    })
}
