use std::{sync::Arc, time::Duration};

use axum::{
    body::{Body, Bytes, HttpBody},
    extract::{Path, Request, State},
    http::{HeaderValue, Method, StatusCode, Uri, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};

use crate::{
    App,
    comments::gate::{TargetPath, open_target},
};

const MAX_CACHED_BODY: usize = 4 * 1024 * 1024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheKey(pub String);

impl CacheKey {
    pub fn for_request(method: &Method, uri: &Uri) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(method.as_str().as_bytes());
        hasher.update(b"\n");
        hasher.update(uri.path().as_bytes());
        hasher.update(b"\n");
        hasher.update(uri.query().unwrap_or_default().as_bytes());
        CacheKey(format!("ecache:{}", hex::encode(hasher.finalize())))
    }
}

#[derive(Clone)]
struct CachedPage {
    content_type: Option<HeaderValue>,
    body: Bytes,
}

impl IntoResponse for CachedPage {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        if let Some(content_type) = self.content_type {
            response
                .headers_mut()
                .insert(header::CONTENT_TYPE, content_type);
        }
        response
            .headers_mut()
            .insert("x-cache", HeaderValue::from_static("HIT"));
        response
    }
}

/// Whole-response cache for GET requests, expiring entries after a fixed TTL.
pub struct PageCache {
    entries: Arc<retainer::Cache<String, CachedPage>>,
    ttl: Duration,
}

impl PageCache {
    pub fn new(ttl: Duration) -> Self {
        PageCache {
            entries: Arc::new(retainer::Cache::new()),
            ttl,
        }
    }

    /// Purges expired entries in the background.
    pub fn spawn_monitor(&self) -> tokio::task::JoinHandle<()> {
        let entries = self.entries.clone();
        tokio::spawn(async move { entries.monitor(4, 0.25, Duration::from_secs(3)).await })
    }
}

/// Caches successful comment listings. A hit is only replayed while the
/// target is still open for comments.
pub async fn page_cache(
    State(ctx): State<App>,
    Path(path): Path<TargetPath>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(cache) = ctx.page_cache.clone() else {
        return next.run(req).await;
    };

    if req.method() != Method::GET {
        return next.run(req).await;
    }

    let key = CacheKey::for_request(req.method(), req.uri());

    if let Some(guard) = cache.entries.get(&key.0).await {
        let page: CachedPage = (*guard).clone();
        drop(guard);

        if let Err(e) = open_target(&ctx, &path).await {
            cache.entries.remove(&key.0).await;
            return e.into_response();
        }
        tracing::debug!(key = %key.0, "page cache hit");
        return page.into_response();
    }

    req.extensions_mut().insert(key.clone());
    let response = next.run(req).await;

    if response.status() != StatusCode::OK {
        return response;
    }
    if response
        .body()
        .size_hint()
        .upper()
        .is_none_or(|size| size > MAX_CACHED_BODY as u64)
    {
        tracing::debug!(key = %key.0, "response too large for the page cache");
        return response;
    }

    let (parts, body) = response.into_parts();
    match axum::body::to_bytes(body, MAX_CACHED_BODY).await {
        Ok(body) => {
            cache
                .entries
                .insert(
                    key.0,
                    CachedPage {
                        content_type: parts.headers.get(header::CONTENT_TYPE).cloned(),
                        body: body.clone(),
                    },
                    cache.ttl,
                )
                .await;
            Response::from_parts(parts, Body::from(body))
        }
        Err(e) => {
            tracing::warn!(error = %e, "could not buffer response for the page cache");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
