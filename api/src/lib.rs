use std::sync::Arc;

use axum::{
    Router,
    http::{HeaderValue, Method},
    routing::get,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod admin;
pub mod cache;
pub mod comments;
pub mod config;
pub mod context;
pub mod error;
pub mod extract;
pub mod models;
pub mod real_ip;
pub mod schema;
pub mod store;
pub mod target;
pub mod utils;

#[cfg(test)]
mod tests;

use admin::AdminSite;
use cache::PageCache;
use comments::security::TokenSigner;
use config::ServerConfig;
use store::CommentStore;
use target::TargetRegistry;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct App {
    pub config: Arc<ServerConfig>,
    pub store: Arc<dyn CommentStore>,
    pub targets: Arc<TargetRegistry>,
    pub admin: Arc<AdminSite>,
    pub signer: Arc<TokenSigner>,
    pub page_cache: Option<Arc<PageCache>>,
}

impl App {
    pub fn new(config: ServerConfig, store: Arc<dyn CommentStore>) -> Self {
        let models_with_comments = &config.comments.models_with_comments;

        let mut targets = TargetRegistry::new();
        for content_type in models_with_comments {
            targets.register(content_type.clone(), store.publishable_loader(content_type));
        }

        let admin = AdminSite::for_comments(models_with_comments);
        let signer = TokenSigner::new(config.secret_key.clone(), config.comments.token_max_age);
        let page_cache = config.cache_ttl.map(|ttl| Arc::new(PageCache::new(ttl)));

        App {
            config: Arc::new(config),
            store,
            targets: Arc::new(targets),
            admin: Arc::new(admin),
            signer: Arc::new(signer),
            page_cache,
        }
    }
}

fn cors(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(origin) => Some(origin),
            Err(e) => {
                tracing::warn!(%origin, error = %e, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
}

async fn health() -> &'static str {
    "ok"
}

pub fn router(ctx: App) -> Router {
    let mut router = Router::<App>::new()
        .route("/health", get(health))
        .merge(comments::routes::route(&ctx));

    if ctx.config.admin_token.is_some() {
        router = router.nest("/admin", admin::routes::route());
    } else {
        tracing::info!("`ADMIN_TOKEN` is not set, admin routes are disabled");
    }

    router
        .layer(TraceLayer::new_for_http())
        .layer(cors(&ctx.config))
        .with_state(ctx)
}
