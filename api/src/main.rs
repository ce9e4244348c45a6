use std::{net::SocketAddr, sync::Arc};

use commentary::{
    App,
    config::{Env, ServerConfig},
    router,
    store::{CommentStore, MemoryStore, PgStore},
    target::ContentTypeTag,
};
use dotenv::dotenv;
use eyre::WrapErr;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn init_tracing(env: &Env) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if *env == Env::Production {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// A store with one article to comment on, for running without Postgres.
async fn demo_store(config: &ServerConfig) -> MemoryStore {
    let store = MemoryStore::new();
    let article = config
        .comments
        .models_with_comments
        .first()
        .cloned()
        .unwrap_or_else(|| ContentTypeTag::new("articles", "article"));
    let publishable = store
        .add_publishable(&article, "Hello, world", "hello-world")
        .await;

    tracing::info!(
        "no `DATABASE_URL`, using the in-memory store with a demo object at /{}/{}/comments",
        article,
        publishable.id
    );
    store
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenv().ok();

    init_tracing(&Env::from_env());

    let config = ServerConfig::new_from_env();

    let store: Arc<dyn CommentStore> = match &config.database {
        Some(database) => Arc::new(
            PgStore::connect(&database.url, database.pool_size)
                .wrap_err("couldn't create the database pool")?,
        ),
        None => Arc::new(demo_store(&config).await),
    };

    let addr = config.listen_addr;
    let ctx = App::new(config, store);
    if let Some(cache) = &ctx.page_cache {
        cache.spawn_monitor();
    }

    let app = router(ctx);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("couldn't bind to {addr}"))?;
    tracing::info!("listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .wrap_err("server error")?;

    Ok(())
}
