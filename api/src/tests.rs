use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Router,
    body::Body,
    extract::connect_info::MockConnectInfo,
    http::{Request, StatusCode, header},
    response::Response,
};
use chrono::NaiveDate;
use serde_json::Value;
use tower::ServiceExt;

use crate::{
    App,
    comments::security::TokenSigner,
    config::ServerConfig,
    models::comment::{Comment, NewComment},
    router,
    store::{CommentFilter, CommentStore, MemoryStore},
    target::{ContentTypeTag, Target, TargetLoader},
    utils::now_timestamp,
};

const ADMIN_TOKEN: &str = "let-me-in";

struct Fixture {
    store: MemoryStore,
    target: Target,
    app: Router,
}

impl Fixture {
    async fn new(config: ServerConfig) -> Self {
        let store = MemoryStore::new();
        let article = ContentTypeTag::new("articles", "article");
        let publishable = store.add_publishable(&article, "Hello", "hello").await;
        let target = store
            .publishable_loader(&article)
            .load(publishable.id)
            .await
            .unwrap()
            .unwrap();

        let app = router(App::new(config, Arc::new(store.clone())))
            .layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));

        Fixture { store, target, app }
    }

    async fn comment(&self, parent: Option<&Comment>, minute: u32) -> Comment {
        self.store
            .insert_comment(NewComment {
                content_type_id: self.target.content_type_id,
                object_id: self.target.object_id,
                parent_id: parent.map(|p| p.id),
                site_id: 1,
                user_name: "Honza".into(),
                user_email: "honza@example.com".into(),
                user_url: String::new(),
                comment: format!("posted at minute {minute}"),
                submit_date: NaiveDate::from_ymd_opt(2024, 5, 1)
                    .unwrap()
                    .and_hms_opt(12, minute, 0)
                    .unwrap(),
                ip_address: None,
                is_public: true,
                is_removed: false,
            })
            .await
            .unwrap()
    }

    /// A, D roots; AB, AC replies to A; DE reply to D; DEF reply to DE.
    async fn thread(&self) -> [Comment; 6] {
        let a = self.comment(None, 0).await;
        let d = self.comment(None, 1).await;
        let ab = self.comment(Some(&a), 2).await;
        let de = self.comment(Some(&d), 3).await;
        let ac = self.comment(Some(&a), 4).await;
        let def = self.comment(Some(&de), 5).await;
        [a, ab, ac, d, de, def]
    }

    fn path(&self, rest: &str) -> String {
        format!("{}{rest}", self.target.comments_path())
    }

    async fn send(&self, req: Request<Body>) -> Response {
        self.app.clone().oneshot(req).await.unwrap()
    }

    async fn get(&self, uri: &str) -> Response {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    async fn post_form(&self, uri: &str, fields: &[(&str, &str)]) -> Response {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        self.send(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }

    async fn admin(&self, method: &str, uri: &str, body: Option<Value>) -> Response {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {ADMIN_TOKEN}"));
        let req = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        };
        self.send(req.unwrap()).await
    }

    async fn stored_count(&self) -> i64 {
        self.store
            .count_comments(&CommentFilter::default())
            .await
            .unwrap()
    }
}

async fn json(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn listed_ids(context: &Value) -> Vec<i64> {
    context["comment_list"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["id"].as_i64().unwrap())
        .collect()
}

fn ids(comments: &[&Comment]) -> Vec<i64> {
    comments.iter().map(|c| c.id as i64).collect()
}

fn paged_config(per_page: usize) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.comments.paginate_by = per_page;
    config
}

/// Renders the (reply) form and fills it in the way a browser would.
async fn filled_form(fx: &Fixture, form_uri: &str) -> Vec<(&'static str, String)> {
    let response = fx.get(form_uri).await;
    assert_eq!(response.status(), StatusCode::OK);
    let form = json(response).await["form"].clone();

    let text = |key: &str| match &form[key] {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    };

    vec![
        ("name", "Honza".into()),
        ("email", "honza@example.com".into()),
        ("url", String::new()),
        ("comment", "I like this app".into()),
        ("parent", text("parent")),
        ("content_type", text("content_type")),
        ("object_pk", text("object_pk")),
        ("timestamp", text("timestamp")),
        ("security_hash", text("security_hash")),
        ("honeypot", String::new()),
    ]
}

fn as_pairs<'a>(fields: &'a [(&'static str, String)]) -> Vec<(&'static str, &'a str)> {
    fields.iter().map(|(k, v)| (*k, v.as_str())).collect()
}

#[tokio::test]
async fn test_list_is_threaded_and_paginated() {
    let fx = Fixture::new(paged_config(3)).await;
    let [a, ab, ac, d, de, def] = fx.thread().await;

    let first = json(fx.get(&fx.path("")).await).await;
    assert_eq!(listed_ids(&first), ids(&[&a, &ab, &ac]));
    assert_eq!(first["page"]["number"], 1);
    assert_eq!(first["page"]["num_pages"], 2);
    assert_eq!(first["is_paginated"], true);
    assert_eq!(first["comment_list"][1]["depth"], 1);
    assert_eq!(first["object"]["title"], "Hello");
    assert!(first["comment_list"][0].get("user_email").is_none());

    let second = json(fx.get(&fx.path("?p=2")).await).await;
    assert_eq!(listed_ids(&second), ids(&[&d, &de, &def]));
    assert_eq!(second["comment_list"][2]["depth"], 2);

    assert_eq!(fx.get(&fx.path("?p=3")).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(fx.get(&fx.path("?p=0")).await.status(), StatusCode::NOT_FOUND);

    let fallback = json(fx.get(&fx.path("?p=abc")).await).await;
    assert_eq!(fallback["page"]["number"], 1);
}

#[tokio::test]
async fn test_page_beyond_a_single_page_is_not_found() {
    let fx = Fixture::new(paged_config(3)).await;
    let a = fx.comment(None, 0).await;
    fx.comment(Some(&a), 1).await;

    assert_eq!(fx.get(&fx.path("")).await.status(), StatusCode::OK);
    let response = fx.get(&fx.path("?p=2")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json(response).await["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_empty_list_has_one_page() {
    let fx = Fixture::new(paged_config(3)).await;

    let context = json(fx.get(&fx.path("")).await).await;
    assert_eq!(listed_ids(&context), Vec::<i64>::new());
    assert_eq!(context["page"]["num_pages"], 1);
}

#[tokio::test]
async fn test_ids_select_branches() {
    let fx = Fixture::new(ServerConfig::default()).await;
    let [a, ab, ac, d, de, def] = fx.thread().await;

    let one = json(fx.get(&fx.path(&format!("?ids={}", a.id))).await).await;
    assert_eq!(listed_ids(&one), ids(&[&a, &ab, &ac]));

    let both = json(
        fx.get(&fx.path(&format!("?ids={}&ids={}", a.id, d.id)))
            .await,
    )
    .await;
    assert_eq!(listed_ids(&both), ids(&[&a, &ab, &ac, &d, &de, &def]));

    let reversed = json(
        fx.get(&fx.path(&format!("?ids={}&ids={}", d.id, a.id)))
            .await,
    )
    .await;
    assert_eq!(listed_ids(&reversed), ids(&[&d, &de, &def, &a, &ab, &ac]));

    let nested = json(fx.get(&fx.path(&format!("?ids={}", de.id))).await).await;
    assert_eq!(listed_ids(&nested), ids(&[&de, &def]));
    assert_eq!(nested["comment_list"][0]["depth"], 1);
}

#[tokio::test]
async fn test_hidden_comments_are_left_out() {
    let fx = Fixture::new(ServerConfig::default()).await;
    let [a, ab, ac, d, de, def] = fx.thread().await;

    fx.store
        .moderate_comment(
            ab.id,
            &crate::models::comment::ModerateComment {
                is_public: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let context = json(fx.get(&fx.path("")).await).await;
    assert_eq!(listed_ids(&context), ids(&[&a, &ac, &d, &de, &def]));
}

#[tokio::test]
async fn test_blocked_target_is_not_found() {
    let fx = Fixture::new(ServerConfig::default()).await;
    let [a, ..] = fx.thread().await;
    let fields = filled_form(&fx, &fx.path("/new")).await;

    fx.store
        .upsert_comment_options(&fx.target, true)
        .await
        .unwrap();

    assert_eq!(fx.get(&fx.path("")).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(fx.get(&fx.path("/new")).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        fx.get(&fx.path(&format!("/new/{}", a.id))).await.status(),
        StatusCode::NOT_FOUND
    );

    let before = fx.stored_count().await;
    let response = fx.post_form(&fx.path("/new"), &as_pairs(&fields)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(fx.stored_count().await, before);
}

#[tokio::test]
async fn test_blocked_target_is_checked_before_the_body() {
    let fx = Fixture::new(ServerConfig::default()).await;
    let bare_post = || {
        Request::post(fx.path("/new"))
            .body(Body::from("name=Honza"))
            .unwrap()
    };

    assert_eq!(fx.send(bare_post()).await.status(), StatusCode::BAD_REQUEST);

    fx.store
        .upsert_comment_options(&fx.target, true)
        .await
        .unwrap();
    assert_eq!(fx.send(bare_post()).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_targets_are_not_found() {
    let fx = Fixture::new(ServerConfig::default()).await;

    for uri in [
        "/articles.article/999/comments",
        "/articles.article/abc/comments",
        "/polls.poll/1/comments",
        "/articles/1/comments",
    ] {
        assert_eq!(fx.get(uri).await.status(), StatusCode::NOT_FOUND, "{uri}");
    }
}

#[tokio::test]
async fn test_reply_is_stored_under_its_parent() {
    let fx = Fixture::new(ServerConfig::default()).await;
    let a = fx.comment(None, 0).await;

    let reply_uri = fx.path(&format!("/new/{}", a.id));
    let form_page = json(fx.get(&reply_uri).await).await;
    assert_eq!(form_page["parent"]["id"], a.id);
    assert_eq!(form_page["form"]["parent"], a.id);
    assert_eq!(form_page["form"]["content_type"], "articles.article");
    assert_eq!(form_page["form"]["honeypot"], "");

    let fields = filled_form(&fx, &reply_uri).await;
    let response = fx.post_form(&reply_uri, &as_pairs(&fields)).await;
    assert_eq!(response.status(), StatusCode::FOUND);

    let location = response.headers()[header::LOCATION].to_str().unwrap().to_string();
    let child = fx
        .store
        .list_comments(&CommentFilter::default(), 0, 1)
        .await
        .unwrap()
        .remove(0);
    assert_eq!(child.parent_id, Some(a.id));
    assert_eq!(child.user_name, "Honza");
    assert_eq!(child.ip_address.as_deref(), Some("127.0.0.1"));
    assert!(child.is_visible());
    assert_eq!(location, fx.path(&format!("/posted?c={}", child.id)));

    let posted = fx.get(&location).await;
    assert_eq!(posted.status(), StatusCode::OK);
    assert_eq!(json(posted).await["comment"]["id"], child.id);

    let listed = json(fx.get(&fx.path("")).await).await;
    assert_eq!(listed_ids(&listed), ids(&[&a, &child]));
}

#[tokio::test]
async fn test_plain_form_posts_a_root_comment() {
    let fx = Fixture::new(ServerConfig::default()).await;

    let form_page = json(fx.get(&fx.path("/new")).await).await;
    assert!(form_page.get("parent").is_none());
    assert_eq!(form_page["form"]["parent"], Value::Null);
    assert_eq!(form_page["CURRENT_SITE"]["domain"], "example.com");

    let fields = filled_form(&fx, &fx.path("/new")).await;
    let response = fx.post_form(&fx.path("/new"), &as_pairs(&fields)).await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(fx.stored_count().await, 1);
}

#[tokio::test]
async fn test_missing_fields_store_nothing() {
    let fx = Fixture::new(ServerConfig::default()).await;
    let mut fields = filled_form(&fx, &fx.path("/new")).await;
    fields.retain(|(key, _)| !matches!(*key, "name" | "comment"));

    let response = fx.post_form(&fx.path("/new"), &as_pairs(&fields)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json(response).await;
    assert_eq!(body["code"], "BAD_REQUEST");
    assert!(body["debug_info"]["form_errors"]["name"].is_array());
    assert!(body["debug_info"]["form_errors"]["comment"].is_array());
    assert_eq!(body["debug_info"]["form_data"]["email"], "honza@example.com");
    assert_eq!(fx.stored_count().await, 0);
}

#[tokio::test]
async fn test_tampered_security_data_is_rejected() {
    let fx = Fixture::new(ServerConfig::default()).await;
    let a = fx.comment(None, 0).await;
    let fields = filled_form(&fx, &fx.path("/new")).await;

    // the token was issued for a root comment
    let mut reparented = fields.clone();
    for (key, value) in reparented.iter_mut() {
        if *key == "parent" {
            *value = a.id.to_string();
        }
    }
    let response = fx.post_form(&fx.path("/new"), &as_pairs(&reparented)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut no_hash = fields.clone();
    no_hash.retain(|(key, _)| *key != "security_hash");
    let response = fx.post_form(&fx.path("/new"), &as_pairs(&no_hash)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut ancient = fields.clone();
    for (key, value) in ancient.iter_mut() {
        if *key == "timestamp" {
            *value = i64::MIN.to_string();
        }
    }
    let response = fx.post_form(&fx.path("/new"), &as_pairs(&ancient)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let mut bot = fields;
    for (key, value) in bot.iter_mut() {
        if *key == "honeypot" {
            *value = "buy now".into();
        }
    }
    let response = fx.post_form(&fx.path("/new"), &as_pairs(&bot)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_eq!(fx.stored_count().await, 1);
}

#[tokio::test]
async fn test_reply_form_for_missing_parent_is_not_found() {
    let fx = Fixture::new(ServerConfig::default()).await;
    fx.comment(None, 0).await;

    assert_eq!(
        fx.get(&fx.path("/new/999")).await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        fx.get(&fx.path("/new/abc")).await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_parent_from_another_target_is_rejected() {
    let mut config = ServerConfig::default();
    config.secret_key = b"shared secret".to_vec();
    let signer = TokenSigner::new(config.secret_key.clone(), config.comments.token_max_age);
    let fx = Fixture::new(config).await;
    let article = ContentTypeTag::new("articles", "article");
    let other = fx.store.add_publishable(&article, "Other", "other").await;
    let other_target = fx
        .store
        .publishable_loader(&article)
        .load(other.id)
        .await
        .unwrap()
        .unwrap();
    let foreign = Fixture {
        store: fx.store.clone(),
        target: other_target,
        app: fx.app.clone(),
    }
    .comment(None, 0)
    .await;

    assert_eq!(
        fx.get(&fx.path(&format!("/new/{}", foreign.id)))
            .await
            .status(),
        StatusCode::NOT_FOUND
    );

    // a correctly signed form does not make the parent acceptable
    let security = signer.generate(&fx.target, Some(foreign.id), now_timestamp());
    let timestamp = security.timestamp.to_string();
    let response = fx
        .post_form(&fx.path(&format!("/new/{}", foreign.id)), &[
            ("name", "Honza"),
            ("email", "honza@example.com"),
            ("comment", "Wrong thread"),
            ("content_type", security.content_type.as_str()),
            ("object_pk", security.object_pk.as_str()),
            ("timestamp", timestamp.as_str()),
            ("security_hash", security.security_hash.as_str()),
        ])
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(fx.stored_count().await, 1);
}

#[tokio::test]
async fn test_posted_needs_a_comment_of_the_target() {
    let fx = Fixture::new(ServerConfig::default()).await;

    assert_eq!(
        fx.get(&fx.path("/posted")).await.status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(
        fx.get(&fx.path("/posted?c=42")).await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_page_cache_marks_and_replays_responses() {
    let mut config = ServerConfig::default();
    config.cache_ttl = Some(Duration::from_secs(60));
    let fx = Fixture::new(config).await;
    let a = fx.comment(None, 0).await;

    let first = fx.get(&fx.path("")).await;
    assert!(first.headers().get("x-cache").is_none());
    let first = json(first).await;
    let marker = first["ECACHE_INFO"].as_str().unwrap().to_string();
    assert!(marker.starts_with("ecache:"));

    fx.comment(Some(&a), 1).await;

    let second = fx.get(&fx.path("")).await;
    assert_eq!(second.headers()["x-cache"], "HIT");
    assert_eq!(json(second).await, first);

    let other_page = json(fx.get(&fx.path("?p=1")).await).await;
    assert_ne!(other_page["ECACHE_INFO"].as_str().unwrap(), marker);
    assert_eq!(listed_ids(&other_page).len(), 2);
}

#[tokio::test]
async fn test_cached_list_of_a_blocked_target_is_not_found() {
    let mut config = ServerConfig::default();
    config.cache_ttl = Some(Duration::from_secs(60));
    let fx = Fixture::new(config).await;
    fx.comment(None, 0).await;

    assert_eq!(fx.get(&fx.path("")).await.status(), StatusCode::OK);
    assert_eq!(fx.get(&fx.path("")).await.headers()["x-cache"], "HIT");

    fx.store
        .upsert_comment_options(&fx.target, true)
        .await
        .unwrap();
    let blocked = fx.get(&fx.path("")).await;
    assert_eq!(blocked.status(), StatusCode::NOT_FOUND);
    assert!(blocked.headers().get("x-cache").is_none());

    fx.store
        .upsert_comment_options(&fx.target, false)
        .await
        .unwrap();
    let reopened = fx.get(&fx.path("")).await;
    assert_eq!(reopened.status(), StatusCode::OK);
    assert!(reopened.headers().get("x-cache").is_none());
}

#[tokio::test]
async fn test_no_cache_marker_without_the_cache() {
    let fx = Fixture::new(ServerConfig::default()).await;

    let context = json(fx.get(&fx.path("")).await).await;
    assert!(context.get("ECACHE_INFO").is_none());
    assert_eq!(context["SITE_NAME"], "examplecom");
    assert_eq!(context["VERSION"], 1);
}

#[tokio::test]
async fn test_admin_is_not_mounted_without_token() {
    let fx = Fixture::new(ServerConfig::default()).await;

    assert_eq!(
        fx.get("/admin/registry").await.status(),
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn test_admin_requires_the_token() {
    let mut config = ServerConfig::default();
    config.admin_token = Some(ADMIN_TOKEN.into());
    let fx = Fixture::new(config).await;

    let response = fx.get("/admin/registry").await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = fx
        .send(
            Request::get("/admin/registry")
                .header(header::AUTHORIZATION, "Bearer nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let registry = json(fx.admin("GET", "/admin/registry", None).await).await;
    assert_eq!(
        registry["models"]["articles.article"]["inlines"][0]["model"],
        "comments.commentoptions"
    );
    assert_eq!(registry["models"]["articles.article"]["inlines"][0]["max_num"], 1);
    assert!(registry["models"]["comments.comment"].is_object());
}

#[tokio::test]
async fn test_admin_blocks_and_moderates() {
    let mut config = ServerConfig::default();
    config.admin_token = Some(ADMIN_TOKEN.into());
    let fx = Fixture::new(config).await;
    let [a, ab, ..] = fx.thread().await;

    let options_uri = format!(
        "/admin/{}/{}/comment-options",
        fx.target.content_type, fx.target.object_id
    );

    let options = json(fx.admin("GET", &options_uri, None).await).await;
    assert_eq!(options["blocked"], false);
    assert_eq!(options["id"], Value::Null);

    let response = fx
        .admin("PUT", &options_uri, Some(serde_json::json!({"blocked": true})))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(fx.get(&fx.path("")).await.status(), StatusCode::NOT_FOUND);

    // blocked targets stay editable
    let options = json(fx.admin("GET", &options_uri, None).await).await;
    assert_eq!(options["blocked"], true);
    fx.admin("PUT", &options_uri, Some(serde_json::json!({"blocked": false})))
        .await;
    assert_eq!(fx.get(&fx.path("")).await.status(), StatusCode::OK);

    let response = fx
        .admin(
            "PATCH",
            &format!("/admin/comments/{}", a.id),
            Some(serde_json::json!({"is_removed": true})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let moderated = json(response).await;
    assert_eq!(moderated["is_removed"], true);
    assert_eq!(moderated["user_email"], "honza@example.com");

    // AB lost its parent and is promoted
    let listed = json(fx.get(&fx.path("")).await).await;
    assert!(!listed_ids(&listed).contains(&(a.id as i64)));
    assert!(listed_ids(&listed).contains(&(ab.id as i64)));

    let response = fx
        .admin(
            "PATCH",
            &format!("/admin/comments/{}", a.id),
            Some(serde_json::json!({})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let removed = json(
        fx.admin("GET", "/admin/comments?is_removed=true", None)
            .await,
    )
    .await;
    assert_eq!(listed_ids(&removed), vec![a.id as i64]);

    let by_target = json(
        fx.admin(
            "GET",
            &format!(
                "/admin/comments?ct=articles.article&object_id={}",
                fx.target.object_id
            ),
            None,
        )
        .await,
    )
    .await;
    assert_eq!(by_target["page"]["count"], 6);

    let response = fx
        .admin("GET", "/admin/comments?ct=articles.article", None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = fx
        .admin("GET", "/admin/polls.poll/1/comment-options", None)
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
