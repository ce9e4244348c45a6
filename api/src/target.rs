use std::{collections::HashMap, fmt, str::FromStr, sync::Arc};

use async_trait::async_trait;
use serde::{Serialize, Serializer};

use crate::store::StoreError;

/// Identifies a kind of commentable content as `app_label.model`, e.g.
/// `articles.article`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentTypeTag {
    pub app_label: String,
    pub model: String,
}

impl ContentTypeTag {
    pub fn new(app_label: &str, model: &str) -> Self {
        ContentTypeTag {
            app_label: app_label.to_lowercase(),
            model: model.to_lowercase(),
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("`{0}` is not a content type, expected `app_label.model`")]
pub struct InvalidContentType(pub String);

impl FromStr for ContentTypeTag {
    type Err = InvalidContentType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().split_once('.') {
            Some((app_label, model))
                if !app_label.is_empty() && !model.is_empty() && !model.contains('.') =>
            {
                Ok(ContentTypeTag::new(app_label, model))
            }
            _ => Err(InvalidContentType(s.to_string())),
        }
    }
}

impl fmt::Display for ContentTypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.app_label, self.model)
    }
}

impl Serialize for ContentTypeTag {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

/// A polymorphic reference to the object comments hang off.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetRef {
    pub content_type: ContentTypeTag,
    pub object_id: i32,
}

/// A resolved target: the reference plus what the loader found.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Target {
    pub content_type: ContentTypeTag,
    pub content_type_id: i32,
    pub object_id: i32,
    pub title: String,
    pub slug: String,
}

impl Target {
    pub fn comments_path(&self) -> String {
        format!("/{}/{}/comments", self.content_type, self.object_id)
    }
}

#[async_trait]
pub trait TargetLoader: Send + Sync {
    async fn load(&self, object_id: i32) -> Result<Option<Target>, StoreError>;
}

/// Maps content types to the loaders able to fetch their objects. Only
/// registered content types can receive comments.
#[derive(Default)]
pub struct TargetRegistry {
    loaders: HashMap<ContentTypeTag, Arc<dyn TargetLoader>>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, content_type: ContentTypeTag, loader: Arc<dyn TargetLoader>) {
        tracing::debug!(%content_type, "registering comment target");
        self.loaders.insert(content_type, loader);
    }

    /// Returns `None` for unregistered content types as well as for objects
    /// the loader can't find.
    pub async fn resolve(&self, target: &TargetRef) -> Result<Option<Target>, StoreError> {
        match self.loaders.get(&target.content_type) {
            Some(loader) => loader.load(target.object_id).await,
            None => Ok(None),
        }
    }
}
