use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Queryable, Selectable, Identifiable, Debug, Serialize, Clone, PartialEq)]
#[diesel(table_name = crate::schema::comments)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Comment {
    pub id: i32,
    pub content_type_id: i32,
    pub object_id: i32,
    pub parent_id: Option<i32>,
    pub site_id: i32,
    pub user_name: String,
    #[serde(skip_serializing)]
    pub user_email: String,
    pub user_url: String,
    pub comment: String,
    pub submit_date: NaiveDateTime,
    #[serde(skip_serializing)]
    pub ip_address: Option<String>,
    pub is_public: bool,
    pub is_removed: bool,
}

impl Comment {
    /// Whether the comment shows up in public listings.
    pub fn is_visible(&self) -> bool {
        self.is_public && !self.is_removed
    }

    pub fn belongs_to(&self, content_type_id: i32, object_id: i32) -> bool {
        self.content_type_id == content_type_id && self.object_id == object_id
    }
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::comments)]
pub struct NewComment {
    pub content_type_id: i32,
    pub object_id: i32,
    pub parent_id: Option<i32>,
    pub site_id: i32,
    pub user_name: String,
    pub user_email: String,
    pub user_url: String,
    pub comment: String,
    pub submit_date: NaiveDateTime,
    pub ip_address: Option<String>,
    pub is_public: bool,
    pub is_removed: bool,
}

/// The only fields moderators may change once a comment exists.
#[derive(AsChangeset, Deserialize, Debug, Default, Clone)]
#[diesel(table_name = crate::schema::comments)]
pub struct ModerateComment {
    pub is_public: Option<bool>,
    pub is_removed: Option<bool>,
}

impl ModerateComment {
    pub fn is_empty(&self) -> bool {
        self.is_public.is_none() && self.is_removed.is_none()
    }

    pub fn apply(&self, comment: &mut Comment) {
        if let Some(is_public) = self.is_public {
            comment.is_public = is_public;
        }
        if let Some(is_removed) = self.is_removed {
            comment.is_removed = is_removed;
        }
    }
}
