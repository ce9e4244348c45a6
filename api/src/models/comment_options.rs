use diesel::prelude::*;
use serde::Serialize;

#[derive(Queryable, Selectable, Debug, Serialize, Clone, PartialEq)]
#[diesel(table_name = crate::schema::comment_options)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CommentOptions {
    pub id: i32,
    pub target_ct_id: i32,
    pub target_id: i32,
    pub blocked: bool,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::comment_options)]
pub struct NewCommentOptions {
    pub target_ct_id: i32,
    pub target_id: i32,
    pub blocked: bool,
}
