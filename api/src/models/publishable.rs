use diesel::prelude::*;
use serde::Serialize;

#[derive(Queryable, Selectable, Debug, Serialize, Clone)]
#[diesel(table_name = crate::schema::publishables)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Publishable {
    pub id: i32,
    pub content_type_id: i32,
    pub title: String,
    pub slug: String,
}
