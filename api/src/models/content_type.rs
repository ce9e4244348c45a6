use diesel::prelude::*;
use serde::Serialize;

#[derive(Queryable, Selectable, Debug, Serialize, Clone)]
#[diesel(table_name = crate::schema::content_types)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ContentType {
    pub id: i32,
    pub app_label: String,
    pub model: String,
}
