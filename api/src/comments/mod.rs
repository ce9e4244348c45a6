pub mod gate;
pub mod list;
pub mod paginate;
pub mod routes;
pub mod security;
pub mod submit;
pub mod tree;
