pub mod comment;
pub mod comment_options;
pub mod content_type;
pub mod publishable;
