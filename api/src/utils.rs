use std::sync::OnceLock;

use regex::Regex;

static NON_WORD: OnceLock<Regex> = OnceLock::new();
static SEPARATORS: OnceLock<Regex> = OnceLock::new();

// convert a display name to a url-safe slug
pub fn slugify(value: &str) -> String {
    let non_word = NON_WORD.get_or_init(|| Regex::new(r"[^\w\s-]").expect("valid regex"));
    let separators = SEPARATORS.get_or_init(|| Regex::new(r"[-\s]+").expect("valid regex"));

    let ascii: String = value.chars().filter(char::is_ascii).collect();
    let cleaned = non_word.replace_all(ascii.trim(), "").to_lowercase();

    separators
        .replace_all(&cleaned, "-")
        .trim_matches('-')
        .to_string()
}

pub fn now_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}
