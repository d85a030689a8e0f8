//! Registered users.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static NON_WORD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\W+").unwrap_or_else(|e| panic!("non-word regex must be valid: {e}"))
});

/// A stored user. The password hash never leaves this struct when serialised.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(skip_serializing)]
    pub is_admin: bool,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Base username for an email: the lower-cased local part with non-word characters removed.
/// Falls back to `"user"` when nothing is left.
pub fn base_username(email: &str) -> String {
    let lowered = email.trim().to_lowercase();
    let local = lowered.split('@').next().unwrap_or_default();
    let cleaned = NON_WORD_RE.replace_all(local, "").into_owned();
    if cleaned.is_empty() {
        String::from("user")
    } else {
        cleaned
    }
}

/// Candidate usernames in the order they should be tried: `base`, `base1`, `base2`, ...
pub fn username_candidates(base: &str) -> impl Iterator<Item = String> + '_ {
    std::iter::once(base.to_string()).chain((1_u64..).map(move |n| format!("{base}{n}")))
}
