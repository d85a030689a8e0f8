use serde::{Deserialize, Serialize};

use crate::cafe::Cafe;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub cafes: i64,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct CafeListResponse {
    pub cafes: Vec<Cafe>,
}

#[derive(Debug, Serialize)]
pub struct CafeResponse {
    pub cafe: Cafe,
}

#[derive(Debug, Serialize)]
pub struct CafeChangedResponse {
    pub message: String,
    pub cafe: Cafe,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct HomeQuery {
    pub logged_out: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    pub next: Option<String>,
    pub registered: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogoutQuery {
    pub next_page: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FeedbackQuery {
    pub action: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub is_rated: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub query: Option<String>,
    pub city: Option<String>,
    pub nearby: Option<String>,
}

impl SearchQuery {
    /// `query` wins over `city`; blank values count as absent.
    pub fn term(&self) -> Option<&str> {
        fn non_blank(value: Option<&str>) -> Option<&str> {
            value.map(str::trim).filter(|term| !term.is_empty())
        }
        non_blank(self.query.as_deref()).or_else(|| non_blank(self.city.as_deref()))
    }

    pub fn nearby(&self) -> bool {
        self.nearby.as_deref().is_some_and(|v| !v.trim().is_empty())
    }
}
