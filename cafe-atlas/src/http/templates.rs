//! Page templates and the view models they render.
//!
//! Everything a template shows is pre-formatted here so the templates stay
//! free of logic beyond loops and flags.

use std::collections::BTreeMap;

use askama::Template;
use askama_web::WebTemplate;

use crate::cafe::Cafe;
use crate::user::User;
use crate::validation::ValidationReport;
use crate::vocab::{self, Choice};

pub const CAFE_COLUMNS: &[&str] = &[
    "Name",
    "Map URL",
    "Location",
    "Coffee Price",
    "Wifi Strength",
    "Seats",
    "Has Sockets",
    "Has Toilet",
    "Cafe Rating",
];

const YES_NO: &[Choice] = &[("True", "Yes"), ("False", "No")];

/// Navigation state shared by every page.
#[derive(Debug, Clone, Default)]
pub struct Nav {
    pub username: Option<String>,
    pub is_admin: bool,
}

impl Nav {
    pub fn for_user(user: Option<&User>) -> Self {
        Self {
            username: user.map(|u| u.username.clone()),
            is_admin: user.is_some_and(|u| u.is_admin),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OptionView {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

fn options(choices: &[Choice], selected: &str) -> Vec<OptionView> {
    choices
        .iter()
        .map(|(value, label)| OptionView {
            value: (*value).to_string(),
            label: (*label).to_string(),
            selected: *value == selected,
        })
        .collect()
}

/// Values shown in the add/update form.
#[derive(Debug, Clone)]
pub struct CafeFormView {
    pub name: String,
    pub map_url: String,
    pub city: String,
    pub coffee_price: String,
    pub seats: String,
    pub full_review: String,
    pub countries: Vec<OptionView>,
    pub currencies: Vec<OptionView>,
    pub wifi_strengths: Vec<OptionView>,
    pub ratings: Vec<OptionView>,
    pub has_sockets: Vec<OptionView>,
    pub has_toilet: Vec<OptionView>,
}

impl CafeFormView {
    /// Build from raw submitted values. Missing select values fall back to the form defaults.
    pub fn from_values(values: &BTreeMap<String, String>) -> Self {
        let text = |key: &str| values.get(key).cloned().unwrap_or_default();
        let select = |key: &str, default: &str| {
            values
                .get(key)
                .filter(|v| !v.is_empty())
                .cloned()
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            name: text("name"),
            map_url: text("map_url"),
            city: text("city"),
            coffee_price: text("coffee_price"),
            seats: text("seats"),
            full_review: text("full_review"),
            countries: options(vocab::COUNTRIES, &select("country", vocab::DEFAULT_COUNTRY)),
            currencies: options(vocab::CURRENCIES, &select("currency", vocab::DEFAULT_CURRENCY)),
            wifi_strengths: options(vocab::STAR_RATINGS, &select("wifi_strength", "")),
            ratings: options(vocab::cafe_ratings(), &select("full_rating", "")),
            has_sockets: options(YES_NO, &select("has_sockets", "False")),
            has_toilet: options(YES_NO, &select("has_toilet", "False")),
        }
    }

    pub fn empty() -> Self {
        Self::from_values(&BTreeMap::new())
    }
}

/// Form values describing a stored cafe.
pub fn cafe_values(cafe: &Cafe) -> BTreeMap<String, String> {
    let bool_value = |flag: bool| String::from(if flag { "True" } else { "False" });
    [
        ("name", cafe.name.clone()),
        ("map_url", cafe.map_url.clone()),
        ("city", cafe.city.clone()),
        ("country", cafe.country.clone()),
        ("currency", cafe.currency.clone()),
        ("coffee_price", cafe.coffee_price.clone()),
        (
            "wifi_strength",
            cafe.wifi_strength.map(|v| v.to_string()).unwrap_or_default(),
        ),
        ("seats", cafe.seats.to_string()),
        ("has_sockets", bool_value(cafe.has_sockets)),
        ("has_toilet", bool_value(cafe.has_toilet)),
        ("full_review", cafe.full_review.clone().unwrap_or_default()),
        ("full_rating", cafe.full_rating.to_string()),
    ]
    .into_iter()
    .map(|(key, value)| (key.to_string(), value))
    .collect()
}

fn field_label(field: &str) -> &str {
    match field {
        "name" => "Cafe name",
        "map_url" => "Map URL",
        "city" => "City",
        "country" => "Country",
        "coffee_price" => "Coffee Price",
        "currency" => "Currency",
        "wifi_strength" => "Wifi Strength",
        "seats" => "Seats",
        "has_sockets" => "Has Sockets",
        "has_toilet" => "Has Toilet",
        "images" => "Cafe Images",
        "full_review" => "Full Review",
        "full_rating" => "Full Rating",
        "email" => "Email",
        "password" => "Password",
        "confirm_password" => "Confirm Password",
        other => other,
    }
}

/// One `"<Label> - <message>"` line per failed check.
pub fn error_lines(report: &ValidationReport) -> Vec<String> {
    report
        .iter()
        .map(|(field, message)| format!("{} - {message}", field_label(field)))
        .collect()
}

/// A cafe as one table row.
#[derive(Debug, Clone)]
pub struct CafeRow {
    pub id: i64,
    pub name: String,
    pub map_url: String,
    pub location: String,
    pub coffee_price: String,
    pub wifi_strength: String,
    pub seats: i64,
    pub has_sockets: &'static str,
    pub has_toilet: &'static str,
    pub rating: String,
    pub review: String,
    pub images: Vec<String>,
}

impl From<&Cafe> for CafeRow {
    fn from(cafe: &Cafe) -> Self {
        let yes_no = |flag: bool| if flag { "Yes" } else { "No" };
        Self {
            id: cafe.id,
            name: cafe.name.clone(),
            map_url: cafe.map_url.clone(),
            location: format!("{}, {}", cafe.city, cafe.country_code()),
            coffee_price: format!("{}{}", cafe.currency, cafe.coffee_price),
            wifi_strength: cafe
                .wifi_strength
                .map_or_else(|| String::from("-"), vocab::star_label),
            seats: cafe.seats,
            has_sockets: yes_no(cafe.has_sockets),
            has_toilet: yes_no(cafe.has_toilet),
            rating: vocab::star_label(cafe.full_rating),
            review: cafe.full_review.clone().unwrap_or_default(),
            images: cafe
                .image_paths()
                .into_iter()
                .map(|path| format!("/{}", path.trim_start_matches('/')))
                .collect(),
        }
    }
}

#[derive(Template, WebTemplate)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub nav: Nav,
    pub notice: Option<String>,
}

#[derive(Template, WebTemplate)]
#[template(path = "register.html")]
pub struct RegisterTemplate {
    pub nav: Nav,
    pub email: String,
    pub errors: Vec<String>,
    pub notice: Option<String>,
}

#[derive(Template, WebTemplate)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub nav: Nav,
    pub email: String,
    pub next: String,
    pub errors: Vec<String>,
    pub notice: Option<String>,
}

#[derive(Template, WebTemplate)]
#[template(path = "cafe_form.html")]
pub struct CafeFormTemplate {
    pub nav: Nav,
    pub heading: String,
    pub action: String,
    pub submit_label: &'static str,
    pub form: CafeFormView,
    pub errors: Vec<String>,
}

#[derive(Template, WebTemplate)]
#[template(path = "feedback.html")]
pub struct FeedbackTemplate {
    pub nav: Nav,
    pub title: &'static str,
    pub message: &'static str,
}

impl FeedbackTemplate {
    pub fn for_action(nav: Nav, action: Option<&str>) -> Self {
        let (title, message) = match action {
            Some("add") => ("Cafe added", "Thanks! The cafe has been added to the catalogue."),
            Some("update") => ("Cafe updated", "The cafe details have been updated."),
            Some("delete") => ("Cafe deleted", "The cafe has been removed from the catalogue."),
            Some("notfound") => ("Cafe not found", "Sorry, that cafe could not be found."),
            _ => ("Nothing to report", "There is no recent change to report."),
        };
        Self {
            nav,
            title,
            message,
        }
    }
}

#[derive(Template, WebTemplate)]
#[template(path = "cafes.html")]
pub struct CafesTemplate {
    pub nav: Nav,
    pub columns: Vec<&'static str>,
    pub rows: Vec<CafeRow>,
    pub notices: Vec<String>,
    pub is_rated: bool,
    pub search_mode: bool,
    pub query: String,
    pub nearby: bool,
}
