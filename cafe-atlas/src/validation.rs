//! Field validation for cafe payloads and the account forms.
//!
//! Every check runs and failures are collected into one [`ValidationReport`]
//! keyed by field name, so callers can show all problems at once. The same
//! cafe rules serve JSON bodies and HTML form submissions; only the raw value
//! representation differs (see [`RawValue`]).

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use validator::{ValidateEmail, ValidateLength, ValidateUrl};

use crate::cafe::CafeFields;
use crate::vocab;

pub const MISSING: &str = "Missing data for required field.";
pub const NULL: &str = "Field may not be null.";
pub const UNKNOWN_FIELD: &str = "Unknown field.";

const CAFE_FIELDS: &[&str] = &[
    "name",
    "map_url",
    "city",
    "country",
    "coffee_price",
    "currency",
    "wifi_strength",
    "seats",
    "has_sockets",
    "has_toilet",
    "images",
    "full_review",
    "full_rating",
];

static COFFEE_PRICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d+(\.\d{1,2})?$").unwrap_or_else(|e| panic!("price regex must be valid: {e}"))
});

static PASSWORD_RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r".{8,}", "Password must be at least 8 characters long."),
        (r"[a-z]", "Password must contain at least one lowercase letter."),
        (r"[0-9]", "Password must contain at least one digit."),
        (
            r#"[!@#$%^&*()_+\-=\[\]{};:"\\|,.<>/?]"#,
            "Password must contain at least one special character.",
        ),
    ]
    .into_iter()
    .map(|(pattern, message)| {
        let re = Regex::new(pattern)
            .unwrap_or_else(|e| panic!("password rule {pattern} must be valid: {e}"));
        (re, message)
    })
    .collect()
});

/// Field name -> messages for every failed check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationReport {
    errors: BTreeMap<String, Vec<String>>,
}

impl ValidationReport {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.errors.get(field).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn has(&self, field: &str) -> bool {
        self.errors.contains_key(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.errors.iter().flat_map(|(field, messages)| {
            messages
                .iter()
                .map(move |message| (field.as_str(), message.as_str()))
        })
    }

    fn into_result<T>(self, value: T) -> Result<T, Self> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

/// A submitted value before type coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Json(Value),
    Text(String),
}

/// Whether absent required fields are errors (create) or simply left unchanged (partial update).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Create,
    Partial,
}

pub fn raw_from_json(object: Map<String, Value>) -> BTreeMap<String, RawValue> {
    object
        .into_iter()
        .map(|(key, value)| (key, RawValue::Json(value)))
        .collect()
}

/// Validate a cafe payload. Unknown keys are reported rather than ignored.
pub fn validate_cafe(
    mut input: BTreeMap<String, RawValue>,
    mode: Mode,
) -> Result<CafeFields, ValidationReport> {
    let mut report = ValidationReport::default();
    for key in input.keys() {
        if !CAFE_FIELDS.contains(&key.as_str()) {
            report.add(key, UNKNOWN_FIELD);
        }
    }

    let mut checker = Checker {
        input: &mut input,
        report: &mut report,
        mode,
    };

    let name = checker
        .string("name", true)
        .filter(|v| checker.length("name", v, Some(2), Some(30)));
    let map_url = checker
        .string("map_url", true)
        .filter(|v| checker.url("map_url", v));
    let city = checker
        .string("city", true)
        .filter(|v| checker.length("city", v, Some(2), Some(25)));
    let country = checker
        .string("country", true)
        .filter(|v| checker.length("country", v, Some(2), Some(20)))
        .filter(|v| {
            checker.member(
                "country",
                vocab::is_country(v),
                "Invalid country format. Check documentation.",
            )
        });
    let coffee_price = checker.string("coffee_price", true).filter(|v| {
        checker.member(
            "coffee_price",
            COFFEE_PRICE_RE.is_match(v),
            "Enter a digit in string format",
        )
    });
    let currency = checker
        .string("currency", true)
        .filter(|v| checker.length("currency", v, None, Some(10)))
        .filter(|v| {
            checker.member(
                "currency",
                vocab::is_currency(v),
                "Invalid currency format. Use currency symbol.",
            )
        });
    let wifi_strength = checker
        .integer("wifi_strength", false)
        .filter(|v| checker.range("wifi_strength", *v, 0, Some(5)))
        .filter(|v| {
            checker.member(
                "wifi_strength",
                vocab::is_wifi_strength(*v),
                "Invalid wifi-strength format. Required format: 0 - 5",
            )
        });
    let seats = checker
        .integer("seats", true)
        .filter(|v| checker.range("seats", *v, 0, None));
    let has_sockets = checker.boolean("has_sockets", true);
    let has_toilet = checker.boolean("has_toilet", true);
    let images = checker
        .string("images", false)
        .filter(|v| checker.length("images", v, None, Some(350)));
    let full_review = checker
        .string("full_review", false)
        .filter(|v| checker.length("full_review", v, Some(3), Some(300)));
    let full_rating = checker
        .integer("full_rating", true)
        .filter(|v| checker.range("full_rating", *v, 1, Some(5)))
        .filter(|v| {
            checker.member(
                "full_rating",
                vocab::is_cafe_rating(*v),
                "Invalid full-rating format. Required format: 1 - 5",
            )
        });

    report.into_result(CafeFields {
        name,
        map_url,
        city,
        country,
        currency,
        coffee_price,
        wifi_strength,
        seats,
        has_sockets,
        has_toilet,
        images,
        full_review,
        full_rating,
    })
}

struct Checker<'a> {
    input: &'a mut BTreeMap<String, RawValue>,
    report: &'a mut ValidationReport,
    mode: Mode,
}

impl Checker<'_> {
    /// Pull a field out of the input, treating blank form text as absent.
    fn take(&mut self, field: &str, required: bool) -> Option<RawValue> {
        let value = match self.input.remove(field) {
            Some(RawValue::Text(text)) if text.trim().is_empty() => None,
            other => other,
        };
        match value {
            None => {
                if required && self.mode == Mode::Create {
                    self.report.add(field, MISSING);
                }
                None
            }
            Some(RawValue::Json(Value::Null)) => {
                self.report.add(field, NULL);
                None
            }
            Some(value) => Some(value),
        }
    }

    fn string(&mut self, field: &str, required: bool) -> Option<String> {
        match self.take(field, required)? {
            RawValue::Json(Value::String(s)) => Some(s),
            RawValue::Text(s) => Some(s.trim().to_string()),
            RawValue::Json(_) => {
                self.report.add(field, "Not a valid string.");
                None
            }
        }
    }

    fn integer(&mut self, field: &str, required: bool) -> Option<i64> {
        let parsed = match self.take(field, required)? {
            RawValue::Json(Value::Number(n)) => n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
                    .map(|f| f as i64)
            }),
            RawValue::Json(Value::String(s)) | RawValue::Text(s) => s.trim().parse::<i64>().ok(),
            RawValue::Json(_) => None,
        };
        if parsed.is_none() {
            self.report.add(field, "Not a valid integer.");
        }
        parsed
    }

    fn boolean(&mut self, field: &str, required: bool) -> Option<bool> {
        let parsed = match self.take(field, required)? {
            RawValue::Json(Value::Bool(b)) => Some(b),
            RawValue::Json(Value::Number(n)) => match n.as_i64() {
                Some(1) => Some(true),
                Some(0) => Some(false),
                _ => None,
            },
            RawValue::Json(Value::String(s)) | RawValue::Text(s) => parse_bool(&s),
            RawValue::Json(_) => None,
        };
        if parsed.is_none() {
            self.report.add(field, "Not a valid boolean.");
        }
        parsed
    }

    fn length(&mut self, field: &str, value: &str, min: Option<u64>, max: Option<u64>) -> bool {
        if value.validate_length(min, max, None) {
            return true;
        }
        let message = match (min, max) {
            (Some(min), Some(max)) => format!("Length must be between {min} and {max}."),
            (None, Some(max)) => format!("Longer than maximum length {max}."),
            (Some(min), None) => format!("Shorter than minimum length {min}."),
            (None, None) => String::from("Invalid length."),
        };
        self.report.add(field, message);
        false
    }

    fn url(&mut self, field: &str, value: &str) -> bool {
        self.member(field, value.validate_url(), "Not a valid URL.")
    }

    fn range(&mut self, field: &str, value: i64, min: i64, max: Option<i64>) -> bool {
        let ok = value >= min && max.map_or(true, |max| value <= max);
        if !ok {
            let message = match max {
                Some(max) => format!(
                    "Must be greater than or equal to {min} and less than or equal to {max}."
                ),
                None => format!("Must be greater than or equal to {min}."),
            };
            self.report.add(field, message);
        }
        ok
    }

    fn member(&mut self, field: &str, ok: bool, message: &str) -> bool {
        if !ok {
            self.report.add(field, message);
        }
        ok
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" | "on" => Some(true),
        "false" | "f" | "0" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}

/// Submitted registration form.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct RegistrationInput {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirm_password: String,
    #[serde(default)]
    pub remember_me: Option<String>,
}

/// Checks that need no database access. Email uniqueness is checked by the caller.
pub fn validate_registration(input: &RegistrationInput) -> ValidationReport {
    let mut report = ValidationReport::default();

    check_email(&mut report, &input.email);

    if input.password.is_empty() {
        report.add("password", "This field is required.");
    } else if let Some(message) = password_problem(&input.password) {
        report.add("password", message);
    }

    if input.confirm_password.is_empty() {
        report.add("confirm_password", "This field is required.");
    } else if input.confirm_password != input.password {
        report.add("confirm_password", "Field must be equal to password.");
    }

    report
}

/// Submitted login form.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct LoginInput {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub remember_me: Option<String>,
    #[serde(default)]
    pub next: Option<String>,
}

impl LoginInput {
    pub fn remember(&self) -> bool {
        self.remember_me
            .as_deref()
            .and_then(parse_bool)
            .unwrap_or(false)
    }
}

pub fn validate_login(input: &LoginInput) -> ValidationReport {
    let mut report = ValidationReport::default();
    check_email(&mut report, &input.email);
    if input.password.is_empty() {
        report.add("password", "This field is required.");
    }
    report
}

fn check_email(report: &mut ValidationReport, email: &str) {
    let email = email.trim();
    if email.is_empty() {
        report.add("email", "This field is required.");
    } else if !email.validate_email() {
        report.add("email", "Invalid email address.");
    }
}

/// First password rule the candidate breaks, if any.
pub fn password_problem(password: &str) -> Option<&'static str> {
    PASSWORD_RULES
        .iter()
        .find(|(rule, _)| !rule.is_match(password))
        .map(|(_, message)| *message)
}
