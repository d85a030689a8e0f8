//! Closed vocabularies for the enumerable cafe fields.
//!
//! Each entry is a `(value, label)` pair: the value is what gets stored and
//! validated, the label is what the HTML choice lists show.

pub type Choice = (&'static str, &'static str);

pub const COUNTRIES: &[Choice] = &[
    ("Australia (AU)", "Australia (AU)"),
    ("Canada (CA)", "Canada (CA)"),
    ("Germany (DE)", "Germany (DE)"),
    ("Spain (ES)", "Spain (ES)"),
    ("France (FR)", "France (FR)"),
    ("Ghana (GH)", "Ghana (GH)"),
    ("India (IN)", "India (IN)"),
    ("Italy (IT)", "Italy (IT)"),
    ("Japan (JP)", "Japan (JP)"),
    ("Nigeria (NG)", "Nigeria (NG)"),
    ("Netherlands (NL)", "Netherlands (NL)"),
    ("Norway (NO)", "Norway (NO)"),
    ("New Zealand (NZ)", "New Zealand (NZ)"),
    ("United Kingdom (UK)", "United Kingdom (UK)"),
    ("United States (US)", "United States (US)"),
    ("South Africa (ZA)", "South Africa (ZA)"),
];

pub const CURRENCIES: &[Choice] = &[
    ("A$", "AUD (A$)"),
    ("C$", "CAD (C$)"),
    ("€", "EUR (€)"),
    ("GH₵", "GHS (GH₵)"),
    ("₹", "INR (₹)"),
    ("¥", "JPY (¥)"),
    ("₦", "NGN (₦)"),
    ("kr", "NOK (kr)"),
    ("NZ$", "NZD (NZ$)"),
    ("£", "GBP (£)"),
    ("$", "USD ($)"),
    ("R", "ZAR (R)"),
];

/// Star labels. Index 0 is the "no wifi" mark and is only valid for wifi strength.
pub const STAR_RATINGS: &[Choice] = &[
    ("0", "✘"),
    ("1", "1 star"),
    ("2", "2 stars"),
    ("3", "3 stars"),
    ("4", "4 stars"),
    ("5", "5 stars"),
];

pub const DEFAULT_COUNTRY: &str = "United States (US)";
pub const DEFAULT_CURRENCY: &str = "$";

pub fn is_country(value: &str) -> bool {
    contains(COUNTRIES, value)
}

pub fn is_currency(value: &str) -> bool {
    contains(CURRENCIES, value)
}

pub fn is_wifi_strength(value: i64) -> bool {
    contains(STAR_RATINGS, &value.to_string())
}

pub fn is_cafe_rating(value: i64) -> bool {
    contains(cafe_ratings(), &value.to_string())
}

/// Ratings a cafe can receive: every star label except the zero mark.
pub fn cafe_ratings() -> &'static [Choice] {
    STAR_RATINGS.get(1..).unwrap_or_default()
}

/// Short code for a country label, e.g. `"Japan (JP)"` -> `"JP"`.
/// Labels without a parenthesised code are returned unchanged.
pub fn country_code(label: &str) -> &str {
    label
        .split_once('(')
        .map(|(_, rest)| rest.trim_end_matches(')').trim())
        .filter(|code| !code.is_empty())
        .unwrap_or(label)
}

/// Display label for a star value; unknown values render as their number.
pub fn star_label(value: i64) -> String {
    let key = value.to_string();
    STAR_RATINGS
        .iter()
        .find(|(choice, _)| *choice == key)
        .map_or(key.clone(), |(_, label)| (*label).to_string())
}

fn contains(choices: &[Choice], value: &str) -> bool {
    choices.iter().any(|(choice, _)| *choice == value)
}
