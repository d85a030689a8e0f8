//! Cafe records and the validated field set used to create or patch them.

use serde::Serialize;

use crate::vocab;

/// A stored cafe. Serialises with the same field names as the table columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Cafe {
    pub id: i64,
    pub name: String,
    pub map_url: String,
    pub city: String,
    pub country: String,
    pub currency: String,
    pub coffee_price: String,
    pub wifi_strength: Option<i64>,
    pub seats: i64,
    pub has_sockets: bool,
    pub has_toilet: bool,
    pub images: Option<String>,
    pub full_review: Option<String>,
    pub full_rating: i64,
}

/// A cafe ready for insertion. Built from a complete [`CafeFields`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCafe {
    pub name: String,
    pub map_url: String,
    pub city: String,
    pub country: String,
    pub currency: String,
    pub coffee_price: String,
    pub wifi_strength: Option<i64>,
    pub seats: i64,
    pub has_sockets: bool,
    pub has_toilet: bool,
    pub images: Option<String>,
    pub full_review: Option<String>,
    pub full_rating: i64,
}

/// Validated cafe fields. `None` means "not supplied".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CafeFields {
    pub name: Option<String>,
    pub map_url: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub currency: Option<String>,
    pub coffee_price: Option<String>,
    pub wifi_strength: Option<i64>,
    pub seats: Option<i64>,
    pub has_sockets: Option<bool>,
    pub has_toilet: Option<bool>,
    pub images: Option<String>,
    pub full_review: Option<String>,
    pub full_rating: Option<i64>,
}

impl CafeFields {
    /// Converts into an insertable cafe. Returns the first missing required field on failure.
    pub fn into_new_cafe(self) -> Result<NewCafe, &'static str> {
        Ok(NewCafe {
            name: self.name.ok_or("name")?,
            map_url: self.map_url.ok_or("map_url")?,
            city: self.city.ok_or("city")?,
            country: self.country.ok_or("country")?,
            currency: self.currency.ok_or("currency")?,
            coffee_price: self.coffee_price.ok_or("coffee_price")?,
            wifi_strength: self.wifi_strength,
            seats: self.seats.ok_or("seats")?,
            has_sockets: self.has_sockets.ok_or("has_sockets")?,
            has_toilet: self.has_toilet.ok_or("has_toilet")?,
            images: self.images,
            full_review: self.full_review,
            full_rating: self.full_rating.ok_or("full_rating")?,
        })
    }

    /// Field set describing an existing cafe, used to pre-populate edit forms.
    pub fn from_cafe(cafe: &Cafe) -> Self {
        Self {
            name: Some(cafe.name.clone()),
            map_url: Some(cafe.map_url.clone()),
            city: Some(cafe.city.clone()),
            country: Some(cafe.country.clone()),
            currency: Some(cafe.currency.clone()),
            coffee_price: Some(cafe.coffee_price.clone()),
            wifi_strength: cafe.wifi_strength,
            seats: Some(cafe.seats),
            has_sockets: Some(cafe.has_sockets),
            has_toilet: Some(cafe.has_toilet),
            images: cafe.images.clone(),
            full_review: cafe.full_review.clone(),
            full_rating: Some(cafe.full_rating),
        }
    }
}

impl Cafe {
    /// Overwrites every supplied field; omitted fields keep their current value.
    pub fn apply(&mut self, fields: CafeFields) {
        let CafeFields {
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
        } = fields;

        replace(&mut self.name, name);
        replace(&mut self.map_url, map_url);
        replace(&mut self.city, city);
        replace(&mut self.country, country);
        replace(&mut self.currency, currency);
        replace(&mut self.coffee_price, coffee_price);
        if wifi_strength.is_some() {
            self.wifi_strength = wifi_strength;
        }
        replace(&mut self.seats, seats);
        replace(&mut self.has_sockets, has_sockets);
        replace(&mut self.has_toilet, has_toilet);
        if images.is_some() {
            self.images = images;
        }
        if full_review.is_some() {
            self.full_review = full_review;
        }
        replace(&mut self.full_rating, full_rating);
    }

    pub fn image_paths(&self) -> Vec<&str> {
        self.images
            .as_deref()
            .map(|joined| {
                joined
                    .split(',')
                    .map(str::trim)
                    .filter(|path| !path.is_empty())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default()
    }

    pub fn country_code(&self) -> &str {
        vocab::country_code(&self.country)
    }

    pub fn is_top_rated(&self) -> bool {
        self.full_rating == 5
    }
}

fn replace<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}
