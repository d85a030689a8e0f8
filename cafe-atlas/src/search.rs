//! Fuzzy cafe search and listing filters.
//!
//! Matching uses a partial ratio: the shorter string is slid across the
//! longer one and the best window similarity (normalised Damerau-Levenshtein,
//! scaled to 0..=100) is the score. A cafe matches when the score for its
//! name, city or country is strictly greater than the threshold.
//!
//! Scores follow edit distance rather than matching blocks, so an adjacent
//! transposition costs one edit. Scores near the threshold can differ by a
//! point or two from block-based partial ratios such as fuzzywuzzy's.

use crate::cafe::Cafe;

pub const DEFAULT_THRESHOLD: u8 = 70;

/// Best similarity of `a` against any equally long window of `b` (or vice versa), 0..=100.
pub fn partial_ratio(a: &str, b: &str) -> u8 {
    let a = a.to_lowercase().chars().collect::<Vec<_>>();
    let b = b.to_lowercase().chars().collect::<Vec<_>>();
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };

    if short.is_empty() {
        return if long.is_empty() { 100 } else { 0 };
    }

    let needle = short.iter().collect::<String>();
    let best = long
        .windows(short.len())
        .map(|window| {
            let candidate = window.iter().collect::<String>();
            strsim::normalized_damerau_levenshtein(&needle, &candidate)
        })
        .fold(0.0_f64, f64::max);

    (best * 100.0).round().clamp(0.0, 100.0) as u8
}

pub fn matches(cafe: &Cafe, query: &str, threshold: u8) -> bool {
    [&cafe.name, &cafe.city, &cafe.country]
        .into_iter()
        .any(|field| partial_ratio(query, field) > threshold)
}

pub fn search<'a>(cafes: &'a [Cafe], query: &str, threshold: u8) -> Vec<&'a Cafe> {
    let query = query.trim();
    if query.is_empty() {
        return Vec::new();
    }
    cafes
        .iter()
        .filter(|cafe| matches(cafe, query, threshold))
        .collect::<Vec<_>>()
}

/// Only five-star cafes, highest rating first.
pub fn top_rated(cafes: Vec<Cafe>) -> Vec<Cafe> {
    let mut rated = cafes
        .into_iter()
        .filter(Cafe::is_top_rated)
        .collect::<Vec<_>>();
    rated.sort_by(|left, right| right.full_rating.cmp(&left.full_rating));
    rated
}
