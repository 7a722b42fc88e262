//! Field scrubbers: pure functions turning one raw extracted value into one
//! typed value.

use std::collections::BTreeMap;

/// Author entries containing any of these are navigation text, not names.
const AUTHOR_PLACEHOLDERS: &[&str] = &["Visit Amazon", "search results", "Learn about"];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed {field}: {raw:?}")]
pub struct MalformedFieldError {
    pub field: String,
    pub raw: String,
}

impl MalformedFieldError {
    pub fn new(field: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            raw: raw.into(),
        }
    }

    /// Re-labels the error with the record field it was raised for.
    pub fn for_field(self, field: &str) -> Self {
        Self {
            field: field.to_owned(),
            raw: self.raw,
        }
    }
}

pub fn price_scrub(text: &str) -> Result<f64, MalformedFieldError> {
    let cleaned = text.trim().replace(['$', ','], "");
    match cleaned.parse::<f64>() {
        Ok(price) if price.is_finite() && price >= 0.0 => Ok(price),
        _ => Err(MalformedFieldError::new("price", text)),
    }
}

pub fn rank_category_scrub(
    rank_text: &str,
    category_text: &str,
) -> Result<(String, u64), MalformedFieldError> {
    let rank = parse_rank(rank_text).ok_or_else(|| MalformedFieldError::new("rank", rank_text))?;
    let category = category_text.trim();
    if category.is_empty() {
        return Err(MalformedFieldError::new("rank", category_text));
    }
    Ok((category.to_owned(), rank))
}

/// Folds a flat `[category, rank, category, rank, ...]` sequence into a
/// mapping. A repeated category keeps the rank seen last.
pub fn rank_reduce<S: AsRef<str>>(tokens: &[S]) -> Result<BTreeMap<String, u64>, MalformedFieldError> {
    let mut chunks = tokens.chunks_exact(2);
    let mut ranks = BTreeMap::new();
    for pair in chunks.by_ref() {
        let (category, rank) = rank_category_scrub(pair[1].as_ref(), pair[0].as_ref())?;
        ranks.insert(category, rank);
    }
    if let [dangling] = chunks.remainder() {
        return Err(MalformedFieldError::new("rank", dangling.as_ref()));
    }
    Ok(ranks)
}

pub fn size_scrub(text: &str) -> Result<u64, MalformedFieldError> {
    let trimmed = text.trim();
    let number = trimmed
        .strip_suffix("KB")
        .or_else(|| trimmed.strip_suffix("pages"))
        .unwrap_or(trimmed)
        .trim()
        .replace(',', "");
    number
        .parse::<u64>()
        .map_err(|_| MalformedFieldError::new("size", text))
}

pub fn authors_filter(authors: Vec<String>) -> Vec<String> {
    authors
        .into_iter()
        .map(|author| author.trim().to_owned())
        .filter(|author| !author.is_empty())
        .filter(|author| {
            !AUTHOR_PLACEHOLDERS
                .iter()
                .any(|placeholder| author.contains(placeholder))
        })
        .collect()
}

/// One description fragment with carriage returns turned into newlines.
pub fn blurb_scrub(fragment: &str) -> String {
    fragment.replace('\r', "\n")
}

/// Whole description: every fragment scrubbed, concatenated without a
/// separator. The loader gets the same result from `blurb_scrub` per value
/// and a `Join("")` reduction.
pub fn blurb_join<S: AsRef<str>>(fragments: &[S]) -> String {
    fragments
        .iter()
        .map(|fragment| blurb_scrub(fragment.as_ref()))
        .collect::<Vec<_>>()
        .join("")
}

pub fn top100_rank_scrub<S: AsRef<str>>(tokens: &[S]) -> Result<u32, MalformedFieldError> {
    let Some(first) = tokens.first() else {
        return Err(MalformedFieldError::new("top_100_rank", ""));
    };
    let raw = first.as_ref();
    match raw.trim().trim_end_matches('.').parse::<u32>() {
        Ok(rank) if rank > 0 => Ok(rank),
        _ => Err(MalformedFieldError::new("top_100_rank", raw)),
    }
}

pub fn num_reviews_scrub(text: &str) -> Result<u64, MalformedFieldError> {
    text.trim()
        .replace(',', "")
        .parse::<u64>()
        .map_err(|_| MalformedFieldError::new("num_reviews", text))
}

pub fn rating_scrub(text: &str) -> Result<f64, MalformedFieldError> {
    match text.trim().parse::<f64>() {
        Ok(rating) if (0.0..=5.0).contains(&rating) => Ok(rating),
        _ => Err(MalformedFieldError::new("avg_rating", text)),
    }
}

pub fn asin_scrub(text: &str) -> Result<String, MalformedFieldError> {
    let asin = text.trim();
    if is_asin(asin) {
        Ok(asin.to_owned())
    } else {
        Err(MalformedFieldError::new("asin", text))
    }
}

pub fn text_scrub(text: &str) -> String {
    text.trim().to_owned()
}

pub fn is_asin(value: &str) -> bool {
    value.len() == 10
        && value
            .bytes()
            .all(|b| b.is_ascii_digit() || b.is_ascii_uppercase())
}

fn parse_rank(raw: &str) -> Option<u64> {
    let digits = raw.trim().trim_start_matches('#').replace(',', "");
    digits.parse::<u64>().ok().filter(|rank| *rank > 0)
}
