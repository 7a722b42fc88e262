use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Key under which the overall Kindle Store rank appears in `BookPage::rank`.
pub const KINDLE_RANK_KEY: &str = "Paid in Kindle Store";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record_kind")]
pub enum Record {
    #[serde(rename = "book_page")]
    BookPage(BookPage),
    #[serde(rename = "top_100")]
    Top100(Top100Entry),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    BookPage,
    Top100,
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::BookPage(_) => RecordKind::BookPage,
            Record::Top100(_) => RecordKind::Top100,
        }
    }

    pub fn asin(&self) -> Option<&str> {
        match self {
            Record::BookPage(book) => book.asin.as_deref(),
            Record::Top100(entry) => entry.asin.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookPage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_reviews: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg_rating: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blurb: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub print_length: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pub_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<BTreeMap<String, u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub also_boughts: Option<Vec<AlsoBought>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl BookPage {
    pub fn kindle_rank(&self) -> Option<u64> {
        self.rank.as_ref()?.get(KINDLE_RANK_KEY).copied()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Top100Entry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_100_rank: Option<u32>,
}

/// A "customers also bought" edge, parsed out of a canonical product URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlsoBought {
    pub url: String,
    pub asin: String,
    pub title_str: String,
}

/// One row of `rank_comp_<label>.tsv`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankCompRow {
    pub asin: String,
    pub catid: Option<String>,
    pub category: Option<String>,
    pub title: Option<String>,
    pub top_100_rank: Option<u32>,
    pub kindle_rank: Option<u64>,
}
