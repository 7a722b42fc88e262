//! CSS selectors for the product and best-seller pages.
//!
//! Every selector the extractors use lives here, so a markup change on the
//! site is a one-file fix.

use std::sync::LazyLock;

use regex::Regex;
use scraper::Selector;

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|err| panic!("invalid selector {css:?}: {err}"))
}

fn pattern(re: &str) -> Regex {
    Regex::new(re).unwrap_or_else(|err| panic!("invalid pattern {re:?}: {err}"))
}

/// Selectors for a single product (book) page.
pub mod book {
    use super::*;

    pub static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("span#productTitle"));

    pub static AUTHORS: LazyLock<Selector> =
        LazyLock::new(|| selector("#byline .author > a, #byline .author .contributorNameID"));

    /// Carries the rating in its `title` attribute.
    pub static RATING: LazyLock<Selector> = LazyLock::new(|| selector("span#acrPopover"));

    pub static REVIEW_COUNT: LazyLock<Selector> =
        LazyLock::new(|| selector("span#acrCustomerReviewText"));

    pub static BLURB: LazyLock<Selector> =
        LazyLock::new(|| selector("#bookDescription_feature_div"));

    /// One format swatch (Kindle, Paperback, ...).
    pub static FORMAT_SWATCH: LazyLock<Selector> =
        LazyLock::new(|| selector("#tmmSwatches > ul > li"));

    /// Inside a swatch: first is the format label, second holds the price.
    pub static SWATCH_SPANS: LazyLock<Selector> =
        LazyLock::new(|| selector("span.a-button-inner > a > span"));

    pub static INNER_SPAN: LazyLock<Selector> = LazyLock::new(|| selector("span"));

    pub static DETAIL_ITEMS: LazyLock<Selector> =
        LazyLock::new(|| selector("table#productDetailsTable div.content > ul > li"));

    pub static DETAIL_LABEL: LazyLock<Selector> = LazyLock::new(|| selector("b"));

    pub static SALES_RANK: LazyLock<Selector> = LazyLock::new(|| {
        selector("table#productDetailsTable div.content > ul > li#SalesRank")
    });

    pub static SUBCATEGORY_RANKS: LazyLock<Selector> = LazyLock::new(|| selector("ul > li"));

    pub static SUBCATEGORY_RANK: LazyLock<Selector> =
        LazyLock::new(|| selector("span.zg_hrsr_rank"));

    pub static LADDER_LINKS: LazyLock<Selector> =
        LazyLock::new(|| selector("span.zg_hrsr_ladder > a"));

    pub static LADDER_BOLD_LINKS: LazyLock<Selector> =
        LazyLock::new(|| selector("span.zg_hrsr_ladder > b > a"));

    pub static ALSO_BOUGHT_LINKS: LazyLock<Selector> =
        LazyLock::new(|| selector("div.a-carousel-viewport > ol > li a[href]"));

    pub static RATING_RE: LazyLock<Regex> = LazyLock::new(|| pattern(r"([0-5][^\s]*)\s+out"));

    pub static REVIEWS_RE: LazyLock<Regex> =
        LazyLock::new(|| pattern(r"([0-9][0-9,]*)\s+customer"));

    /// `#1,234 Paid in Kindle Store (See Top 100 ...)`
    pub static SALES_RANK_RE: LazyLock<Regex> =
        LazyLock::new(|| pattern(r"#([^\s]+)\s+([^(]+)"));

    pub static SUBCATEGORY_RANK_RE: LazyLock<Regex> =
        LazyLock::new(|| pattern(r"^\s*#?([0-9][0-9,]*)"));
}

/// Selectors for a best-seller ("top 100") listing page.
pub mod listing {
    use super::*;

    pub static ROW: LazyLock<Selector> =
        LazyLock::new(|| selector("div#zg_centerListWrapper div.zg_itemImmersion"));

    pub static RANK_NUMBER: LazyLock<Selector> =
        LazyLock::new(|| selector("span.zg_rankNumber"));

    pub static TITLE_LINK: LazyLock<Selector> = LazyLock::new(|| selector("div.zg_title > a"));

    pub static CATEGORY: LazyLock<Selector> =
        LazyLock::new(|| selector("#zg_listTitle .category"));

    pub static PAGINATION_LINKS: LazyLock<Selector> = LazyLock::new(|| {
        selector("div#zg_paginationWrapper ol.zg_pagination a[href]")
    });

    pub static PRODUCT_LINKS: LazyLock<Selector> =
        LazyLock::new(|| selector("div#zg_centerListWrapper a[href]"));
}
