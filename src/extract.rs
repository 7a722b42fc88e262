//! Page extractors: locate DOM fragments and feed raw strings into an
//! [`ItemLoader`]. All functions are stateless; the crawl context arrives as
//! an argument.

use std::collections::HashSet;

use regex::Regex;
use scraper::{ElementRef, Html};
use url::Url;

use crate::formats::{AlsoBought, Record, RecordKind};
use crate::links::{SitePatterns, resolve_href};
use crate::loader::{Field, ItemLoader, Value};
use crate::selectors::{book, listing};

/// Category a page was reached through, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlContext {
    pub catid: Option<String>,
    pub category: Option<String>,
}

impl CrawlContext {
    pub fn category(catid: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            catid: Some(catid.into()),
            category: Some(category.into()),
        }
    }
}

/// Product-detail labels and the record fields they populate.
const PRODUCT_DETAIL_FIELDS: &[(&str, Field)] = &[
    ("File Size", Field::FileSize),
    ("Print Length", Field::PrintLength),
    ("Publisher", Field::Publisher),
    ("Publication Date", Field::PubDate),
    ("ASIN", Field::Asin),
];

const KINDLE_FORMAT: &str = "Kindle";

pub fn book_page(
    html: &Html,
    page_url: &Url,
    ctx: &CrawlContext,
    patterns: &SitePatterns,
) -> Record {
    let mut loader = ItemLoader::new(RecordKind::BookPage);
    loader.add_opt(Field::Catid, ctx.catid.clone());
    loader.add_opt(Field::Category, ctx.category.clone());
    loader.add(Field::Url, patterns.page_key(page_url));

    loader.add_all(Field::Title, html.select(&book::TITLE).map(element_text));
    loader.add_all(Field::Authors, html.select(&book::AUTHORS).map(element_text));
    loader.add_all(
        Field::AvgRating,
        html.select(&book::RATING)
            .filter_map(|el| el.value().attr("title"))
            .filter_map(|title| first_capture(&book::RATING_RE, title)),
    );
    loader.add_all(
        Field::NumReviews,
        html.select(&book::REVIEW_COUNT)
            .filter_map(|el| first_capture(&book::REVIEWS_RE, &element_text(el))),
    );
    loader.add_all(
        Field::Blurb,
        html.select(&book::BLURB)
            .flat_map(|el| el.text())
            .filter(|fragment| !fragment.trim().is_empty())
            .map(str::to_owned),
    );
    loader.add_opt(Field::Price, kindle_price(html));

    for (label, value) in product_details(html) {
        if let Some((_, field)) = PRODUCT_DETAIL_FIELDS.iter().find(|(l, _)| *l == label) {
            loader.add(*field, value);
        }
    }

    for (rank, category) in sales_ranks(html) {
        loader.add(Field::Rank, Value::RankPair(rank, category));
    }

    loader.add_all(Field::AlsoBoughts, also_bought_links(html, page_url, patterns));

    loader.finalize()
}

/// "Customers also bought" carousel links, canonicalized and deduplicated in
/// page order.
pub fn also_bought_links(html: &Html, page_url: &Url, patterns: &SitePatterns) -> Vec<AlsoBought> {
    let mut seen = HashSet::new();
    html.select(&book::ALSO_BOUGHT_LINKS)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| resolve_href(page_url, href))
        .filter_map(|url| patterns.also_bought(url.as_str()))
        .filter(|link| seen.insert(link.url.clone()))
        .collect()
}

/// catid and category of a listing page, read from the page itself and
/// falling back to `ctx`.
pub fn listing_context(
    html: &Html,
    page_url: &Url,
    ctx: &CrawlContext,
    patterns: &SitePatterns,
) -> CrawlContext {
    let catid = patterns
        .listing_catid(page_url.as_str())
        .or_else(|| ctx.catid.clone());
    let category = html
        .select(&listing::CATEGORY)
        .map(element_text)
        .map(|text| text.trim().to_owned())
        .find(|text| !text.is_empty())
        .or_else(|| ctx.category.clone());
    CrawlContext { catid, category }
}

/// One `top_100` record per listing row, in page order.
pub fn top100_entries<'a>(
    html: &'a Html,
    page_url: &'a Url,
    ctx: &'a CrawlContext,
    patterns: &'a SitePatterns,
) -> impl Iterator<Item = Record> + 'a {
    html.select(&listing::ROW).map(move |row| {
        let mut loader = ItemLoader::new(RecordKind::Top100);
        loader.add_opt(Field::Catid, ctx.catid.clone());
        loader.add_opt(Field::Category, ctx.category.clone());
        loader.add_all(
            Field::Top100Rank,
            row.select(&listing::RANK_NUMBER).map(element_text),
        );

        let link = row.select(&listing::TITLE_LINK).next();
        loader.add_opt(Field::Title, link.map(element_text));
        loader.add_opt(
            Field::Asin,
            link.and_then(|a| a.value().attr("href"))
                .and_then(|href| resolve_href(page_url, href))
                .and_then(|url| patterns.product_asin(url.as_str())),
        );

        loader.finalize()
    })
}

pub fn pagination_links(html: &Html, page_url: &Url, patterns: &SitePatterns) -> Vec<Url> {
    let mut seen = HashSet::new();
    html.select(&listing::PAGINATION_LINKS)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| resolve_href(page_url, href))
        .filter(|url| patterns.is_listing(url.as_str()))
        .map(|mut url| {
            url.set_fragment(None);
            url
        })
        .filter(|url| seen.insert(url.to_string()))
        .collect()
}

/// Product links inside the listing body, in canonical form.
pub fn listing_product_links(html: &Html, page_url: &Url, patterns: &SitePatterns) -> Vec<Url> {
    let mut seen = HashSet::new();
    html.select(&listing::PRODUCT_LINKS)
        .filter_map(|a| a.value().attr("href"))
        .filter_map(|href| resolve_href(page_url, href))
        .filter_map(|url| patterns.canonical_product_url(url.as_str()))
        .filter(|canonical| seen.insert(canonical.clone()))
        .filter_map(|canonical| Url::parse(&canonical).ok())
        .collect()
}

fn kindle_price(html: &Html) -> Option<String> {
    for swatch in html.select(&book::FORMAT_SWATCH) {
        let mut spans = swatch.select(&book::SWATCH_SPANS);
        let Some(label) = spans.next() else {
            continue;
        };
        if element_text(label).trim() != KINDLE_FORMAT {
            continue;
        }
        let price = spans.next()?;
        let text = price
            .select(&book::INNER_SPAN)
            .next()
            .map(element_text)
            .unwrap_or_else(|| element_text(price));
        return Some(text);
    }
    None
}

/// `(label, value)` pairs from the product-details list, sales rank excluded.
fn product_details(html: &Html) -> Vec<(String, String)> {
    html.select(&book::DETAIL_ITEMS)
        .filter(|li| li.value().id() != Some("SalesRank"))
        .filter_map(|li| {
            let label = li.select(&book::DETAIL_LABEL).next()?;
            let label = element_text(label);
            let label = label.trim().trim_end_matches(':').trim();
            Some((label.to_owned(), own_text(li).trim().to_owned()))
        })
        .collect()
}

/// Raw `(rank, category)` pairs: the overall rank first, then each
/// subcategory in page order. A subcategory label is the ladder's plain
/// links followed by its bold leaf link, joined with `" > "`.
fn sales_ranks(html: &Html) -> Vec<(String, String)> {
    let Some(block) = html.select(&book::SALES_RANK).next() else {
        return Vec::new();
    };

    let mut ranks = Vec::new();
    if let Some(caps) = book::SALES_RANK_RE.captures(&own_text(block)) {
        ranks.push((caps[1].to_owned(), caps[2].to_owned()));
    }

    for item in block.select(&book::SUBCATEGORY_RANKS) {
        let rank = item
            .select(&book::SUBCATEGORY_RANK)
            .next()
            .and_then(|el| first_capture(&book::SUBCATEGORY_RANK_RE, &element_text(el)));
        let mut ladder: Vec<String> = item
            .select(&book::LADDER_LINKS)
            .map(|a| element_text(a).trim().to_owned())
            .collect();
        ladder.extend(
            item.select(&book::LADDER_BOLD_LINKS)
                .map(|a| element_text(a).trim().to_owned()),
        );
        ladder.retain(|label| !label.is_empty());

        match rank {
            Some(rank) if !ladder.is_empty() => ranks.push((rank, ladder.join(" > "))),
            _ => tracing::debug!(rank = ?rank, ?ladder, "skipping incomplete subcategory rank"),
        }
    }

    ranks
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect()
}

/// Text nodes that are direct children of `el`.
fn own_text(el: ElementRef<'_>) -> String {
    el.children()
        .filter_map(|node| node.value().as_text().map(|text| &**text))
        .collect()
}

fn first_capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::KINDLE_RANK_KEY;
    use crate::links::DEFAULT_BASE_URL;

    const BOOK_HTML: &str = include_str!("../tests/fixtures/book_page.html");
    const LISTING_HTML: &str = include_str!("../tests/fixtures/top100_page.html");

    fn patterns() -> SitePatterns {
        SitePatterns::new(&Url::parse(DEFAULT_BASE_URL).expect("base url")).expect("patterns")
    }

    fn book_url() -> Url {
        Url::parse("http://www.amazon.com/The-Sample-Book/dp/B00SAMPLE1/ref=zg_bs_1")
            .expect("book url")
    }

    #[test]
    fn book_page_fields() {
        let html = Html::parse_document(BOOK_HTML);
        let Record::BookPage(book) =
            book_page(&html, &book_url(), &CrawlContext::default(), &patterns())
        else {
            panic!("expected book_page record");
        };

        assert_eq!(book.asin.as_deref(), Some("B00SAMPLE1"));
        assert_eq!(book.title.as_deref(), Some("The Sample Book"));
        assert_eq!(
            book.authors,
            Some(vec!["Jane Doe".to_owned(), "John Roe".to_owned()])
        );
        assert_eq!(book.price, Some(9.99));
        assert_eq!(book.avg_rating, Some(4.5));
        assert_eq!(book.num_reviews, Some(123));
        assert_eq!(book.file_size, Some(1024));
        assert_eq!(book.print_length, Some(352));
        assert_eq!(book.publisher.as_deref(), Some("Sample House (May 5, 2015)"));
        assert_eq!(book.pub_date.as_deref(), Some("May 5, 2015"));
        assert_eq!(
            book.url.as_deref(),
            Some("http://www.amazon.com/The-Sample-Book/dp/B00SAMPLE1")
        );
        assert_eq!(book.catid, None);
        assert_eq!(book.category, None);

        let blurb = book.blurb.expect("blurb");
        assert!(blurb.starts_with("A gripping tale."));
        assert!(!blurb.contains('\r'));
    }

    #[test]
    fn book_page_ranks() {
        let html = Html::parse_document(BOOK_HTML);
        let Record::BookPage(book) =
            book_page(&html, &book_url(), &CrawlContext::default(), &patterns())
        else {
            panic!("expected book_page record");
        };
        let rank = book.rank.expect("rank");
        assert_eq!(rank.get(KINDLE_RANK_KEY), Some(&1234));
        assert_eq!(rank.get("Books"), Some(&12));
        assert_eq!(
            rank.get("Kindle Store > Kindle eBooks > Literature & Fiction"),
            Some(&3)
        );
        assert_eq!(rank.len(), 3);
    }

    #[test]
    fn book_page_carries_crawl_context() {
        let html = Html::parse_document(BOOK_HTML);
        let ctx = CrawlContext::category("1234567890", "fiction");
        let Record::BookPage(book) = book_page(&html, &book_url(), &ctx, &patterns()) else {
            panic!("expected book_page record");
        };
        assert_eq!(book.catid.as_deref(), Some("1234567890"));
        assert_eq!(book.category.as_deref(), Some("fiction"));
    }

    #[test]
    fn also_boughts_are_canonical_and_unique() {
        let html = Html::parse_document(BOOK_HTML);
        let links = also_bought_links(&html, &book_url(), &patterns());
        let asins: Vec<_> = links.iter().map(|l| l.asin.as_str()).collect();
        assert_eq!(asins, vec!["B00OTHER01", "B00OTHER02"]);
        assert_eq!(links[0].url, "http://www.amazon.com/Other-Book/dp/B00OTHER01");
        assert_eq!(links[0].title_str, "Other-Book");
        assert_eq!(links[1].title_str, "Relative-Book");
    }

    #[test]
    fn missing_fragments_are_omitted() {
        let html = Html::parse_document(
            r#"<html><body><span id="productTitle">Bare</span></body></html>"#,
        );
        let Record::BookPage(book) =
            book_page(&html, &book_url(), &CrawlContext::default(), &patterns())
        else {
            panic!("expected book_page record");
        };
        assert_eq!(book.title.as_deref(), Some("Bare"));
        assert_eq!(book.price, None);
        assert_eq!(book.rank, None);
        assert_eq!(book.authors, None);
        assert_eq!(book.also_boughts, None);
    }

    #[test]
    fn price_requires_kindle_swatch() {
        let html = Html::parse_document(
            r#"<div id="tmmSwatches"><ul>
              <li><span class="a-button-inner"><a><span>Paperback</span><span><span>$14.00</span></span></a></span></li>
              <li><span class="a-button-inner"><a><span>Hardcover</span><span><span>$24.00</span></span></a></span></li>
            </ul></div>"#,
        );
        assert_eq!(kindle_price(&html), None);
    }

    #[test]
    fn listing_rows_in_page_order() {
        let html = Html::parse_document(LISTING_HTML);
        let url = Url::parse("http://www.amazon.com/gp/bestsellers/digital-text/1234567890")
            .expect("listing url");
        let p = patterns();
        let ctx = listing_context(&html, &url, &CrawlContext::default(), &p);
        assert_eq!(ctx, CrawlContext::category("1234567890", "Literary Fiction"));

        let entries: Vec<_> = top100_entries(&html, &url, &ctx, &p)
            .map(|record| match record {
                Record::Top100(entry) => entry,
                Record::BookPage(_) => panic!("expected top_100 record"),
            })
            .collect();
        assert_eq!(entries.len(), 3);
        let ranks: Vec<_> = entries.iter().filter_map(|e| e.top_100_rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
        assert_eq!(entries[0].asin.as_deref(), Some("B000000001"));
        assert_eq!(entries[0].title.as_deref(), Some("First Book"));
        assert!(
            entries
                .iter()
                .all(|e| e.catid.as_deref() == Some("1234567890")
                    && e.category.as_deref() == Some("Literary Fiction"))
        );
    }

    #[test]
    fn listing_context_falls_back_to_crawl_arguments() {
        let html = Html::parse_document("<html><body></body></html>");
        let url = Url::parse("http://www.amazon.com/some/other/page").expect("url");
        let ctx = CrawlContext::category("0987654321", "poetry");
        assert_eq!(listing_context(&html, &url, &ctx, &patterns()), ctx);
    }

    #[test]
    fn listing_links() {
        let html = Html::parse_document(LISTING_HTML);
        let url = Url::parse("http://www.amazon.com/gp/bestsellers/digital-text/1234567890")
            .expect("listing url");
        let p = patterns();

        let pages = pagination_links(&html, &url, &p);
        assert_eq!(pages.len(), 1);
        assert_eq!(
            pages[0].as_str(),
            "http://www.amazon.com/gp/bestsellers/digital-text/1234567890/ref=zg_bs_pg_2?pg=2"
        );

        let products: Vec<_> = listing_product_links(&html, &url, &p)
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(
            products,
            vec![
                "http://www.amazon.com/First-Book/dp/B000000001",
                "http://www.amazon.com/Second-Book/dp/B000000002",
                "http://www.amazon.com/Third-Book/dp/B000000003",
            ]
        );
    }
}
