use anyhow::Context as _;
use regex::Regex;
use url::Url;

use crate::formats::AlsoBought;

pub const DEFAULT_BASE_URL: &str = "http://www.amazon.com";

/// URL shapes of the crawled site, anchored to one origin.
#[derive(Debug, Clone)]
pub struct SitePatterns {
    origin: String,
    product_link: Regex,
    product_page: Regex,
    listing_page: Regex,
}

impl SitePatterns {
    pub fn new(base_url: &Url) -> anyhow::Result<Self> {
        if base_url.scheme() != "http" && base_url.scheme() != "https" {
            anyhow::bail!("--base-url must be http/https: {base_url}");
        }
        if base_url.host_str().is_none() {
            anyhow::bail!("--base-url must have host: {base_url}");
        }
        let origin = base_url.origin().ascii_serialization();
        let escaped = regex::escape(&origin);

        let product_link = Regex::new(&format!(
            r"^{escaped}/(?P<title>[^/?#]+)/dp/(?P<asin>[0-9A-Z]{{10}})"
        ))
        .context("compile product link pattern")?;
        let product_page = Regex::new(&format!(
            r"^{escaped}/(?:[^/?#]+/)?dp/(?P<asin>[0-9A-Z]{{10}})"
        ))
        .context("compile product page pattern")?;
        let listing_page = Regex::new(&format!(
            r"^{escaped}/(?:gp/bestsellers|[^/?#]+/zgbs)/digital-text/(?P<catid>[0-9]{{10}})(?:/ref=zg_bs_pg_(?P<page>[0-9]+))?"
        ))
        .context("compile listing page pattern")?;

        Ok(Self {
            origin,
            product_link,
            product_page,
            listing_page,
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Product link with everything after the ASIN stripped, or `None` when
    /// `url` is not a same-site product-detail link.
    pub fn canonical_product_url(&self, url: &str) -> Option<String> {
        self.product_link
            .find(url)
            .map(|m| m.as_str().to_owned())
    }

    pub fn also_bought(&self, url: &str) -> Option<AlsoBought> {
        let caps = self.product_link.captures(url)?;
        Some(AlsoBought {
            url: caps.get(0)?.as_str().to_owned(),
            asin: caps.name("asin")?.as_str().to_owned(),
            title_str: caps.name("title")?.as_str().to_owned(),
        })
    }

    pub fn product_asin(&self, url: &str) -> Option<String> {
        self.product_page
            .captures(url)
            .and_then(|caps| caps.name("asin"))
            .map(|m| m.as_str().to_owned())
    }

    pub fn listing_catid(&self, url: &str) -> Option<String> {
        self.listing_page
            .captures(url)
            .and_then(|caps| caps.name("catid"))
            .map(|m| m.as_str().to_owned())
    }

    /// catid and 1-based page number of a listing URL. The page comes from
    /// the `pg` query parameter, else the `ref=zg_bs_pg_N` path suffix, else 1.
    pub fn listing_page(&self, url: &Url) -> Option<(String, u32)> {
        let caps = self.listing_page.captures(url.as_str())?;
        let catid = caps.name("catid")?.as_str().to_owned();
        let page = url
            .query_pairs()
            .find(|(key, _)| key == "pg")
            .and_then(|(_, value)| value.parse::<u32>().ok())
            .or_else(|| caps.name("page").and_then(|m| m.as_str().parse().ok()))
            .unwrap_or(1);
        Some((catid, page))
    }

    pub fn is_listing(&self, url: &str) -> bool {
        self.listing_page.is_match(url)
    }

    pub fn book_url(&self, asin: &str, title_slug: Option<&str>) -> String {
        match title_slug {
            Some(slug) => format!("{}/{slug}/dp/{asin}", self.origin),
            None => format!("{}/dp/{asin}", self.origin),
        }
    }

    pub fn listing_url(&self, catid: &str) -> String {
        format!("{}/gp/bestsellers/digital-text/{catid}", self.origin)
    }

    /// Key used for visited-URL bookkeeping: product pages collapse to their
    /// canonical form, listing pages to `listing:<catid>:<page>`, everything
    /// else only drops the fragment.
    pub fn page_key(&self, url: &Url) -> String {
        if let Some(canonical) = self.canonical_product_url(url.as_str()) {
            return canonical;
        }
        if let Some((catid, page)) = self.listing_page(url) {
            return format!("listing:{catid}:{page}");
        }
        let mut normalized = url.clone();
        normalized.set_fragment(None);
        normalized.to_string()
    }
}

/// Resolves `href` against `base`, keeping only http(s) results.
pub fn resolve_href(base: &Url, href: &str) -> Option<Url> {
    let url = base.join(href.trim()).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    Some(url)
}
