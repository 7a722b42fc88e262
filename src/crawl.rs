//! Runs a crawl: walks each seed breadth-first, fetching only the pages the
//! active driver follows, and hands every record to the output pipeline.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt as _};
use scraper::Html;
use url::Url;

use crate::extract::{self, CrawlContext};
use crate::links::SitePatterns;
use crate::pipeline::JsonLinesPipeline;
use crate::rank_comp::RankCompSummary;
use crate::seeds::{Driver, PageKind, RunConfig, Seed};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    pub url: Url,
    pub status: u16,
    pub html: String,
}

impl FetchedPage {
    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait(?Send)]
pub trait PageSource {
    /// Fetches exactly `url`. `Ok(None)` means no response came back; an
    /// `Err` means the source itself is unusable and the run should stop.
    async fn fetch(&self, url: &Url) -> anyhow::Result<Option<FetchedPage>>;
}

/// Fetches over HTTP with `spider`, one page per call.
#[derive(Debug, Clone)]
pub struct SpiderSource {
    delay_ms: u64,
}

impl SpiderSource {
    pub fn new(delay_ms: u64) -> Self {
        Self { delay_ms }
    }
}

#[async_trait(?Send)]
impl PageSource for SpiderSource {
    async fn fetch(&self, url: &Url) -> anyhow::Result<Option<FetchedPage>> {
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }

        let mut website = spider::website::Website::new(url.as_str());
        website.configuration.respect_robots_txt = false;
        website.configuration.subdomains = false;
        website.configuration.tld = false;
        website.with_block_assets(true);
        website.with_limit(1);

        website.scrape().await;

        let page = website
            .get_pages()
            .and_then(|pages| pages.first().cloned());
        Ok(page.map(|page| FetchedPage {
            url: Url::parse(page.get_url()).unwrap_or_else(|_| url.clone()),
            status: page.status_code.as_u16(),
            html: page.get_html(),
        }))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub fetched: usize,
    pub pages: usize,
    pub books: usize,
    pub listing_rows: usize,
    pub failed: usize,
    pub not_fetched: usize,
    pub revisits: usize,
}

/// What a finished crawl reports: walk counters plus the join summary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlReport {
    pub stats: WalkStats,
    pub summary: RankCompSummary,
}

pub async fn run(config: RunConfig) -> anyhow::Result<CrawlReport> {
    let source = SpiderSource::new(config.delay_ms);
    run_with_source(&config, &source).await
}

/// Crawls every seed of `config` and writes the three outputs. On Ctrl-C the
/// `.jl` files are flushed and the comparison table is not built.
pub async fn run_with_source(
    config: &RunConfig,
    source: &dyn PageSource,
) -> anyhow::Result<CrawlReport> {
    let pipeline = JsonLinesPipeline::open(&config.out_dir, &config.label, config.force)
        .context("open output pipeline")?;
    tracing::info!(
        driver = ?config.driver,
        seeds = config.seeds.len(),
        label = %config.label,
        "crawl started"
    );

    let outcome = tokio::select! {
        result = crawl_seeds(config, source, &pipeline) => Some(result),
        signal = tokio::signal::ctrl_c() => {
            signal.context("listen for ctrl-c")?;
            None
        }
    };

    match outcome {
        Some(Ok(stats)) => {
            tracing::info!(?stats, "crawl finished");
            if stats.not_fetched > 0 {
                tracing::warn!(
                    not_fetched = stats.not_fetched,
                    max_pages = config.max_pages,
                    "some pages the crawl needed were not fetched; their rows have no book data"
                );
            }
            let summary = pipeline.close()?;
            tracing::info!(?summary, "rank comparison written");
            Ok(CrawlReport { stats, summary })
        }
        Some(Err(err)) => {
            if let Err(flush_err) = pipeline.abort() {
                tracing::warn!(error = %format!("{flush_err:#}"), "flush partial outputs");
            }
            Err(err)
        }
        None => {
            pipeline.abort()?;
            anyhow::bail!("interrupted");
        }
    }
}

async fn crawl_seeds(
    config: &RunConfig,
    source: &dyn PageSource,
    pipeline: &JsonLinesPipeline,
) -> anyhow::Result<WalkStats> {
    let mut visited = HashSet::new();
    let mut stats = WalkStats::default();

    for seed in &config.seeds {
        let before = stats;
        walk(config, seed, source, pipeline, &mut visited, &mut stats).await?;
        tracing::info!(
            seed = %seed.url,
            fetched = stats.fetched - before.fetched,
            not_fetched = stats.not_fetched - before.not_fetched,
            "seed done"
        );
    }
    Ok(stats)
}

/// Pages fetched per seed. Book pages are leaves for the book driver, so
/// only the seed is needed.
fn page_budget(config: &RunConfig) -> usize {
    match config.driver {
        Driver::Book => 1,
        Driver::Top100 | Driver::AlsoBought => config.max_pages,
    }
}

/// Visits pages reachable from `seed` one depth level at a time, fetching
/// each level with up to `concurrency` requests in flight. Records are
/// written in queue order. `visited` is shared across seeds so a page is
/// extracted at most once per run.
pub async fn walk(
    config: &RunConfig,
    seed: &Seed,
    source: &dyn PageSource,
    pipeline: &JsonLinesPipeline,
    visited: &mut HashSet<String>,
    stats: &mut WalkStats,
) -> anyhow::Result<()> {
    let patterns = &config.patterns;
    let budget = page_budget(config);
    let mut fetched = 0_usize;
    let mut level = vec![(seed.url.clone(), seed.kind, seed.ctx.clone())];
    let mut depth = 0_u32;

    while !level.is_empty() {
        let mut due = Vec::with_capacity(level.len());
        for (url, kind, ctx) in level {
            let key = visit_key(patterns, &url);
            if visited.contains(&key) {
                stats.revisits += 1;
                continue;
            }
            if fetched >= budget {
                stats.not_fetched += 1;
                tracing::warn!(%url, max_pages = budget, "page budget spent; not fetching");
                continue;
            }
            visited.insert(key);
            fetched += 1;
            due.push((url, kind, ctx));
        }

        let responses: Vec<_> = stream::iter(due.iter().map(|(url, _, _)| source.fetch(url)))
            .buffered(config.concurrency.max(1))
            .collect()
            .await;

        let follow = depth < config.max_depth;
        let mut next = Vec::new();
        for ((url, kind, ctx), response) in due.into_iter().zip(responses) {
            stats.fetched += 1;
            let Some(page) = response.with_context(|| format!("fetch {url}"))? else {
                stats.not_fetched += 1;
                tracing::warn!(%url, "no response; skipping page");
                continue;
            };
            if !page.is_success() {
                stats.failed += 1;
                tracing::warn!(%url, status = page.status, "skipping page with error status");
                continue;
            }

            stats.pages += 1;
            tracing::debug!(%url, ?kind, depth, "extracting");
            let html = Html::parse_document(&page.html);

            match kind {
                PageKind::Book => {
                    let record = extract::book_page(&html, &page.url, &ctx, patterns);
                    pipeline.process_item(&record)?;
                    stats.books += 1;

                    if config.driver == Driver::AlsoBought && follow {
                        for link in extract::also_bought_links(&html, &page.url, patterns) {
                            match Url::parse(&link.url) {
                                Ok(next_url) => {
                                    next.push((next_url, PageKind::Book, CrawlContext::default()))
                                }
                                Err(err) => {
                                    tracing::debug!(url = %link.url, %err, "bad also-bought url")
                                }
                            }
                        }
                    }
                }
                PageKind::Listing => {
                    let ctx = extract::listing_context(&html, &page.url, &ctx, patterns);
                    for record in extract::top100_entries(&html, &page.url, &ctx, patterns) {
                        pipeline.process_item(&record)?;
                        stats.listing_rows += 1;
                    }

                    if follow {
                        for next_url in extract::pagination_links(&html, &page.url, patterns) {
                            next.push((next_url, PageKind::Listing, ctx.clone()));
                        }
                        for next_url in extract::listing_product_links(&html, &page.url, patterns) {
                            next.push((next_url, PageKind::Book, ctx.clone()));
                        }
                    }
                }
            }
        }

        level = next;
        depth += 1;
    }
    Ok(())
}

/// Product pages are visited once per ASIN whatever their slug; listing
/// pages once per category and page number; others once per URL.
fn visit_key(patterns: &SitePatterns, url: &Url) -> String {
    match patterns.product_asin(url.as_str()) {
        Some(asin) => format!("dp/{asin}"),
        None => patterns.page_key(url),
    }
}
