//! Start URLs and the immutable run configuration built from the command
//! line before any page is fetched.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use url::Url;

use crate::cli::{BookArgs, CrawlArgs, Top100Args};
use crate::extract::CrawlContext;
use crate::links::SitePatterns;
use crate::scrub::is_asin;

/// Output label used when the run has no `category` argument.
pub const DEFAULT_LABEL: &str = "mcats";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    Book,
    Top100,
    AlsoBought,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Book,
    Listing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Seed {
    pub url: Url,
    pub kind: PageKind,
    pub ctx: CrawlContext,
}

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub driver: Driver,
    pub seeds: Vec<Seed>,
    pub label: String,
    pub patterns: SitePatterns,
    pub out_dir: PathBuf,
    pub force: bool,
    pub max_pages: usize,
    pub max_depth: u32,
    pub concurrency: usize,
    pub delay_ms: u64,
}

impl RunConfig {
    /// Configuration for the book and also-bought drivers.
    pub fn for_books(driver: Driver, args: &BookArgs) -> anyhow::Result<Self> {
        let patterns = site_patterns(&args.crawl)?;

        let books = match (&args.asin, &args.infile) {
            (Some(asin), None) => {
                let asin = asin.trim();
                if !is_asin(asin) {
                    anyhow::bail!("--asin must be 10 uppercase letters/digits: {asin:?}");
                }
                vec![BookSeed {
                    asin: asin.to_owned(),
                    title_slug: args.title.clone(),
                }]
            }
            (None, Some(infile)) => read_book_file(Path::new(infile))?,
            _ => anyhow::bail!("exactly one of --asin or --infile is required"),
        };

        let seeds = books
            .into_iter()
            .map(|book| {
                let url = patterns.book_url(&book.asin, book.title_slug.as_deref());
                Ok(Seed {
                    url: Url::parse(&url).with_context(|| format!("parse book url: {url}"))?,
                    kind: PageKind::Book,
                    ctx: CrawlContext::default(),
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Self::new(driver, seeds, DEFAULT_LABEL.to_owned(), patterns, &args.crawl)
    }

    pub fn for_top100(args: &Top100Args) -> anyhow::Result<Self> {
        let patterns = site_patterns(&args.crawl)?;

        let (categories, label) = match (&args.catid, &args.category, &args.infile) {
            (Some(catid), Some(category), None) => {
                let category = category.trim();
                if category.is_empty() {
                    anyhow::bail!("--category must not be empty");
                }
                let catid = validate_catid(catid)?;
                (
                    vec![CategorySeed {
                        catid,
                        label: category.to_owned(),
                    }],
                    category.to_owned(),
                )
            }
            (None, None, Some(infile)) => {
                (read_category_file(Path::new(infile))?, DEFAULT_LABEL.to_owned())
            }
            _ => anyhow::bail!("either both --catid and --category, or --infile, are required"),
        };

        let seeds = categories
            .into_iter()
            .map(|category| {
                let url = patterns.listing_url(&category.catid);
                Ok(Seed {
                    url: Url::parse(&url).with_context(|| format!("parse listing url: {url}"))?,
                    kind: PageKind::Listing,
                    ctx: CrawlContext::category(category.catid, category.label),
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Self::new(Driver::Top100, seeds, label, patterns, &args.crawl)
    }

    fn new(
        driver: Driver,
        seeds: Vec<Seed>,
        label: String,
        patterns: SitePatterns,
        crawl: &CrawlArgs,
    ) -> anyhow::Result<Self> {
        if seeds.is_empty() {
            anyhow::bail!("no start urls to crawl");
        }
        tracing::debug!(?driver, seeds = seeds.len(), %label, "run configured");
        Ok(Self {
            driver,
            seeds,
            label,
            patterns,
            out_dir: PathBuf::from(&crawl.out_dir),
            force: crawl.force,
            max_pages: crawl.max_pages.max(1),
            max_depth: crawl.max_depth,
            concurrency: crawl.concurrency.max(1),
            delay_ms: crawl.delay_ms,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookSeed {
    pub asin: String,
    pub title_slug: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySeed {
    pub catid: String,
    pub label: String,
}

pub fn read_book_file(path: &Path) -> anyhow::Result<Vec<BookSeed>> {
    let file = File::open(path).with_context(|| format!("open infile: {}", path.display()))?;
    read_books(BufReader::new(file)).with_context(|| format!("read infile: {}", path.display()))
}

pub fn read_category_file(path: &Path) -> anyhow::Result<Vec<CategorySeed>> {
    let file = File::open(path).with_context(|| format!("open infile: {}", path.display()))?;
    read_categories(BufReader::new(file))
        .with_context(|| format!("read infile: {}", path.display()))
}

/// Reads `ASIN [title-slug]` lines. Blank lines and lines starting with `#`
/// are ignored.
pub fn read_books(reader: impl BufRead) -> anyhow::Result<Vec<BookSeed>> {
    let mut out = Vec::new();
    for (index, line) in content_lines(reader) {
        let line = line?;
        let mut tokens = line.split_whitespace();
        let (Some(asin), title_slug, None) = (tokens.next(), tokens.next(), tokens.next()) else {
            anyhow::bail!("line {index}: expected `ASIN [title-slug]`, got {line:?}");
        };
        if !is_asin(asin) {
            anyhow::bail!("line {index}: invalid ASIN {asin:?}");
        }
        out.push(BookSeed {
            asin: asin.to_owned(),
            title_slug: title_slug.map(str::to_owned),
        });
    }
    Ok(out)
}

/// Reads `catid label...` lines; the label is the rest of the line.
pub fn read_categories(reader: impl BufRead) -> anyhow::Result<Vec<CategorySeed>> {
    let mut out = Vec::new();
    for (index, line) in content_lines(reader) {
        let line = line?;
        let line = line.trim();
        let Some((catid, label)) = line.split_once(char::is_whitespace) else {
            anyhow::bail!("line {index}: expected `catid label`, got {line:?}");
        };
        let catid = validate_catid(catid).with_context(|| format!("line {index}"))?;
        out.push(CategorySeed {
            catid,
            label: label.split_whitespace().collect::<Vec<_>>().join(" "),
        });
    }
    Ok(out)
}

/// Non-blank, non-comment lines with their 1-based line numbers.
fn content_lines(
    reader: impl BufRead,
) -> impl Iterator<Item = (usize, anyhow::Result<String>)> {
    reader
        .lines()
        .enumerate()
        .map(|(index, line)| (index + 1, line.context("read line")))
        .filter(|(_, line)| match line {
            Ok(line) => {
                let trimmed = line.trim_start();
                !trimmed.is_empty() && !trimmed.starts_with('#')
            }
            Err(_) => true,
        })
}

fn validate_catid(catid: &str) -> anyhow::Result<String> {
    let catid = catid.trim();
    if catid.len() != 10 || !catid.bytes().all(|b| b.is_ascii_digit()) {
        anyhow::bail!("category id must be 10 digits: {catid:?}");
    }
    Ok(catid.to_owned())
}

fn site_patterns(crawl: &CrawlArgs) -> anyhow::Result<SitePatterns> {
    let base = Url::parse(&crawl.base_url).context("parse --base-url")?;
    SitePatterns::new(&base).context("build site url patterns")
}
