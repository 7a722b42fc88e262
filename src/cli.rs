use clap::{ArgGroup, Args, Parser, Subcommand};

use crate::links::DEFAULT_BASE_URL;
use crate::seeds::DEFAULT_LABEL;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scrape individual book pages.
    Book(BookArgs),
    /// Crawl a category's best-seller listing and the books it links to.
    Top100(Top100Args),
    /// Scrape book pages and follow their "customers also bought" links.
    AlsoBought(BookArgs),
    /// Rebuild `rank_comp_<label>.tsv` from existing `.jl` outputs.
    RankComp(RankCompArgs),
}

#[derive(Debug, Clone, Args)]
#[command(group(ArgGroup::new("source").required(true).args(["asin", "infile"])))]
pub struct BookArgs {
    /// ASIN of a single book to scrape.
    #[arg(long)]
    pub asin: Option<String>,

    /// Title slug used in the product URL of `--asin`.
    #[arg(long, requires = "asin")]
    pub title: Option<String>,

    /// File with one `ASIN [title-slug]` per line ('#' starts a comment line).
    #[arg(long)]
    pub infile: Option<String>,

    #[command(flatten)]
    pub crawl: CrawlArgs,
}

#[derive(Debug, Clone, Args)]
#[command(group(ArgGroup::new("source").required(true).args(["catid", "infile"])))]
pub struct Top100Args {
    /// 10-digit category id of the best-seller listing.
    #[arg(long, requires = "category")]
    pub catid: Option<String>,

    /// Descriptive category label (also names the output files).
    #[arg(long, requires = "catid")]
    pub category: Option<String>,

    /// File with one `catid label` per line ('#' starts a comment line).
    #[arg(long)]
    pub infile: Option<String>,

    #[command(flatten)]
    pub crawl: CrawlArgs,
}

#[derive(Debug, Clone, Args)]
pub struct CrawlArgs {
    /// Site origin that product and listing URLs are built from.
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Output directory for `.jl` and `.tsv` files.
    #[arg(long, default_value = ".")]
    pub out_dir: String,

    /// Overwrite existing output files.
    #[arg(long)]
    pub force: bool,

    /// Maximum pages to retrieve per start URL.
    #[arg(long, default_value_t = 200)]
    pub max_pages: usize,

    /// Maximum link depth to traverse.
    #[arg(long, default_value_t = 8)]
    pub max_depth: u32,

    /// Maximum concurrent HTTP requests.
    #[arg(long, default_value_t = 4)]
    pub concurrency: usize,

    /// Delay before each request (politeness).
    #[arg(long, default_value_t = 200)]
    pub delay_ms: u64,
}

#[derive(Debug, Clone, Args)]
pub struct RankCompArgs {
    /// Label the `.jl` files were written under.
    #[arg(long, default_value = DEFAULT_LABEL)]
    pub label: String,

    /// Directory holding the `.jl` files; the table is written there too.
    #[arg(long, default_value = ".")]
    pub out_dir: String,

    /// Overwrite an existing table.
    #[arg(long)]
    pub force: bool,
}
