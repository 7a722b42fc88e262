use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Context as _;

use crate::formats::Record;
use crate::rank_comp::RankCompSummary;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub top_100: PathBuf,
    pub books: PathBuf,
    pub rank_comp: PathBuf,
}

impl OutputPaths {
    pub fn new(out_dir: &Path, label: &str) -> Self {
        Self {
            top_100: out_dir.join(format!("top_100_{label}.jl")),
            books: out_dir.join(format!("books_{label}.jl")),
            rank_comp: out_dir.join(format!("rank_comp_{label}.tsv")),
        }
    }
}

/// Appends finished records as JSON lines, one file per record kind.
///
/// Each file has its own lock; a record is serialized before the lock is
/// taken and written as one whole line while it is held.
#[derive(Debug)]
pub struct JsonLinesPipeline {
    paths: OutputPaths,
    force: bool,
    top_100: Mutex<BufWriter<File>>,
    books: Mutex<BufWriter<File>>,
    top_100_count: AtomicUsize,
    books_count: AtomicUsize,
}

impl JsonLinesPipeline {
    pub fn open(out_dir: &Path, label: &str, force: bool) -> anyhow::Result<Self> {
        std::fs::create_dir_all(out_dir)
            .with_context(|| format!("create output dir: {}", out_dir.display()))?;

        let paths = OutputPaths::new(out_dir, label);
        if !force && paths.rank_comp.exists() {
            anyhow::bail!("rank comparison output already exists: {}", paths.rank_comp.display());
        }
        let top_100 = open_output(&paths.top_100, force)?;
        let books = open_output(&paths.books, force)?;
        tracing::debug!(
            top_100 = %paths.top_100.display(),
            books = %paths.books.display(),
            "opened output pipeline"
        );

        Ok(Self {
            paths,
            force,
            top_100: Mutex::new(BufWriter::new(top_100)),
            books: Mutex::new(BufWriter::new(books)),
            top_100_count: AtomicUsize::new(0),
            books_count: AtomicUsize::new(0),
        })
    }

    pub fn paths(&self) -> &OutputPaths {
        &self.paths
    }

    pub fn process_item(&self, record: &Record) -> anyhow::Result<()> {
        let mut line = serde_json::to_vec(record).context("serialize record")?;
        line.push(b'\n');

        let (writer, count, path) = match record {
            Record::Top100(_) => (&self.top_100, &self.top_100_count, &self.paths.top_100),
            Record::BookPage(_) => (&self.books, &self.books_count, &self.paths.books),
        };
        let mut writer = writer
            .lock()
            .map_err(|_| anyhow::anyhow!("writer lock poisoned: {}", path.display()))?;
        writer
            .write_all(&line)
            .with_context(|| format!("append record: {}", path.display()))?;
        count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Number of `(top_100, book_page)` records written so far.
    pub fn counts(&self) -> (usize, usize) {
        (
            self.top_100_count.load(Ordering::Relaxed),
            self.books_count.load(Ordering::Relaxed),
        )
    }

    /// Flushes both files without building the comparison table.
    pub fn abort(self) -> anyhow::Result<()> {
        let (top_100, books) = self.counts();
        tracing::warn!(top_100, books, "crawl aborted; keeping partial outputs");
        self.flush_all()?;
        Ok(())
    }

    /// Flushes and closes both files, then joins them into the rank
    /// comparison table.
    pub fn close(self) -> anyhow::Result<RankCompSummary> {
        let (top_100, books) = self.counts();
        tracing::info!(top_100, books, "closing output pipeline");
        let paths = self.paths.clone();
        let force = self.force;
        self.flush_all()?;

        crate::rank_comp::build(&paths, force).context("build rank comparison")
    }

    fn flush_all(self) -> anyhow::Result<()> {
        for (writer, path) in [
            (self.top_100, &self.paths.top_100),
            (self.books, &self.paths.books),
        ] {
            let mut writer = writer
                .into_inner()
                .map_err(|_| anyhow::anyhow!("writer lock poisoned: {}", path.display()))?;
            writer
                .flush()
                .with_context(|| format!("flush output: {}", path.display()))?;
        }
        Ok(())
    }
}

fn open_output(path: &Path, force: bool) -> anyhow::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true);
    if force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    options
        .open(path)
        .with_context(|| format!("create output (use --force to overwrite): {}", path.display()))
}
