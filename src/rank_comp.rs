//! Joins the listing and book outputs of a run into a table comparing each
//! book's top-100 position with its overall Kindle Store rank.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::cli::RankCompArgs;
use crate::formats::{BookPage, KINDLE_RANK_KEY, RankCompRow, Record, Top100Entry};
use crate::pipeline::OutputPaths;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RankCompSummary {
    pub rows: usize,
    pub listings_without_asin: usize,
    pub books_missing: usize,
    pub kindle_rank_missing: usize,
    pub duplicate_books: usize,
}

pub fn run(args: RankCompArgs) -> anyhow::Result<()> {
    let paths = OutputPaths::new(&PathBuf::from(&args.out_dir), &args.label);
    let summary = build(&paths, args.force)?;
    tracing::info!(out = %paths.rank_comp.display(), ?summary, "rank comparison written");
    Ok(())
}

/// Reads both `.jl` files of a run and writes the comparison table.
pub fn build(paths: &OutputPaths, force: bool) -> anyhow::Result<RankCompSummary> {
    let mut listings = Vec::new();
    let mut books = Vec::new();
    for path in [&paths.top_100, &paths.books] {
        for record in read_records(path)? {
            match record {
                Record::Top100(entry) => listings.push(entry),
                Record::BookPage(book) => books.push(book),
            }
        }
    }

    let (rows, summary) = join(listings, books);
    write_tsv(&paths.rank_comp, &rows, force)?;

    if summary.kindle_rank_missing > 0 || summary.books_missing > 0 {
        tracing::warn!(
            kindle_rank_missing = summary.kindle_rank_missing,
            books_missing = summary.books_missing,
            "rank comparison has rows without a Kindle rank"
        );
    }
    Ok(summary)
}

/// Parses a JSON-lines file. An unparsable final line is taken to be a
/// write cut short and skipped; anywhere else it is an error.
pub fn read_records(path: &Path) -> anyhow::Result<Vec<Record>> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("read: {}", path.display()))?;
    let lines: Vec<(usize, &str)> = contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .collect();

    let mut records = Vec::with_capacity(lines.len());
    for (position, (index, line)) in lines.iter().enumerate() {
        match serde_json::from_str::<Record>(line) {
            Ok(record) => records.push(record),
            Err(err) if position + 1 == lines.len() => {
                tracing::warn!(
                    path = %path.display(),
                    line = index + 1,
                    %err,
                    "skipping truncated trailing line"
                );
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("parse {}:{}", path.display(), index + 1));
            }
        }
    }
    Ok(records)
}

/// Left-joins listing entries with the Kindle rank of the book sharing their
/// ASIN, sorted by `top_100_rank`. The first book record seen for an ASIN is
/// used.
pub fn join(listings: Vec<Top100Entry>, books: Vec<BookPage>) -> (Vec<RankCompRow>, RankCompSummary) {
    let mut summary = RankCompSummary::default();

    let mut by_asin: HashMap<String, BookPage> = HashMap::new();
    for book in books {
        let Some(asin) = book.asin.clone() else {
            tracing::debug!(url = ?book.url, "book record without asin; not joinable");
            continue;
        };
        if by_asin.contains_key(&asin) {
            summary.duplicate_books += 1;
            tracing::warn!(%asin, "duplicate book record; keeping the first");
            continue;
        }
        by_asin.insert(asin, book);
    }

    let mut rows = Vec::with_capacity(listings.len());
    for entry in listings {
        let Some(asin) = entry.asin else {
            summary.listings_without_asin += 1;
            tracing::warn!(title = ?entry.title, rank = ?entry.top_100_rank, "listing entry without asin; skipping");
            continue;
        };

        let kindle_rank = match by_asin.get(&asin) {
            Some(book) => {
                let rank = book.kindle_rank();
                if rank.is_none() {
                    summary.kindle_rank_missing += 1;
                    tracing::warn!(%asin, key = KINDLE_RANK_KEY, "book has no Kindle Store rank");
                }
                rank
            }
            None => {
                summary.books_missing += 1;
                tracing::debug!(%asin, "no book record for listing entry");
                None
            }
        };

        rows.push(RankCompRow {
            asin,
            catid: entry.catid,
            category: entry.category,
            title: entry.title,
            top_100_rank: entry.top_100_rank,
            kindle_rank,
        });
    }

    rows.sort_by_key(|row| (row.top_100_rank.is_none(), row.top_100_rank));
    summary.rows = rows.len();
    (rows, summary)
}

fn write_tsv(path: &Path, rows: &[RankCompRow], force: bool) -> anyhow::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true);
    if force {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }
    let file = options
        .open(path)
        .with_context(|| format!("create rank comparison: {}", path.display()))?;

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(file);
    for row in rows {
        writer.serialize(row).context("write rank comparison row")?;
    }
    if rows.is_empty() {
        writer
            .write_record([
                "asin",
                "catid",
                "category",
                "title",
                "top_100_rank",
                "kindle_rank",
            ])
            .context("write rank comparison header")?;
    }
    writer
        .flush()
        .with_context(|| format!("flush rank comparison: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn entry(asin: &str, rank: u32) -> Top100Entry {
        Top100Entry {
            catid: Some("1234567890".to_owned()),
            category: Some("x".to_owned()),
            title: Some(format!("Title {asin}")),
            asin: Some(asin.to_owned()),
            top_100_rank: Some(rank),
        }
    }

    fn book(asin: &str, ranks: &[(&str, u64)]) -> BookPage {
        BookPage {
            asin: Some(asin.to_owned()),
            rank: Some(
                ranks
                    .iter()
                    .map(|(category, rank)| ((*category).to_owned(), *rank))
                    .collect::<BTreeMap<_, _>>(),
            ),
            ..Default::default()
        }
    }

    fn write_lines(path: &Path, records: &[Record]) -> anyhow::Result<()> {
        let mut out = String::new();
        for record in records {
            out.push_str(&serde_json::to_string(record)?);
            out.push('\n');
        }
        std::fs::write(path, out)?;
        Ok(())
    }

    #[test]
    fn joins_kindle_rank_by_asin() -> anyhow::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let paths = OutputPaths::new(dir.path(), "x");
        write_lines(
            &paths.books,
            &[Record::BookPage(book("B000000000", &[(KINDLE_RANK_KEY, 5)]))],
        )?;
        write_lines(&paths.top_100, &[Record::Top100(entry("B000000000", 5))])?;

        let summary = build(&paths, false)?;
        assert_eq!(summary.rows, 1);

        let tsv = std::fs::read_to_string(&paths.rank_comp)?;
        let lines: Vec<_> = tsv.lines().collect();
        assert_eq!(
            lines,
            vec![
                "asin\tcatid\tcategory\ttitle\ttop_100_rank\tkindle_rank",
                "B000000000\t1234567890\tx\tTitle B000000000\t5\t5",
            ]
        );
        Ok(())
    }

    #[test]
    fn rows_sorted_by_listing_rank() {
        let (rows, summary) = join(
            vec![entry("B000000003", 3), entry("B000000001", 1), entry("B000000002", 2)],
            vec![
                book("B000000001", &[(KINDLE_RANK_KEY, 10)]),
                book("B000000003", &[(KINDLE_RANK_KEY, 30)]),
            ],
        );
        let order: Vec<_> = rows.iter().map(|r| r.asin.as_str()).collect();
        assert_eq!(order, vec!["B000000001", "B000000002", "B000000003"]);
        assert_eq!(rows[0].kindle_rank, Some(10));
        assert_eq!(rows[1].kindle_rank, None);
        assert_eq!(summary.books_missing, 1);
    }

    #[test]
    fn missing_kindle_key_is_counted_not_defaulted() {
        let (rows, summary) = join(
            vec![entry("B000000001", 1)],
            vec![book("B000000001", &[("Books", 12)])],
        );
        assert_eq!(rows[0].kindle_rank, None);
        assert_eq!(summary.kindle_rank_missing, 1);
    }

    #[test]
    fn duplicate_books_keep_first() {
        let (rows, summary) = join(
            vec![entry("B000000001", 1)],
            vec![
                book("B000000001", &[(KINDLE_RANK_KEY, 7)]),
                book("B000000001", &[(KINDLE_RANK_KEY, 99)]),
            ],
        );
        assert_eq!(rows[0].kindle_rank, Some(7));
        assert_eq!(summary.duplicate_books, 1);
    }

    #[test]
    fn listing_without_asin_is_skipped() {
        let mut orphan = entry("B000000001", 1);
        orphan.asin = None;
        let (rows, summary) = join(vec![orphan, entry("B000000002", 2)], Vec::new());
        assert_eq!(rows.len(), 1);
        assert_eq!(summary.listings_without_asin, 1);
    }

    #[test]
    fn truncated_trailing_line_is_ignored() -> anyhow::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let path = dir.path().join("top_100_x.jl");
        let complete = serde_json::to_string(&Record::Top100(entry("B000000001", 1)))?;
        std::fs::write(&path, format!("{complete}\n{{\"record_kind\":\"top_1"))?;
        let records = read_records(&path)?;
        assert_eq!(records.len(), 1);

        std::fs::write(&path, format!("{{\"record_kind\"\n{complete}\n"))?;
        let err = read_records(&path).unwrap_err();
        assert!(format!("{err:#}").contains(":1"), "{err:#}");
        Ok(())
    }

    #[test]
    fn empty_run_still_writes_header() -> anyhow::Result<()> {
        let dir = tempfile::TempDir::new()?;
        let paths = OutputPaths::new(dir.path(), "empty");
        std::fs::write(&paths.top_100, "")?;
        std::fs::write(&paths.books, "")?;
        let summary = build(&paths, false)?;
        assert_eq!(summary, RankCompSummary::default());
        let tsv = std::fs::read_to_string(&paths.rank_comp)?;
        assert_eq!(tsv, "asin\tcatid\tcategory\ttitle\ttop_100_rank\tkindle_rank\n");
        Ok(())
    }
}
