//! Record assembly: raw values accumulate per field while a page is
//! traversed, then every field is scrubbed and reduced exactly once.
//!
//! `finalize` takes the loader by value, so a finalized loader cannot be
//! finalized again:
//!
//! ```compile_fail
//! use amspy::formats::RecordKind;
//! use amspy::loader::{Field, ItemLoader};
//!
//! let mut loader = ItemLoader::new(RecordKind::Top100);
//! loader.add(Field::Title, "A Book");
//! let first = loader.finalize();
//! let second = loader.finalize();
//! ```

use std::collections::BTreeMap;

use crate::formats::{AlsoBought, BookPage, Record, RecordKind, Top100Entry};
use crate::scrub::{self, MalformedFieldError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Asin,
    Title,
    Authors,
    Price,
    NumReviews,
    AvgRating,
    Blurb,
    FileSize,
    PrintLength,
    Publisher,
    PubDate,
    Rank,
    Category,
    Catid,
    AlsoBoughts,
    Url,
    Top100Rank,
}

impl Field {
    pub fn name(self) -> &'static str {
        match self {
            Field::Asin => "asin",
            Field::Title => "title",
            Field::Authors => "authors",
            Field::Price => "price",
            Field::NumReviews => "num_reviews",
            Field::AvgRating => "avg_rating",
            Field::Blurb => "blurb",
            Field::FileSize => "file_size",
            Field::PrintLength => "print_length",
            Field::Publisher => "publisher",
            Field::PubDate => "pub_date",
            Field::Rank => "rank",
            Field::Category => "category",
            Field::Catid => "catid",
            Field::AlsoBoughts => "also_boughts",
            Field::Url => "url",
            Field::Top100Rank => "top_100_rank",
        }
    }

    pub fn spec(self) -> FieldSpec {
        match self {
            Field::Asin => FieldSpec::first(ASIN_IN),
            Field::Title | Field::Publisher | Field::PubDate | Field::Category | Field::Catid => {
                FieldSpec::first(TEXT_IN)
            }
            Field::Url => FieldSpec::first(NO_INPUT),
            Field::Authors => FieldSpec {
                input: TEXT_IN,
                output: Reduce::Compose(authors_out),
            },
            Field::Price => FieldSpec::first(PRICE_IN),
            Field::NumReviews => FieldSpec::first(NUM_REVIEWS_IN),
            Field::AvgRating => FieldSpec::first(RATING_IN),
            Field::Blurb => FieldSpec {
                input: BLURB_IN,
                output: Reduce::Join(""),
            },
            Field::FileSize | Field::PrintLength => FieldSpec::first(SIZE_IN),
            Field::Rank => FieldSpec {
                input: RANK_IN,
                output: Reduce::Compose(rank_out),
            },
            Field::AlsoBoughts => FieldSpec {
                input: NO_INPUT,
                output: Reduce::Identity,
            },
            Field::Top100Rank => FieldSpec {
                input: NO_INPUT,
                output: Reduce::Compose(top100_rank_out),
            },
        }
    }
}

const NO_INPUT: &[InputFn] = &[];
const TEXT_IN: &[InputFn] = &[text_in];
const ASIN_IN: &[InputFn] = &[asin_in];
const PRICE_IN: &[InputFn] = &[price_in];
const NUM_REVIEWS_IN: &[InputFn] = &[num_reviews_in];
const RATING_IN: &[InputFn] = &[rating_in];
const SIZE_IN: &[InputFn] = &[size_in];
const BLURB_IN: &[InputFn] = &[blurb_in];
const RANK_IN: &[InputFn] = &[rank_in];

/// A raw or scrubbed field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Int(u64),
    Float(f64),
    /// Raw `(rank, category)` tokens as found on the page.
    RankPair(String, String),
    Link(AlsoBought),
    List(Vec<Value>),
    Ranks(BTreeMap<String, u64>),
}

impl Value {
    fn is_empty(&self) -> bool {
        match self {
            Value::Text(text) => text.is_empty(),
            Value::List(values) => values.is_empty(),
            _ => false,
        }
    }

    fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<AlsoBought> for Value {
    fn from(value: AlsoBought) -> Self {
        Value::Link(value)
    }
}

pub type InputFn = fn(Value) -> Result<Value, MalformedFieldError>;
pub type ComposeFn = fn(Vec<Value>) -> Result<Value, MalformedFieldError>;

#[derive(Debug, Clone, Copy)]
pub enum Reduce {
    TakeFirst,
    Join(&'static str),
    Identity,
    Compose(ComposeFn),
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub input: &'static [InputFn],
    pub output: Reduce,
}

impl FieldSpec {
    const fn first(input: &'static [InputFn]) -> Self {
        Self {
            input,
            output: Reduce::TakeFirst,
        }
    }

    /// Runs the input chain over every raw value, then the reduction.
    /// `Ok(None)` means the field ends up without a value.
    pub fn apply(&self, raw: Vec<Value>) -> Result<Option<Value>, MalformedFieldError> {
        let mut values = raw;
        for scrub in self.input {
            let mut next = Vec::with_capacity(values.len());
            for value in values {
                match scrub(value)? {
                    Value::List(items) => next.extend(items),
                    other => next.push(other),
                }
            }
            values = next;
        }

        match self.output {
            Reduce::TakeFirst => Ok(values.into_iter().find(|value| !value.is_empty())),
            Reduce::Join(separator) => {
                let parts = values
                    .iter()
                    .map(|value| {
                        value
                            .as_text()
                            .map(str::to_owned)
                            .ok_or_else(|| MalformedFieldError::new("", format!("{value:?}")))
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Some(Value::Text(parts.join(separator))))
            }
            Reduce::Identity => Ok(Some(Value::List(values))),
            Reduce::Compose(reducer) => reducer(values).map(Some),
        }
    }
}

#[derive(Debug)]
pub struct ItemLoader {
    kind: RecordKind,
    values: BTreeMap<Field, Vec<Value>>,
}

impl ItemLoader {
    pub fn new(kind: RecordKind) -> Self {
        Self {
            kind,
            values: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, field: Field, raw: impl Into<Value>) {
        self.values.entry(field).or_default().push(raw.into());
    }

    pub fn add_all<I, V>(&mut self, field: Field, raws: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let mut raws = raws.into_iter().map(Into::into).peekable();
        if raws.peek().is_some() {
            self.values.entry(field).or_default().extend(raws);
        }
    }

    pub fn add_opt(&mut self, field: Field, raw: Option<impl Into<Value>>) {
        if let Some(raw) = raw {
            self.add(field, raw);
        }
    }

    pub fn finalize(self) -> Record {
        let mut fields = Fields::default();
        for (field, raw) in self.values {
            match field.spec().apply(raw) {
                Ok(Some(value)) => {
                    fields.0.insert(field, value);
                }
                Ok(None) => {}
                Err(err) => {
                    let err = err.for_field(field.name());
                    tracing::warn!(field = field.name(), raw = %err.raw, "dropping malformed field");
                }
            }
        }

        match self.kind {
            RecordKind::BookPage => Record::BookPage(BookPage {
                asin: fields.text(Field::Asin),
                title: fields.text(Field::Title),
                authors: fields.texts(Field::Authors),
                price: fields.float(Field::Price),
                num_reviews: fields.int(Field::NumReviews),
                avg_rating: fields.float(Field::AvgRating),
                blurb: fields.text(Field::Blurb),
                file_size: fields.int(Field::FileSize),
                print_length: fields.int(Field::PrintLength),
                publisher: fields.text(Field::Publisher),
                pub_date: fields.text(Field::PubDate),
                rank: fields.ranks(Field::Rank),
                category: fields.text(Field::Category),
                catid: fields.text(Field::Catid),
                also_boughts: fields.links(Field::AlsoBoughts),
                url: fields.text(Field::Url),
            }),
            RecordKind::Top100 => Record::Top100(Top100Entry {
                catid: fields.text(Field::Catid),
                category: fields.text(Field::Category),
                title: fields.text(Field::Title),
                asin: fields.text(Field::Asin),
                top_100_rank: fields.int(Field::Top100Rank).and_then(|r| u32::try_from(r).ok()),
            }),
        }
    }
}

#[derive(Debug, Default)]
struct Fields(BTreeMap<Field, Value>);

impl Fields {
    fn text(&mut self, field: Field) -> Option<String> {
        match self.0.remove(&field)? {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    fn int(&mut self, field: Field) -> Option<u64> {
        match self.0.remove(&field)? {
            Value::Int(value) => Some(value),
            _ => None,
        }
    }

    fn float(&mut self, field: Field) -> Option<f64> {
        match self.0.remove(&field)? {
            Value::Float(value) => Some(value),
            _ => None,
        }
    }

    fn texts(&mut self, field: Field) -> Option<Vec<String>> {
        match self.0.remove(&field)? {
            Value::List(values) => Some(
                values
                    .into_iter()
                    .filter_map(|value| match value {
                        Value::Text(text) => Some(text),
                        _ => None,
                    })
                    .collect(),
            ),
            _ => None,
        }
    }

    fn links(&mut self, field: Field) -> Option<Vec<AlsoBought>> {
        match self.0.remove(&field)? {
            Value::List(values) => Some(
                values
                    .into_iter()
                    .filter_map(|value| match value {
                        Value::Link(link) => Some(link),
                        _ => None,
                    })
                    .collect(),
            ),
            _ => None,
        }
    }

    fn ranks(&mut self, field: Field) -> Option<BTreeMap<String, u64>> {
        match self.0.remove(&field)? {
            Value::Ranks(ranks) => Some(ranks),
            _ => None,
        }
    }
}

fn expect_text(value: Value) -> Result<String, MalformedFieldError> {
    match value {
        Value::Text(text) => Ok(text),
        other => Err(MalformedFieldError::new("", format!("{other:?}"))),
    }
}

fn text_in(value: Value) -> Result<Value, MalformedFieldError> {
    Ok(Value::Text(scrub::text_scrub(&expect_text(value)?)))
}

fn asin_in(value: Value) -> Result<Value, MalformedFieldError> {
    scrub::asin_scrub(&expect_text(value)?).map(Value::Text)
}

fn price_in(value: Value) -> Result<Value, MalformedFieldError> {
    scrub::price_scrub(&expect_text(value)?).map(Value::Float)
}

fn num_reviews_in(value: Value) -> Result<Value, MalformedFieldError> {
    scrub::num_reviews_scrub(&expect_text(value)?).map(Value::Int)
}

fn rating_in(value: Value) -> Result<Value, MalformedFieldError> {
    scrub::rating_scrub(&expect_text(value)?).map(Value::Float)
}

fn size_in(value: Value) -> Result<Value, MalformedFieldError> {
    scrub::size_scrub(&expect_text(value)?).map(Value::Int)
}

/// `(rank, category)` becomes the flat `[category, rank]` pair `rank_out`
/// folds.
fn rank_in(value: Value) -> Result<Value, MalformedFieldError> {
    match value {
        Value::RankPair(rank, category) => {
            let (category, rank) = scrub::rank_category_scrub(&rank, &category)?;
            Ok(Value::List(vec![Value::Text(category), Value::Int(rank)]))
        }
        other => Err(MalformedFieldError::new("", format!("{other:?}"))),
    }
}

fn rank_out(values: Vec<Value>) -> Result<Value, MalformedFieldError> {
    let tokens = values
        .into_iter()
        .map(|value| match value {
            Value::Int(rank) => Ok(rank.to_string()),
            other => expect_text(other),
        })
        .collect::<Result<Vec<_>, _>>()?;
    scrub::rank_reduce(&tokens).map(Value::Ranks)
}

fn authors_out(values: Vec<Value>) -> Result<Value, MalformedFieldError> {
    let authors = values
        .into_iter()
        .map(expect_text)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Value::List(
        scrub::authors_filter(authors)
            .into_iter()
            .map(Value::Text)
            .collect(),
    ))
}

fn blurb_in(value: Value) -> Result<Value, MalformedFieldError> {
    Ok(Value::Text(scrub::blurb_scrub(&expect_text(value)?)))
}

fn top100_rank_out(values: Vec<Value>) -> Result<Value, MalformedFieldError> {
    let tokens = values
        .into_iter()
        .map(expect_text)
        .collect::<Result<Vec<_>, _>>()?;
    scrub::top100_rank_scrub(&tokens).map(|rank| Value::Int(u64::from(rank)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_first_skips_empty_values() {
        let mut loader = ItemLoader::new(RecordKind::Top100);
        loader.add(Field::Title, "   ");
        loader.add(Field::Title, "  Second  ");
        loader.add(Field::Title, "Third");
        let Record::Top100(entry) = loader.finalize() else {
            panic!("expected top_100 record");
        };
        assert_eq!(entry.title.as_deref(), Some("Second"));
    }

    #[test]
    fn fields_never_added_are_omitted() {
        let Record::BookPage(book) = ItemLoader::new(RecordKind::BookPage).finalize() else {
            panic!("expected book_page record");
        };
        assert_eq!(book, BookPage::default());
    }

    #[test]
    fn empty_add_all_leaves_field_unset() {
        let mut loader = ItemLoader::new(RecordKind::BookPage);
        loader.add_all(Field::Authors, Vec::<String>::new());
        loader.add_all(Field::AlsoBoughts, Vec::<AlsoBought>::new());
        let Record::BookPage(book) = loader.finalize() else {
            panic!("expected book_page record");
        };
        assert_eq!(book.authors, None);
        assert_eq!(book.also_boughts, None);
    }

    #[test]
    fn rank_pairs_fold_into_mapping() {
        let mut loader = ItemLoader::new(RecordKind::BookPage);
        loader.add(
            Field::Rank,
            Value::RankPair("1,234".to_owned(), "Paid in Kindle Store ".to_owned()),
        );
        loader.add(Field::Rank, Value::RankPair("12".to_owned(), "Books".to_owned()));
        let Record::BookPage(book) = loader.finalize() else {
            panic!("expected book_page record");
        };
        let rank = book.rank.expect("rank present");
        assert_eq!(rank.get("Paid in Kindle Store"), Some(&1234));
        assert_eq!(rank.get("Books"), Some(&12));
    }

    #[test]
    fn malformed_field_is_dropped_and_record_kept() {
        let mut loader = ItemLoader::new(RecordKind::BookPage);
        loader.add(Field::Price, "call for price");
        loader.add(Field::Title, "Still Here");
        loader.add(Field::Rank, Value::RankPair("n/a".to_owned(), "Books".to_owned()));
        let Record::BookPage(book) = loader.finalize() else {
            panic!("expected book_page record");
        };
        assert_eq!(book.price, None);
        assert_eq!(book.rank, None);
        assert_eq!(book.title.as_deref(), Some("Still Here"));
    }

    #[test]
    fn authors_and_blurb_compose() {
        let mut loader = ItemLoader::new(RecordKind::BookPage);
        loader.add_all(
            Field::Authors,
            ["Jane Doe", "Visit Amazon's Jane Doe Page", "John Roe"],
        );
        loader.add_all(Field::Blurb, ["First part.\r", "Second part."]);
        let Record::BookPage(book) = loader.finalize() else {
            panic!("expected book_page record");
        };
        assert_eq!(
            book.authors,
            Some(vec!["Jane Doe".to_owned(), "John Roe".to_owned()])
        );
        assert_eq!(book.blurb.as_deref(), Some("First part.\nSecond part."));
    }

    #[test]
    fn blurb_fragments_join_without_separator() {
        let joined = Field::Blurb
            .spec()
            .apply(vec![Value::from("One\r"), Value::from("Two "), Value::from("Three")])
            .expect("join blurb");
        assert_eq!(joined, Some(Value::Text("One\nTwo Three".to_owned())));
        assert!(matches!(Field::Blurb.spec().output, Reduce::Join("")));
    }

    #[test]
    fn top100_rank_uses_first_token() {
        let mut loader = ItemLoader::new(RecordKind::Top100);
        loader.add_all(Field::Top100Rank, ["12.", "99."]);
        loader.add(Field::Asin, "B000000012");
        let Record::Top100(entry) = loader.finalize() else {
            panic!("expected top_100 record");
        };
        assert_eq!(entry.top_100_rank, Some(12));
        assert_eq!(entry.asin.as_deref(), Some("B000000012"));
    }

    #[test]
    fn join_policy_concatenates_text() {
        let spec = FieldSpec {
            input: NO_INPUT,
            output: Reduce::Join(", "),
        };
        let joined = spec
            .apply(vec![Value::from("a"), Value::from("b")])
            .expect("join text");
        assert_eq!(joined, Some(Value::Text("a, b".to_owned())));
    }

    #[test]
    fn also_boughts_keep_order() {
        let link = |asin: &str| AlsoBought {
            url: format!("http://www.amazon.com/T/dp/{asin}"),
            asin: asin.to_owned(),
            title_str: "T".to_owned(),
        };
        let mut loader = ItemLoader::new(RecordKind::BookPage);
        loader.add(Field::AlsoBoughts, link("B000000002"));
        loader.add(Field::AlsoBoughts, link("B000000001"));
        let Record::BookPage(book) = loader.finalize() else {
            panic!("expected book_page record");
        };
        let asins: Vec<_> = book
            .also_boughts
            .unwrap_or_default()
            .into_iter()
            .map(|l| l.asin)
            .collect();
        assert_eq!(asins, vec!["B000000002", "B000000001"]);
    }

    #[test]
    fn invalid_asin_is_dropped() {
        let mut loader = ItemLoader::new(RecordKind::Top100);
        loader.add(Field::Asin, "not-an-asin");
        let Record::Top100(entry) = loader.finalize() else {
            panic!("expected top_100 record");
        };
        assert_eq!(entry.asin, None);
    }
}
