use chrono::NaiveDate;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    pub id: i64,
    pub title: String,
    pub subtitle: String,
    pub authors: String,
    pub publisher: String,
    pub published_date: NaiveDate,
    pub category_id: i64,
    pub category: String,
    pub distribution_expenses: f64,
}

/// Identifies a book for upsert purposes, independent of its storage id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NaturalKey {
    pub title: String,
    pub authors: String,
    pub published_date: NaiveDate,
}

/// The fields an upsert overwrites on an existing book.
#[derive(Debug, Clone, PartialEq)]
pub struct BookFields {
    pub subtitle: String,
    pub publisher: String,
    pub category_id: i64,
    pub distribution_expenses: f64,
}

/// A normalized upload row, produced once by the column mapper before any DB write.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRow {
    /// 1-based data row in the upload, blank rows included.
    pub row: usize,
    pub title: String,
    pub subtitle: String,
    pub authors: String,
    pub publisher: String,
    pub published_date: NaiveDate,
    pub category: String,
    pub distribution_expenses: f64,
}

impl ParsedRow {
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            title: self.title.clone(),
            authors: self.authors.clone(),
            published_date: self.published_date,
        }
    }
}

/// Round a currency amount to whole cents.
pub fn round_cents(val: f64) -> f64 {
    (val * 100.0).round() / 100.0
}
