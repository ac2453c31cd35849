use std::path::Path;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use rusqlite::Connection;

use crate::cache::ReportCache;
use crate::error::{BooktallyError, Result};
use crate::models::{round_cents, BookFields, ParsedRow};
use crate::reports::discard_cached_reports;
use crate::store::{get_or_create_category, upsert_book};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn ymd_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("static date pattern"))
}

/// Strict `YYYY-MM-DD`. Surrounding whitespace is ignored, nothing else is.
pub fn parse_date_ymd(raw: &str) -> Result<NaiveDate> {
    let s = raw.trim();
    let invalid = || BooktallyError::InvalidDateFormat { raw: raw.to_string() };
    if !ymd_pattern().is_match(s) {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| invalid())
}

/// Thousands separators are stripped; an empty cell means zero.
pub fn parse_expenses(raw: &str) -> Result<f64> {
    let cleaned = raw.replace(',', "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Ok(0.0);
    }
    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(round_cents(v)),
        _ => Err(BooktallyError::InvalidAmount { raw: raw.to_string() }),
    }
}

#[cfg(any(feature = "xlsx", test))]
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    // Excel epoch is 1899-12-30 (accounting for the 1900 leap year bug)
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_signed(chrono::Duration::days(serial.floor() as i64))
}

fn normalize_header(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}').trim().to_lowercase()
}

// ---------------------------------------------------------------------------
// Column mapping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Title,
    Subtitle,
    Authors,
    Publisher,
    PublishedDate,
    Category,
    DistributionExpenses,
}

impl Column {
    pub const ALL: [Column; 7] = [
        Column::Title,
        Column::Subtitle,
        Column::Authors,
        Column::Publisher,
        Column::PublishedDate,
        Column::Category,
        Column::DistributionExpenses,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Subtitle => "subtitle",
            Self::Authors => "authors",
            Self::Publisher => "publisher",
            Self::PublishedDate => "published_date",
            Self::Category => "category",
            Self::DistributionExpenses => "distribution_expenses",
        }
    }
}

// subtitle and publisher may be absent from a CSV; a spreadsheet must carry all seven.
const CSV_REQUIRED: &[Column] = &[
    Column::Title,
    Column::Authors,
    Column::PublishedDate,
    Column::Category,
    Column::DistributionExpenses,
];

#[cfg(feature = "xlsx")]
const XLSX_REQUIRED: &[Column] = &Column::ALL;

/// Position of each logical column in the upload's header row.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMap {
    indices: [Option<usize>; 7],
}

impl ColumnMap {
    pub fn from_headers<I, S>(headers: I, required: &[Column]) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut indices = [None; 7];
        for (i, header) in headers.into_iter().enumerate() {
            let header = normalize_header(header.as_ref());
            if let Some(col) = Column::ALL.iter().find(|c| c.name() == header) {
                indices[*col as usize].get_or_insert(i);
            }
        }
        let mut missing: Vec<String> = required
            .iter()
            .filter(|c| indices[**c as usize].is_none())
            .map(|c| c.name().to_string())
            .collect();
        if !missing.is_empty() {
            missing.sort();
            return Err(BooktallyError::MissingColumns(missing));
        }
        Ok(Self { indices })
    }

    pub fn index(&self, col: Column) -> Option<usize> {
        self.indices[col as usize]
    }
}

/// A single upload cell before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Date(NaiveDate),
    Empty,
}

impl Cell {
    fn raw(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
            Self::Empty => String::new(),
        }
    }

    fn text(&self) -> String {
        self.raw().trim().to_string()
    }

    fn is_blank(&self) -> bool {
        match self {
            Self::Text(s) => s.trim().is_empty(),
            Self::Date(_) => false,
            Self::Empty => true,
        }
    }
}

fn cell_at<'a>(map: &ColumnMap, cells: &'a [Cell], col: Column) -> Option<&'a Cell> {
    map.index(col).and_then(|i| cells.get(i))
}

fn text_at(map: &ColumnMap, cells: &[Cell], col: Column) -> String {
    cell_at(map, cells, col).map(Cell::text).unwrap_or_default()
}

pub fn normalize_row(map: &ColumnMap, cells: &[Cell], row: usize) -> Result<ParsedRow> {
    let published_date = match cell_at(map, cells, Column::PublishedDate) {
        Some(Cell::Date(d)) => *d,
        Some(cell) => parse_date_ymd(&cell.raw())?,
        None => parse_date_ymd("")?,
    };
    let category = text_at(map, cells, Column::Category);
    if category.is_empty() {
        return Err(BooktallyError::EmptyCategory);
    }
    let expenses_raw = cell_at(map, cells, Column::DistributionExpenses)
        .map(Cell::raw)
        .unwrap_or_default();
    Ok(ParsedRow {
        row,
        title: text_at(map, cells, Column::Title),
        subtitle: text_at(map, cells, Column::Subtitle),
        authors: text_at(map, cells, Column::Authors),
        publisher: text_at(map, cells, Column::Publisher),
        published_date,
        category,
        distribution_expenses: parse_expenses(&expenses_raw)?,
    })
}

fn normalize_rows<I>(map: &ColumnMap, records: I) -> Result<Vec<ParsedRow>>
where
    I: IntoIterator<Item = Result<Vec<Cell>>>,
{
    let mut rows = Vec::new();
    for (i, record) in records.into_iter().enumerate() {
        let row = i + 1;
        let cells = record.map_err(|e| e.at_row(row))?;
        if cells.iter().all(Cell::is_blank) {
            continue;
        }
        rows.push(normalize_row(map, &cells, row).map_err(|e| e.at_row(row))?);
    }
    Ok(rows)
}

// ---------------------------------------------------------------------------
// File formats: dispatch on the upload extension
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    #[cfg(feature = "xlsx")]
    Xlsx,
}

impl FileFormat {
    pub fn from_filename(file_name: &str) -> Result<Self> {
        let ext = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("csv") => Ok(Self::Csv),
            #[cfg(feature = "xlsx")]
            Some("xlsx") => Ok(Self::Xlsx),
            _ => Err(BooktallyError::UnsupportedFileType(file_name.to_string())),
        }
    }

    pub fn parse(&self, bytes: &[u8]) -> Result<Vec<ParsedRow>> {
        match self {
            Self::Csv => parse_csv(bytes),
            #[cfg(feature = "xlsx")]
            Self::Xlsx => parse_xlsx(bytes),
        }
    }
}

// ---------------------------------------------------------------------------
// CSV parser
// ---------------------------------------------------------------------------

pub fn parse_csv(bytes: &[u8]) -> Result<Vec<ParsedRow>> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| BooktallyError::Other(format!("File is not valid UTF-8: {e}")))?;
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers = rdr.headers()?.clone();
    let map = ColumnMap::from_headers(headers.iter(), CSV_REQUIRED)?;
    let records = rdr.records().map(|result| -> Result<Vec<Cell>> {
        let record = result?;
        Ok(record.iter().map(|f| Cell::Text(f.to_string())).collect())
    });
    normalize_rows(&map, records)
}

// ---------------------------------------------------------------------------
// XLSX parser (feature-gated)
// ---------------------------------------------------------------------------

#[cfg(feature = "xlsx")]
fn cell_from_data(data: &calamine::Data) -> Cell {
    use calamine::Data;
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Float(f) => Cell::Text(f.to_string()),
        Data::Int(i) => Cell::Text(i.to_string()),
        Data::DateTime(dt) => excel_serial_to_date(dt.as_f64())
            .map(Cell::Date)
            .unwrap_or_else(|| Cell::Text(dt.as_f64().to_string())),
        Data::DateTimeIso(s) => s
            .get(..10)
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
            .map(Cell::Date)
            .unwrap_or_else(|| Cell::Text(s.clone())),
        other => Cell::Text(other.to_string()),
    }
}

/// Reads the first worksheet; its first row is the header.
#[cfg(feature = "xlsx")]
pub fn parse_xlsx(bytes: &[u8]) -> Result<Vec<ParsedRow>> {
    use calamine::{Reader, Xlsx};

    let mut workbook: Xlsx<_> = Xlsx::new(std::io::Cursor::new(bytes))
        .map_err(|e| BooktallyError::Spreadsheet(format!("Failed to open XLSX: {e}")))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| BooktallyError::Spreadsheet("Workbook has no worksheets".to_string()))?
        .map_err(|e| BooktallyError::Spreadsheet(e.to_string()))?;
    parse_xlsx_range(&range)
}

#[cfg(feature = "xlsx")]
pub fn parse_xlsx_range(range: &calamine::Range<calamine::Data>) -> Result<Vec<ParsedRow>> {
    let mut rows = range.rows();
    let header = rows.next().unwrap_or(&[]);
    let map = ColumnMap::from_headers(header.iter().map(|c| c.to_string()), XLSX_REQUIRED)?;
    let records = rows.map(|row| -> Result<Vec<Cell>> { Ok(row.iter().map(cell_from_data).collect()) });
    normalize_rows(&map, records)
}

// ---------------------------------------------------------------------------
// import
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportResult {
    pub rows: usize,
    pub created: usize,
    pub updated: usize,
    pub categories_created: usize,
}

/// Upsert parsed rows in one transaction: either every row lands or none do.
pub fn import_rows(conn: &Connection, rows: &[ParsedRow]) -> Result<ImportResult> {
    let tx = conn.unchecked_transaction()?;
    let mut result = ImportResult::default();
    for row in rows {
        let (category, category_created) =
            get_or_create_category(&tx, &row.category).map_err(|e| e.at_row(row.row))?;
        let fields = BookFields {
            subtitle: row.subtitle.clone(),
            publisher: row.publisher.clone(),
            category_id: category.id,
            distribution_expenses: row.distribution_expenses,
        };
        let (_, created) = upsert_book(&tx, &row.natural_key(), &fields).map_err(|e| e.at_row(row.row))?;
        result.rows += 1;
        if created {
            result.created += 1;
        } else {
            result.updated += 1;
        }
        if category_created {
            result.categories_created += 1;
        }
    }
    tx.commit()?;
    Ok(result)
}

/// Import an uploaded file given its name and raw bytes.
///
/// An unrecognized extension is reported as-is; any later failure is wrapped
/// in `ImportFailed` and leaves the store untouched. On success the report
/// cache is invalidated.
pub fn import_upload(
    conn: &Connection,
    cache: &dyn ReportCache,
    file_name: &str,
    bytes: &[u8],
) -> Result<ImportResult> {
    let format = FileFormat::from_filename(file_name)?;
    tracing::debug!(file_name, ?format, size = bytes.len(), "importing upload");

    let result = format
        .parse(bytes)
        .and_then(|rows| import_rows(conn, &rows))
        .map_err(|e| {
            tracing::warn!(file_name, error = %e, "import failed");
            BooktallyError::ImportFailed(Box::new(e))
        })?;

    discard_cached_reports(cache);
    tracing::info!(
        file_name,
        rows = result.rows,
        created = result.created,
        updated = result.updated,
        categories_created = result.categories_created,
        "import complete"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{NoCache, SqliteCache};
    use crate::db::test_db;
    use crate::models::NaturalKey;
    use crate::reports::{get_expense_report, DEFAULT_CACHE_TTL};
    use crate::store::find_book;

    const HEADER: &str = "title,subtitle,authors,publisher,published_date,category,distribution_expenses\n";

    fn csv_with(rows: &[&str]) -> Vec<u8> {
        let mut content = String::from(HEADER);
        for row in rows {
            content.push_str(row);
            content.push('\n');
        }
        content.into_bytes()
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT count(*) FROM {table}"), [], |r| r.get(0))
            .unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_date_ymd() {
        assert_eq!(parse_date_ymd("2024-01-15").unwrap(), date(2024, 1, 15));
        assert_eq!(parse_date_ymd("  2024-01-15 ").unwrap(), date(2024, 1, 15));
    }

    #[test]
    fn test_parse_date_ymd_rejects_other_formats() {
        for raw in ["15/01/2024", "2024-1-15", "2024/01/15", "20240115", "", "2024-01-15T00:00"] {
            let err = parse_date_ymd(raw).unwrap_err();
            assert!(matches!(err, BooktallyError::InvalidDateFormat { .. }), "{raw}");
        }
        let msg = parse_date_ymd("15/01/2024").unwrap_err().to_string();
        assert_eq!(msg, "Invalid date format for '15/01/2024'. Expected YYYY-MM-DD.");
    }

    #[test]
    fn test_parse_date_ymd_rejects_impossible_dates() {
        assert!(parse_date_ymd("2024-02-30").is_err());
        assert!(parse_date_ymd("2024-13-01").is_err());
    }

    #[test]
    fn test_parse_expenses() {
        assert_eq!(parse_expenses("1,234.50").unwrap(), 1234.50);
        assert_eq!(parse_expenses("").unwrap(), 0.0);
        assert_eq!(parse_expenses("   ").unwrap(), 0.0);
        assert_eq!(parse_expenses(" 42 ").unwrap(), 42.0);
        assert_eq!(parse_expenses("-5.5").unwrap(), -5.5);
        assert_eq!(parse_expenses("1,000,000").unwrap(), 1_000_000.0);
    }

    #[test]
    fn test_parse_expenses_rejects_garbage() {
        assert!(matches!(parse_expenses("abc"), Err(BooktallyError::InvalidAmount { .. })));
        assert!(matches!(parse_expenses("NaN"), Err(BooktallyError::InvalidAmount { .. })));
        assert!(matches!(parse_expenses("$12"), Err(BooktallyError::InvalidAmount { .. })));
    }

    #[test]
    fn test_excel_serial_to_date() {
        assert_eq!(excel_serial_to_date(45306.0), Some(date(2024, 1, 15)));
        assert_eq!(excel_serial_to_date(45306.75), Some(date(2024, 1, 15)));
    }

    #[test]
    fn test_file_format_detection() {
        assert_eq!(FileFormat::from_filename("books.csv").unwrap(), FileFormat::Csv);
        assert_eq!(FileFormat::from_filename("BOOKS.CSV").unwrap(), FileFormat::Csv);
        assert!(matches!(
            FileFormat::from_filename("books.xls"),
            Err(BooktallyError::UnsupportedFileType(_))
        ));
        assert!(matches!(
            FileFormat::from_filename("books"),
            Err(BooktallyError::UnsupportedFileType(_))
        ));
    }

    #[cfg(feature = "xlsx")]
    #[test]
    fn test_file_format_detects_xlsx() {
        assert_eq!(FileFormat::from_filename("Books.XLSX").unwrap(), FileFormat::Xlsx);
    }

    #[test]
    fn test_column_map_normalizes_headers() {
        let map = ColumnMap::from_headers(
            ["\u{feff} Title", "AUTHORS ", "Published_Date", "category", "Distribution_Expenses", "notes"],
            CSV_REQUIRED,
        )
        .unwrap();
        assert_eq!(map.index(Column::Title), Some(0));
        assert_eq!(map.index(Column::DistributionExpenses), Some(4));
        assert_eq!(map.index(Column::Publisher), None);
    }

    #[test]
    fn test_column_map_reports_missing_sorted() {
        let err = ColumnMap::from_headers(["authors", "published_date", "distribution_expenses"], CSV_REQUIRED)
            .unwrap_err();
        match err {
            BooktallyError::MissingColumns(cols) => assert_eq!(cols, vec!["category", "title"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_parse_csv_normalizes_rows() {
        let bytes = csv_with(&[
            "  Harmattan , A Novel ,  Ada Obi ,Lantern,2024-01-15, Fiction ,\"1,234.50\"",
            "Counting Goats,,Chi Eze,,2023-06-01,Children,",
        ]);
        let rows = parse_csv(&bytes).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].title, "Harmattan");
        assert_eq!(rows[0].subtitle, "A Novel");
        assert_eq!(rows[0].authors, "Ada Obi");
        assert_eq!(rows[0].category, "Fiction");
        assert_eq!(rows[0].published_date, date(2024, 1, 15));
        assert_eq!(rows[0].distribution_expenses, 1234.50);
        assert_eq!(rows[1].publisher, "");
        assert_eq!(rows[1].distribution_expenses, 0.0);
    }

    #[test]
    fn test_parse_csv_optional_columns_default_empty() {
        let bytes = b"Title,Authors,Published_Date,Category,Distribution_Expenses\n\
                      Harmattan,Ada Obi,2024-01-15,Fiction,10\n";
        let rows = parse_csv(bytes).unwrap();
        assert_eq!(rows[0].subtitle, "");
        assert_eq!(rows[0].publisher, "");
    }

    #[test]
    fn test_parse_csv_skips_blank_lines() {
        let bytes = csv_with(&["Harmattan,,Ada Obi,,2024-01-15,Fiction,1", ",,,,,,"]);
        assert_eq!(parse_csv(&bytes).unwrap().len(), 1);
    }

    #[test]
    fn test_parse_csv_bad_date_names_row() {
        let bytes = csv_with(&[
            "Harmattan,,Ada Obi,,2024-01-15,Fiction,1",
            "Dry Season,,Ada Obi,,15/01/2024,Fiction,1",
        ]);
        let msg = parse_csv(&bytes).unwrap_err().to_string();
        assert_eq!(msg, "row 2: Invalid date format for '15/01/2024'. Expected YYYY-MM-DD.");
    }

    #[test]
    fn test_parse_csv_rejects_non_utf8() {
        assert!(parse_csv(&[0xff, 0xfe, 0x00]).is_err());
    }

    #[test]
    fn test_import_creates_category_once() {
        let (_dir, conn) = test_db();
        let bytes = csv_with(&[
            "Harmattan,,Ada Obi,Lantern,2024-01-15,Fiction,100",
            "Dry Season,,Ada Obi,Lantern,2024-02-01,Fiction,50",
        ]);
        let result = import_upload(&conn, &NoCache, "books.csv", &bytes).unwrap();
        assert_eq!(result.categories_created, 1);
        assert_eq!(result.created, 2);

        let again = import_upload(&conn, &NoCache, "books.csv", &bytes).unwrap();
        assert_eq!(again.categories_created, 0);
        assert_eq!(again.updated, 2);
        assert_eq!(count(&conn, "categories"), 1);
        assert_eq!(count(&conn, "books"), 2);
    }

    #[test]
    fn test_reimport_updates_mutable_fields() {
        let (_dir, conn) = test_db();
        let first = csv_with(&["Harmattan,Old,Ada Obi,Lantern,2024-01-15,Fiction,100"]);
        import_upload(&conn, &NoCache, "a.csv", &first).unwrap();
        let second = csv_with(&["Harmattan,New,Ada Obi,Kola,2024-01-15,Essays,\"2,500.75\""]);
        let result = import_upload(&conn, &NoCache, "b.csv", &second).unwrap();
        assert_eq!(result.updated, 1);
        assert_eq!(result.created, 0);

        let key = NaturalKey {
            title: "Harmattan".into(),
            authors: "Ada Obi".into(),
            published_date: date(2024, 1, 15),
        };
        let book = find_book(&conn, &key).unwrap().unwrap();
        assert_eq!(book.title, "Harmattan");
        assert_eq!(book.authors, "Ada Obi");
        assert_eq!(book.published_date, date(2024, 1, 15));
        assert_eq!(book.subtitle, "New");
        assert_eq!(book.publisher, "Kola");
        assert_eq!(book.category, "Essays");
        assert_eq!(book.distribution_expenses, 2500.75);
        assert_eq!(count(&conn, "books"), 1);
    }

    #[test]
    fn test_natural_key_is_case_sensitive() {
        let (_dir, conn) = test_db();
        let bytes = csv_with(&[
            "Harmattan,,Ada Obi,,2024-01-15,Fiction,1",
            "harmattan,,Ada Obi,,2024-01-15,Fiction,1",
        ]);
        let result = import_upload(&conn, &NoCache, "books.csv", &bytes).unwrap();
        assert_eq!(result.created, 2);
    }

    #[test]
    fn test_unsupported_extension_is_not_wrapped() {
        let (_dir, conn) = test_db();
        let err = import_upload(&conn, &NoCache, "books.txt", b"whatever").unwrap_err();
        assert!(matches!(err, BooktallyError::UnsupportedFileType(_)));
        assert_eq!(count(&conn, "books"), 0);
    }

    #[test]
    fn test_bad_row_rolls_back_whole_batch() {
        let (_dir, conn) = test_db();
        let bytes = csv_with(&[
            "Harmattan,,Ada Obi,,2024-01-15,Fiction,100",
            "Dry Season,,Ada Obi,,2024-02-01,Essays,not-a-number",
        ]);
        let err = import_upload(&conn, &NoCache, "books.csv", &bytes).unwrap_err();
        assert!(matches!(err, BooktallyError::ImportFailed(_)));
        assert!(err.to_string().starts_with("Import failed: row 2: Invalid amount"));
        assert_eq!(count(&conn, "categories"), 0);
        assert_eq!(count(&conn, "books"), 0);
    }

    #[test]
    fn test_import_rows_rolls_back_on_store_failure() {
        let (_dir, conn) = test_db();
        let good = ParsedRow {
            row: 1,
            title: "Harmattan".into(),
            subtitle: String::new(),
            authors: "Ada Obi".into(),
            publisher: String::new(),
            published_date: date(2024, 1, 15),
            category: "Fiction".into(),
            distribution_expenses: 1.0,
        };
        let bad = ParsedRow {
            row: 2,
            category: String::new(),
            ..good.clone()
        };
        let err = import_rows(&conn, &[good, bad]).unwrap_err();
        assert_eq!(err.to_string(), "row 2: Category name is empty");
        assert_eq!(count(&conn, "categories"), 0);
        assert_eq!(count(&conn, "books"), 0);
    }

    #[test]
    fn test_store_errors_count_blank_rows() {
        let (_dir, conn) = test_db();
        conn.execute_batch(
            "CREATE TRIGGER reject_bad BEFORE INSERT ON books WHEN NEW.title = 'Bad' \
             BEGIN SELECT RAISE(ABORT, 'boom'); END;",
        )
        .unwrap();
        let bytes = csv_with(&[
            "Good,,Ada Obi,,2024-01-15,Fiction,1",
            ",,,,,,",
            "Bad,,Ada Obi,,2024-01-15,Fiction,1",
        ]);
        let rows = parse_csv(&bytes).unwrap();
        assert_eq!(rows.iter().map(|r| r.row).collect::<Vec<_>>(), vec![1, 3]);

        let err = import_upload(&conn, &NoCache, "books.csv", &bytes).unwrap_err();
        assert!(err.to_string().starts_with("Import failed: row 3: "), "{err}");
        assert_eq!(count(&conn, "books"), 0);
    }

    #[test]
    fn test_csv_missing_required_column_fails_before_any_row() {
        let (_dir, conn) = test_db();
        let bytes = b"title,authors,published_date,distribution_expenses\nHarmattan,Ada Obi,2024-01-15,1\n";
        let err = import_upload(&conn, &NoCache, "books.csv", bytes).unwrap_err();
        assert_eq!(err.to_string(), "Import failed: Missing columns: category");
        assert_eq!(count(&conn, "books"), 0);
    }

    #[test]
    fn test_import_invalidates_cached_report() {
        let (_dir, conn) = test_db();
        let cache = SqliteCache::new(&conn);
        import_upload(
            &conn,
            &cache,
            "first.csv",
            &csv_with(&["Harmattan,,Ada Obi,Lantern,2024-01-15,Fiction,100"]),
        )
        .unwrap();
        let before = get_expense_report(&conn, &cache, DEFAULT_CACHE_TTL).unwrap();
        assert_eq!(before.by_category.len(), 1);

        import_upload(
            &conn,
            &cache,
            "second.csv",
            &csv_with(&["Counting Goats,,Chi Eze,,2023-06-01,Children,75"]),
        )
        .unwrap();
        let after = get_expense_report(&conn, &cache, DEFAULT_CACHE_TTL).unwrap();
        let names: Vec<&str> = after.by_category.iter().map(|t| t.category.as_str()).collect();
        assert_eq!(names, vec!["Children", "Fiction"]);
        assert_eq!(after.by_category[0].total, 75.0);
        assert_eq!(after.grand_total, 175.0);
    }

    #[test]
    fn test_import_succeeds_when_cache_unavailable() {
        let (_dir, conn) = test_db();
        conn.execute_batch("DROP TABLE report_cache").unwrap();
        let cache = SqliteCache::new(&conn);
        let bytes = csv_with(&["Harmattan,,Ada Obi,,2024-01-15,Fiction,100"]);
        let result = import_upload(&conn, &cache, "books.csv", &bytes).unwrap();
        assert_eq!(result.created, 1);
        assert_eq!(count(&conn, "books"), 1);
    }

    #[test]
    fn test_failed_import_keeps_cache() {
        let (_dir, conn) = test_db();
        let cache = SqliteCache::new(&conn);
        import_upload(
            &conn,
            &cache,
            "first.csv",
            &csv_with(&["Harmattan,,Ada Obi,,2024-01-15,Fiction,100"]),
        )
        .unwrap();
        get_expense_report(&conn, &cache, DEFAULT_CACHE_TTL).unwrap();
        assert!(import_upload(&conn, &cache, "bad.csv", b"nope\n1\n").is_err());
        assert!(cache.get(crate::reports::AGGREGATES_KEY).unwrap().is_some());
    }

    #[cfg(feature = "xlsx")]
    mod xlsx {
        use super::*;
        use calamine::{Data, ExcelDateTime, ExcelDateTimeType, Range};

        fn sheet(header: &[&str], rows: &[Vec<Data>]) -> Range<Data> {
            let width = header.len() as u32;
            let mut range = Range::new((0, 0), (rows.len() as u32, width - 1));
            for (c, h) in header.iter().enumerate() {
                range.set_value((0, c as u32), Data::String(h.to_string()));
            }
            for (r, row) in rows.iter().enumerate() {
                for (c, cell) in row.iter().enumerate() {
                    range.set_value((r as u32 + 1, c as u32), cell.clone());
                }
            }
            range
        }

        fn s(v: &str) -> Data {
            Data::String(v.to_string())
        }

        const FULL_HEADER: &[&str] = &[
            "Title", "Subtitle", "Authors", "Publisher", "Published_Date", "Category", "Distribution_Expenses",
        ];

        #[test]
        fn test_xlsx_rows_with_typed_cells() {
            let range = sheet(
                FULL_HEADER,
                &[
                    vec![
                        s(" Harmattan "),
                        Data::Empty,
                        s("Ada Obi"),
                        s("Lantern"),
                        Data::DateTimeIso("2024-01-15T00:00:00".to_string()),
                        s("Fiction"),
                        Data::Float(1234.5),
                    ],
                    vec![
                        Data::Int(1984),
                        s("Reissue"),
                        s("G. Orwell"),
                        Data::Empty,
                        s("2023-06-01"),
                        s("Classics"),
                        s("2,000"),
                    ],
                ],
            );
            let rows = parse_xlsx_range(&range).unwrap();
            assert_eq!(rows.len(), 2);
            assert_eq!(rows[0].title, "Harmattan");
            assert_eq!(rows[0].subtitle, "");
            assert_eq!(rows[0].published_date, date(2024, 1, 15));
            assert_eq!(rows[0].distribution_expenses, 1234.5);
            assert_eq!(rows[1].title, "1984");
            assert_eq!(rows[1].published_date, date(2023, 6, 1));
            assert_eq!(rows[1].distribution_expenses, 2000.0);
        }

        #[test]
        fn test_xlsx_date_cell_uses_date_component() {
            let stamp = ExcelDateTime::new(45306.75, ExcelDateTimeType::DateTime, false);
            let range = sheet(
                FULL_HEADER,
                &[vec![
                    s("Harmattan"),
                    Data::Empty,
                    s("Ada Obi"),
                    s("Lantern"),
                    Data::DateTime(stamp),
                    s("Fiction"),
                    Data::Float(10.0),
                ]],
            );
            let rows = parse_xlsx_range(&range).unwrap();
            assert_eq!(rows[0].published_date, date(2024, 1, 15));
            assert_eq!(rows[0].row, 1);
        }

        #[test]
        fn test_xlsx_missing_category_aborts_without_mutations() {
            let (_dir, conn) = test_db();
            let header: Vec<&str> = FULL_HEADER.iter().copied().filter(|h| *h != "Category").collect();
            let range = sheet(
                &header,
                &[vec![s("Harmattan"), s(""), s("Ada Obi"), s("Lantern"), s("2024-01-15"), s("10")]],
            );
            let err = parse_xlsx_range(&range)
                .and_then(|rows| import_rows(&conn, &rows))
                .unwrap_err();
            match err {
                BooktallyError::MissingColumns(cols) => assert_eq!(cols, vec!["category"]),
                other => panic!("unexpected error: {other}"),
            }
            assert_eq!(count(&conn, "categories"), 0);
            assert_eq!(count(&conn, "books"), 0);
        }

        #[test]
        fn test_xlsx_requires_subtitle_and_publisher() {
            let range = sheet(
                &["title", "authors", "published_date", "category", "distribution_expenses"],
                &[],
            );
            match parse_xlsx_range(&range).unwrap_err() {
                BooktallyError::MissingColumns(cols) => assert_eq!(cols, vec!["publisher", "subtitle"]),
                other => panic!("unexpected error: {other}"),
            }
        }

        #[test]
        fn test_xlsx_numeric_date_cell_is_not_a_date() {
            let range = sheet(
                FULL_HEADER,
                &[vec![s("Harmattan"), s(""), s("Ada Obi"), s(""), Data::Float(45306.0), s("Fiction"), s("1")]],
            );
            let err = parse_xlsx_range(&range).unwrap_err();
            assert_eq!(err.to_string(), "row 1: Invalid date format for '45306'. Expected YYYY-MM-DD.");
        }

        #[test]
        fn test_corrupt_xlsx_is_import_failure() {
            let (_dir, conn) = test_db();
            let err = import_upload(&conn, &NoCache, "books.xlsx", b"not a zip archive").unwrap_err();
            assert!(matches!(err, BooktallyError::ImportFailed(_)));
            assert!(err.to_string().starts_with("Import failed: Spreadsheet error"));
        }
    }
}
