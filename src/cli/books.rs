use comfy_table::{Cell, CellAlignment, Table};
use rusqlite::Connection;

use crate::cli::{after_catalog_change, open_db, BookArgs};
use crate::error::{BooktallyError, Result};
use crate::fmt::amount;
use crate::importer::{parse_date_ymd, parse_expenses};
use crate::models::{Book, BookFields, NaturalKey};
use crate::settings::Settings;
use crate::store::{book_from_row, date_str, find_book, find_category, get_book, upsert_book, BOOK_COLUMNS};

#[derive(Debug)]
pub struct BookPage {
    pub books: Vec<Book>,
    pub page: usize,
    pub pages: usize,
    pub total: usize,
}

pub fn list(page: usize, category: Option<&str>) -> Result<()> {
    let settings = Settings::load();
    let conn = open_db(&settings)?;
    let result = list_books(&conn, page, settings.page_size, category)?;

    if result.books.is_empty() {
        println!("No books.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Title", "Authors", "Publisher", "Published", "Category", "Expenses"]);
    for b in &result.books {
        let title = if b.subtitle.is_empty() {
            b.title.clone()
        } else {
            format!("{}: {}", b.title, b.subtitle)
        };
        table.add_row(vec![
            Cell::new(b.id),
            Cell::new(title),
            Cell::new(&b.authors),
            Cell::new(&b.publisher),
            Cell::new(b.published_date),
            Cell::new(&b.category),
            Cell::new(amount(b.distribution_expenses)).set_alignment(CellAlignment::Right),
        ]);
    }
    println!(
        "Books (page {} of {}, {} total)\n{table}",
        result.page, result.pages, result.total
    );
    Ok(())
}

pub fn add(args: &BookArgs) -> Result<()> {
    let settings = Settings::load();
    let conn = open_db(&settings)?;
    let book = add_book(&conn, args)?;
    after_catalog_change(&settings, &conn);
    println!("Added book {}: {} ({})", book.id, book.title, book.category);
    Ok(())
}

pub fn edit(id: i64, args: &BookArgs) -> Result<()> {
    let settings = Settings::load();
    let conn = open_db(&settings)?;
    let book = edit_book(&conn, id, args)?;
    after_catalog_change(&settings, &conn);
    println!("Updated book {}: {}", book.id, book.title);
    Ok(())
}

pub fn delete(id: i64) -> Result<()> {
    let settings = Settings::load();
    let conn = open_db(&settings)?;
    let book = delete_book(&conn, id)?;
    after_catalog_change(&settings, &conn);
    println!("Deleted book {id}: {}", book.title);
    Ok(())
}

// ---------------------------------------------------------------------------
// Data layer
// ---------------------------------------------------------------------------

pub fn list_books(
    conn: &Connection,
    page: usize,
    page_size: usize,
    category: Option<&str>,
) -> Result<BookPage> {
    let page_size = page_size.max(1);
    let page = page.max(1);
    let filter = if category.is_some() { "WHERE c.name = ?1" } else { "" };

    let count_sql = format!(
        "SELECT count(*) FROM books b JOIN categories c ON b.category_id = c.id {filter}"
    );
    let total: i64 = match category {
        Some(name) => conn.query_row(&count_sql, [name], |row| row.get(0))?,
        None => conn.query_row(&count_sql, [], |row| row.get(0))?,
    };
    let total = total as usize;
    let offset = (page - 1)
        .checked_mul(page_size)
        .and_then(|o| i64::try_from(o).ok())
        .ok_or_else(|| BooktallyError::Other(format!("Page {page} is out of range")))?;

    let sql = format!(
        "SELECT {BOOK_COLUMNS} FROM books b JOIN categories c ON b.category_id = c.id {filter} \
         ORDER BY b.title, b.id LIMIT {page_size} OFFSET {offset}"
    );
    let mut stmt = conn.prepare(&sql)?;
    let books = match category {
        Some(name) => stmt.query_map([name], book_from_row)?.collect::<std::result::Result<Vec<_>, _>>()?,
        None => stmt.query_map([], book_from_row)?.collect::<std::result::Result<Vec<_>, _>>()?,
    };

    Ok(BookPage {
        books,
        page,
        pages: total.div_ceil(page_size).max(1),
        total,
    })
}

fn require_category(conn: &Connection, name: &str) -> Result<i64> {
    let name = name.trim();
    find_category(conn, name)?
        .map(|c| c.id)
        .ok_or_else(|| BooktallyError::UnknownCategory(name.to_string()))
}

fn required<'a>(value: &'a Option<String>, flag: &str) -> Result<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .ok_or_else(|| BooktallyError::Other(format!("--{flag} is required")))
}

pub fn add_book(conn: &Connection, args: &BookArgs) -> Result<Book> {
    let key = NaturalKey {
        title: required(&args.title, "title")?.to_string(),
        authors: required(&args.authors, "authors")?.to_string(),
        published_date: parse_date_ymd(required(&args.published_date, "published-date")?)?,
    };
    let category_id = require_category(conn, required(&args.category, "category")?)?;
    if find_book(conn, &key)?.is_some() {
        return Err(BooktallyError::Conflict(format!(
            "A book titled '{}' by {} published {} already exists",
            key.title,
            key.authors,
            date_str(key.published_date)
        )));
    }
    let fields = BookFields {
        subtitle: args.subtitle.as_deref().unwrap_or_default().trim().to_string(),
        publisher: args.publisher.as_deref().unwrap_or_default().trim().to_string(),
        category_id,
        distribution_expenses: parse_expenses(args.expenses.as_deref().unwrap_or_default())?,
    };
    let (book, _) = upsert_book(conn, &key, &fields)?;
    Ok(book)
}

pub fn edit_book(conn: &Connection, id: i64, args: &BookArgs) -> Result<Book> {
    let current = get_book(conn, id)?;

    let title = args.title.as_deref().map_or(current.title.clone(), |s| s.trim().to_string());
    let authors = args.authors.as_deref().map_or(current.authors.clone(), |s| s.trim().to_string());
    let published_date = match args.published_date.as_deref() {
        Some(raw) => parse_date_ymd(raw)?,
        None => current.published_date,
    };
    let category_id = match args.category.as_deref() {
        Some(name) => require_category(conn, name)?,
        None => current.category_id,
    };
    let subtitle = args.subtitle.as_deref().map_or(current.subtitle.clone(), |s| s.trim().to_string());
    let publisher = args.publisher.as_deref().map_or(current.publisher.clone(), |s| s.trim().to_string());
    let expenses = match args.expenses.as_deref() {
        Some(raw) => parse_expenses(raw)?,
        None => current.distribution_expenses,
    };

    let key = NaturalKey {
        title,
        authors,
        published_date,
    };
    if let Some(other) = find_book(conn, &key)? {
        if other.id != id {
            return Err(BooktallyError::Conflict(format!(
                "Book {} already has that title, authors and published date",
                other.id
            )));
        }
    }

    conn.execute(
        "UPDATE books SET title = ?1, subtitle = ?2, authors = ?3, publisher = ?4, \
         published_date = ?5, category_id = ?6, distribution_expenses = ?7, \
         updated_at = datetime('now') WHERE id = ?8",
        rusqlite::params![
            key.title,
            subtitle,
            key.authors,
            publisher,
            date_str(key.published_date),
            category_id,
            expenses,
            id
        ],
    )?;
    get_book(conn, id)
}

pub fn delete_book(conn: &Connection, id: i64) -> Result<Book> {
    let book = get_book(conn, id)?;
    conn.execute("DELETE FROM books WHERE id = ?1", [id])?;
    Ok(book)
}
