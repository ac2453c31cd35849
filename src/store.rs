use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::error::{BooktallyError, Result};
use crate::models::{round_cents, Book, BookFields, Category, NaturalKey};

pub(crate) const BOOK_COLUMNS: &str = "b.id, b.title, b.subtitle, b.authors, b.publisher, \
     b.published_date, b.category_id, c.name, b.distribution_expenses";

pub(crate) fn book_from_row(row: &Row) -> rusqlite::Result<Book> {
    let date: String = row.get(5)?;
    let published_date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Book {
        id: row.get(0)?,
        title: row.get(1)?,
        subtitle: row.get(2)?,
        authors: row.get(3)?,
        publisher: row.get(4)?,
        published_date,
        category_id: row.get(6)?,
        category: row.get(7)?,
        distribution_expenses: row.get(8)?,
    })
}

pub(crate) fn date_str(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn find_category(conn: &Connection, name: &str) -> Result<Option<Category>> {
    let cat = conn
        .query_row(
            "SELECT id, name FROM categories WHERE name = ?1",
            [name],
            |row| {
                Ok(Category {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(cat)
}

/// Look up a category by exact name, inserting it when missing.
/// Returns the category and whether it was created.
pub fn get_or_create_category(conn: &Connection, name: &str) -> Result<(Category, bool)> {
    if name.is_empty() {
        return Err(BooktallyError::EmptyCategory);
    }
    if let Some(cat) = find_category(conn, name)? {
        return Ok((cat, false));
    }
    conn.execute("INSERT INTO categories (name) VALUES (?1)", [name])?;
    tracing::debug!(category = name, "created category");
    Ok((
        Category {
            id: conn.last_insert_rowid(),
            name: name.to_string(),
        },
        true,
    ))
}

pub fn get_book(conn: &Connection, id: i64) -> Result<Book> {
    let sql = format!(
        "SELECT {BOOK_COLUMNS} FROM books b JOIN categories c ON b.category_id = c.id \
         WHERE b.id = ?1"
    );
    conn.query_row(&sql, [id], book_from_row)
        .optional()?
        .ok_or_else(|| BooktallyError::NotFound(format!("book id {id}")))
}

pub fn find_book(conn: &Connection, key: &NaturalKey) -> Result<Option<Book>> {
    let sql = format!(
        "SELECT {BOOK_COLUMNS} FROM books b JOIN categories c ON b.category_id = c.id \
         WHERE b.title = ?1 AND b.authors = ?2 AND b.published_date = ?3"
    );
    let book = conn
        .query_row(
            &sql,
            rusqlite::params![key.title, key.authors, date_str(key.published_date)],
            book_from_row,
        )
        .optional()?;
    Ok(book)
}

/// Update the book matching `key` in place, or insert a new one.
/// Returns the stored book and whether it was created.
pub fn upsert_book(conn: &Connection, key: &NaturalKey, fields: &BookFields) -> Result<(Book, bool)> {
    let expenses = round_cents(fields.distribution_expenses);
    let (id, created) = match find_book(conn, key)? {
        Some(existing) => {
            conn.execute(
                "UPDATE books SET subtitle = ?1, publisher = ?2, category_id = ?3, \
                 distribution_expenses = ?4, updated_at = datetime('now') WHERE id = ?5",
                rusqlite::params![
                    fields.subtitle,
                    fields.publisher,
                    fields.category_id,
                    expenses,
                    existing.id
                ],
            )?;
            (existing.id, false)
        }
        None => {
            conn.execute(
                "INSERT INTO books (title, subtitle, authors, publisher, published_date, \
                 category_id, distribution_expenses) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    key.title,
                    fields.subtitle,
                    key.authors,
                    fields.publisher,
                    date_str(key.published_date),
                    fields.category_id,
                    expenses
                ],
            )?;
            (conn.last_insert_rowid(), true)
        }
    };
    Ok((get_book(conn, id)?, created))
}
