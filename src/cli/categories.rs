use comfy_table::{Cell, Table};
use rusqlite::Connection;

use crate::cli::{after_catalog_change, open_db};
use crate::error::{BooktallyError, Result};
use crate::settings::Settings;

#[derive(Debug, Clone)]
pub struct CategoryRow {
    pub id: i64,
    pub name: String,
    pub book_count: i64,
}

pub fn list() -> Result<()> {
    let conn = open_db(&Settings::load())?;
    let categories = list_categories(&conn)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Name", "Books"]);
    for cat in categories {
        table.add_row(vec![Cell::new(cat.id), Cell::new(cat.name), Cell::new(cat.book_count)]);
    }
    println!("Categories\n{table}");
    Ok(())
}

pub fn add(name: &str) -> Result<()> {
    let settings = Settings::load();
    let conn = open_db(&settings)?;
    let id = add_category(&conn, name)?;
    after_catalog_change(&settings, &conn);
    println!("Added category {id}: {}", name.trim());
    Ok(())
}

pub fn rename(id: i64, new_name: &str) -> Result<()> {
    let settings = Settings::load();
    let conn = open_db(&settings)?;
    rename_category(&conn, id, new_name)?;
    after_catalog_change(&settings, &conn);
    println!("Renamed category {id} to: {}", new_name.trim());
    Ok(())
}

pub fn delete(id: i64) -> Result<()> {
    let settings = Settings::load();
    let conn = open_db(&settings)?;
    delete_category(&conn, id)?;
    after_catalog_change(&settings, &conn);
    println!("Deleted category {id}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Data layer
// ---------------------------------------------------------------------------

pub fn list_categories(conn: &Connection) -> Result<Vec<CategoryRow>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.name, COUNT(b.id) \
         FROM categories c LEFT JOIN books b ON b.category_id = c.id \
         GROUP BY c.id ORDER BY c.name",
    )?;
    let categories = stmt
        .query_map([], |row| {
            Ok(CategoryRow {
                id: row.get(0)?,
                name: row.get(1)?,
                book_count: row.get(2)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(categories)
}

fn name_taken(conn: &Connection, name: &str, except_id: Option<i64>) -> Result<bool> {
    let taken = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM categories WHERE name = ?1 AND id != ?2)",
        rusqlite::params![name, except_id.unwrap_or(-1)],
        |row| row.get(0),
    )?;
    Ok(taken)
}

pub fn add_category(conn: &Connection, name: &str) -> Result<i64> {
    let name = name.trim();
    if name.is_empty() {
        return Err(BooktallyError::EmptyCategory);
    }
    if name_taken(conn, name, None)? {
        return Err(BooktallyError::Conflict(format!("Category name already exists: {name}")));
    }
    conn.execute("INSERT INTO categories (name) VALUES (?1)", [name])?;
    Ok(conn.last_insert_rowid())
}

pub fn rename_category(conn: &Connection, id: i64, new_name: &str) -> Result<()> {
    let new_name = new_name.trim();
    if new_name.is_empty() {
        return Err(BooktallyError::EmptyCategory);
    }
    if name_taken(conn, new_name, Some(id))? {
        return Err(BooktallyError::Conflict(format!(
            "Category name already exists: {new_name}"
        )));
    }
    let updated = conn.execute(
        "UPDATE categories SET name = ?1 WHERE id = ?2",
        rusqlite::params![new_name, id],
    )?;
    if updated == 0 {
        return Err(BooktallyError::NotFound(format!("category id {id}")));
    }
    Ok(())
}

/// Returns a human-readable reason why a category cannot be deleted, or None if
/// deletion is safe.
pub fn blocking_reason(conn: &Connection, id: i64) -> Result<Option<String>> {
    let book_count: i64 = conn.query_row(
        "SELECT count(*) FROM books WHERE category_id = ?1",
        [id],
        |row| row.get(0),
    )?;
    if book_count > 0 {
        let noun = if book_count == 1 { "book" } else { "books" };
        return Ok(Some(format!("Cannot delete: category has {book_count} {noun}")));
    }
    Ok(None)
}

pub fn delete_category(conn: &Connection, id: i64) -> Result<()> {
    if let Some(reason) = blocking_reason(conn, id)? {
        return Err(BooktallyError::Conflict(reason));
    }
    let deleted = conn.execute("DELETE FROM categories WHERE id = ?1", [id])?;
    if deleted == 0 {
        return Err(BooktallyError::NotFound(format!("category id {id}")));
    }
    Ok(())
}
