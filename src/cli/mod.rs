pub mod books;
pub mod categories;
pub mod import;
pub mod init;
pub mod report;
pub mod status;

use clap::{Args, Parser, Subcommand};
use rusqlite::Connection;

use crate::cache::{NoCache, ReportCache, SqliteCache};
use crate::db::{get_connection, init_db, DB_FILE};
use crate::error::{BooktallyError, Result};
use crate::reports::discard_cached_reports;
use crate::settings::Settings;

/// Open the configured database; it must have been created by `booktally init`.
pub(crate) fn open_db(settings: &Settings) -> Result<Connection> {
    let db_path = settings.data_path().join(DB_FILE);
    if !db_path.exists() {
        return Err(BooktallyError::Settings(format!(
            "No database found at {}\nRun `booktally init` to create one.",
            db_path.display()
        )));
    }
    let conn = get_connection(&db_path)?;
    init_db(&conn)?;
    Ok(conn)
}

pub(crate) fn report_cache<'a>(settings: &Settings, conn: &'a Connection) -> Box<dyn ReportCache + 'a> {
    if settings.cache_enabled {
        Box::new(SqliteCache::new(conn))
    } else {
        Box::new(NoCache)
    }
}

/// Catalog edits change report totals, so cached reports are dropped after each one.
pub(crate) fn after_catalog_change(settings: &Settings, conn: &Connection) {
    discard_cached_reports(report_cache(settings, conn).as_ref());
}

#[derive(Parser)]
#[command(name = "booktally", about = "Track book distribution expenses by category and publisher.")]
pub struct Cli {
    /// Show debug logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set up booktally: choose a data directory and initialize the database.
    Init {
        /// Path for booktally data (default: ~/Documents/booktally)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Manage book categories.
    Categories {
        #[command(subcommand)]
        command: CategoriesCommands,
    },
    /// Manage books.
    Books {
        #[command(subcommand)]
        command: BooksCommands,
    },
    /// Import books from a CSV or XLSX file (upserts by title, authors and published date).
    Import {
        /// Path to a .csv or .xlsx file
        file: String,
    },
    /// Distribution expenses by category and publisher.
    Report {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show data directory, database and cache settings.
    Status,
}

#[derive(Subcommand)]
pub enum CategoriesCommands {
    /// List categories with their book counts.
    List,
    /// Add a category.
    Add {
        /// Category name (case-sensitive, unique)
        name: String,
    },
    /// Rename a category.
    Rename {
        /// Category ID
        id: i64,
        /// New name
        name: String,
    },
    /// Delete a category that no book references.
    Delete {
        /// Category ID
        id: i64,
    },
}

#[derive(Args)]
pub struct BookArgs {
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub subtitle: Option<String>,
    #[arg(long)]
    pub authors: Option<String>,
    #[arg(long)]
    pub publisher: Option<String>,
    /// Published date: YYYY-MM-DD
    #[arg(long = "published-date")]
    pub published_date: Option<String>,
    /// Existing category name
    #[arg(long)]
    pub category: Option<String>,
    /// Distribution expenses, e.g. 1,234.50
    #[arg(long)]
    pub expenses: Option<String>,
}

#[derive(Subcommand)]
pub enum BooksCommands {
    /// List books ordered by title.
    List {
        /// Page number, starting at 1
        #[arg(long, default_value = "1")]
        page: usize,
        /// Only books in this category
        #[arg(long)]
        category: Option<String>,
    },
    /// Add a book. Requires --title, --authors, --published-date and --category.
    Add {
        #[command(flatten)]
        fields: BookArgs,
    },
    /// Edit a book; only the given fields change.
    Edit {
        /// Book ID
        id: i64,
        #[command(flatten)]
        fields: BookArgs,
    },
    /// Delete a book.
    Delete {
        /// Book ID
        id: i64,
    },
}
