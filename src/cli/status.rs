use crate::db::DB_FILE;
use crate::error::Result;
use crate::settings::Settings;

pub fn run() -> Result<()> {
    let settings = Settings::load();
    let db_path = settings.data_path().join(DB_FILE);

    println!("Data dir:   {}", settings.data_dir);
    println!("Database:   {}", db_path.display());
    if settings.cache_enabled {
        println!("Cache:      on ({}s TTL)", settings.cache_ttl_secs);
    } else {
        println!("Cache:      off");
    }

    if !db_path.exists() {
        println!();
        println!("Database not found. Run `booktally init` to set up.");
        return Ok(());
    }

    let conn = crate::db::get_connection(&db_path)?;
    crate::db::init_db(&conn)?;
    let categories: i64 = conn.query_row("SELECT count(*) FROM categories", [], |r| r.get(0))?;
    let books: i64 = conn.query_row("SELECT count(*) FROM books", [], |r| r.get(0))?;
    let cached: i64 = conn.query_row(
        "SELECT count(*) FROM report_cache WHERE expires_at > ?1",
        [chrono::Utc::now().timestamp_millis()],
        |r| r.get(0),
    )?;

    println!();
    println!("Categories:     {categories}");
    println!("Books:          {books}");
    println!("Cached reports: {cached}");
    Ok(())
}
