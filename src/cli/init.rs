use crate::db::{open_data_dir, DB_FILE};
use crate::error::Result;
use crate::settings::Settings;

pub fn run(data_dir: Option<String>) -> Result<()> {
    let mut settings = Settings::load();

    if let Some(dir) = data_dir {
        settings.set_data_dir(&dir);
    } else if !Settings::is_saved() {
        // First run: prompt for data dir
        println!("Data directory [{}]: ", settings.data_dir);
        let mut input = String::new();
        std::io::stdin().read_line(&mut input).ok();
        let chosen = input.trim();
        if !chosen.is_empty() {
            settings.set_data_dir(chosen);
        }
    }

    let resolved = settings.data_path();
    std::fs::create_dir_all(&resolved)?;
    settings.save()?;
    open_data_dir(&resolved)?;

    tracing::debug!(data_dir = %resolved.display(), "initialized database");
    println!("Initialized booktally at {}", resolved.join(DB_FILE).display());
    Ok(())
}
