mod cache;
mod cli;
mod db;
mod error;
mod fmt;
mod importer;
mod logging;
mod models;
mod reports;
mod settings;
mod store;

use clap::Parser;

use cli::{BooksCommands, CategoriesCommands, Cli, Commands};

fn main() {
    let cli = Cli::parse();
    logging::init_logger(cli.verbose);

    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(data_dir),
        Commands::Categories { command } => match command {
            CategoriesCommands::List => cli::categories::list(),
            CategoriesCommands::Add { name } => cli::categories::add(&name),
            CategoriesCommands::Rename { id, name } => cli::categories::rename(id, &name),
            CategoriesCommands::Delete { id } => cli::categories::delete(id),
        },
        Commands::Books { command } => match command {
            BooksCommands::List { page, category } => cli::books::list(page, category.as_deref()),
            BooksCommands::Add { fields } => cli::books::add(&fields),
            BooksCommands::Edit { id, fields } => cli::books::edit(id, &fields),
            BooksCommands::Delete { id } => cli::books::delete(id),
        },
        Commands::Import { file } => cli::import::run(&file),
        Commands::Report { json } => cli::report::run(json),
        Commands::Status => cli::status::run(),
    };

    if let Err(e) = result {
        tracing::debug!(error = ?e, "command failed");
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
