use colored::Colorize;
use comfy_table::{Cell, CellAlignment, Table};

use crate::cli::{open_db, report_cache};
use crate::error::Result;
use crate::fmt::amount;
use crate::reports::{get_expense_report, ExpenseReport};
use crate::settings::Settings;

fn money_cell(val: f64) -> Cell {
    Cell::new(amount(val)).set_alignment(CellAlignment::Right)
}

pub fn run(json: bool) -> Result<()> {
    let settings = Settings::load();
    let conn = open_db(&settings)?;
    let cache = report_cache(&settings, &conn);
    let report = get_expense_report(&conn, cache.as_ref(), settings.cache_ttl())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_tables(&report);
    }
    Ok(())
}

fn print_tables(report: &ExpenseReport) {
    if report.by_category.is_empty() {
        println!("No books yet. Import a file with `booktally import <file>`.");
        return;
    }

    let mut table = Table::new();
    table.set_header(vec!["Category", "Distribution Expenses"]);
    for item in &report.by_category {
        table.add_row(vec![Cell::new(&item.category), money_cell(item.total)]);
    }
    table.add_row(vec![Cell::new("Total".bold()), money_cell(report.grand_total)]);
    println!("{}\n{table}", "Expenses by Category".bold());

    let mut ptable = Table::new();
    ptable.set_header(vec!["Category", "Publisher", "Distribution Expenses"]);
    for item in &report.by_publisher {
        let publisher = if item.publisher.is_empty() {
            "(none)".dimmed().to_string()
        } else {
            item.publisher.clone()
        };
        ptable.add_row(vec![Cell::new(&item.category), Cell::new(publisher), money_cell(item.total)]);
    }
    println!("\n{}\n{ptable}", "Expenses by Publisher".bold());

    println!("\nGrand Total: {}", amount(report.grand_total).green().bold());
}
