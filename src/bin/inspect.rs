//! QuarryDB - read-only schema inspector
//!
//! Prints the tables of a persisted schema, their columns, indexes and
//! foreign keys, and optionally their rows. Nothing is written back.

use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context};
use tracing_subscriber::EnvFilter;

use quarrydb::catalog::Catalog;
use quarrydb::config::{DatabaseConfig, DEFAULT_DATA_DIR, DEFAULT_SCHEMA};
use quarrydb::storage::Row;

fn print_help() {
    println!(
        r#"
Usage: quarrydb-inspect [OPTIONS] [TABLE...]

Options:
  -d, --data-dir <DIR>   Data directory (default: {})
  -s, --schema <NAME>    Schema name (default: {})
  -r, --rows             Print table rows as well
  -h, --help             Show this message
"#,
        DEFAULT_DATA_DIR, DEFAULT_SCHEMA
    );
}

#[derive(Debug)]
struct Args {
    config: DatabaseConfig,
    rows: bool,
    tables: Vec<String>,
}

fn parse_args() -> anyhow::Result<Option<Args>> {
    let mut config = DatabaseConfig::new().persist(false);
    let mut rows = false;
    let mut tables = Vec::new();

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-d" | "--data-dir" => {
                let dir = args.next().context("--data-dir needs a value")?;
                config = config.data_dir(PathBuf::from(dir));
            }
            "-s" | "--schema" => {
                let schema = args.next().context("--schema needs a value")?;
                config = config.schema(schema);
            }
            "-r" | "--rows" => rows = true,
            "-h" | "--help" => return Ok(None),
            flag if flag.starts_with('-') => bail!("unknown option '{}'", flag),
            table => tables.push(table.to_string()),
        }
    }

    Ok(Some(Args {
        config,
        rows,
        tables,
    }))
}

/// Format rows as a table
fn format_rows(columns: &[&str], rows: &[Row]) -> String {
    let mut widths: Vec<usize> = columns.iter().map(|c| c.len()).collect();
    for row in rows {
        for (width, value) in widths.iter_mut().zip(row.values()) {
            *width = (*width).max(value.to_string().len());
        }
    }

    let separator = format!(
        "+{}+\n",
        widths
            .iter()
            .map(|w| "-".repeat(*w + 2))
            .collect::<Vec<_>>()
            .join("+")
    );

    let mut output = separator.clone();
    let header = columns
        .iter()
        .zip(&widths)
        .map(|(c, w)| format!(" {:^width$} ", c, width = *w))
        .collect::<Vec<_>>()
        .join("|");
    output.push_str(&format!("|{}|\n", header));
    output.push_str(&separator);

    for row in rows {
        let line = row
            .values()
            .zip(&widths)
            .map(|(v, w)| format!(" {:>width$} ", v.to_string(), width = *w))
            .collect::<Vec<_>>()
            .join("|");
        output.push_str(&format!("|{}|\n", line));
    }
    if !rows.is_empty() {
        output.push_str(&separator);
    }

    output.push_str(&format!("{} row(s)\n", rows.len()));
    output
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let Some(args) = parse_args()? else {
        print_help();
        return Ok(());
    };

    let schema_dir = args.config.schema_dir();
    if !schema_dir.is_dir() {
        bail!("no schema found at {}", schema_dir.display());
    }
    let catalog = Catalog::load(&schema_dir, args.config.schema.clone())
        .with_context(|| format!("failed to load schema {}", schema_dir.display()))?;

    let tables: Vec<String> = if args.tables.is_empty() {
        catalog.list_tables().into_iter().map(str::to_string).collect()
    } else {
        args.tables
    };

    if tables.is_empty() {
        println!("No tables found.");
        return Ok(());
    }

    println!("Schema '{}' at {}\n", catalog.name(), schema_dir.display());
    for name in &tables {
        println!("{}", catalog.describe_table(name)?);
        if args.rows {
            let table = catalog.get_table(name)?;
            let rows: Vec<Row> = table.select_all().into_iter().cloned().collect();
            println!("{}", format_rows(&table.definition().column_names(), &rows));
        }
    }

    Ok(())
}
