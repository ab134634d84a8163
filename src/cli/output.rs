//! Output formatting for list and show commands
//!
//! List commands build a [`Listing`] of display rows alongside the records
//! themselves; JSON and YAML serialize the records, every other format
//! prints the rows.

use console::style;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use tabled::builder::Builder;
use tabled::settings::Style;

use crate::cli::OutputFormat;

/// Display rows for a list command
#[derive(Debug, Clone)]
pub struct Listing {
    noun: &'static str,
    headers: Vec<&'static str>,
    rows: Vec<Vec<String>>,
    keys: Vec<String>,
}

impl Listing {
    pub fn new(noun: &'static str, headers: &[&'static str]) -> Self {
        Self {
            noun,
            headers: headers.to_vec(),
            rows: Vec::new(),
            keys: Vec::new(),
        }
    }

    /// Add a row; `key` is what `--format id` prints for it
    pub fn push(&mut self, key: impl Into<String>, cells: Vec<String>) {
        self.keys.push(key.into());
        self.rows.push(cells);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn table(&self, style: TableStyle) -> String {
        let mut builder = Builder::default();
        builder.push_record(self.headers.iter().map(|h| h.to_string()));
        for row in &self.rows {
            builder.push_record(row.iter().cloned());
        }
        let mut table = builder.build();
        match style {
            TableStyle::Plain => table.with(Style::blank()),
            TableStyle::Markdown => table.with(Style::markdown()),
        };
        table.to_string()
    }

    fn print_delimited(&self, delimiter: u8) -> Result<()> {
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_writer(std::io::stdout());
        writer
            .write_record(self.headers.iter().map(|h| h.to_lowercase()))
            .into_diagnostic()?;
        for row in &self.rows {
            writer.write_record(row).into_diagnostic()?;
        }
        writer.flush().into_diagnostic()
    }
}

enum TableStyle {
    Plain,
    Markdown,
}

/// Print a list in the requested format
pub fn print_list<T: Serialize>(
    records: &[T],
    listing: &Listing,
    format: OutputFormat,
    quiet: bool,
) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(records).into_diagnostic()?);
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yml::to_string(&records).into_diagnostic()?);
        }
        OutputFormat::Csv => listing.print_delimited(b',')?,
        OutputFormat::Tsv => listing.print_delimited(b'\t')?,
        OutputFormat::Id => {
            for key in &listing.keys {
                println!("{}", key);
            }
        }
        OutputFormat::Md => println!("{}", listing.table(TableStyle::Markdown)),
        OutputFormat::Auto => {
            if listing.is_empty() {
                if !quiet {
                    println!("No {}s found.", listing.noun);
                }
                return Ok(());
            }
            println!("{}", listing.table(TableStyle::Plain));
            if !quiet {
                println!();
                println!("{} {}(s) found.", style(listing.len()).cyan(), listing.noun);
            }
        }
    }
    Ok(())
}

/// Print a listing as an aligned table with no summary line
pub fn print_table(listing: &Listing) {
    println!("{}", listing.table(TableStyle::Plain));
}

/// Print one record; `key` is used for `--format id`
pub fn print_record<T: Serialize>(record: &T, key: &str, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(record).into_diagnostic()?);
        }
        OutputFormat::Id => println!("{}", key),
        _ => print!("{}", serde_yml::to_string(record).into_diagnostic()?),
    }
    Ok(())
}

/// Green check line for a completed change
pub fn success(quiet: bool, message: impl std::fmt::Display) {
    if !quiet {
        println!("{} {}", style("✓").green(), message);
    }
}

/// Yellow note for something that happened but needs attention
pub fn notice(message: impl std::fmt::Display) {
    eprintln!("{} {}", style("!").yellow(), message);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Listing {
        let mut listing = Listing::new("part", &["NUMBER", "NAME"]);
        listing.push("BRK-100", vec!["BRK-100".into(), "Steel bracket".into()]);
        listing.push("SETUP", vec!["SETUP".into(), "Machine setup".into()]);
        listing
    }

    #[test]
    fn test_markdown_table() {
        let md = sample().table(TableStyle::Markdown);
        let lines: Vec<&str> = md.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with('|'));
        assert!(lines[0].contains("NUMBER"));
        assert!(lines[1].contains("---"));
        assert!(lines[3].contains("Machine setup"));
    }

    #[test]
    fn test_plain_table_aligns_columns() {
        let table = sample().table(TableStyle::Plain);
        let lines: Vec<&str> = table.lines().collect();
        let column = |line: &str, needle: &str| line.find(needle);
        assert_eq!(column(lines[0], "NAME"), column(lines[1], "Steel"));
    }

    #[test]
    fn test_listing_counts() {
        let listing = sample();
        assert_eq!(listing.len(), 2);
        assert!(!listing.is_empty());
        assert!(Listing::new("part", &["NUMBER"]).is_empty());
    }
}
