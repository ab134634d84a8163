//! `iw import` command - Bulk-load master data from CSV files

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use clap::{Subcommand, ValueEnum};
use console::style;
use csv::{ReaderBuilder, StringRecord};
use miette::{IntoDiagnostic, Result};
use serde_json::{json, Map, Value};

use crate::cli::helpers::Context;
use crate::cli::GlobalOpts;
use crate::core::permissions::{Authorized, Requirements};
use crate::core::Module;
use crate::entities::{ContactDetails, Customer, Part, PartType, Replenishment, Supplier};
use crate::schema::{Form, FormValidator};

#[derive(Subcommand, Debug)]
pub enum ImportCommands {
    /// Import parts (part_number, name, description, part_type, replenishment, unit_of_measure, unit_cost)
    Parts(ImportArgs),

    /// Import customers (name, tax_id, email, phone)
    Customers(ImportArgs),

    /// Import suppliers (name, tax_id, email, phone)
    Suppliers(ImportArgs),

    /// Print a CSV header and example row for a record kind
    Template(TemplateArgs),
}

#[derive(clap::Args, Debug)]
pub struct ImportArgs {
    /// CSV file with a header row
    pub file: PathBuf,

    /// Validate every row without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Keep going after a bad row (default: stop on the first error)
    #[arg(long)]
    pub skip_errors: bool,
}

#[derive(clap::Args, Debug)]
pub struct TemplateArgs {
    pub kind: ImportKind,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImportKind {
    Parts,
    Customers,
    Suppliers,
}

impl ImportKind {
    fn noun(&self) -> &'static str {
        match self {
            ImportKind::Parts => "part",
            ImportKind::Customers => "customer",
            ImportKind::Suppliers => "supplier",
        }
    }

    fn form(&self) -> Form {
        match self {
            ImportKind::Parts => Form::Part,
            ImportKind::Customers | ImportKind::Suppliers => Form::Contact,
        }
    }

    fn columns(&self) -> &'static [&'static str] {
        match self {
            ImportKind::Parts => &[
                "part_number",
                "name",
                "description",
                "part_type",
                "replenishment",
                "unit_of_measure",
                "unit_cost",
            ],
            ImportKind::Customers | ImportKind::Suppliers => &["name", "tax_id", "email", "phone"],
        }
    }

    fn example(&self) -> &'static [&'static str] {
        match self {
            ImportKind::Parts => &[
                "BRK-100",
                "\"Steel bracket, 2in\"",
                "\"Zinc plated\"",
                "inventory",
                "buy",
                "EA",
                "4.25",
            ],
            ImportKind::Customers => &["\"Globex Corporation\"", "US-12-3456789", "ap@globex.example", "+1-555-0100"],
            ImportKind::Suppliers => &["\"Acme Metals\"", "", "sales@acme.example", "+1-555-0199"],
        }
    }

    fn requirements(&self) -> Requirements {
        match self {
            ImportKind::Parts => Requirements::new().create(Module::Parts),
            ImportKind::Customers => Requirements::new().create(Module::Sales),
            ImportKind::Suppliers => Requirements::new().create(Module::Purchasing),
        }
    }
}

/// Import statistics
#[derive(Default)]
struct ImportStats {
    rows_processed: usize,
    created: usize,
    errors: usize,
}

pub fn run(cmd: ImportCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        ImportCommands::Parts(args) => run_import(ImportKind::Parts, args, global),
        ImportCommands::Customers(args) => run_import(ImportKind::Customers, args, global),
        ImportCommands::Suppliers(args) => run_import(ImportKind::Suppliers, args, global),
        ImportCommands::Template(args) => {
            print_template(args.kind);
            Ok(())
        }
    }
}

fn print_template(kind: ImportKind) {
    println!("{}", kind.columns().join(","));
    println!("{}", kind.example().join(","));
    eprintln!();
    eprintln!(
        "{} Redirect to a file: iw import template {}s > {}s.csv",
        style("→").blue(),
        kind.noun(),
        kind.noun()
    );
}

/// Map lower-cased header names to column indexes
fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim().to_lowercase(), i))
        .collect()
}

fn get_field(record: &StringRecord, header_map: &HashMap<String, usize>, field: &str) -> Option<String> {
    header_map
        .get(field)
        .and_then(|&idx| record.get(idx))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Shape one CSV row into the form's JSON input. Empty cells become null,
/// numeric columns are parsed and defaults fill in what a part row omits.
fn row_to_input(
    kind: ImportKind,
    record: &StringRecord,
    header_map: &HashMap<String, usize>,
) -> std::result::Result<Value, String> {
    let mut input = Map::new();
    for &column in kind.columns() {
        let value = match get_field(record, header_map, column) {
            None => Value::Null,
            Some(raw) if column == "unit_cost" => {
                let cost: f64 = raw
                    .parse()
                    .map_err(|_| format!("unit_cost '{}' is not a number", raw))?;
                json!(cost)
            }
            Some(raw) => Value::String(raw),
        };
        input.insert(column.to_string(), value);
    }

    if kind == ImportKind::Parts {
        for (column, default) in [
            ("part_type", "inventory"),
            ("replenishment", "buy"),
            ("unit_of_measure", "EA"),
        ] {
            if input.get(column).is_some_and(Value::is_null) {
                input.insert(column.to_string(), json!(default));
            }
        }
    }
    for required in ["part_number", "name"] {
        if input.get(required).is_some_and(Value::is_null) {
            input.remove(required);
        }
    }
    Ok(Value::Object(input))
}

fn text(input: &Value, key: &str) -> Option<String> {
    input.get(key).and_then(Value::as_str).map(str::to_string)
}

fn create_record(ctx: &mut Context, auth: &Authorized, kind: ImportKind, input: &Value) -> Result<String> {
    let name = text(input, "name").unwrap_or_default();
    match kind {
        ImportKind::Parts => {
            let part_type: PartType = text(input, "part_type")
                .unwrap_or_default()
                .parse()
                .map_err(|e: String| miette::miette!("{}", e))?;
            let replenishment: Replenishment = text(input, "replenishment")
                .unwrap_or_default()
                .parse()
                .map_err(|e: String| miette::miette!("{}", e))?;
            let mut part = Part::new(
                auth.company_id.clone(),
                text(input, "part_number").unwrap_or_default(),
                name,
                part_type,
                replenishment,
                auth.user_id.clone(),
            );
            part.description = text(input, "description");
            part.unit_of_measure = text(input, "unit_of_measure")
                .unwrap_or_else(|| "EA".to_string())
                .to_uppercase();
            part.unit_cost = input.get("unit_cost").and_then(Value::as_f64);
            ctx.db.create_part(&part)?;
            Ok(part.part_number)
        }
        ImportKind::Customers | ImportKind::Suppliers => {
            let details = ContactDetails {
                tax_id: text(input, "tax_id"),
                email: text(input, "email"),
                phone: text(input, "phone"),
            };
            if kind == ImportKind::Customers {
                let customer =
                    Customer::new(auth.company_id.clone(), name, details, auth.user_id.clone());
                ctx.db.create_customer(&customer)?;
                Ok(customer.name)
            } else {
                let supplier =
                    Supplier::new(auth.company_id.clone(), name, details, auth.user_id.clone());
                ctx.db.create_supplier(&supplier)?;
                Ok(supplier.name)
            }
        }
    }
}

fn run_import(kind: ImportKind, args: ImportArgs, global: &GlobalOpts) -> Result<()> {
    if !args.file.exists() {
        return Err(miette::miette!("File not found: {}", args.file.display()));
    }
    let mut ctx = Context::open(global)?;
    let auth = ctx.authorize(kind.requirements())?;
    let validator = FormValidator::new()?;

    if !ctx.quiet() {
        println!(
            "{} Importing {}s from {}{}",
            style("→").blue(),
            style(kind.noun()).cyan(),
            style(args.file.display()).yellow(),
            if args.dry_run {
                style(" (dry run)").dim().to_string()
            } else {
                String::new()
            }
        );
    }

    let stats = import_rows(&mut ctx, &auth, kind, &args, &validator)?;

    if !ctx.quiet() {
        println!();
        println!("{}", style("─".repeat(40)).dim());
        println!("  Rows processed: {}", style(stats.rows_processed).cyan());
        if args.dry_run {
            println!("  Rows valid:     {}", style(stats.created).green());
        } else {
            println!("  Created:        {}", style(stats.created).green());
        }
        if stats.errors > 0 {
            println!("  Errors:         {}", style(stats.errors).red());
        }
        if args.dry_run {
            println!();
            println!("{}", style("Dry run complete. Nothing was written.").yellow());
        }
    }

    if stats.errors > 0 && !args.skip_errors {
        return Err(miette::miette!("Import stopped with {} error(s)", stats.errors));
    }
    Ok(())
}

fn open_reader(path: &Path) -> Result<csv::Reader<BufReader<File>>> {
    let file = File::open(path).into_diagnostic()?;
    Ok(ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(BufReader::new(file)))
}

fn import_rows(
    ctx: &mut Context,
    auth: &Authorized,
    kind: ImportKind,
    args: &ImportArgs,
    validator: &FormValidator,
) -> Result<ImportStats> {
    let mut stats = ImportStats::default();
    let mut reader = open_reader(&args.file)?;
    let header_map = build_header_map(reader.headers().into_diagnostic()?);

    for (idx, result) in reader.records().enumerate() {
        // header is row 1
        let row_num = idx + 2;
        stats.rows_processed += 1;

        let outcome = result
            .map_err(|e| format!("CSV parse error: {}", e))
            .and_then(|record| row_to_input(kind, &record, &header_map))
            .and_then(|input| {
                validator
                    .validate(kind.form(), &input)
                    .map(|()| input)
                    .map_err(|e| e.brief())
            });

        let outcome = match outcome {
            Ok(input) if args.dry_run => Ok(text(&input, "part_number")
                .or_else(|| text(&input, "name"))
                .unwrap_or_default()),
            Ok(input) => create_record(ctx, auth, kind, &input).map_err(|e| e.to_string()),
            Err(message) => Err(message),
        };

        match outcome {
            Ok(label) => {
                stats.created += 1;
                if !ctx.quiet() {
                    println!("{} Row {}: {}", style("✓").green(), row_num, label);
                }
            }
            Err(message) => {
                stats.errors += 1;
                eprintln!("{} Row {}: {}", style("✗").red(), row_num, message);
                if !args.skip_errors {
                    tracing::warn!(row = row_num, "import stopped");
                    return Ok(stats);
                }
            }
        }
    }
    tracing::info!(kind = kind.noun(), rows = stats.rows_processed, created = stats.created, "import finished");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(cols: &[&str]) -> HashMap<String, usize> {
        build_header_map(&StringRecord::from(cols.to_vec()))
    }

    #[test]
    fn test_part_row_fills_defaults() {
        let map = headers(&["Part_Number", "name"]);
        let record = StringRecord::from(vec!["BRK-100", "Bracket"]);
        let input = row_to_input(ImportKind::Parts, &record, &map).unwrap();
        assert_eq!(input["part_number"], "BRK-100");
        assert_eq!(input["part_type"], "inventory");
        assert_eq!(input["replenishment"], "buy");
        assert_eq!(input["unit_of_measure"], "EA");
        assert!(input["unit_cost"].is_null());
    }

    #[test]
    fn test_part_row_rejects_bad_cost() {
        let map = headers(&["part_number", "name", "unit_cost"]);
        let record = StringRecord::from(vec!["BRK-100", "Bracket", "cheap"]);
        let err = row_to_input(ImportKind::Parts, &record, &map).unwrap_err();
        assert!(err.contains("unit_cost"));
    }

    #[test]
    fn test_contact_row_validates() {
        let validator = FormValidator::new().unwrap();
        let map = headers(&["name", "email"]);

        let good = StringRecord::from(vec!["Globex", "ap@globex.example"]);
        let input = row_to_input(ImportKind::Customers, &good, &map).unwrap();
        assert!(validator.validate(Form::Contact, &input).is_ok());

        let bad = StringRecord::from(vec!["", "not-an-email"]);
        let input = row_to_input(ImportKind::Customers, &bad, &map).unwrap();
        let err = validator.validate(Form::Contact, &input).unwrap_err();
        assert!(!err.brief().is_empty());
    }
}
