//! `iw part` command - Item master

use clap::Subcommand;
use console::style;
use miette::Result;
use serde::Serialize;
use serde_json::json;

use crate::cli::helpers::{format_money, truncate_str, validate_input, Context};
use crate::cli::output::{print_list, print_record, success, Listing};
use crate::cli::GlobalOpts;
use crate::core::db::{PartFilter, PartUpdate};
use crate::core::permissions::Requirements;
use crate::core::{Module, Page};
use crate::entities::{Part, PartType, Replenishment, StockLevel};
use crate::schema::Form;

#[derive(Subcommand, Debug)]
pub enum PartCommands {
    /// Create a part
    New(NewArgs),

    /// List parts
    List(ListArgs),

    /// Show a part with its stock on hand
    Show(PartRef),

    /// Change a part's fields
    Update(UpdateArgs),

    /// Deactivate a part
    Deactivate(PartRef),

    /// Reactivate a deactivated part
    Activate(PartRef),
}

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// Part number, unique within the company
    pub part_number: String,

    #[arg(long, short = 'n')]
    pub name: String,

    #[arg(long, short = 'd')]
    pub description: Option<String>,

    /// inventory, non_inventory or service
    #[arg(long = "type", short = 't', default_value = "inventory")]
    pub part_type: PartType,

    /// buy, make or buy_and_make
    #[arg(long, short = 'r', default_value = "buy")]
    pub replenishment: Replenishment,

    /// Unit of measure code
    #[arg(long, default_value = "EA")]
    pub uom: String,

    /// Standard unit cost
    #[arg(long)]
    pub cost: Option<f64>,
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Filter by part type
    #[arg(long = "type", short = 't')]
    pub part_type: Option<PartType>,

    /// Search part number, name and description
    #[arg(long, short = 's')]
    pub search: Option<String>,

    /// Include deactivated parts
    #[arg(long)]
    pub all: bool,

    /// Limit number of results
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,

    /// Skip this many results
    #[arg(long, default_value_t = 0)]
    pub offset: usize,

    /// Show only count
    #[arg(long)]
    pub count: bool,
}

#[derive(clap::Args, Debug)]
pub struct PartRef {
    /// Part number or id
    pub part: String,
}

#[derive(clap::Args, Debug)]
pub struct UpdateArgs {
    /// Part number or id
    pub part: String,

    #[arg(long)]
    pub name: Option<String>,

    /// New description; an empty string clears it
    #[arg(long)]
    pub description: Option<String>,

    #[arg(long = "type")]
    pub part_type: Option<PartType>,

    #[arg(long)]
    pub replenishment: Option<Replenishment>,

    #[arg(long)]
    pub uom: Option<String>,

    #[arg(long)]
    pub cost: Option<f64>,
}

pub fn run(cmd: PartCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        PartCommands::New(args) => run_new(args, global),
        PartCommands::List(args) => run_list(args, global),
        PartCommands::Show(args) => run_show(args, global),
        PartCommands::Update(args) => run_update(args, global),
        PartCommands::Deactivate(args) => run_set_active(args, false, global),
        PartCommands::Activate(args) => run_set_active(args, true, global),
    }
}

fn run_new(args: NewArgs, global: &GlobalOpts) -> Result<()> {
    let mut ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().create(Module::Parts))?;

    validate_input(
        Form::Part,
        &json!({
            "part_number": args.part_number,
            "name": args.name,
            "description": args.description,
            "part_type": args.part_type.to_string(),
            "replenishment": args.replenishment.to_string(),
            "unit_of_measure": args.uom,
            "unit_cost": args.cost,
        }),
    )?;

    let mut part = Part::new(
        auth.company_id.clone(),
        args.part_number.trim().to_string(),
        args.name.trim().to_string(),
        args.part_type,
        args.replenishment,
        auth.user_id.clone(),
    );
    part.description = args.description;
    part.unit_of_measure = args.uom.to_uppercase();
    part.unit_cost = args.cost;
    ctx.db.create_part(&part)?;

    if ctx.quiet() {
        println!("{}", part.part_number);
    } else {
        success(
            false,
            format!(
                "Created part {} {}",
                style(&part.part_number).cyan(),
                style(truncate_str(&part.name, 40)).yellow()
            ),
        );
    }
    Ok(())
}

fn run_list(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().view(Module::Parts))?;

    let filter = PartFilter {
        part_type: args.part_type,
        search: args.search,
        include_inactive: args.all,
    };
    let parts = ctx
        .db
        .list_parts(&auth.company_id, &filter, Page::new(args.limit, args.offset))?;

    if args.count {
        println!("{}", parts.len());
        return Ok(());
    }

    let mut listing = Listing::new(
        "part",
        &["NUMBER", "NAME", "TYPE", "REPLENISH", "UOM", "COST", "ACTIVE"],
    );
    for p in &parts {
        listing.push(
            p.part_number.clone(),
            vec![
                p.part_number.clone(),
                truncate_str(&p.name, 32),
                p.part_type.to_string(),
                p.replenishment.to_string(),
                p.unit_of_measure.clone(),
                p.unit_cost.map(format_money).unwrap_or_else(|| "-".to_string()),
                if p.active { "yes" } else { "no" }.to_string(),
            ],
        );
    }
    print_list(&parts, &listing, ctx.format(), ctx.quiet())
}

#[derive(Serialize)]
struct PartDetail {
    #[serde(flatten)]
    part: Part,
    on_hand: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    locations: Vec<StockLevel>,
}

fn run_show(args: PartRef, global: &GlobalOpts) -> Result<()> {
    let ctx = Context::open(global)?;
    let auth = ctx.authorize(
        Requirements::new()
            .view(Module::Parts)
            .view(Module::Inventory),
    )?;
    let part = ctx.db.find_part(&auth.company_id, &args.part)?;
    let on_hand = ctx.db.on_hand(&part.id)?;
    let locations = ctx.db.stock_levels(&auth.company_id, Some(&part.id))?;

    let key = part.part_number.clone();
    let detail = PartDetail {
        part,
        on_hand,
        locations,
    };
    print_record(&detail, &key, ctx.format())
}

fn run_update(args: UpdateArgs, global: &GlobalOpts) -> Result<()> {
    let mut ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().update(Module::Parts))?;

    if let Some(cost) = args.cost {
        if cost < 0.0 {
            return Err(miette::miette!("unit cost cannot be negative"));
        }
    }
    let changes = PartUpdate {
        name: args.name,
        description: args.description,
        part_type: args.part_type,
        replenishment: args.replenishment,
        unit_of_measure: args.uom.map(|u| u.to_uppercase()),
        unit_cost: args.cost,
    };
    if changes.is_empty() {
        return Err(miette::miette!(
            help = "pass at least one of --name, --description, --type, --replenishment, --uom, --cost",
            "nothing to update"
        ));
    }
    let part = ctx.db.update_part(&auth.company_id, &args.part, changes)?;
    success(ctx.quiet(), format!("Updated part {}", part.part_number));
    Ok(())
}

fn run_set_active(args: PartRef, active: bool, global: &GlobalOpts) -> Result<()> {
    let mut ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().delete(Module::Parts))?;
    let part = ctx.db.set_part_active(&auth.company_id, &args.part, active)?;
    let verb = if active { "Reactivated" } else { "Deactivated" };
    success(ctx.quiet(), format!("{} part {}", verb, part.part_number));
    Ok(())
}
