//! `iw inv` command - Stock adjustments, on-hand and the item ledger

use std::collections::HashMap;

use clap::Subcommand;
use console::style;
use miette::Result;

use crate::cli::helpers::{format_quantity, or_dash, Context};
use crate::cli::output::{print_list, success, Listing};
use crate::cli::GlobalOpts;
use crate::core::permissions::Requirements;
use crate::core::{Database, EntityId, Module, Page};
use crate::entities::inventory::DEFAULT_LOCATION;

#[derive(Subcommand, Debug)]
pub enum InvCommands {
    /// Post a manual stock adjustment
    Adjust(AdjustArgs),

    /// On-hand quantity per part and location
    Onhand(OnhandArgs),

    /// Item ledger entries, newest first
    Ledger(LedgerArgs),
}

#[derive(clap::Args, Debug)]
pub struct AdjustArgs {
    /// Part number or id
    pub part: String,

    /// Signed quantity; negative takes stock out
    #[arg(allow_negative_numbers = true)]
    pub quantity: f64,

    /// Stock location
    #[arg(long, short = 'l', default_value = DEFAULT_LOCATION)]
    pub location: String,

    /// Reason recorded on the ledger entry
    #[arg(long)]
    pub note: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct OnhandArgs {
    /// Only this part
    #[arg(long, short = 'p')]
    pub part: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct LedgerArgs {
    /// Only this part
    #[arg(long, short = 'p')]
    pub part: Option<String>,

    /// Limit number of results
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,

    /// Skip this many results
    #[arg(long, default_value_t = 0)]
    pub offset: usize,
}

pub fn run(cmd: InvCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        InvCommands::Adjust(args) => run_adjust(args, global),
        InvCommands::Onhand(args) => run_onhand(args, global),
        InvCommands::Ledger(args) => run_ledger(args, global),
    }
}

fn run_adjust(args: AdjustArgs, global: &GlobalOpts) -> Result<()> {
    let mut ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().update(Module::Inventory))?;
    let entry = ctx.db.adjust_inventory(
        &auth.company_id,
        &args.part,
        args.location.trim(),
        args.quantity,
        args.note,
        &auth.user_id,
    )?;
    let on_hand = ctx.db.on_hand(&entry.part_id)?;

    if ctx.quiet() {
        println!("{}", entry.id);
    } else {
        success(
            false,
            format!(
                "Posted {} of {} at {}; on hand now {}",
                entry.entry_type,
                format_quantity(entry.quantity),
                entry.location,
                style(format_quantity(on_hand)).cyan()
            ),
        );
    }
    Ok(())
}

/// Part numbers by id, looked up once each
struct PartNumbers<'a> {
    db: &'a Database,
    company_id: &'a EntityId,
    cache: HashMap<EntityId, String>,
}

impl<'a> PartNumbers<'a> {
    fn new(db: &'a Database, company_id: &'a EntityId) -> Self {
        Self {
            db,
            company_id,
            cache: HashMap::new(),
        }
    }

    fn get(&mut self, part_id: &EntityId) -> Result<String> {
        if let Some(number) = self.cache.get(part_id) {
            return Ok(number.clone());
        }
        let part = self.db.find_part(self.company_id, &part_id.to_string())?;
        self.cache.insert(part_id.clone(), part.part_number.clone());
        Ok(part.part_number)
    }
}

fn resolve_part(ctx: &Context, company_id: &EntityId, part: Option<&str>) -> Result<Option<EntityId>> {
    match part {
        Some(reference) => Ok(Some(ctx.db.find_part(company_id, reference)?.id)),
        None => Ok(None),
    }
}

fn run_onhand(args: OnhandArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().view(Module::Inventory))?;
    let part_id = resolve_part(&ctx, &auth.company_id, args.part.as_deref())?;
    let levels = ctx.db.stock_levels(&auth.company_id, part_id.as_ref())?;

    let mut numbers = PartNumbers::new(&ctx.db, &auth.company_id);
    let mut listing = Listing::new("stock level", &["PART", "LOCATION", "ON HAND"]);
    for level in &levels {
        let number = numbers.get(&level.part_id)?;
        listing.push(
            number.clone(),
            vec![number, level.location.clone(), format_quantity(level.on_hand)],
        );
    }
    print_list(&levels, &listing, ctx.format(), ctx.quiet())
}

fn run_ledger(args: LedgerArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().view(Module::Inventory))?;
    let part_id = resolve_part(&ctx, &auth.company_id, args.part.as_deref())?;
    let entries = ctx.db.ledger(
        &auth.company_id,
        part_id.as_ref(),
        Page::new(args.limit, args.offset),
    )?;

    let mut numbers = PartNumbers::new(&ctx.db, &auth.company_id);
    let mut listing = Listing::new(
        "ledger entry",
        &["DATE", "PART", "LOCATION", "TYPE", "QTY", "DOCUMENT"],
    );
    for entry in &entries {
        listing.push(
            entry.id.to_string(),
            vec![
                entry.created.format("%Y-%m-%d %H:%M").to_string(),
                numbers.get(&entry.part_id)?,
                entry.location.clone(),
                entry.entry_type.to_string(),
                format_quantity(entry.quantity),
                or_dash(entry.document_ref.as_deref()),
            ],
        );
    }
    print_list(&entries, &listing, ctx.format(), ctx.quiet())
}
