//! `iw seq` command - Document number sequences

use clap::Subcommand;
use console::style;
use miette::Result;

use crate::cli::helpers::{or_dash, Context};
use crate::cli::output::{print_list, print_record, success, Listing};
use crate::cli::GlobalOpts;
use crate::core::permissions::Requirements;
use crate::core::sequence::{Sequence, SequenceUpdate};
use crate::core::Module;

#[derive(Subcommand, Debug)]
pub enum SeqCommands {
    /// List the company's sequences
    List,

    /// Show one sequence and the number it would issue next
    Show(SeqRef),

    /// Issue the next number
    Next(SeqRef),

    /// Give back the last number issued
    Rollback(SeqRef),

    /// Change a sequence's format or counter
    Set(SetArgs),
}

#[derive(clap::Args, Debug)]
pub struct SeqRef {
    /// Sequence table, e.g. quote, salesOrder, purchaseOrder
    pub table: String,
}

#[derive(clap::Args, Debug)]
pub struct SetArgs {
    pub table: String,

    /// Prefix template; %{yyyy}, %{yy}, %{mm}, %{dd} expand to today's date
    #[arg(long)]
    pub prefix: Option<String>,

    #[arg(long)]
    pub suffix: Option<String>,

    /// Last number issued; the next issue is this plus step
    #[arg(long)]
    pub next: Option<i64>,

    /// Zero padding width
    #[arg(long)]
    pub size: Option<u32>,

    #[arg(long)]
    pub step: Option<i64>,
}

pub fn run(cmd: SeqCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        SeqCommands::List => run_list(global),
        SeqCommands::Show(args) => run_show(args, global),
        SeqCommands::Next(args) => run_next(args, global),
        SeqCommands::Rollback(args) => run_rollback(args, global),
        SeqCommands::Set(args) => run_set(args, global),
    }
}

fn today() -> chrono::NaiveDate {
    chrono::Local::now().date_naive()
}

fn run_list(global: &GlobalOpts) -> Result<()> {
    let ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().view(Module::Settings))?;
    let sequences = ctx.db.list_sequences(&auth.company_id)?;

    let mut listing = Listing::new(
        "sequence",
        &["TABLE", "PREFIX", "SUFFIX", "LAST", "SIZE", "STEP", "NEXT ISSUE"],
    );
    for s in &sequences {
        listing.push(
            s.table.clone(),
            vec![
                s.table.clone(),
                or_dash(s.prefix.as_deref()),
                or_dash(s.suffix.as_deref()),
                s.next.to_string(),
                s.size.to_string(),
                s.step.to_string(),
                upcoming_label(s),
            ],
        );
    }
    print_list(&sequences, &listing, ctx.format(), ctx.quiet())
}

fn run_show(args: SeqRef, global: &GlobalOpts) -> Result<()> {
    let ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().view(Module::Settings))?;
    let sequence = ctx.db.get_sequence(&auth.company_id, &args.table)?;
    print_record(&sequence, &sequence.table, ctx.format())
}

fn run_next(args: SeqRef, global: &GlobalOpts) -> Result<()> {
    let mut ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().update(Module::Settings))?;
    let number = ctx.db.get_next_sequence(&auth.company_id, &args.table)?;
    println!("{}", number);
    Ok(())
}

fn run_rollback(args: SeqRef, global: &GlobalOpts) -> Result<()> {
    let mut ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().update(Module::Settings))?;
    let sequence = ctx
        .db
        .rollback_next_sequence(&auth.company_id, &args.table)?;
    success(
        ctx.quiet(),
        format!(
            "Rolled back {}; next issue is {}",
            sequence.table,
            style(upcoming_label(&sequence)).cyan()
        ),
    );
    Ok(())
}

fn run_set(args: SetArgs, global: &GlobalOpts) -> Result<()> {
    let update = SequenceUpdate {
        prefix: args.prefix,
        suffix: args.suffix,
        next: args.next,
        size: args.size,
        step: args.step,
    };
    if update.prefix.is_none()
        && update.suffix.is_none()
        && update.next.is_none()
        && update.size.is_none()
        && update.step.is_none()
    {
        return Err(miette::miette!(
            help = "pass at least one of --prefix, --suffix, --next, --size, --step",
            "nothing to update"
        ));
    }

    let mut ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().update(Module::Settings))?;
    let sequence = ctx
        .db
        .update_sequence(&auth.company_id, &args.table, update)?;
    success(
        ctx.quiet(),
        format!(
            "Updated {}; next issue is {}",
            sequence.table,
            style(upcoming_label(&sequence)).cyan()
        ),
    );
    Ok(())
}

fn upcoming_label(sequence: &Sequence) -> String {
    sequence
        .upcoming()
        .map(|value| sequence.format(value, today()))
        .unwrap_or_else(|| "exhausted".to_string())
}
