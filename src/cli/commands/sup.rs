//! `iw sup` command - Supplier management

use clap::Subcommand;
use console::style;
use miette::Result;

use crate::cli::commands::contacts::{contact_listing, ContactFields, ContactRef, ContactRow, ListArgs, UpdateArgs};
use crate::cli::helpers::Context;
use crate::cli::output::{print_list, print_record, success};
use crate::cli::GlobalOpts;
use crate::core::permissions::Requirements;
use crate::core::{Module, Page};
use crate::entities::Supplier;

#[derive(Subcommand, Debug)]
pub enum SupCommands {
    /// Create a supplier
    New(ContactFields),

    /// List suppliers
    List(ListArgs),

    /// Show a supplier's details
    Show(ContactRef),

    /// Change a supplier's details
    Update(UpdateArgs),

    /// Deactivate a supplier
    Deactivate(ContactRef),
}

pub fn run(cmd: SupCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        SupCommands::New(args) => run_new(args, global),
        SupCommands::List(args) => run_list(args, global),
        SupCommands::Show(args) => run_show(args, global),
        SupCommands::Update(args) => run_update(args, global),
        SupCommands::Deactivate(args) => run_deactivate(args, global),
    }
}

fn run_new(args: ContactFields, global: &GlobalOpts) -> Result<()> {
    args.validate()?;
    let mut ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().create(Module::Purchasing))?;

    let supplier = Supplier::new(
        auth.company_id.clone(),
        args.name.trim().to_string(),
        args.details(),
        auth.user_id.clone(),
    );
    ctx.db.create_supplier(&supplier)?;

    if ctx.quiet() {
        println!("{}", supplier.id);
    } else {
        success(
            false,
            format!(
                "Created supplier {} {}",
                style(&supplier.name).yellow(),
                style(&supplier.id).cyan()
            ),
        );
    }
    Ok(())
}

fn run_list(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().view(Module::Purchasing))?;
    let suppliers = ctx.db.list_suppliers(
        &auth.company_id,
        args.search.as_deref(),
        args.all,
        Page::new(args.limit, args.offset),
    )?;

    let listing = contact_listing(
        "supplier",
        suppliers.iter().map(|s| ContactRow {
            id: &s.id,
            name: &s.name,
            details: &s.details,
            active: s.active,
        }),
    );
    print_list(&suppliers, &listing, ctx.format(), ctx.quiet())
}

fn run_show(args: ContactRef, global: &GlobalOpts) -> Result<()> {
    let ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().view(Module::Purchasing))?;
    let supplier = ctx.db.find_supplier(&auth.company_id, &args.reference)?;
    print_record(&supplier, &supplier.id.to_string(), ctx.format())
}

fn run_update(args: UpdateArgs, global: &GlobalOpts) -> Result<()> {
    let reference = args.reference.clone();
    let changes = args.into_update()?;
    let mut ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().update(Module::Purchasing))?;
    let supplier = ctx.db.update_supplier(&auth.company_id, &reference, changes)?;
    success(ctx.quiet(), format!("Updated supplier {}", supplier.name));
    Ok(())
}

fn run_deactivate(args: ContactRef, global: &GlobalOpts) -> Result<()> {
    let mut ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().delete(Module::Purchasing))?;
    let supplier = ctx
        .db
        .set_supplier_active(&auth.company_id, &args.reference, false)?;
    success(ctx.quiet(), format!("Deactivated supplier {}", supplier.name));
    Ok(())
}
