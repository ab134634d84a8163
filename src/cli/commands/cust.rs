//! `iw cust` command - Customer management

use clap::Subcommand;
use console::style;
use miette::Result;

use crate::cli::commands::contacts::{contact_listing, ContactFields, ContactRef, ContactRow, ListArgs, UpdateArgs};
use crate::cli::helpers::Context;
use crate::cli::output::{print_list, print_record, success};
use crate::cli::GlobalOpts;
use crate::core::permissions::Requirements;
use crate::core::{Module, Page};
use crate::entities::Customer;

#[derive(Subcommand, Debug)]
pub enum CustCommands {
    /// Create a customer
    New(ContactFields),

    /// List customers
    List(ListArgs),

    /// Show a customer's details
    Show(ContactRef),

    /// Change a customer's details
    Update(UpdateArgs),

    /// Deactivate a customer
    Deactivate(ContactRef),
}

pub fn run(cmd: CustCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        CustCommands::New(args) => run_new(args, global),
        CustCommands::List(args) => run_list(args, global),
        CustCommands::Show(args) => run_show(args, global),
        CustCommands::Update(args) => run_update(args, global),
        CustCommands::Deactivate(args) => run_deactivate(args, global),
    }
}

fn run_new(args: ContactFields, global: &GlobalOpts) -> Result<()> {
    args.validate()?;
    let mut ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().create(Module::Sales))?;

    let customer = Customer::new(
        auth.company_id.clone(),
        args.name.trim().to_string(),
        args.details(),
        auth.user_id.clone(),
    );
    ctx.db.create_customer(&customer)?;

    if ctx.quiet() {
        println!("{}", customer.id);
    } else {
        success(
            false,
            format!(
                "Created customer {} {}",
                style(&customer.name).yellow(),
                style(&customer.id).cyan()
            ),
        );
    }
    Ok(())
}

fn run_list(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().view(Module::Sales))?;
    let customers = ctx.db.list_customers(
        &auth.company_id,
        args.search.as_deref(),
        args.all,
        Page::new(args.limit, args.offset),
    )?;

    let listing = contact_listing(
        "customer",
        customers.iter().map(|c| ContactRow {
            id: &c.id,
            name: &c.name,
            details: &c.details,
            active: c.active,
        }),
    );
    print_list(&customers, &listing, ctx.format(), ctx.quiet())
}

fn run_show(args: ContactRef, global: &GlobalOpts) -> Result<()> {
    let ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().view(Module::Sales))?;
    let customer = ctx.db.find_customer(&auth.company_id, &args.reference)?;
    print_record(&customer, &customer.id.to_string(), ctx.format())
}

fn run_update(args: UpdateArgs, global: &GlobalOpts) -> Result<()> {
    let reference = args.reference.clone();
    let changes = args.into_update()?;
    let mut ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().update(Module::Sales))?;
    let customer = ctx.db.update_customer(&auth.company_id, &reference, changes)?;
    success(ctx.quiet(), format!("Updated customer {}", customer.name));
    Ok(())
}

fn run_deactivate(args: ContactRef, global: &GlobalOpts) -> Result<()> {
    let mut ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().delete(Module::Sales))?;
    let customer = ctx
        .db
        .set_customer_active(&auth.company_id, &args.reference, false)?;
    success(ctx.quiet(), format!("Deactivated customer {}", customer.name));
    Ok(())
}
