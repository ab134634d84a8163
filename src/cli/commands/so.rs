//! `iw so` command - Sales orders

use clap::Subcommand;
use console::style;
use miette::Result;

use crate::cli::commands::orders::{line_listing, AddLineArgs, DocumentRef, LineRow};
use crate::cli::helpers::{format_money, format_quantity, truncate_str, Context};
use crate::cli::output::{print_list, print_record, print_table, success, Listing};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::db::{SalesOrderFilter, SalesOrderTransition};
use crate::core::permissions::Requirements;
use crate::core::{Module, Page};
use crate::entities::SalesOrderStatus;

#[derive(Subcommand, Debug)]
pub enum SoCommands {
    /// Start a draft sales order for a customer
    New(NewArgs),

    /// Add a line to a draft order
    AddLine(AddLineArgs),

    /// List sales orders
    List(ListArgs),

    /// Show an order with its lines and shipped quantities
    Show(DocumentRef),

    /// Confirm a draft order
    Confirm(DocumentRef),

    /// Cancel an order that has not shipped anything
    Cancel(DocumentRef),

    /// Ship quantity against an order line, taking it out of stock
    Ship(ShipArgs),
}

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// Customer id or exact name
    #[arg(long, short = 'c')]
    pub customer: String,
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// draft, confirmed, in_progress, completed or cancelled
    #[arg(long, short = 's')]
    pub status: Option<SalesOrderStatus>,

    /// Customer id or exact name
    #[arg(long, short = 'c')]
    pub customer: Option<String>,

    /// Limit number of results
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,

    /// Skip this many results
    #[arg(long, default_value_t = 0)]
    pub offset: usize,
}

#[derive(clap::Args, Debug)]
pub struct ShipArgs {
    /// Order number or id
    pub document: String,

    /// Line number as shown by `iw so show`
    pub line: usize,

    /// Quantity to ship
    pub quantity: f64,

    /// Stock location to ship from
    #[arg(long, short = 'l')]
    pub location: Option<String>,
}

pub fn run(cmd: SoCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        SoCommands::New(args) => run_new(args, global),
        SoCommands::AddLine(args) => run_add_line(args, global),
        SoCommands::List(args) => run_list(args, global),
        SoCommands::Show(args) => run_show(args, global),
        SoCommands::Confirm(args) => run_transition(args, SalesOrderTransition::Confirm, global),
        SoCommands::Cancel(args) => run_transition(args, SalesOrderTransition::Cancel, global),
        SoCommands::Ship(args) => run_ship(args, global),
    }
}

fn run_new(args: NewArgs, global: &GlobalOpts) -> Result<()> {
    let mut ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().create(Module::Sales))?;
    let customer = ctx.db.find_customer(&auth.company_id, &args.customer)?;
    let order = ctx
        .db
        .create_sales_order(&auth.company_id, &customer.id, &auth.user_id)?;

    if ctx.quiet() {
        println!("{}", order.order_number);
    } else {
        success(
            false,
            format!(
                "Created sales order {} for {}",
                style(&order.order_number).cyan(),
                style(&customer.name).yellow()
            ),
        );
    }
    Ok(())
}

fn run_add_line(args: AddLineArgs, global: &GlobalOpts) -> Result<()> {
    args.validate()?;
    let mut ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().update(Module::Sales).view(Module::Parts))?;
    let order = ctx.db.add_sales_order_line(
        &auth.company_id,
        &args.document,
        &args.part,
        args.quantity,
        args.price,
        args.description,
    )?;
    success(
        ctx.quiet(),
        format!(
            "Added line {} to {} (total {})",
            order.lines.len(),
            order.order_number,
            format_money(order.total())
        ),
    );
    Ok(())
}

fn run_list(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().view(Module::Sales))?;

    let customer_id = match &args.customer {
        Some(reference) => Some(ctx.db.find_customer(&auth.company_id, reference)?.id),
        None => None,
    };
    let filter = SalesOrderFilter {
        status: args.status,
        customer_id,
    };
    let orders =
        ctx.db
            .list_sales_orders(&auth.company_id, &filter, Page::new(args.limit, args.offset))?;

    let mut listing = Listing::new(
        "sales order",
        &["NUMBER", "CUSTOMER", "STATUS", "DATE", "LINES", "TOTAL"],
    );
    for o in &orders {
        let customer = ctx.db.get_customer(&auth.company_id, &o.customer_id)?;
        listing.push(
            o.order_number.clone(),
            vec![
                o.order_number.clone(),
                truncate_str(&customer.name, 28),
                o.status.to_string(),
                o.order_date.to_string(),
                o.lines.len().to_string(),
                format_money(o.total()),
            ],
        );
    }
    print_list(&orders, &listing, ctx.format(), ctx.quiet())
}

fn run_show(args: DocumentRef, global: &GlobalOpts) -> Result<()> {
    let ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().view(Module::Sales))?;
    let order = ctx.db.get_sales_order(&auth.company_id, &args.document)?;

    if ctx.format() != OutputFormat::Auto {
        return print_record(&order, &order.order_number, ctx.format());
    }

    let customer = ctx.db.get_customer(&auth.company_id, &order.customer_id)?;
    println!(
        "{} {}  {}",
        style("Sales order").bold(),
        style(&order.order_number).cyan(),
        style(format!("[{}]", order.status)).dim()
    );
    println!("{}   {}", style("Customer:").dim(), customer.name);
    println!("{}   {}", style("Date:").dim(), order.order_date);
    if let Some(quote) = &order.quote_id {
        let quote = ctx.db.get_quote(&auth.company_id, &quote.to_string())?;
        println!("{}   {}", style("Quote:").dim(), quote.quote_number);
    }
    println!();

    if order.lines.is_empty() {
        println!("No lines yet.");
        return Ok(());
    }
    let listing = line_listing(
        &ctx.db,
        &auth.company_id,
        Some("SHIPPED"),
        order.lines.iter().map(|l| LineRow {
            part_id: l.part_id.clone(),
            description: l.description.clone(),
            quantity: l.quantity,
            unit_price: l.unit_price,
            progress: Some(l.quantity_shipped),
        }),
    )?;
    print_table(&listing);
    println!();
    println!("{} {}", style("Total:").bold(), format_money(order.total()));
    Ok(())
}

fn run_transition(
    args: DocumentRef,
    transition: SalesOrderTransition,
    global: &GlobalOpts,
) -> Result<()> {
    let mut ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().update(Module::Sales))?;
    let order = ctx
        .db
        .transition_sales_order(&auth.company_id, &args.document, transition)?;
    success(
        ctx.quiet(),
        format!(
            "Sales order {} is now {}",
            order.order_number,
            style(order.status).yellow()
        ),
    );
    Ok(())
}

fn run_ship(args: ShipArgs, global: &GlobalOpts) -> Result<()> {
    let mut ctx = Context::open(global)?;
    let auth = ctx.authorize(
        Requirements::new()
            .update(Module::Sales)
            .update(Module::Inventory),
    )?;
    let order = ctx.db.ship_sales_order_line(
        &auth.company_id,
        &args.document,
        args.line,
        args.quantity,
        args.location.as_deref(),
        &auth.user_id,
    )?;
    success(
        ctx.quiet(),
        format!(
            "Shipped {} on {} line {} ({})",
            format_quantity(args.quantity),
            order.order_number,
            args.line,
            style(order.status).yellow()
        ),
    );
    Ok(())
}
