//! `iw po` command - Purchase orders

use clap::Subcommand;
use console::style;
use miette::Result;

use crate::cli::commands::orders::{line_listing, AddLineArgs, DocumentRef, LineRow};
use crate::cli::helpers::{format_money, format_quantity, truncate_str, Context};
use crate::cli::output::{print_list, print_record, print_table, success, Listing};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::db::PurchaseOrderFilter;
use crate::core::permissions::Requirements;
use crate::core::{Module, Page};
use crate::entities::PurchaseOrderStatus;

#[derive(Subcommand, Debug)]
pub enum PoCommands {
    /// Start a draft purchase order for a supplier
    New(NewArgs),

    /// Add a line to a draft order
    AddLine(AddLineArgs),

    /// Release a draft order to the supplier
    Release(DocumentRef),

    /// Receive quantity against an order line into stock
    Receive(ReceiveArgs),

    /// Cancel an order that has not received anything
    Cancel(DocumentRef),

    /// List purchase orders
    List(ListArgs),

    /// Show an order with its lines and received quantities
    Show(DocumentRef),
}

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// Supplier id or exact name
    #[arg(long, short = 's')]
    pub supplier: String,
}

#[derive(clap::Args, Debug)]
pub struct ReceiveArgs {
    /// Order number or id
    pub document: String,

    /// Line number as shown by `iw po show`
    pub line: usize,

    /// Quantity received
    pub quantity: f64,

    /// Stock location to receive into
    #[arg(long, short = 'l')]
    pub location: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// draft, to_receive, completed or cancelled
    #[arg(long)]
    pub status: Option<PurchaseOrderStatus>,

    /// Supplier id or exact name
    #[arg(long, short = 's')]
    pub supplier: Option<String>,

    /// Limit number of results
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,

    /// Skip this many results
    #[arg(long, default_value_t = 0)]
    pub offset: usize,
}

pub fn run(cmd: PoCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        PoCommands::New(args) => run_new(args, global),
        PoCommands::AddLine(args) => run_add_line(args, global),
        PoCommands::Release(args) => run_release(args, global),
        PoCommands::Receive(args) => run_receive(args, global),
        PoCommands::Cancel(args) => run_cancel(args, global),
        PoCommands::List(args) => run_list(args, global),
        PoCommands::Show(args) => run_show(args, global),
    }
}

fn run_new(args: NewArgs, global: &GlobalOpts) -> Result<()> {
    let mut ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().create(Module::Purchasing))?;
    let supplier = ctx.db.find_supplier(&auth.company_id, &args.supplier)?;
    let order = ctx
        .db
        .create_purchase_order(&auth.company_id, &supplier.id, &auth.user_id)?;

    if ctx.quiet() {
        println!("{}", order.order_number);
    } else {
        success(
            false,
            format!(
                "Created purchase order {} for {}",
                style(&order.order_number).cyan(),
                style(&supplier.name).yellow()
            ),
        );
    }
    Ok(())
}

fn run_add_line(args: AddLineArgs, global: &GlobalOpts) -> Result<()> {
    args.validate()?;
    let mut ctx = Context::open(global)?;
    let auth = ctx.authorize(
        Requirements::new()
            .update(Module::Purchasing)
            .view(Module::Parts),
    )?;
    let order = ctx.db.add_purchase_order_line(
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

fn run_release(args: DocumentRef, global: &GlobalOpts) -> Result<()> {
    let mut ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().update(Module::Purchasing))?;
    let order = ctx
        .db
        .release_purchase_order(&auth.company_id, &args.document)?;
    success(
        ctx.quiet(),
        format!(
            "Purchase order {} is now {}",
            order.order_number,
            style(order.status).yellow()
        ),
    );
    Ok(())
}

fn run_receive(args: ReceiveArgs, global: &GlobalOpts) -> Result<()> {
    let mut ctx = Context::open(global)?;
    let auth = ctx.authorize(
        Requirements::new()
            .update(Module::Purchasing)
            .update(Module::Inventory),
    )?;
    let order = ctx.db.receive_purchase_order_line(
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
            "Received {} on {} line {} ({})",
            format_quantity(args.quantity),
            order.order_number,
            args.line,
            style(order.status).yellow()
        ),
    );
    Ok(())
}

fn run_cancel(args: DocumentRef, global: &GlobalOpts) -> Result<()> {
    let mut ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().update(Module::Purchasing))?;
    let order = ctx
        .db
        .cancel_purchase_order(&auth.company_id, &args.document)?;
    success(
        ctx.quiet(),
        format!("Cancelled purchase order {}", order.order_number),
    );
    Ok(())
}

fn run_list(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().view(Module::Purchasing))?;

    let supplier_id = match &args.supplier {
        Some(reference) => Some(ctx.db.find_supplier(&auth.company_id, reference)?.id),
        None => None,
    };
    let filter = PurchaseOrderFilter {
        status: args.status,
        supplier_id,
    };
    let orders = ctx.db.list_purchase_orders(
        &auth.company_id,
        &filter,
        Page::new(args.limit, args.offset),
    )?;

    let mut listing = Listing::new(
        "purchase order",
        &["NUMBER", "SUPPLIER", "STATUS", "DATE", "LINES", "TOTAL"],
    );
    for o in &orders {
        let supplier = ctx.db.get_supplier(&auth.company_id, &o.supplier_id)?;
        listing.push(
            o.order_number.clone(),
            vec![
                o.order_number.clone(),
                truncate_str(&supplier.name, 28),
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
    let auth = ctx.authorize(Requirements::new().view(Module::Purchasing))?;
    let order = ctx.db.get_purchase_order(&auth.company_id, &args.document)?;

    if ctx.format() != OutputFormat::Auto {
        return print_record(&order, &order.order_number, ctx.format());
    }

    let supplier = ctx.db.get_supplier(&auth.company_id, &order.supplier_id)?;
    println!(
        "{} {}  {}",
        style("Purchase order").bold(),
        style(&order.order_number).cyan(),
        style(format!("[{}]", order.status)).dim()
    );
    println!("{}   {}", style("Supplier:").dim(), supplier.name);
    println!("{}   {}", style("Date:").dim(), order.order_date);
    println!();

    if order.lines.is_empty() {
        println!("No lines yet.");
        return Ok(());
    }
    let listing = line_listing(
        &ctx.db,
        &auth.company_id,
        Some("RECEIVED"),
        order.lines.iter().map(|l| LineRow {
            part_id: l.part_id.clone(),
            description: l.description.clone(),
            quantity: l.quantity,
            unit_price: l.unit_price,
            progress: Some(l.quantity_received),
        }),
    )?;
    print_table(&listing);
    println!();
    println!("{} {}", style("Total:").bold(), format_money(order.total()));
    Ok(())
}
