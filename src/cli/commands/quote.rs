//! `iw quote` command - Customer quotes

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::Subcommand;
use console::style;
use miette::{IntoDiagnostic, Result};
use serde_json::json;

use crate::cli::commands::orders::{line_listing, AddLineArgs, DocumentRef, LineRow};
use crate::cli::helpers::{format_money, or_dash, truncate_str, validate_input, Context};
use crate::cli::output::{print_list, print_record, print_table, success, Listing};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::db::{QuoteFilter, QuoteTransition};
use crate::core::permissions::Requirements;
use crate::core::{Job, JobKind, Module, Page, Storage};
use crate::entities::{Bucket, QuoteStatus};
use crate::schema::{DocumentRenderer, Form, QuoteDocument};

#[derive(Subcommand, Debug)]
pub enum QuoteCommands {
    /// Start a draft quote for a customer
    New(NewArgs),

    /// Add a line to a draft quote
    AddLine(AddLineArgs),

    /// Remove a line from a draft quote
    RmLine(RmLineArgs),

    /// List quotes
    List(ListArgs),

    /// Show a quote with its lines
    Show(DocumentRef),

    /// Mark a draft quote as sent
    Send(DocumentRef),

    /// Mark an open quote as lost
    Lose(DocumentRef),

    /// Cancel an open quote
    Cancel(DocumentRef),

    /// Convert an open quote into a confirmed sales order
    Convert(DocumentRef),

    /// Render a quote as an HTML document
    Render(RenderArgs),

    /// Expire sent quotes past their expiration date
    Expire(ExpireArgs),
}

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// Customer id or exact name
    #[arg(long, short = 'c')]
    pub customer: String,

    /// Short title for the quote
    #[arg(long, short = 'n')]
    pub name: String,

    /// Last day the quote is valid (YYYY-MM-DD)
    #[arg(long)]
    pub expires: Option<NaiveDate>,
}

#[derive(clap::Args, Debug)]
pub struct RmLineArgs {
    /// Quote number or id
    pub document: String,

    /// Line number as shown by `iw quote show`
    pub line: usize,
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// draft, sent, ordered, lost, cancelled or expired
    #[arg(long, short = 's')]
    pub status: Option<QuoteStatus>,

    /// Customer id or exact name
    #[arg(long, short = 'c')]
    pub customer: Option<String>,

    /// Search quote number and name
    #[arg(long)]
    pub search: Option<String>,

    /// Limit number of results
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,

    /// Skip this many results
    #[arg(long, default_value_t = 0)]
    pub offset: usize,
}

#[derive(clap::Args, Debug)]
pub struct RenderArgs {
    /// Quote number or id
    pub document: String,

    /// Write the HTML to a file instead of stdout
    #[arg(long, short = 'o')]
    pub out: Option<PathBuf>,

    /// Also keep a copy in the private bucket under quotes/
    #[arg(long)]
    pub store: bool,
}

#[derive(clap::Args, Debug)]
pub struct ExpireArgs {
    /// Expire quotes whose expiration date is before this day (default: today)
    #[arg(long)]
    pub as_of: Option<NaiveDate>,

    /// Queue the sweep as a background job instead of running it now
    #[arg(long)]
    pub job: bool,
}

pub fn run(cmd: QuoteCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        QuoteCommands::New(args) => run_new(args, global),
        QuoteCommands::AddLine(args) => run_add_line(args, global),
        QuoteCommands::RmLine(args) => run_rm_line(args, global),
        QuoteCommands::List(args) => run_list(args, global),
        QuoteCommands::Show(args) => run_show(args, global),
        QuoteCommands::Send(args) => run_transition(args, QuoteTransition::Send, global),
        QuoteCommands::Lose(args) => run_transition(args, QuoteTransition::Lose, global),
        QuoteCommands::Cancel(args) => run_transition(args, QuoteTransition::Cancel, global),
        QuoteCommands::Convert(args) => run_convert(args, global),
        QuoteCommands::Render(args) => run_render(args, global),
        QuoteCommands::Expire(args) => run_expire(args, global),
    }
}

fn run_new(args: NewArgs, global: &GlobalOpts) -> Result<()> {
    validate_input(
        Form::Quote,
        &json!({
            "customer": args.customer,
            "name": args.name,
            "expiration_date": args.expires.map(|d| d.to_string()),
        }),
    )?;

    let mut ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().create(Module::Sales))?;
    let customer = ctx.db.find_customer(&auth.company_id, &args.customer)?;
    let quote = ctx.db.create_quote(
        &auth.company_id,
        &customer.id,
        args.name.trim(),
        args.expires,
        &auth.user_id,
    )?;

    if ctx.quiet() {
        println!("{}", quote.quote_number);
    } else {
        success(
            false,
            format!(
                "Created quote {} for {}",
                style(&quote.quote_number).cyan(),
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
    let quote = ctx.db.add_quote_line(
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
            quote.lines.len(),
            quote.quote_number,
            format_money(quote.total())
        ),
    );
    Ok(())
}

fn run_rm_line(args: RmLineArgs, global: &GlobalOpts) -> Result<()> {
    let mut ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().update(Module::Sales))?;
    let quote = ctx
        .db
        .remove_quote_line(&auth.company_id, &args.document, args.line)?;
    success(
        ctx.quiet(),
        format!("Removed line {} from {}", args.line, quote.quote_number),
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
    let filter = QuoteFilter {
        status: args.status,
        customer_id,
        search: args.search,
    };
    let quotes = ctx
        .db
        .list_quotes(&auth.company_id, &filter, Page::new(args.limit, args.offset))?;

    let mut listing = Listing::new(
        "quote",
        &["NUMBER", "NAME", "CUSTOMER", "STATUS", "EXPIRES", "LINES", "TOTAL"],
    );
    for q in &quotes {
        let customer = ctx.db.get_customer(&auth.company_id, &q.customer_id)?;
        listing.push(
            q.quote_number.clone(),
            vec![
                q.quote_number.clone(),
                truncate_str(&q.name, 28),
                truncate_str(&customer.name, 24),
                q.status.to_string(),
                or_dash(q.expiration_date.map(|d| d.to_string()).as_deref()),
                q.lines.len().to_string(),
                format_money(q.total()),
            ],
        );
    }
    print_list(&quotes, &listing, ctx.format(), ctx.quiet())
}

fn run_show(args: DocumentRef, global: &GlobalOpts) -> Result<()> {
    let ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().view(Module::Sales))?;
    let quote = ctx.db.get_quote(&auth.company_id, &args.document)?;

    if ctx.format() != OutputFormat::Auto {
        return print_record(&quote, &quote.quote_number, ctx.format());
    }

    let customer = ctx.db.get_customer(&auth.company_id, &quote.customer_id)?;
    println!(
        "{} {}  {}",
        style("Quote").bold(),
        style(&quote.quote_number).cyan(),
        style(format!("[{}]", quote.status)).dim()
    );
    println!("{}   {}", style("Name:").dim(), quote.name);
    println!("{}   {}", style("Customer:").dim(), customer.name);
    if let Some(expires) = quote.expiration_date {
        println!("{}   {}", style("Expires:").dim(), expires);
    }
    if let Some(order) = &quote.sales_order_id {
        let order = ctx.db.get_sales_order(&auth.company_id, &order.to_string())?;
        println!("{}   {}", style("Order:").dim(), order.order_number);
    }
    println!();

    if quote.lines.is_empty() {
        println!("No lines yet.");
        return Ok(());
    }
    let listing = line_listing(
        &ctx.db,
        &auth.company_id,
        None,
        quote.lines.iter().map(|l| LineRow {
            part_id: l.part_id.clone(),
            description: l.description.clone(),
            quantity: l.quantity,
            unit_price: l.unit_price,
            progress: None,
        }),
    )?;
    print_table(&listing);
    println!();
    println!("{} {}", style("Total:").bold(), format_money(quote.total()));
    Ok(())
}

fn run_transition(args: DocumentRef, transition: QuoteTransition, global: &GlobalOpts) -> Result<()> {
    let mut ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().update(Module::Sales))?;
    let quote = ctx
        .db
        .transition_quote(&auth.company_id, &args.document, transition)?;
    success(
        ctx.quiet(),
        format!("Quote {} is now {}", quote.quote_number, style(quote.status).yellow()),
    );
    Ok(())
}

fn run_convert(args: DocumentRef, global: &GlobalOpts) -> Result<()> {
    let mut ctx = Context::open(global)?;
    let auth = ctx.authorize(
        Requirements::new()
            .update(Module::Sales)
            .create(Module::Sales),
    )?;
    let order = ctx
        .db
        .convert_quote_to_order(&auth.company_id, &args.document, &auth.user_id)?;

    if ctx.quiet() {
        println!("{}", order.order_number);
    } else {
        success(
            false,
            format!(
                "Converted {} to sales order {} ({} line(s), total {})",
                args.document,
                style(&order.order_number).cyan(),
                order.lines.len(),
                format_money(order.total())
            ),
        );
    }
    Ok(())
}

fn run_render(args: RenderArgs, global: &GlobalOpts) -> Result<()> {
    let mut ctx = Context::open(global)?;
    let mut requirements = Requirements::new().view(Module::Sales);
    if args.store {
        requirements = requirements.create(Module::Documents);
    }
    let auth = ctx.authorize(requirements)?;

    let document = QuoteDocument::assemble(&ctx.db, &auth.company_id, &args.document)?;
    let html = DocumentRenderer::new()?.render_quote(&document)?;

    match &args.out {
        Some(path) => {
            std::fs::write(path, &html).into_diagnostic()?;
            success(
                ctx.quiet(),
                format!("Wrote {} to {}", document.quote.number, path.display()),
            );
        }
        None if !args.store => print!("{}", html),
        None => {}
    }

    if args.store {
        let storage = Storage::open(&ctx.workspace)?;
        let path = format!("quotes/{}.html", document.quote.number);
        let stored = storage.put(
            &mut ctx.db,
            &auth.company_id,
            Bucket::Private,
            &path,
            html.as_bytes(),
            &auth.user_id,
        )?;
        success(
            ctx.quiet(),
            format!("Stored {}/{}", stored.bucket, style(&stored.path).cyan()),
        );
    }
    Ok(())
}

fn run_expire(args: ExpireArgs, global: &GlobalOpts) -> Result<()> {
    let mut ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().update(Module::Sales))?;
    let as_of = args
        .as_of
        .unwrap_or_else(|| chrono::Local::now().date_naive());

    if args.job {
        let job = Job::new(
            auth.company_id.clone(),
            JobKind::ExpireQuotes { as_of },
            auth.user_id.clone(),
        );
        ctx.db.enqueue_job(&job)?;
        if ctx.quiet() {
            println!("{}", job.id);
        } else {
            success(false, format!("Queued job {}", style(&job.id).cyan()));
        }
        return Ok(());
    }

    let expired = ctx.db.expire_quotes(&auth.company_id, as_of)?;
    if ctx.quiet() {
        for number in &expired {
            println!("{}", number);
        }
    } else if expired.is_empty() {
        println!("No quotes past their expiration date.");
    } else {
        success(false, format!("Expired {} quote(s): {}", expired.len(), expired.join(", ")));
    }
    Ok(())
}
