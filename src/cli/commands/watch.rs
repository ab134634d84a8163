//! `iw watch` command - Follow the change feed

use std::time::Duration;

use console::style;
use miette::{IntoDiagnostic, Result};

use crate::cli::helpers::Context;
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::permissions::Requirements;
use crate::core::realtime::ALL_TOPICS;
use crate::core::{ChangeEvent, Operation};

#[derive(clap::Args, Debug)]
pub struct WatchArgs {
    /// Table to follow, e.g. part, quote, sales_order; `*` follows everything
    #[arg(default_value = ALL_TOPICS)]
    pub table: String,

    /// Print what is pending and exit
    #[arg(long)]
    pub once: bool,

    /// Replay the whole change log before following
    #[arg(long)]
    pub from_start: bool,

    /// Poll interval in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub interval: u64,
}

pub fn run(args: WatchArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new())?;
    let mut subscription = ctx
        .db
        .subscribe(&args.table, &auth.company_id, args.from_start)?;
    tracing::debug!(topic = subscription.topic(), cursor = subscription.cursor(), "watching");

    if !args.once && !ctx.quiet() && ctx.format() == OutputFormat::Auto {
        eprintln!(
            "{} Watching {} (Ctrl-C to stop)",
            style("→").blue(),
            style(subscription.topic()).cyan()
        );
    }

    loop {
        for event in subscription.poll(&ctx.db)? {
            print_event(&event, ctx.format())?;
        }
        if args.once {
            return Ok(());
        }
        std::thread::sleep(Duration::from_millis(args.interval));
    }
}

fn print_event(event: &ChangeEvent, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json | OutputFormat::Yaml => {
            println!("{}", serde_json::to_string(event).into_diagnostic()?);
        }
        OutputFormat::Id => println!("{}", event.record_id),
        OutputFormat::Tsv | OutputFormat::Csv | OutputFormat::Md => println!(
            "{}\t{}\t{}\t{}\t{}",
            event.seq,
            event.at.to_rfc3339(),
            event.table,
            event.operation,
            event.record_id
        ),
        OutputFormat::Auto => {
            let op = match event.operation {
                Operation::Insert => style("insert").green(),
                Operation::Update => style("update").yellow(),
                Operation::Delete => style("delete").red(),
            };
            println!(
                "{:>6}  {}  {:<16} {:<7} {}",
                event.seq,
                event.at.format("%H:%M:%S"),
                event.table,
                op,
                event.record_id
            );
        }
    }
    Ok(())
}
