//! `iw job` command - Background job queue

use clap::Subcommand;
use console::style;
use miette::Result;

use crate::cli::helpers::{or_dash, truncate_str, Context};
use crate::cli::output::{print_list, print_record, success, Listing};
use crate::cli::GlobalOpts;
use crate::core::permissions::Requirements;
use crate::core::{JobStatus, Module};

#[derive(Subcommand, Debug)]
pub enum JobCommands {
    /// List queued and finished jobs
    List(ListArgs),

    /// Show one job
    Show(JobRef),

    /// Run pending jobs now
    Run(RunArgs),

    /// Requeue a failed or interrupted job
    Retry(JobRef),
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// pending, running, succeeded or failed
    #[arg(long, short = 's')]
    pub status: Option<JobStatus>,
}

#[derive(clap::Args, Debug)]
pub struct JobRef {
    /// Job id
    pub id: String,
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Most jobs to run in this pass
    #[arg(long, short = 'n', default_value_t = 10)]
    pub limit: usize,
}

pub fn run(cmd: JobCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        JobCommands::List(args) => run_list(args, global),
        JobCommands::Show(args) => run_show(args, global),
        JobCommands::Run(args) => run_pending(args, global),
        JobCommands::Retry(args) => run_retry(args, global),
    }
}

fn run_list(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().view(Module::Settings))?;
    let jobs = ctx.db.list_jobs(&auth.company_id, args.status)?;

    let mut listing = Listing::new("job", &["ID", "KIND", "STATUS", "ATTEMPTS", "CREATED", "ERROR"]);
    for j in &jobs {
        listing.push(
            j.id.to_string(),
            vec![
                j.id.to_string(),
                j.kind.name().to_string(),
                j.status.to_string(),
                j.attempts.to_string(),
                j.created.format("%Y-%m-%d %H:%M").to_string(),
                or_dash(j.error.as_deref().map(|e| truncate_str(e, 40)).as_deref()),
            ],
        );
    }
    print_list(&jobs, &listing, ctx.format(), ctx.quiet())
}

fn run_show(args: JobRef, global: &GlobalOpts) -> Result<()> {
    let ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().view(Module::Settings))?;
    let job = ctx.db.get_job(&auth.company_id, &args.id)?;
    print_record(&job, &job.id.to_string(), ctx.format())
}

fn run_pending(args: RunArgs, global: &GlobalOpts) -> Result<()> {
    let mut ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().update(Module::Settings))?;
    let summary = ctx.db.run_pending(&auth.company_id, args.limit)?;

    if summary.succeeded.is_empty() && summary.failed.is_empty() {
        if !ctx.quiet() {
            println!("No pending jobs.");
        }
        return Ok(());
    }
    success(
        ctx.quiet(),
        format!("{} job(s) succeeded", summary.succeeded.len()),
    );
    if summary.failed.is_empty() {
        return Ok(());
    }
    for id in &summary.failed {
        let job = ctx.db.get_job(&auth.company_id, &id.to_string())?;
        eprintln!(
            "{} {} {}",
            style("✗").red(),
            style(&job.id).cyan(),
            job.error.as_deref().unwrap_or("failed")
        );
    }
    Err(miette::miette!(
        help = "fix the cause and requeue with `iw job retry <id>`",
        "{} job(s) failed",
        summary.failed.len()
    ))
}

fn run_retry(args: JobRef, global: &GlobalOpts) -> Result<()> {
    let mut ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().update(Module::Settings))?;
    let job = ctx.db.retry_job(&auth.company_id, &args.id)?;
    success(ctx.quiet(), format!("Requeued job {}", style(&job.id).cyan()));
    Ok(())
}
