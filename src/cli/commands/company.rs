//! `iw company` command - Companies (tenants)

use clap::Subcommand;
use miette::{IntoDiagnostic, Result};

use crate::cli::helpers::{format_short_id, Context};
use crate::cli::output::{print_list, success, Listing};
use crate::cli::GlobalOpts;
use crate::core::{Config, PermissionError};
use crate::entities::{Company, User, UserType};

#[derive(Subcommand, Debug)]
pub enum CompanyCommands {
    /// Create a company; you become its administrator
    New(NewArgs),

    /// List companies you can act in
    List,

    /// Make a company the current one for this workspace
    Use(UseArgs),
}

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// Company name
    pub name: String,

    /// Base currency
    #[arg(long, default_value = "USD")]
    pub currency: String,

    /// Switch to the new company
    #[arg(long = "use")]
    pub switch: bool,
}

#[derive(clap::Args, Debug)]
pub struct UseArgs {
    /// Company id or name
    pub company: String,
}

pub fn run(cmd: CompanyCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        CompanyCommands::New(args) => run_new(args, global),
        CompanyCommands::List => run_list(global),
        CompanyCommands::Use(args) => run_use(args, global),
    }
}

/// Creating a company needs an active employee account but no company yet
fn acting_employee(ctx: &Context) -> Result<User> {
    let email = ctx.config.user.as_deref().ok_or(PermissionError::NoUser)?;
    let user = ctx.db.get_user_by_email(email)?;
    if !user.active {
        return Err(PermissionError::Inactive(user.email).into());
    }
    if user.user_type != UserType::Employee {
        return Err(PermissionError::WrongUserType {
            expected: UserType::Employee,
            actual: user.user_type,
        }
        .into());
    }
    Ok(user)
}

fn run_new(args: NewArgs, global: &GlobalOpts) -> Result<()> {
    let mut ctx = Context::open(global)?;
    let user = acting_employee(&ctx)?;
    let company = ctx
        .db
        .create_company(&args.name, &args.currency.to_uppercase(), &user.id)?;

    if args.switch {
        switch_to(&ctx, &company)?;
    }
    success(
        ctx.quiet(),
        format!("Created company {} ({})", company.name, company.id),
    );
    Ok(())
}

fn run_list(global: &GlobalOpts) -> Result<()> {
    let ctx = Context::open(global)?;
    let email = ctx.config.user.as_deref().ok_or(PermissionError::NoUser)?;
    let user = ctx.db.get_user_by_email(email)?;
    let permissions = ctx.db.get_permissions(&user.id)?;
    let current = ctx.company_id().ok();

    let companies: Vec<Company> = ctx
        .db
        .list_companies()?
        .into_iter()
        .filter(|c| !permissions.held_in(&c.id).is_empty())
        .collect();

    let mut listing = Listing::new("company", &["", "ID", "NAME", "CURRENCY"]);
    for company in &companies {
        let marker = if current.as_ref() == Some(&company.id) { "*" } else { "" };
        listing.push(
            company.id.to_string(),
            vec![
                marker.to_string(),
                format_short_id(&company.id),
                company.name.clone(),
                company.base_currency.clone(),
            ],
        );
    }
    print_list(&companies, &listing, ctx.format(), ctx.quiet())
}

fn run_use(args: UseArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = Context::open(global)?;
    let company = ctx.db.find_company(&args.company)?;
    switch_to(&ctx, &company)?;
    success(ctx.quiet(), format!("Now acting in {}", company.name));
    Ok(())
}

fn switch_to(ctx: &Context, company: &Company) -> Result<()> {
    let mut config = Config::load_workspace_file(&ctx.workspace);
    config.company = Some(company.id.to_string());
    config.save_workspace_file(&ctx.workspace).into_diagnostic()?;
    tracing::info!(company = %company.id, "current company changed");
    Ok(())
}
