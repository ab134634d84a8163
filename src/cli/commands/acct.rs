//! `iw acct` command - Chart of accounts

use clap::Subcommand;
use console::style;
use miette::Result;
use serde_json::json;

use crate::cli::helpers::{truncate_str, validate_input, Context};
use crate::cli::output::{print_list, print_record, success, Listing};
use crate::cli::GlobalOpts;
use crate::core::permissions::Requirements;
use crate::core::Module;
use crate::entities::{Account, AccountType};
use crate::schema::Form;

#[derive(Subcommand, Debug)]
pub enum AcctCommands {
    /// Add an account to the chart
    New(NewArgs),

    /// List accounts
    List(ListArgs),

    /// Show one account
    Show(AccountRef),

    /// Deactivate an account
    Deactivate(AccountRef),
}

#[derive(clap::Args, Debug)]
pub struct NewArgs {
    /// Account number, 3 to 10 digits
    pub number: String,

    #[arg(long, short = 'n')]
    pub name: String,

    /// asset, liability, equity, revenue or expense
    #[arg(long = "type", short = 't')]
    pub account_type: AccountType,
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    #[arg(long = "type", short = 't')]
    pub account_type: Option<AccountType>,
}

#[derive(clap::Args, Debug)]
pub struct AccountRef {
    pub number: String,
}

pub fn run(cmd: AcctCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        AcctCommands::New(args) => run_new(args, global),
        AcctCommands::List(args) => run_list(args, global),
        AcctCommands::Show(args) => run_show(args, global),
        AcctCommands::Deactivate(args) => run_deactivate(args, global),
    }
}

fn run_new(args: NewArgs, global: &GlobalOpts) -> Result<()> {
    validate_input(
        Form::Account,
        &json!({
            "number": args.number,
            "name": args.name,
            "account_type": args.account_type.to_string(),
        }),
    )?;
    let mut ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().create(Module::Accounting))?;

    let account = Account::new(
        auth.company_id.clone(),
        &args.number,
        args.name.trim(),
        args.account_type,
    );
    ctx.db.create_account(&account)?;
    success(
        ctx.quiet(),
        format!(
            "Created account {} {}",
            style(&account.number).cyan(),
            style(&account.name).yellow()
        ),
    );
    Ok(())
}

fn run_list(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().view(Module::Accounting))?;
    let accounts = ctx.db.list_accounts(&auth.company_id, args.account_type)?;

    let mut listing = Listing::new("account", &["NUMBER", "NAME", "TYPE", "ACTIVE"]);
    for a in &accounts {
        listing.push(
            a.number.clone(),
            vec![
                a.number.clone(),
                truncate_str(&a.name, 40),
                a.account_type.to_string(),
                if a.active { "yes" } else { "no" }.to_string(),
            ],
        );
    }
    print_list(&accounts, &listing, ctx.format(), ctx.quiet())
}

fn run_show(args: AccountRef, global: &GlobalOpts) -> Result<()> {
    let ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().view(Module::Accounting))?;
    let account = ctx.db.get_account(&auth.company_id, &args.number)?;
    print_record(&account, &account.number, ctx.format())
}

fn run_deactivate(args: AccountRef, global: &GlobalOpts) -> Result<()> {
    let mut ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().delete(Module::Accounting))?;
    let account = ctx
        .db
        .set_account_active(&auth.company_id, &args.number, false)?;
    success(
        ctx.quiet(),
        format!("Deactivated account {} {}", account.number, account.name),
    );
    Ok(())
}
