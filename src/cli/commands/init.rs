//! `iw init` command - Initialize a workspace

use console::style;
use miette::{IntoDiagnostic, Result};

use crate::cli::GlobalOpts;
use crate::core::{Config, Database, DbError, Workspace, WorkspaceError};
use crate::entities::{User, UserType};

#[derive(clap::Args, Debug)]
pub struct InitArgs {
    /// Directory to initialize (default: current directory)
    #[arg(default_value = ".")]
    pub path: std::path::PathBuf,

    /// Name of the first company
    #[arg(long)]
    pub company: String,

    /// Administrator email; becomes the acting user
    #[arg(long)]
    pub email: String,

    /// Administrator first name
    #[arg(long, default_value = "Admin")]
    pub first: String,

    /// Administrator last name
    #[arg(long, default_value = "User")]
    pub last: String,

    /// Base currency of the company
    #[arg(long, default_value = "USD")]
    pub currency: String,

    /// Reuse an existing .iw/ directory
    #[arg(long)]
    pub force: bool,
}

pub fn run(args: InitArgs, global: &GlobalOpts) -> Result<()> {
    let path = if args.path.as_os_str() == "." {
        std::env::current_dir().into_diagnostic()?
    } else {
        args.path.clone()
    };
    if !path.exists() {
        std::fs::create_dir_all(&path).into_diagnostic()?;
    }

    let workspace = match Workspace::init(&path, args.force) {
        Ok(ws) => ws,
        Err(WorkspaceError::AlreadyExists(root)) => {
            println!(
                "{} Ironworks workspace already exists at {}",
                style("!").yellow(),
                style(root.display()).cyan()
            );
            println!();
            println!("Use {} to add another company to it", style("iw company new").yellow());
            return Ok(());
        }
        Err(e) => return Err(miette::miette!("{}", e)),
    };

    let mut db = Database::open(&workspace)?;
    let admin = match db.get_user_by_email(&args.email) {
        Ok(user) => user,
        Err(DbError::NotFound { .. }) => {
            let user = User::new(&args.email, args.first, args.last, UserType::Employee);
            db.create_user(&user)?;
            user
        }
        Err(e) => return Err(e.into()),
    };
    let company = db.create_company(&args.company, &args.currency.to_uppercase(), &admin.id)?;

    let mut config = Config::load_workspace_file(&workspace);
    config.user = Some(admin.email.clone());
    config.company = Some(company.id.to_string());
    config.save_workspace_file(&workspace).into_diagnostic()?;

    if global.quiet {
        return Ok(());
    }
    println!(
        "{} Initialized Ironworks workspace at {}",
        style("✓").green(),
        style(workspace.root().display()).cyan()
    );
    println!(
        "{} Created company {} ({})",
        style("✓").green(),
        style(&company.name).cyan(),
        company.id
    );
    println!(
        "{} Acting as {}",
        style("✓").green(),
        style(&admin.email).cyan()
    );
    println!();
    println!("Next steps:");
    println!("  {} Add your first part", style("iw part new").yellow());
    println!("  {} Add a customer", style("iw cust new").yellow());
    println!("  {} Start a quote", style("iw quote new").yellow());
    Ok(())
}
