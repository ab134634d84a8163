//! `iw user` command - Users, employee types and permissions

use clap::Subcommand;
use console::style;
use miette::Result;
use serde::Serialize;
use serde_json::json;

use crate::cli::helpers::{format_short_id, validate_input, Context};
use crate::cli::output::{print_list, print_record, success, Listing};
use crate::cli::GlobalOpts;
use crate::core::db::EmployeeRecord;
use crate::core::permissions::Requirements;
use crate::core::{Job, JobKind, Module, Permission, PermissionSet};
use crate::entities::{EmployeeType, User, UserType};
use crate::schema::Form;

#[derive(Subcommand, Debug)]
pub enum UserCommands {
    /// Add an employee to the current company
    Add(AddArgs),

    /// List employees of the current company
    List,

    /// Show a user with the permissions held in the current company
    Show(UserRef),

    /// Deactivate a user account
    Deactivate(UserRef),

    /// Show the acting user
    Whoami,

    /// Grant permissions to one user immediately
    Grant(PermissionArgs),

    /// Revoke permissions from one user immediately
    Revoke(PermissionArgs),

    /// Queue a permission change for many users as a background job
    Bulk(BulkArgs),

    /// Employee types and their permission templates
    #[command(subcommand)]
    Type(TypeCommands),
}

#[derive(clap::Args, Debug)]
pub struct AddArgs {
    /// Email address
    pub email: String,

    #[arg(long)]
    pub first: String,

    #[arg(long)]
    pub last: String,

    /// Employee type whose permissions the user receives
    #[arg(long = "type", short = 't')]
    pub employee_type: String,
}

#[derive(clap::Args, Debug)]
pub struct UserRef {
    /// User id or email
    pub user: String,
}

#[derive(clap::Args, Debug)]
pub struct PermissionArgs {
    /// User id or email
    pub user: String,

    /// Permissions such as sales_view or parts_create
    #[arg(required = true)]
    pub permissions: Vec<Permission>,
}

#[derive(clap::Args, Debug)]
pub struct BulkArgs {
    /// Users to change (id or email, comma separated)
    #[arg(long, value_delimiter = ',', required = true)]
    pub users: Vec<String>,

    /// Permissions to grant
    #[arg(long, value_delimiter = ',')]
    pub add: Vec<Permission>,

    /// Permissions to revoke
    #[arg(long, value_delimiter = ',')]
    pub remove: Vec<Permission>,
}

#[derive(Subcommand, Debug)]
pub enum TypeCommands {
    /// Create an employee type
    New(TypeNewArgs),

    /// List employee types
    List,
}

#[derive(clap::Args, Debug)]
pub struct TypeNewArgs {
    /// Type name, e.g. "Sales Clerk"
    pub name: String,

    /// Permissions granted to employees of this type
    #[arg(long = "perm", short = 'p', value_delimiter = ',')]
    pub permissions: Vec<Permission>,
}

pub fn run(cmd: UserCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        UserCommands::Add(args) => run_add(args, global),
        UserCommands::List => run_list(global),
        UserCommands::Show(args) => run_show(args, global),
        UserCommands::Deactivate(args) => run_deactivate(args, global),
        UserCommands::Whoami => run_whoami(global),
        UserCommands::Grant(args) => run_change(args, true, global),
        UserCommands::Revoke(args) => run_change(args, false, global),
        UserCommands::Bulk(args) => run_bulk(args, global),
        UserCommands::Type(TypeCommands::New(args)) => run_type_new(args, global),
        UserCommands::Type(TypeCommands::List) => run_type_list(global),
    }
}

#[derive(Serialize)]
struct UserDetail<'a> {
    #[serde(flatten)]
    user: &'a User,
    employee_type: Option<&'a str>,
    permissions: Vec<String>,
}

fn run_add(args: AddArgs, global: &GlobalOpts) -> Result<()> {
    let mut ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().create(Module::Users))?;

    validate_input(
        Form::Employee,
        &json!({
            "email": args.email,
            "first_name": args.first,
            "last_name": args.last,
            "employee_type": args.employee_type,
        }),
    )?;

    let user = User::new(&args.email, args.first, args.last, UserType::Employee);
    let record = ctx
        .db
        .add_employee(&user, &auth.company_id, &args.employee_type)?;
    success(
        ctx.quiet(),
        format!(
            "Added {} as {}",
            style(&record.user.email).cyan(),
            record.employee_type
        ),
    );
    Ok(())
}

fn run_list(global: &GlobalOpts) -> Result<()> {
    let ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().view(Module::Users))?;
    let employees: Vec<EmployeeRecord> = ctx.db.list_employees(&auth.company_id)?;

    let mut listing = Listing::new("employee", &["ID", "EMAIL", "NAME", "TYPE", "ACTIVE"]);
    for e in &employees {
        listing.push(
            e.user.email.clone(),
            vec![
                format_short_id(&e.user.id),
                e.user.email.clone(),
                e.user.full_name(),
                e.employee_type.clone(),
                if e.user.active { "yes" } else { "no" }.to_string(),
            ],
        );
    }
    print_list(&employees, &listing, ctx.format(), ctx.quiet())
}

fn show_user(ctx: &Context, user: &User) -> Result<()> {
    let company_id = ctx.company_id()?;
    let employees = ctx.db.list_employees(&company_id)?;
    let employee_type = employees
        .iter()
        .find(|e| e.user.id == user.id)
        .map(|e| e.employee_type.as_str());
    let permissions = ctx
        .db
        .get_permissions(&user.id)?
        .held_in(&company_id)
        .iter()
        .map(|p| p.key())
        .collect();
    let detail = UserDetail {
        user,
        employee_type,
        permissions,
    };
    print_record(&detail, &user.email, ctx.format())
}

fn run_show(args: UserRef, global: &GlobalOpts) -> Result<()> {
    let ctx = Context::open(global)?;
    ctx.authorize(Requirements::new().view(Module::Users))?;
    let user = ctx.db.find_user(&args.user)?;
    show_user(&ctx, &user)
}

fn run_whoami(global: &GlobalOpts) -> Result<()> {
    let ctx = Context::open(global)?;
    let session = ctx.session()?;
    show_user(&ctx, &session.user)
}

fn run_deactivate(args: UserRef, global: &GlobalOpts) -> Result<()> {
    let mut ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().delete(Module::Users))?;
    let user = ctx.db.find_user(&args.user)?;
    if user.id == auth.user_id {
        return Err(miette::miette!("refusing to deactivate your own account"));
    }
    let user = ctx.db.set_user_active(&user.id, &auth.company_id, false)?;
    success(ctx.quiet(), format!("Deactivated {}", user.email));
    Ok(())
}

fn run_change(args: PermissionArgs, grant: bool, global: &GlobalOpts) -> Result<()> {
    let mut ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().update(Module::Users))?;
    let user = ctx.db.find_user(&args.user)?;

    let (add, remove): (&[Permission], &[Permission]) = if grant {
        (&args.permissions, &[])
    } else {
        (&[], &args.permissions)
    };
    let set = ctx
        .db
        .update_permissions(&user.id, &auth.company_id, add, remove)?;

    let verb = if grant { "Granted" } else { "Revoked" };
    let keys: Vec<String> = args.permissions.iter().map(|p| p.key()).collect();
    success(
        ctx.quiet(),
        format!("{} {} for {}", verb, keys.join(", "), user.email),
    );
    if !ctx.quiet() {
        println!(
            "  {} permission(s) now held in this company",
            style(set.held_in(&auth.company_id).len()).cyan()
        );
    }
    Ok(())
}

fn run_bulk(args: BulkArgs, global: &GlobalOpts) -> Result<()> {
    if args.add.is_empty() && args.remove.is_empty() {
        return Err(miette::miette!(
            help = "pass --add and/or --remove",
            "nothing to change"
        ));
    }
    let mut ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().update(Module::Users))?;

    let user_ids = args
        .users
        .iter()
        .map(|u| ctx.db.find_user(u).map(|user| user.id))
        .collect::<Result<Vec<_>, _>>()?;
    let job = Job::new(
        auth.company_id.clone(),
        JobKind::UpdatePermissions {
            user_ids,
            add: args.add,
            remove: args.remove,
        },
        auth.user_id.clone(),
    );
    ctx.db.enqueue_job(&job)?;

    if ctx.quiet() {
        println!("{}", job.id);
    } else {
        success(false, format!("Queued job {}", style(&job.id).cyan()));
        println!("  Run it with {}", style("iw job run").yellow());
    }
    Ok(())
}

fn run_type_new(args: TypeNewArgs, global: &GlobalOpts) -> Result<()> {
    let mut ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().create(Module::Resources))?;

    let company = auth.company_id.to_string();
    let mut permissions = PermissionSet::new();
    for perm in &args.permissions {
        permissions.grant(*perm, &company);
    }
    let et = EmployeeType::new(auth.company_id.clone(), args.name.trim().to_string(), permissions);
    ctx.db.create_employee_type(&et)?;
    success(
        ctx.quiet(),
        format!(
            "Created employee type {} with {} permission(s)",
            et.name,
            args.permissions.len()
        ),
    );
    Ok(())
}

fn run_type_list(global: &GlobalOpts) -> Result<()> {
    let ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().view(Module::Resources))?;
    let types = ctx.db.list_employee_types(&auth.company_id)?;

    let mut listing = Listing::new("employee type", &["NAME", "PERMISSIONS"]);
    for et in &types {
        let perms = et.permissions.permissions();
        let summary = if perms.len() == Permission::all().len() {
            "all".to_string()
        } else {
            perms.iter().map(|p| p.key()).collect::<Vec<_>>().join(", ")
        };
        listing.push(et.name.clone(), vec![et.name.clone(), summary]);
    }
    print_list(&types, &listing, ctx.format(), ctx.quiet())
}
