//! `iw doc` command - Document storage and preview URLs

use std::io::Write;
use std::path::PathBuf;

use clap::Subcommand;
use console::style;
use dialoguer::{theme::ColorfulTheme, Confirm};
use miette::{IntoDiagnostic, Result};

use crate::cli::helpers::Context;
use crate::cli::output::{print_list, success, Listing};
use crate::cli::GlobalOpts;
use crate::core::permissions::Requirements;
use crate::core::{Module, Storage};
use crate::entities::Bucket;

#[derive(Subcommand, Debug)]
pub enum DocCommands {
    /// Upload a local file
    Upload(UploadArgs),

    /// List stored documents
    List(ListArgs),

    /// Copy a stored document to a local file
    Download(DownloadArgs),

    /// Delete a stored document
    Rm(RmArgs),

    /// Create a time-limited preview URL
    Sign(SignArgs),

    /// Read the object behind a preview URL
    Open(OpenArgs),

    /// Compare stored files against their recorded checksums
    Verify,
}

#[derive(clap::Args, Debug)]
pub struct ObjectRef {
    /// Path inside the bucket, e.g. quotes/Q000001.html
    pub path: String,

    /// private or public
    #[arg(long, short = 'b', default_value = "private")]
    pub bucket: Bucket,
}

#[derive(clap::Args, Debug)]
pub struct UploadArgs {
    /// Local file to upload
    pub file: PathBuf,

    /// Path inside the bucket (default: the file name)
    #[arg(long)]
    pub path: Option<String>,

    #[arg(long, short = 'b', default_value = "private")]
    pub bucket: Bucket,
}

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    #[arg(long, short = 'b')]
    pub bucket: Option<Bucket>,

    /// Only paths starting with this prefix
    #[arg(long)]
    pub prefix: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct DownloadArgs {
    #[command(flatten)]
    pub object: ObjectRef,

    /// Destination file (default: the document name in the current directory)
    #[arg(long, short = 'o')]
    pub out: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct RmArgs {
    #[command(flatten)]
    pub object: ObjectRef,

    /// Skip confirmation
    #[arg(long, short = 'y')]
    pub yes: bool,
}

#[derive(clap::Args, Debug)]
pub struct SignArgs {
    #[command(flatten)]
    pub object: ObjectRef,

    /// Seconds the URL stays valid (default: preview_ttl_secs from config)
    #[arg(long)]
    pub ttl: Option<u64>,
}

#[derive(clap::Args, Debug)]
pub struct OpenArgs {
    /// URL printed by `iw doc sign`
    pub url: String,

    /// Write the contents here instead of stdout
    #[arg(long, short = 'o')]
    pub out: Option<PathBuf>,
}

pub fn run(cmd: DocCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        DocCommands::Upload(args) => run_upload(args, global),
        DocCommands::List(args) => run_list(args, global),
        DocCommands::Download(args) => run_download(args, global),
        DocCommands::Rm(args) => run_rm(args, global),
        DocCommands::Sign(args) => run_sign(args, global),
        DocCommands::Open(args) => run_open(args, global),
        DocCommands::Verify => run_verify(global),
    }
}

fn run_upload(args: UploadArgs, global: &GlobalOpts) -> Result<()> {
    let mut ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().create(Module::Documents))?;
    let storage = Storage::open(&ctx.workspace)?;
    let doc = storage.upload(
        &mut ctx.db,
        &auth.company_id,
        args.bucket,
        &args.file,
        args.path.as_deref(),
        &auth.user_id,
    )?;
    if ctx.quiet() {
        println!("{}", doc.path);
    } else {
        success(
            false,
            format!(
                "Uploaded {}/{} ({} bytes)",
                doc.bucket,
                style(&doc.path).cyan(),
                doc.size
            ),
        );
    }
    Ok(())
}

fn run_list(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().view(Module::Documents))?;
    let docs = ctx
        .db
        .list_documents(&auth.company_id, args.bucket, args.prefix.as_deref())?;

    let mut listing = Listing::new("document", &["BUCKET", "PATH", "SIZE", "SHA256", "UPLOADED"]);
    for d in &docs {
        listing.push(
            d.path.clone(),
            vec![
                d.bucket.to_string(),
                d.path.clone(),
                d.size.to_string(),
                d.sha256.chars().take(12).collect(),
                d.created.format("%Y-%m-%d %H:%M").to_string(),
            ],
        );
    }
    print_list(&docs, &listing, ctx.format(), ctx.quiet())
}

fn run_download(args: DownloadArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().view(Module::Documents))?;
    let storage = Storage::open(&ctx.workspace)?;

    let dest = match args.out {
        Some(path) => path,
        None => {
            let doc = ctx
                .db
                .get_document(&auth.company_id, args.object.bucket, &args.object.path)?;
            PathBuf::from(doc.name)
        }
    };
    let doc = storage.download(
        &ctx.db,
        &auth.company_id,
        args.object.bucket,
        &args.object.path,
        &dest,
    )?;
    success(
        ctx.quiet(),
        format!("Downloaded {}/{} to {}", doc.bucket, doc.path, dest.display()),
    );
    Ok(())
}

fn run_rm(args: RmArgs, global: &GlobalOpts) -> Result<()> {
    let mut ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().delete(Module::Documents))?;
    let storage = Storage::open(&ctx.workspace)?;

    if !args.yes && !ctx.quiet() {
        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!(
                "Delete {}/{}?",
                args.object.bucket, args.object.path
            ))
            .default(false)
            .interact()
            .into_diagnostic()?;
        if !confirmed {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let doc = storage.remove(
        &mut ctx.db,
        &auth.company_id,
        args.object.bucket,
        &args.object.path,
    )?;
    success(ctx.quiet(), format!("Deleted {}/{}", doc.bucket, doc.path));
    Ok(())
}

fn run_sign(args: SignArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().view(Module::Documents))?;
    let storage = Storage::open(&ctx.workspace)?;

    // the object must exist before a URL is handed out
    ctx.db
        .get_document(&auth.company_id, args.object.bucket, &args.object.path)?;
    let ttl = args.ttl.unwrap_or_else(|| ctx.config.preview_ttl_secs());
    let url = storage.sign_url(
        args.object.bucket,
        &auth.company_id,
        &args.object.path,
        ttl,
        chrono::Utc::now().timestamp(),
    )?;
    println!("{}", url);
    Ok(())
}

fn run_open(args: OpenArgs, global: &GlobalOpts) -> Result<()> {
    let ctx = Context::open(global)?;
    let storage = Storage::open(&ctx.workspace)?;
    let object = storage.verify_url(&args.url, chrono::Utc::now().timestamp())?;
    let (doc, bytes) = storage.read(&ctx.db, &object.company_id, object.bucket, &object.path)?;
    tracing::debug!(path = %doc.path, expires = object.expires, "preview URL opened");

    match args.out {
        Some(path) => {
            std::fs::write(&path, &bytes).into_diagnostic()?;
            success(
                ctx.quiet(),
                format!("Wrote {} to {}", doc.name, path.display()),
            );
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&bytes).into_diagnostic()?;
            stdout.flush().into_diagnostic()?;
        }
    }
    Ok(())
}

fn run_verify(global: &GlobalOpts) -> Result<()> {
    let ctx = Context::open(global)?;
    let auth = ctx.authorize(Requirements::new().view(Module::Documents))?;
    let storage = Storage::open(&ctx.workspace)?;
    let issues = storage.verify(&ctx.db, &auth.company_id)?;

    if issues.is_empty() {
        success(ctx.quiet(), "All stored documents match their checksums");
        return Ok(());
    }
    for issue in &issues {
        println!("{} {}", style("✗").red(), issue);
    }
    Err(miette::miette!(
        help = "re-upload corrupt files or remove their records with `iw doc rm`",
        "{} storage issue(s) found",
        issues.len()
    ))
}
