use clap::Parser;
use ironworks::cli::commands;
use ironworks::cli::{Cli, Commands, GlobalOpts};
use miette::Result;
use tracing_subscriber::EnvFilter;

/// Log to stderr. `IW_LOG` takes a full filter; otherwise `--verbose` turns on debug.
fn init_logging(global: &GlobalOpts) {
    let filter = EnvFilter::try_from_env("IW_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if global.verbose { "ironworks=debug" } else { "warn" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    // Reset SIGPIPE to default behavior (terminate silently) for proper Unix piping.
    // Without this, piping to `head`, `grep -q`, etc. causes a panic on broken pipe.
    #[cfg(unix)]
    {
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_DFL);
        }
    }
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    let global = cli.global;
    init_logging(&global);

    match cli.command {
        Commands::Init(args) => commands::init::run(args, &global),
        Commands::Company(cmd) => commands::company::run(cmd, &global),
        Commands::User(cmd) => commands::user::run(cmd, &global),
        Commands::Part(cmd) => commands::part::run(cmd, &global),
        Commands::Cust(cmd) => commands::cust::run(cmd, &global),
        Commands::Sup(cmd) => commands::sup::run(cmd, &global),
        Commands::Quote(cmd) => commands::quote::run(cmd, &global),
        Commands::So(cmd) => commands::so::run(cmd, &global),
        Commands::Po(cmd) => commands::po::run(cmd, &global),
        Commands::Inv(cmd) => commands::inv::run(cmd, &global),
        Commands::Acct(cmd) => commands::acct::run(cmd, &global),
        Commands::Seq(cmd) => commands::seq::run(cmd, &global),
        Commands::Doc(cmd) => commands::doc::run(cmd, &global),
        Commands::Job(cmd) => commands::job::run(cmd, &global),
        Commands::Watch(args) => commands::watch::run(args, &global),
        Commands::Import(cmd) => commands::import::run(cmd, &global),
        Commands::Config(cmd) => commands::config::run(cmd, &global),
        Commands::Completions(args) => commands::completions::run(args),
    }
}
