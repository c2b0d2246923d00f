//! m2cache CLI - a Maven repository cache

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod error;
mod exit_codes;

use commands::Target;

#[derive(Parser)]
#[command(name = "m2cache")]
#[command(author = "m2cache Contributors")]
#[command(version)]
#[command(about = "A Maven repository cache with checksum-verified transfers", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Repository from repositories.yaml (default: the first one, ignored with --url)
    #[arg(long, global = true)]
    repo: Option<String>,

    /// Remote repository URL, bypassing repositories.yaml
    #[arg(long, global = true, env = "M2CACHE_URL")]
    url: Option<String>,

    /// Local repository root (default: ~/.m2/repository), also stored by `repo add`
    #[arg(long, global = true)]
    local: Option<PathBuf>,

    /// Path to repositories.yaml
    #[arg(long, global = true, env = "M2CACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the local path of an archive, fetching it if needed
    Get {
        /// groupId:artifactId[:extension[:classifier]]:version
        coordinate: String,
    },

    /// List the released versions of a program
    Versions {
        /// groupId:artifactId
        program: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the archives of the current build of a SNAPSHOT
    Snapshots {
        /// groupId:artifactId:version
        revision: String,
    },

    /// Publish files as the archives of a revision
    Release {
        /// groupId:artifactId:version
        revision: String,

        /// Files named artifact-version[-classifier].extension
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Replace an existing release
        #[arg(long)]
        force: bool,

        /// Only install into the local repository
        #[arg(long)]
        local_only: bool,
    },

    /// Print the local revisions whenever the local repository changes
    Watch,

    /// Manage repositories
    Repo {
        #[command(subcommand)]
        command: RepoCommands,
    },
}

#[derive(Subcommand)]
enum RepoCommands {
    /// Add a repository
    Add {
        /// Repository name
        name: String,

        /// Repository URL
        #[arg(value_name = "URL")]
        remote: String,

        /// Username for basic authentication
        #[arg(long, requires = "password")]
        username: Option<String>,

        /// Password for basic authentication
        #[arg(long, requires = "username")]
        password: Option<String>,

        /// Bearer token
        #[arg(long, conflicts_with_all = ["username", "password"])]
        token: Option<String>,
    },

    /// List repositories
    List,

    /// Remove a repository
    Remove {
        /// Repository name
        name: String,
    },
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    let target = Target {
        repo: cli.repo,
        url: cli.url,
        local: cli.local,
        config: cli.config,
    };

    let result = match cli.command {
        Commands::Get { coordinate } => commands::get::run(&target, &coordinate).await,

        Commands::Versions { program, json } => {
            commands::versions::run(&target, &program, json).await
        }

        Commands::Snapshots { revision } => commands::snapshots::run(&target, &revision).await,

        Commands::Release {
            revision,
            files,
            force,
            local_only,
        } => commands::release::run(&target, &revision, &files, force, local_only).await,

        Commands::Watch => commands::watch::run(&target).await,

        Commands::Repo { command } => match command {
            RepoCommands::Add {
                name,
                remote,
                username,
                password,
                token,
            } => commands::repo::add(
                &target,
                &name,
                &remote,
                target.local.clone(),
                username.as_deref(),
                password.as_deref(),
                token.as_deref(),
            ),
            RepoCommands::List => commands::repo::list(&target),
            RepoCommands::Remove { name } => commands::repo::remove(&target, &name),
        },
    };

    if let Err(err) = result {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}
