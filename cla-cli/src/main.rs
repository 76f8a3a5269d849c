use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use cla_core::settings::{
    parse_organizations, DEFAULT_AGREEMENT_REPOSITORY, DEFAULT_STATUS_CONTEXT,
    DEFAULT_TARGET_URL, DEFAULT_TITLE_PREFIX,
};
use cla_core::{
    CommitState, Engine, EngineConfig, PullRequestRef, RateWindow, RepoId, Settings,
    DEFAULT_API_URL,
};
use tracing::Level;

/// cla: run contributor agreement checks by hand
#[derive(Parser, Debug)]
#[command(name = "cla")]
#[command(about = "Run contributor agreement checks by hand", long_about = None)]
struct Cli {
    #[command(flatten)]
    github: GitHubArgs,

    /// Log every API call
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check one commit and write its status
    Verify(VerifyArgs),
    /// Re-check every open pull request by a user
    Reverify(ReverifyArgs),
}

#[derive(Args, Debug)]
struct GitHubArgs {
    /// GitHub access token
    #[arg(long, env = "GITHUB_ACCESS_TOKEN", hide_env_values = true)]
    token: String,

    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Calls allowed per hour
    #[arg(long, env = "GITHUB_RATE_LIMIT", default_value_t = 5000)]
    rate_limit: usize,

    /// Comma separated organizations covered by the agreement
    #[arg(long, env = "CLA_USERS", default_value = "mulesoft, mulesoft-labs, mulesoft-consulting")]
    organizations: String,

    /// Repository holding agreement issues, as owner/name
    #[arg(long, env = "CLA_REPOSITORY", default_value = DEFAULT_AGREEMENT_REPOSITORY)]
    agreement_repo: RepoId,

    #[arg(long, env = "CLA_TITLE_PREFIX", default_value = DEFAULT_TITLE_PREFIX)]
    title_prefix: String,

    #[arg(long, env = "TARGET_URL", default_value = DEFAULT_TARGET_URL)]
    target_url: String,

    #[arg(long, env = "STATUS_CONTEXT", default_value = DEFAULT_STATUS_CONTEXT)]
    status_context: String,
}

#[derive(Parser, Debug)]
struct VerifyArgs {
    /// Base repository, as owner/name
    repo: RepoId,

    /// Head commit of the pull request
    sha: String,

    /// Login of the pull request author
    username: String,
}

#[derive(Parser, Debug)]
struct ReverifyArgs {
    /// Login whose open pull requests are checked again
    username: String,
}

impl GitHubArgs {
    fn engine(self) -> Result<Engine> {
        let organizations = parse_organizations(&self.organizations);
        if organizations.is_empty() {
            return Err(anyhow!("At least one organization must be covered"));
        }

        Engine::new(EngineConfig {
            api_url: self.api_url,
            token: self.token,
            rate_window: RateWindow::per_hour(self.rate_limit),
            settings: Settings {
                agreement_repo: self.agreement_repo,
                organizations,
                title_prefix: self.title_prefix,
                target_url: self.target_url,
                status_context: self.status_context,
            },
            recording_logger: None,
        })
        .context("Failed to set up the GitHub client")
    }
}

async fn run_verify(engine: &Engine, args: VerifyArgs) -> Result<()> {
    let pr = PullRequestRef {
        owner: args.repo.owner,
        repo: args.repo.name,
        sha: args.sha,
        author: args.username,
    };

    let state = engine.verifier.review(&pr).await;
    println!("{} {}", pr.target(), state);

    if state == CommitState::Error {
        return Err(anyhow!("Agreement check for {} could not complete", pr.target()));
    }
    Ok(())
}

async fn run_reverify(engine: &Engine, args: ReverifyArgs) -> Result<()> {
    let summary = engine.bulk.reverify_all(&args.username).await;

    for (pr, state) in &summary.outcomes {
        println!("{} {}", pr.target(), state);
    }
    eprintln!(
        "Pages: {}, reviewed: {}, failed: {}",
        summary.pages,
        summary.reviewed(),
        summary.failed
    );

    match summary.error {
        Some(e) => Err(anyhow!("Search for {}'s pull requests stopped: {}", args.username, e)),
        None => Ok(()),
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let engine = cli.github.engine()?;

    match cli.command {
        Commands::Verify(args) => run_verify(&engine, args).await,
        Commands::Reverify(args) => run_reverify(&engine, args).await,
    }
}
