mod checks;
mod config;
mod github;
mod host;
mod pr;
mod report;
mod retry;
mod search;
mod tags;

use chrono::NaiveDate;
use clap::{ArgGroup, Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, info_span};
use tracing_subscriber::EnvFilter;

use github::GitHubApi;
use host::{CommitRef, Repository, RestHost};
use pr::{CommentOutcome, MessageType};
use report::PullSummary;
use tags::TagOutcome;

/// shipgate: deployment-pipeline gate for GitHub repositories.
///
/// Decides whether a commit or PR may proceed based on its statuses and
/// check runs, and performs the release chores around that decision.
#[derive(Parser, Debug)]
#[command(name = "shipgate", version, about)]
struct Cli {
    /// Repository owner. Overrides `github.org` in .shipgate.toml.
    #[arg(long, global = true)]
    org: Option<String>,

    /// Repository name. Overrides `github.repo` in .shipgate.toml.
    #[arg(long, global = true)]
    repo: Option<String>,

    /// API token. Defaults to GITHUB_TOKEN, then GIT_TOKEN.
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decide whether the checks of a PR or commit let the pipeline proceed
    CheckTests(CheckTestsArgs),

    /// List the pull requests merged between two commits
    PrRange {
        #[arg(long)]
        base: String,
        #[arg(long)]
        head: String,
        #[arg(long)]
        out_file: Option<PathBuf>,
    },

    /// Comment on a pull request once
    MessagePr {
        #[arg(long)]
        pr_number: u64,
        /// Free-form comment body
        #[arg(long, conflicts_with = "message_type", required_unless_present = "message_type")]
        message: Option<String>,
        /// Pipeline notice: stage, stage_failed, prod, prod_failed,
        /// prod_rollback, rollback_failed, broke_vagrant, e2e_failed
        #[arg(long)]
        message_type: Option<MessageType>,
        #[arg(long, default_value = "")]
        extra_text: String,
        /// Production release date announced by stage notices (YYYY-MM-DD)
        #[arg(long)]
        deploy_date: Option<NaiveDate>,
        /// Post even if an identical comment exists
        #[arg(long)]
        force: bool,
    },

    /// Tag a commit, succeeding if the tag already points at it
    CreateTag {
        #[arg(long)]
        commit_hash: String,
        #[arg(long)]
        tag_name: String,
    },

    DeleteBranch {
        #[arg(long)]
        branch: String,
    },

    CreatePr {
        #[arg(long)]
        head: String,
        #[arg(long)]
        base: String,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        body: String,
        #[arg(long)]
        out_file: Option<PathBuf>,
    },

    /// Print the web URL comparing two commits
    DiffUrl {
        #[arg(long)]
        base: String,
        #[arg(long)]
        head: String,
    },
}

#[derive(Args, Debug)]
#[command(group(
    ArgGroup::new("target")
        .required(true)
        .args(["pr_number", "commit_hash", "input_file"])
))]
struct CheckTestsArgs {
    #[arg(long)]
    pr_number: Option<u64>,
    #[arg(long)]
    commit_hash: Option<String>,
    /// YAML file with a `pr_number` key
    #[arg(long)]
    input_file: Option<PathBuf>,

    /// Where to write the `name: "<url> <state>"` results. Defaults to stdout.
    #[arg(long)]
    out_file: Option<PathBuf>,

    /// Regex of contexts to ignore
    #[arg(long)]
    exclude_contexts: Option<String>,
    /// Regex of contexts to consider; when set, only matching contexts count
    #[arg(long)]
    include_contexts: Option<String>,
    #[arg(long)]
    min_checks: Option<usize>,
    #[arg(long)]
    fail_on_pending: Option<bool>,
    /// Consider every check, not only those the protected branch requires
    #[arg(long)]
    all_checks: Option<bool>,
    #[arg(long)]
    protected_branch: Option<String>,
}

impl CheckTestsArgs {
    fn apply(&self, checks: &mut config::ChecksConfig) {
        if let Some(pattern) = &self.exclude_contexts {
            checks.exclude_contexts = Some(pattern.clone());
        }
        if let Some(pattern) = &self.include_contexts {
            checks.include_contexts = Some(pattern.clone());
        }
        if let Some(min_checks) = self.min_checks {
            checks.min_checks = min_checks;
        }
        if let Some(fail_on_pending) = self.fail_on_pending {
            checks.fail_on_pending = fail_on_pending;
        }
        if let Some(all_checks) = self.all_checks {
            checks.all_checks = all_checks;
        }
        if let Some(branch) = &self.protected_branch {
            checks.protected_branch = branch.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!("loading configuration");
    let mut config = config::Config::load()?;
    if let Some(token) = &cli.token {
        config.github.token = Some(token.clone());
    }
    let org = cli
        .org
        .clone()
        .or_else(|| config.github.org.clone())
        .ok_or("--org is required (or set github.org in .shipgate.toml)")?;
    let repo = cli
        .repo
        .clone()
        .or_else(|| config.github.repo.clone())
        .ok_or("--repo is required (or set github.repo in .shipgate.toml)")?;

    if let Command::DiffUrl { base, head } = &cli.command {
        println!("{}", GitHubApi::get_diff_url(&org, &repo, base, head)?);
        return Ok(ExitCode::SUCCESS);
    }

    if let Command::CheckTests(args) = &cli.command {
        args.apply(&mut config.checks);
    }

    let _main_span = info_span!("shipgate", repo = %format!("{org}/{repo}")).entered();

    let token = config.github.token.clone().unwrap_or_default();
    let host = RestHost::new(
        &config.github.api_url,
        token,
        Repository::new(org, repo),
        Duration::from_secs(config.github.timeout_secs),
    )?;
    let api = GitHubApi::new(Arc::new(host), config.retry.clone(), &config.checks)?;
    debug!(repo = %api.repository().slug(), api_url = %config.github.api_url, "client ready");

    match cli.command {
        Command::CheckTests(args) => {
            let verdict = match (args.pr_number, &args.commit_hash, &args.input_file) {
                (Some(number), _, _) => api.check_combined_status_pull_request(number).await?,
                (None, Some(sha), _) => {
                    api.check_combined_status_commit(&CommitRef::from(sha.as_str()))
                        .await?
                }
                (None, None, Some(path)) => {
                    let input = report::load_input(path)?;
                    info!(pr = input.pr_number, "read PR number from input file");
                    api.check_combined_status_pull_request(input.pr_number)
                        .await?
                }
                (None, None, None) => {
                    return Err("one of --pr-number, --commit-hash or --input-file is required".into())
                }
            };
            report::write_yaml(&verdict.results, args.out_file.as_deref())?;
            report::print_verdict(&verdict);
            Ok(if verdict.passed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::PrRange { base, head, out_file } => {
            let pulls = api.get_pr_range(&base, &head).await?;
            info!(pulls = pulls.len(), "resolved PR range");
            let summaries: Vec<PullSummary> = pulls.iter().map(PullSummary::from).collect();
            report::write_yaml(&summaries, out_file.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
        Command::MessagePr {
            pr_number,
            message,
            message_type,
            extra_text,
            deploy_date,
            force,
        } => {
            let outcome = match (message_type, message) {
                (Some(message_type), _) => {
                    api.message_pr_with_type(pr_number, message_type, &extra_text, force, deploy_date)
                        .await?
                }
                (None, Some(body)) => api.message_pull_request(pr_number, &body, None, force).await?,
                (None, None) => return Err("one of --message or --message-type is required".into()),
            };
            match outcome {
                CommentOutcome::Posted(comment) => info!(comment = comment.id, "comment posted"),
                CommentOutcome::AlreadyPosted => info!("identical comment exists, nothing posted"),
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::CreateTag {
            commit_hash,
            tag_name,
        } => {
            match api.create_tag(&commit_hash, &tag_name).await? {
                TagOutcome::Created(git_ref) => info!(git_ref = %git_ref.name, "tag created"),
                TagOutcome::AlreadyPresent => info!(tag = %tag_name, "tag already in place"),
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::DeleteBranch { branch } => {
            api.delete_branch(&branch).await?;
            Ok(ExitCode::SUCCESS)
        }
        Command::CreatePr {
            head,
            base,
            title,
            body,
            out_file,
        } => {
            let pull = api.create_pull_request(&head, &base, &title, &body).await?;
            let summary = PullSummary {
                number: pull.number,
                title: pull.title,
                url: pull.html_url,
            };
            report::write_yaml(&summary, out_file.as_deref())?;
            Ok(ExitCode::SUCCESS)
        }
        Command::DiffUrl { .. } => Ok(ExitCode::SUCCESS),
    }
}
