//! # welnav CLI entry point
//!
//! Every case, linkage and search operation as a subcommand. Results are
//! printed to stdout as JSON; logs go to stderr. Failures print one JSON
//! line `{"error": ..., "kind": ...}` to stderr and exit non-zero.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::{CommandFactory, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use welnav_core::case::PlanStep;
use welnav_core::config::CONFIG_FILE;
use welnav_core::department::DEPARTMENTS;
use welnav_core::{
    CaseStatus, ExecutionStatus, LinkageAction, LinkageDraft, LinkageType, WelnavConfig, WelnavError,
};
use welnav_search::{ContextOpts, KnowledgeBase};
use welnav_store::CaseStore;
use welnav_workflow::{ApplicationInput, ExtractiveSummarizer, OutboxNotifier, Workflow};

/// Outbox file the default notifier appends to, inside the data directory.
const OUTBOX_FILE: &str = "outbox.jsonl";

/// Welfare navigation backend: cases, linkage approvals, relevance search.
#[derive(Parser, Debug)]
#[command(name = "welnav", version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging. Repeat for more (-v, -vv). `RUST_LOG` wins.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to configuration file.
    #[arg(long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default config file and create the data directory.
    Init {
        /// Overwrite an existing config file.
        #[arg(long)]
        force: bool,
    },

    /// Accept a citizen's application as a new case.
    Apply(ApplyArgs),

    /// Case operations.
    #[command(subcommand)]
    Case(CaseCommand),

    /// Linkage (referral / collaboration) operations.
    #[command(subcommand)]
    Linkage(LinkageCommand),

    /// Dashboard approval queues.
    Queue {
        #[arg(value_enum)]
        which: Queue,
    },

    /// Referral lineage of a case.
    Chain { case_id: String },

    /// Rank knowledge-base services against a free-text query.
    #[command(alias = "s")]
    Search(SearchArgs),

    /// Case and linkage counters.
    Stats,

    /// Backfill linkages from legacy collaboration/referral data.
    Migrate,

    /// List coordinating departments.
    Departments,

    /// Print shell completions.
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(clap::Args, Debug)]
struct ApplyArgs {
    #[arg(long)]
    service: String,
    #[arg(long)]
    name: String,
    #[arg(long)]
    phone: String,
    /// Department id hint (see `welnav departments`).
    #[arg(long)]
    department: Option<String>,
    #[arg(long)]
    note: Option<String>,
    /// Why the service was recommended.
    #[arg(long)]
    rationale: Option<String>,
    /// Counseling transcript to summarize onto the case.
    #[arg(long)]
    transcript: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum CaseCommand {
    /// Every case, newest first.
    List,
    Show { case_id: String },
    /// Move a case forward: open → confirmed → contacted → connected → closed.
    Status { case_id: String, status: CaseStatus },
    Note {
        case_id: String,
        #[arg(long)]
        text: String,
        #[arg(long, default_value = "")]
        author: String,
    },
    /// Replace the service plan. Steps are `title` or `title@department`.
    Plan {
        case_id: String,
        #[arg(long = "step", required = true)]
        steps: Vec<String>,
    },
    Assign { case_id: String, department: String },
}

#[derive(Subcommand, Debug)]
enum LinkageCommand {
    /// Submit a referral or collaboration on a case.
    Create(CreateLinkageArgs),
    Show { linkage_id: String },
    DeptApprove(TransitionArgs),
    DeptReject(TransitionArgs),
    DeptRevise(TransitionArgs),
    AdminApprove(TransitionArgs),
    AdminReject(TransitionArgs),
    AdminRevise(TransitionArgs),
    Resubmit(TransitionArgs),
    Note {
        linkage_id: String,
        #[arg(long)]
        text: String,
        #[arg(long, default_value = "")]
        author: String,
    },
    /// Advance the operational status of an approved linkage.
    Exec {
        linkage_id: String,
        status: ExecutionStatus,
    },
}

#[derive(clap::Args, Debug)]
struct CreateLinkageArgs {
    case_id: String,
    /// consultation | joint | transfer | service_referral
    #[arg(long = "type")]
    kind: LinkageType,
    #[arg(long)]
    reason: String,
    #[arg(long)]
    from: Option<String>,
    #[arg(long)]
    to: Option<String>,
    /// Target service (referrals).
    #[arg(long)]
    target: Option<String>,
    #[arg(long)]
    comment: Option<String>,
    #[arg(long)]
    sequence: Option<u32>,
    #[arg(long)]
    depends_on: Option<String>,
}

#[derive(clap::Args, Debug)]
struct TransitionArgs {
    linkage_id: String,
    #[arg(long)]
    comment: Option<String>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum Queue {
    /// Awaiting the department coordinator.
    Dept,
    /// Awaiting the administrator.
    Admin,
    /// Bounced back to the department.
    Returned,
}

#[derive(clap::Args, Debug)]
struct SearchArgs {
    #[arg(required = true)]
    query: Vec<String>,
    /// Print the assembled prompt context instead of JSON.
    #[arg(long)]
    context: bool,
    /// Include the extracted query terms in the output.
    #[arg(long)]
    explain: bool,
    /// Knowledge-base file; defaults to the configured one.
    #[arg(long)]
    kb: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match cli.verbose {
        0 => EnvFilter::new("info"),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let (kind, code) = classify(&e);
            let line = serde_json::json!({ "error": format!("{e:#}"), "kind": kind });
            eprintln!("{line}");
            ExitCode::from(code)
        }
    }
}

/// Error kind and exit code: 2 for not found, 3 for a rejected transition,
/// 4 for invalid input, 1 otherwise.
fn classify(e: &anyhow::Error) -> (&'static str, u8) {
    match e.downcast_ref::<WelnavError>() {
        Some(WelnavError::NotFound { .. }) => ("not_found", 2),
        Some(WelnavError::Transition(_)) => ("invalid_state", 3),
        Some(WelnavError::Validation(_)) => ("validation", 4),
        _ => ("error", 1),
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config;
    let config = || -> anyhow::Result<WelnavConfig> {
        let config = load_config(&config_path)?;
        tracing::debug!(data_dir = %config.data_dir.display(), "configuration loaded");
        Ok(config)
    };

    match cli.command {
        Commands::Init { force } => init(&config_path, force),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "welnav", &mut std::io::stdout());
            Ok(())
        }
        Commands::Departments => print_json(&DEPARTMENTS),
        Commands::Search(args) => search(&config()?, args),
        Commands::Apply(args) => apply(&workflow(config()?)?, args),
        Commands::Case(cmd) => case(&workflow(config()?)?, cmd),
        Commands::Linkage(cmd) => linkage(&workflow(config()?)?, cmd),
        Commands::Queue { which } => {
            let wf = workflow(config()?)?;
            let views = match which {
                Queue::Dept => wf.pending_for_department()?,
                Queue::Admin => wf.pending_for_admin()?,
                Queue::Returned => wf.returned_to_department()?,
            };
            print_json(&views)
        }
        Commands::Chain { case_id } => print_json(&workflow(config()?)?.referral_chain(&case_id)?),
        Commands::Stats => print_json(&workflow(config()?)?.stats()?),
        Commands::Migrate => print_json(&workflow(config()?)?.store().migrate_legacy()?),
    }
}

/// Load the config file (defaults when absent) with paths resolved against
/// its directory.
fn load_config(path: &Path) -> anyhow::Result<WelnavConfig> {
    let config = WelnavConfig::load(path)?;
    let base = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => std::env::current_dir().context("cannot resolve current directory")?,
    };
    Ok(config.resolved_against(&base))
}

fn init(config_path: &Path, force: bool) -> anyhow::Result<()> {
    if config_path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }
    let defaults = WelnavConfig::default();
    std::fs::write(config_path, defaults.to_toml()?)
        .with_context(|| format!("writing {}", config_path.display()))?;
    let resolved = load_config(config_path)?;
    std::fs::create_dir_all(&resolved.data_dir)
        .with_context(|| format!("creating {}", resolved.data_dir.display()))?;
    tracing::info!(config = %config_path.display(), "initialized welnav");
    print_json(&serde_json::json!({
        "config": config_path.display().to_string(),
        "dataDir": resolved.data_dir.display().to_string(),
    }))
}

fn workflow(config: WelnavConfig) -> anyhow::Result<Workflow> {
    let store = CaseStore::open(&config.data_dir)
        .with_context(|| format!("opening store at {}", config.data_dir.display()))?;
    let outbox = OutboxNotifier::new(&config.data_dir.join(OUTBOX_FILE));
    Ok(Workflow::new(store, Box::new(outbox), config)
        .with_summarizer(Box::new(ExtractiveSummarizer::default())))
}

fn apply(wf: &Workflow, args: ApplyArgs) -> anyhow::Result<()> {
    let transcript = args
        .transcript
        .as_deref()
        .map(|p| std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display())))
        .transpose()?;
    let intake = wf.submit_application(
        ApplicationInput {
            service: args.service,
            applicant_name: args.name,
            applicant_phone: args.phone,
            assigned_department: args.department,
            note: args.note,
            rationale: args.rationale,
        },
        transcript.as_deref(),
    )?;
    print_json(&intake)
}

fn case(wf: &Workflow, cmd: CaseCommand) -> anyhow::Result<()> {
    match cmd {
        CaseCommand::List => print_json(&wf.store().list_all()?),
        CaseCommand::Show { case_id } => {
            let case = wf
                .store()
                .find_by_id(&case_id)?
                .ok_or_else(|| WelnavError::case_not_found(&case_id))?;
            print_json(&case)
        }
        CaseCommand::Status { case_id, status } => {
            print_json(&wf.update_case_status(&case_id, status)?)
        }
        CaseCommand::Note {
            case_id,
            text,
            author,
        } => print_json(&wf.add_case_note(&case_id, &author, &text)?),
        CaseCommand::Plan { case_id, steps } => {
            let steps = steps.iter().map(|s| parse_step(s)).collect();
            print_json(&wf.set_service_plan(&case_id, steps)?)
        }
        CaseCommand::Assign {
            case_id,
            department,
        } => print_json(&wf.assign_department(&case_id, &department)?),
    }
}

fn parse_step(raw: &str) -> PlanStep {
    let (title, department) = match raw.rsplit_once('@') {
        Some((title, dept)) if !dept.trim().is_empty() => (title, Some(dept.trim().to_string())),
        _ => (raw, None),
    };
    PlanStep {
        title: title.trim().to_string(),
        description: None,
        department,
        done: false,
    }
}

fn linkage(wf: &Workflow, cmd: LinkageCommand) -> anyhow::Result<()> {
    let (action, args) = match cmd {
        LinkageCommand::Create(args) => {
            let draft = LinkageDraft {
                kind: Some(args.kind),
                from_dept: args.from,
                to_dept: args.to,
                target_service: args.target,
                reason: args.reason,
                sequence: args.sequence,
                depends_on: args.depends_on,
            };
            return print_json(&wf.create_linkage(&args.case_id, draft, args.comment)?);
        }
        LinkageCommand::Show { linkage_id } => {
            let view = wf
                .find_linkage(&linkage_id)?
                .ok_or_else(|| WelnavError::linkage_not_found(&linkage_id))?;
            return print_json(&view);
        }
        LinkageCommand::Note {
            linkage_id,
            text,
            author,
        } => return print_json(&wf.add_linkage_note(&linkage_id, &author, &text)?),
        LinkageCommand::Exec { linkage_id, status } => {
            return print_json(&wf.update_execution_status(&linkage_id, status)?);
        }
        LinkageCommand::DeptApprove(args) => (LinkageAction::DeptApproved, args),
        LinkageCommand::DeptReject(args) => (LinkageAction::Rejected, args),
        LinkageCommand::DeptRevise(args) => (LinkageAction::RevisionRequested, args),
        LinkageCommand::AdminApprove(args) => (LinkageAction::Approved, args),
        LinkageCommand::AdminReject(args) => (LinkageAction::AdminRejected, args),
        LinkageCommand::AdminRevise(args) => (LinkageAction::AdminRevisionRequested, args),
        LinkageCommand::Resubmit(args) => (LinkageAction::DeptResubmitted, args),
    };
    print_json(&wf.transition(&args.linkage_id, action, args.comment)?)
}

fn search(config: &WelnavConfig, args: SearchArgs) -> anyhow::Result<()> {
    let path = args.kb.unwrap_or_else(|| config.knowledge_base.clone());
    let kb = KnowledgeBase::from_json_path(&path)
        .with_context(|| format!("loading knowledge base {}", path.display()))?;
    let query = args.query.join(" ");
    let hits = kb.search(&query);

    if args.context {
        println!("{}", welnav_search::assemble(&hits, &ContextOpts::default()));
        return Ok(());
    }
    if args.explain {
        return print_json(&serde_json::json!({
            "terms": welnav_search::extract(&query),
            "results": hits,
        }));
    }
    print_json(&hits)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
