//! ai-approver - command line for reviewing ApprovalTasks

use ai_approver::{DirResolver, FileTaskStore};
use anyhow::{bail, Context};
use approver_agent::{AgentConfig, LlmAnalyzer};
use approver_core::{ApprovalTask, ApproverConfig};
use approver_engine::{
    parse_decision, prompt, reconcile_with_store, Analyzer, ContextResolver, DriveOutcome, Gate,
    NoContext, Reconciliation, ReplayAnalyzer,
};
use approver_tools::create_policy_registry;
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_CONFIG_PATH: &str = "ai-approver.toml";
const DEFAULT_LOG_FILTER: &str =
    "ai_approver=info,approver_engine=info,approver_agent=info,approver_tools=info";

#[derive(Parser)]
#[command(
    name = "ai-approver",
    version,
    about = "Automated reviewer for Tekton ApprovalTasks"
)]
struct Cli {
    /// Config file (missing file means defaults)
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Review one ApprovalTask and write the decision back to its file
    Reconcile {
        /// ApprovalTask JSON file
        #[arg(short, long)]
        task: PathBuf,
        /// Directory of PipelineRun JSON documents
        #[arg(long)]
        runs: Option<PathBuf>,
        /// Print the patch without writing it
        #[arg(long)]
        dry_run: bool,
        /// Replay a recorded analyzer response instead of calling the model
        #[arg(long)]
        response: Option<PathBuf>,
    },
    /// Print the analysis request that would be sent for a task
    Prompt {
        #[arg(short, long)]
        task: PathBuf,
        #[arg(long)]
        runs: Option<PathBuf>,
    },
    /// Parse analyzer output (stdin by default) into a decision
    Parse {
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Print the default configuration as TOML
    Config,
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

fn load_config(path: &Path) -> anyhow::Result<ApproverConfig> {
    let mut config = ApproverConfig::load(path)
        .with_context(|| format!("failed to load config {}", path.display()))?;
    config.apply_env();
    prompt::validate(&config.prompt).context("invalid prompt template")?;
    Ok(config)
}

fn read_task(path: &Path) -> anyhow::Result<ApprovalTask> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read task {}", path.display()))?;
    ApprovalTask::from_json(&content)
        .with_context(|| format!("invalid ApprovalTask in {}", path.display()))
}

fn resolver(runs: Option<PathBuf>) -> Box<dyn ContextResolver> {
    match runs {
        Some(dir) => Box::new(DirResolver::new(dir)),
        None => Box::new(NoContext),
    }
}

fn capability_names(config: &ApproverConfig) -> Vec<String> {
    create_policy_registry(&config.tools)
        .list()
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn analyzer(config: &ApproverConfig, response: Option<PathBuf>) -> anyhow::Result<Box<dyn Analyzer>> {
    if let Some(path) = response {
        let recorded = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read response {}", path.display()))?;
        info!("Replaying recorded response from {}", path.display());
        return Ok(Box::new(
            ReplayAnalyzer::new(recorded).with_capabilities(capability_names(config)),
        ));
    }

    let Some(api_key) = config.model.api_key.as_deref() else {
        bail!("no API key configured: set API_KEY or model.api_key");
    };
    let analyzer = LlmAnalyzer::new(
        api_key,
        config.model.base_url.as_deref(),
        create_policy_registry(&config.tools),
        AgentConfig::from(&config.model),
    );

    let cancel = analyzer.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling analysis");
            cancel.cancel();
        }
    });

    info!(
        "Using model {} with tools [{}]",
        config.model.name,
        analyzer.advertise_capabilities().join(", ")
    );
    Ok(Box::new(analyzer))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match cli.command {
        Commands::Reconcile {
            task: task_path,
            runs,
            dry_run,
            response,
        } => {
            let config = load_config(&cli.config)?;
            let task = read_task(&task_path)?;
            let resolver = resolver(runs);
            let analyzer = analyzer(&config, response)?;
            let gate = Gate::new(Arc::new(config));

            if dry_run {
                match gate.reconcile(&task, resolver.as_ref(), analyzer.as_ref()).await {
                    Reconciliation::Skip(reason) => println!("skipped: {}", reason),
                    Reconciliation::Patch { patch, .. } => println!("{}", patch.to_json_pretty()?),
                }
                return Ok(());
            }

            let store = FileTaskStore::new(&task_path);
            let outcome = reconcile_with_store(
                &gate,
                &store,
                task.namespace(),
                task.name(),
                resolver.as_ref(),
                analyzer.as_ref(),
            )
            .await?;
            match outcome {
                DriveOutcome::Skipped(reason) => println!("skipped: {}", reason),
                DriveOutcome::Applied {
                    decision, attempts, ..
                } => {
                    info!("Wrote {} after {} attempt(s)", store.path().display(), attempts);
                    println!("{}", serde_json::to_string_pretty(&decision)?);
                }
            }
        }

        Commands::Prompt {
            task: task_path,
            runs,
        } => {
            let config = load_config(&cli.config)?;
            let task = read_task(&task_path)?;
            let capabilities = capability_names(&config);
            let gate = Gate::new(Arc::new(config));
            let request = gate
                .compile_request(&task, resolver(runs).as_ref(), capabilities)
                .await?;
            println!("{}", request);
        }

        Commands::Parse { file } => {
            let text = match file {
                Some(path) => std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf
                }
            };
            println!("{}", serde_json::to_string_pretty(&parse_decision(&text))?);
        }

        Commands::Config => {
            print!("{}", ApproverConfig::default().to_toml()?);
        }
    }

    Ok(())
}
