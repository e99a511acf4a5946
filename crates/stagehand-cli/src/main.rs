//! Stagehand - build/test orchestration over pluggable engines
//!
//! ## Commands
//!
//! - `create`: Create a test environment for a stage
//! - `delete`: Tear down a test environment
//! - `outcome`: Record whether tests against an environment passed
//! - `build`: Run configured builds and record their artifacts
//! - `list`: Show recorded test environments
//!
//! With `--mcp`, `create` and `delete` are served as engine tools over
//! stdin/stdout instead.

mod serve;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use stagehand_core::{
    ArtifactStore, BuildCoordinator, EngineCaller, ProcessEngineCaller, ProjectConfig,
    StageOrchestrator, StepStatus, DEFAULT_CONFIG_FILE,
};
use stagehand_engine::{ClientConfig, EngineClient, Resolver, ServerInfo};
use stagehand_store::FsArtifactStore;
use tokio::io::BufReader;
use tracing::{info, Level};

use crate::serve::StageTools;

#[derive(Parser)]
#[command(name = "stagehand")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build and test orchestration over pluggable engines", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Project configuration file
    #[arg(short, long, global = true, env = "STAGEHAND_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Serve create/delete as engine tools on stdin/stdout
    #[arg(long)]
    mcp: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a test environment for a stage
    Create {
        /// Stage name from the `test:` section
        stage: String,
    },

    /// Tear down a test environment
    Delete {
        /// Test ID printed by `create`
        test_id: String,
    },

    /// Record whether tests against a test environment passed
    Outcome {
        /// Test ID printed by `create`
        test_id: String,

        /// The tests passed
        #[arg(long, conflicts_with = "failed", required_unless_present = "failed")]
        passed: bool,

        /// The tests failed
        #[arg(long)]
        failed: bool,
    },

    /// Run configured builds
    Build {
        /// Only build the spec with this name
        name: Option<String>,
    },

    /// List recorded test environments
    List {
        /// Only show environments of this stage
        #[arg(long)]
        stage: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    stagehand_core::init_tracing(cli.json, level);

    let config = ProjectConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;
    // Repository lookups shell out to git; keep them off the async call path.
    let resolver = tokio::task::spawn_blocking(Resolver::discover)
        .await
        .context("Repository lookup task failed")?;
    let (caller, store) = wire(&config, resolver);

    if cli.mcp {
        return cmd_serve(&config, caller, store).await;
    }

    match cli.command {
        Some(Commands::Create { stage }) => cmd_create(&config, caller, store, &stage).await,
        Some(Commands::Delete { test_id }) => cmd_delete(&config, caller, store, &test_id).await,
        Some(Commands::Outcome { test_id, passed, .. }) => {
            cmd_outcome(&config, caller, store, &test_id, passed).await
        }
        Some(Commands::Build { name }) => cmd_build(&config, caller, store, name.as_deref()).await,
        Some(Commands::List { stage }) => cmd_list(&config, caller, store, stage.as_deref()).await,
        None => bail!("no command given; run `stagehand --help` or pass --mcp"),
    }
}

fn wire(
    config: &ProjectConfig,
    resolver: Resolver,
) -> (Arc<dyn EngineCaller>, Arc<dyn ArtifactStore>) {
    let caller = ProcessEngineCaller::new(
        Arc::new(resolver),
        EngineClient::new(client_config(config)),
    );
    let store = FsArtifactStore::new(config.store_path());
    (Arc::new(caller), Arc::new(store))
}

fn client_config(config: &ProjectConfig) -> ClientConfig {
    ClientConfig {
        call_timeout: config.engine_timeout(),
        handshake_timeout: config.handshake_timeout(),
        ..ClientConfig::default()
    }
}

async fn cmd_serve(
    config: &ProjectConfig,
    caller: Arc<dyn EngineCaller>,
    store: Arc<dyn ArtifactStore>,
) -> Result<()> {
    let orchestrator = Arc::new(StageOrchestrator::new(config, caller, store));
    let tools = StageTools::new(orchestrator);
    let info = ServerInfo::new("stagehand", env!("CARGO_PKG_VERSION"));

    info!(project = %config.name, "serving stage tools on stdio");
    stagehand_engine::serve(
        &tools,
        &info,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await
    .context("RPC server failed")
}

async fn cmd_create(
    config: &ProjectConfig,
    caller: Arc<dyn EngineCaller>,
    store: Arc<dyn ArtifactStore>,
    stage: &str,
) -> Result<()> {
    let orchestrator = StageOrchestrator::new(config, caller, store);
    let env = orchestrator
        .create(stage)
        .await
        .with_context(|| format!("Failed to create test environment for stage '{stage}'"))?;

    println!("Created test environment {}", env.id);
    println!("Stage:   {}", env.name);
    println!("Tmp dir: {}", env.tmp_dir.display());
    for (key, value) in &env.metadata {
        println!("  {key} = {value}");
    }
    Ok(())
}

async fn cmd_delete(
    config: &ProjectConfig,
    caller: Arc<dyn EngineCaller>,
    store: Arc<dyn ArtifactStore>,
    test_id: &str,
) -> Result<()> {
    let orchestrator = StageOrchestrator::new(config, caller, store);
    let report = orchestrator
        .delete(test_id)
        .await
        .with_context(|| format!("Failed to delete test environment '{test_id}'"))?;

    println!("Deleted test environment {}", report.test_id);
    for step in report.failures() {
        if let StepStatus::Failed(error) = &step.status {
            println!("  incomplete: {} ({error})", step.step);
        }
    }
    Ok(())
}

async fn cmd_outcome(
    config: &ProjectConfig,
    caller: Arc<dyn EngineCaller>,
    store: Arc<dyn ArtifactStore>,
    test_id: &str,
    passed: bool,
) -> Result<()> {
    let orchestrator = StageOrchestrator::new(config, caller, store);
    let env = orchestrator
        .record_outcome(test_id, passed)
        .await
        .with_context(|| format!("Failed to record outcome for '{test_id}'"))?;

    println!("{} marked {}", env.id, env.status.as_str());
    Ok(())
}

async fn cmd_build(
    config: &ProjectConfig,
    caller: Arc<dyn EngineCaller>,
    store: Arc<dyn ArtifactStore>,
    name: Option<&str>,
) -> Result<()> {
    let coordinator = BuildCoordinator::new(config, caller, store);
    let artifacts = coordinator.build(name).await.context("Build failed")?;

    println!("Built {} artifact(s)", artifacts.len());
    for artifact in &artifacts {
        println!("  {:<24} {:<10} {}", artifact.name, artifact.kind, artifact.location);
    }
    Ok(())
}

async fn cmd_list(
    config: &ProjectConfig,
    caller: Arc<dyn EngineCaller>,
    store: Arc<dyn ArtifactStore>,
    stage: Option<&str>,
) -> Result<()> {
    let orchestrator = StageOrchestrator::new(config, caller, store);
    let envs = orchestrator.list(stage).await?;

    if envs.is_empty() {
        println!("No test environments found.");
        return Ok(());
    }
    for env in envs {
        println!(
            "{}  {:<16} {:<8} {}",
            env.id,
            env.name,
            env.status.as_str(),
            env.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}
