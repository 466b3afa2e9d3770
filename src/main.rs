mod cli;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use cli::{Cli, Command};
use tracing::{info, warn};

use presswright::anthropic::AnthropicClient;
use presswright::config::PresswrightConfig;
use presswright::orchestrator::{OrchestratorSettings, PublishingOrchestrator};
use presswright::plugins::register_builtin;
use presswright::refine::{LlmJudge, RefinementEngine};
use presswright::registry::AdapterRegistry;
use presswright::research::ResearchOrchestrator;
use presswright::services::{CompletionService, HttpPageFetcher, SearxClient};
use presswright::store::JsonFileStore;
use presswright::ui::{self, RunProgress};
use presswright::validation::ValidationRules;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    presswright::logging::init(cli.verbose);

    let config = PresswrightConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::Run {
            project,
            generate_only,
        } => run(config, project, generate_only).await,
        Command::Status => status(&config).await,
        Command::ValidateConfig => validate(&config).await,
    }
}

async fn run(config: PresswrightConfig, project: Option<String>, generate_only: bool) -> Result<()> {
    if config.api_key.is_empty() {
        bail!("no API key: set ANTHROPIC_API_KEY or api_key in the config file");
    }
    let Some(search_url) = config.search_url.clone() else {
        bail!("search_url is not configured");
    };
    let timeout = config.timeout();

    let store = Arc::new(JsonFileStore::open(&config.store_path).await.with_context(|| {
        format!("failed to open store {}", config.store_path.display())
    })?);

    let llm: Arc<dyn CompletionService> = Arc::new(AnthropicClient::new(
        config.api_key.clone(),
        config.model.clone(),
        config.llm_timeout(),
    )?);
    let research = ResearchOrchestrator::new(
        Arc::clone(&llm),
        Arc::new(SearxClient::new(search_url, timeout)?),
        config.research,
        config.retry.clone(),
    )
    .with_fetcher(Arc::new(HttpPageFetcher::new(timeout)?));
    let judge = Arc::new(LlmJudge::new(Arc::clone(&llm), config.retry.clone()));
    let refiner = RefinementEngine::new(llm, judge, config.retry.clone());

    let mut registry = AdapterRegistry::new();
    register_builtin(&mut registry, timeout);

    let settings = OrchestratorSettings {
        generate_only: generate_only || config.generate_only,
        quality: config.quality,
        validation: ValidationRules::default(),
    };
    let orchestrator =
        PublishingOrchestrator::new(store, research, refiner, Arc::new(registry), settings);

    let token = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current stage");
            token.cancel();
        }
    });

    let progress = RunProgress::start("Processing due work items...");
    let report = orchestrator.run(project.as_deref()).await?;
    progress.finish(&report);
    Ok(())
}

async fn status(config: &PresswrightConfig) -> Result<()> {
    let store = JsonFileStore::open(&config.store_path).await?;
    let state = store.snapshot().await;
    ui::print_status(&state.projects, &state.status_counts());
    Ok(())
}

async fn validate(config: &PresswrightConfig) -> Result<()> {
    let store = JsonFileStore::open(&config.store_path).await?;
    let state = store.snapshot().await;

    let mut registry = AdapterRegistry::new();
    register_builtin(&mut registry, config.timeout());

    let mut problems = Vec::new();
    for project in &state.projects {
        if let Err(err) = project.validate() {
            problems.push(err.to_string());
        } else if !registry.exists(project.platform_id()) {
            problems.push(format!(
                "project '{}': no plugin registered for platform '{}'",
                project.id,
                project.platform_id()
            ));
        }
    }

    if problems.is_empty() {
        info!(projects = state.projects.len(), "configuration is valid");
        println!("Configuration OK ({} projects)", state.projects.len());
        Ok(())
    } else {
        for problem in &problems {
            eprintln!("  {problem}");
        }
        bail!("{} configuration problem(s) found", problems.len())
    }
}
