//! Halcyon CLI
//!
//! Serves the conversational HTTP API, or talks on the console with `--chat`.

use clap::Parser;
use halcyon::api::{self, AppState};
use halcyon::config::{halcyon_home, BackendKind, FailurePolicy, HalcyonConfig, ProviderKind};
use halcyon::generation::{
    ChatCompletionsClient, EchoClient, GenerationClient, ResponseShaper, ShapedClient,
};
use halcyon::memory::{FileBackend, InMemoryBackend, MemoryBackend, MemoryStore};
use halcyon::orchestrator::{InteractionOrchestrator, OrchestratorSettings};
use halcyon::repl;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Halcyon - conversational service with bounded memory
#[derive(Parser, Debug)]
#[command(name = "halcyon")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config.toml (default: $HALCYON_HOME/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the persisted memory file
    #[arg(long)]
    memory_file: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Strict mode: report generation failures instead of the fallback reply
    #[arg(long)]
    strict: bool,

    /// Generation provider (openai or echo)
    #[arg(long)]
    provider: Option<ProviderKind>,

    /// Talk on the console instead of serving HTTP
    #[arg(long)]
    chat: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let home = halcyon_home()?;
    let config = build_config(&cli, &home)?;
    info!("Starting Halcyon v{}", env!("CARGO_PKG_VERSION"));
    info!("Halcyon home: {:?}", home);

    let backend: Arc<dyn MemoryBackend> = match config.memory.backend {
        BackendKind::File => Arc::new(FileBackend::new(config.memory.file.clone())),
        BackendKind::Memory => Arc::new(InMemoryBackend::new()),
    };
    let backup: Arc<dyn MemoryBackend> =
        Arc::new(FileBackend::new(config.memory.backup_file.clone()));

    let store = Arc::new(MemoryStore::open(backend, config.memory.max_size).await);
    let client = build_client(&config)?;
    let orchestrator = Arc::new(InteractionOrchestrator::new(
        store,
        client,
        OrchestratorSettings::from_config(&config),
    ));

    if cli.chat {
        let input = repl::spawn_stdin_reader();
        let (output, writer) = repl::spawn_stdout_writer();
        repl::run(orchestrator, Some(backup), input, output).await?;
        writer.await?;
        return Ok(());
    }

    let app = api::build_app(AppState::new(orchestrator, backup), config.enable_cors);
    api::serve(&config.bind_addr(), app, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await?;
    Ok(())
}

/// Defaults, config file and environment, then command-line overrides
fn build_config(cli: &Cli, home: &std::path::Path) -> anyhow::Result<HalcyonConfig> {
    let mut config = HalcyonConfig::load(home, cli.config.as_deref())?;

    if let Some(host) = &cli.host {
        config = config.with_host(host.clone());
    }
    if let Some(port) = cli.port {
        config = config.with_port(port);
    }
    if let Some(memory_file) = &cli.memory_file {
        config = config.with_memory_file(memory_file.clone());
    }
    if let Some(provider) = cli.provider {
        config = config.with_provider(provider);
    }
    if cli.strict {
        config = config.with_failure_policy(FailurePolicy::Strict);
    }

    config.validate()?;
    Ok(config)
}

fn build_client(config: &HalcyonConfig) -> anyhow::Result<Arc<dyn GenerationClient>> {
    let generation = &config.generation;
    let api_key = std::env::var(&generation.api_key_env)
        .ok()
        .filter(|k| !k.trim().is_empty());

    let provider = match generation.provider {
        Some(kind) => kind,
        None if api_key.is_some() => ProviderKind::OpenAi,
        None => {
            warn!(
                "{} is not set; using the offline echo provider",
                generation.api_key_env
            );
            ProviderKind::Echo
        }
    };

    let client: Arc<dyn GenerationClient> = match provider {
        ProviderKind::OpenAi => {
            if api_key.is_none() {
                warn!("{} is not set; requests may be rejected", generation.api_key_env);
            }
            Arc::new(
                ChatCompletionsClient::new(generation.base_url.clone(), generation.model.clone())?
                    .with_api_key(api_key)
                    .with_system_prompt(generation.system_prompt.clone()),
            )
        }
        ProviderKind::Echo => Arc::new(EchoClient::new()),
    };
    info!("Generation provider: {}", client.name());

    let shaper = ResponseShaper::new(generation.min_response_chars, generation.max_response_chars);
    Ok(Arc::new(ShapedClient::new(client, shaper)))
}
