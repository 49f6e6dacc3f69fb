use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use mnemos_rs::adk::model::openai::OpenAIInvoker;
use mnemos_rs::adk::pii::PatternMasker;
use mnemos_rs::adk::retrieval::StateRetriever;
use mnemos_rs::mnemos::checkpoint::open_store;
use mnemos_rs::mnemos::config::{ConfigLoader, EngineConfig};
use mnemos_rs::mnemos::executor::{ExecutorSettings, TurnExecutor, TurnRequest, TurnResponse};
use mnemos_rs::mnemos::policy::RetrievalTrigger;
use mnemos_rs::mnemos::router::MemoryRouter;
use mnemos_rs::mnemos::server;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the engine config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Chat with the agent; reads stdin line by line when no message is given
    Chat {
        #[arg(short, long, default_value = "default")]
        session: String,

        #[arg(short, long, default_value = "local")]
        user: String,

        /// Memory mode: rolling, summary, facts or hybrid
        #[arg(short, long)]
        mode: Option<String>,

        /// PII mode: placeholder or pseudonymize
        #[arg(long)]
        pii: Option<String>,

        /// Send a single message and exit
        message: Option<String>,
    },
    /// Inspect and restore checkpoints
    Checkpoints {
        #[command(subcommand)]
        action: CheckpointAction,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(short, long, default_value_t = 8080)]
        port: u16,
    },
}

#[derive(Subcommand, Debug)]
enum CheckpointAction {
    /// List a session's checkpoints, newest first
    List {
        #[arg(short, long)]
        session: String,

        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Show a checkpoint, optionally committing it as the session's new head
    Restore {
        checkpoint_id: String,

        #[arg(long)]
        commit: bool,
    },
}

fn build_executor(config: &EngineConfig) -> anyhow::Result<TurnExecutor> {
    let invoker = OpenAIInvoker::new(config.model.name.clone(), config.model.generation())
        .map_err(|e| anyhow::anyhow!("failed to create model invoker: {}", e))?;
    let router = MemoryRouter::standard(
        RetrievalTrigger::new(&config.retrieval.trigger_phrases),
        Arc::new(invoker),
        Arc::new(PatternMasker::new()),
        Arc::new(StateRetriever::new(config.retrieval.limit)),
    );
    let store = open_store(&config.checkpoint).context("failed to open checkpoint store")?;
    Ok(TurnExecutor::new(router, store, ExecutorSettings::from(config)))
}

fn print_response(response: &TurnResponse) {
    println!("{}", response.response_text);
    log::info!(
        "turn {} committed as {} ({} messages, {} facts)",
        response.turn,
        response.checkpoint_id,
        response.memory_snapshot.message_count,
        response.memory_snapshot.fact_count
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => ConfigLoader::load(path)?,
        None => EngineConfig::default(),
    };

    match args.command {
        Commands::Chat {
            session,
            user,
            mode,
            pii,
            message,
        } => {
            let executor = build_executor(&config)?;
            let request = |text: String| {
                let mut req = TurnRequest::new(session.clone(), user.clone(), text);
                req.memory_mode = mode.clone();
                req.pii_mode = pii.clone();
                req
            };

            if let Some(text) = message {
                let response = executor.run_turn(request(text)).await?;
                print_response(&response);
                return Ok(());
            }

            let stdin = io::stdin();
            print!("> ");
            io::stdout().flush()?;
            for line in stdin.lock().lines() {
                let line = line?;
                let text = line.trim();
                if text == "/quit" || text == "/exit" {
                    break;
                }
                if !text.is_empty() {
                    match executor.run_turn(request(text.to_string())).await {
                        Ok(response) => print_response(&response),
                        Err(e) => eprintln!("error: {}", e),
                    }
                }
                print!("> ");
                io::stdout().flush()?;
            }
        }
        Commands::Checkpoints { action } => {
            let store = open_store(&config.checkpoint).context("failed to open checkpoint store")?;
            match action {
                CheckpointAction::List { session, limit } => {
                    for summary in store.list(&session, limit).await? {
                        println!(
                            "{}  turn {:>4}  {}  {} messages  {}",
                            summary.checkpoint_id,
                            summary.turn,
                            summary.created_at.to_rfc3339(),
                            summary.message_count,
                            summary.metadata.mode
                        );
                    }
                }
                CheckpointAction::Restore {
                    checkpoint_id,
                    commit,
                } => {
                    let snapshot = store.restore(&checkpoint_id).await?;
                    println!("{}", serde_json::to_string_pretty(&snapshot)?);
                    if commit {
                        let executor = TurnExecutor::new(
                            MemoryRouter::new(RetrievalTrigger::default()),
                            store,
                            ExecutorSettings::from(&config),
                        );
                        let session_id = snapshot.session_id.clone();
                        let new_id = executor.commit_restored(&session_id, snapshot).await?;
                        println!("Committed {} as {} for session {}", checkpoint_id, new_id, session_id);
                    }
                }
            }
        }
        Commands::Serve { port } => {
            let executor = Arc::new(build_executor(&config)?);
            server::serve(executor, port)
                .await
                .map_err(|e| anyhow::anyhow!("server error: {}", e))?;
        }
    }

    Ok(())
}
