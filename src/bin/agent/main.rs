mod brain;
mod dom;
mod face;
mod hands;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use dotenvy::dotenv;
use face::EngineEvent;
use nlbrowse::{Classifier, Engine, EngineConfig, ExecutionResult, JsonFileStore, KeywordClassifier};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "agent", version, about = "Drive Chrome with natural-language commands")]
struct Cli {
    /// How commands are turned into intents
    #[arg(long, value_enum, default_value_t = ClassifierKind::Keyword)]
    classifier: ClassifierKind,

    /// Chat model used by the llm classifier
    #[arg(long, default_value = brain::DEFAULT_MODEL)]
    model: String,

    /// Launch Chrome without a window (ignored when attaching on port 9222)
    #[arg(long)]
    headless: bool,

    /// Directory for extracted_*.json artifacts
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand)]
enum Mode {
    /// Run one command and exit
    Run { command: Vec<String> },
    /// Accept commands on POST /command and stream results on /events
    Serve {
        #[arg(long, default_value_t = 3000)]
        port: u16,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ClassifierKind {
    Keyword,
    Llm,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("nlbrowse=info,agent=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let classifier: Arc<dyn Classifier> = match cli.classifier {
        ClassifierKind::Keyword => Arc::new(KeywordClassifier::new()),
        ClassifierKind::Llm => Arc::new(brain::LlmClassifier::new(&cli.model)?),
    };

    info!("[Agent] Launching Chrome...");
    let headless = cli.headless;
    let driver = tokio::task::spawn_blocking(move || hands::ChromeDriver::launch(headless))
        .await
        .map_err(|e| anyhow::anyhow!("Browser launch panicked: {}", e))??;

    let store = Arc::new(JsonFileStore::new(cli.output_dir));
    info!("[Agent] Extracted data goes to {}", store.dir().display());
    let engine = Engine::new(classifier, Arc::new(driver), EngineConfig::from_env()).with_store(store);

    match cli.mode {
        None => repl(engine).await,
        Some(Mode::Run { command }) => {
            let mut engine = engine;
            let results = engine.execute(&command.join(" ")).await?;
            print_results(&results);
            Ok(())
        }
        Some(Mode::Serve { port }) => serve(engine, port).await,
    }
}

async fn repl(mut engine: Engine) -> Result<()> {
    println!("Type a command, 'help' for the list, or 'exit' to quit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let command = line.trim();
        if command.is_empty() {
            continue;
        }

        let results = engine.execute(command).await.inspect_err(|e| {
            error!("[Agent] {}. Restart the agent to open a new browser.", e);
        })?;
        print_results(&results);

        if engine.exit_requested() {
            break;
        }
    }

    info!("[Agent] Bye.");
    Ok(())
}

fn print_results(results: &[ExecutionResult]) {
    for result in results {
        let mark = if result.success { "ok" } else { "failed" };
        println!("[{}] {}", mark, result.message);
        if let Some(artifact) = &result.artifact {
            if let Ok(pretty) = serde_json::to_string_pretty(artifact) {
                println!("{}", pretty);
            }
        }
    }
}

async fn serve(mut engine: Engine, port: u16) -> Result<()> {
    let (mut commands, events) = face::start_server(port).await?;
    info!("[Agent] Waiting for commands...");

    while let Some(command) = commands.recv().await {
        let _ = events.send(EngineEvent::Received {
            command: command.clone(),
        });

        match engine.execute(&command).await {
            Ok(results) => {
                for (i, result) in results.into_iter().enumerate() {
                    let _ = events.send(EngineEvent::step(i + 1, result));
                }
            }
            Err(e) => {
                error!("[Agent] {}", e);
                let _ = events.send(EngineEvent::SessionLost {
                    message: e.to_string(),
                });
                return Err(e.into());
            }
        }

        let _ = events.send(EngineEvent::Ready);
        if engine.exit_requested() {
            break;
        }
    }

    Ok(())
}
