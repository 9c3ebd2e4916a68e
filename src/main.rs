use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docqa::config::{Config, EmbedderProvider};
use docqa::embedder::{self, Embedder};
use docqa::llm::{LanguageModel, OpenAiClient};
use docqa::DocumentAssistant;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "docqa", version, about = "Ask questions about your documents")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, global = true, default_value = "config.json")]
    config: String,

    /// Use the deterministic hash embedder instead of the ONNX model
    #[arg(long, global = true)]
    mock_embedder: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Copy files into the upload directory and index them
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Index new documents in the upload directory
    Ingest,
    /// Ask a single question
    Ask { question: String },
    /// Interactive multi-turn session
    Chat,
    /// List uploaded documents
    List,
    /// Suggest previously asked questions containing a fragment
    Suggest { fragment: String },
    /// Delete the index and every uploaded document
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // 1. Load config
    let mut config = Config::load(&cli.config)?;
    if cli.mock_embedder {
        config.embedder.provider = EmbedderProvider::Mock;
    }
    config.validate().context("Invalid configuration")?;

    // 2. Init embedder (may download the model, which blocks)
    let embedder_config = config.clone();
    let embedder: Arc<dyn Embedder> =
        tokio::task::spawn_blocking(move || embedder::from_config(&embedder_config))
            .await
            .context("Embedder initialisation panicked")?
            .context("Failed to initialise embedder")?;

    // 3. Init language model
    let client = OpenAiClient::from_config(&config.llm).context("Failed to build HTTP client")?;
    if !client.has_api_key() {
        warn!(
            "{} is not set; questions cannot be answered",
            config.llm.api_key_env
        );
    }
    let llm: Arc<dyn LanguageModel> = Arc::new(client);

    // 4. Open the assistant
    let assistant = DocumentAssistant::open(config, embedder, llm)
        .context("Failed to open document assistant")?;

    let outcome = run(&assistant, cli.command).await;
    assistant.close().context("Failed to close question store")?;
    outcome
}

async fn run(assistant: &DocumentAssistant, command: Command) -> Result<()> {
    match command {
        Command::Upload { files } => {
            for path in files {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .with_context(|| format!("{} has no file name", path.display()))?;
                let bytes = tokio::fs::read(&path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                let built = assistant
                    .upload(&name, &bytes)
                    .await
                    .with_context(|| format!("Failed to upload {}", path.display()))?;
                info!("Uploaded {name} (index built: {built})");
            }
            print_json(&assistant.list_indexed_documents()?)
        }
        Command::Ingest => {
            let report = assistant.sync().await.context("Ingest failed")?;
            print_json(&report)
        }
        Command::Ask { question } => {
            let answer = assistant.ask(&question).await?;
            print_json(&answer)
        }
        Command::Chat => chat(assistant).await,
        Command::List => print_json(&assistant.list_indexed_documents()?),
        Command::Suggest { fragment } => print_json(&assistant.suggestions(&fragment).await?),
        Command::Reset => {
            assistant.reset().await?;
            println!("All documents and embeddings deleted");
            Ok(())
        }
    }
}

async fn chat(assistant: &DocumentAssistant) -> Result<()> {
    if !assistant.ingest().await? {
        anyhow::bail!(
            "No documents to talk about; upload some into {} first",
            assistant.config().upload_dir
        );
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question, "exit" | "quit") {
            break;
        }

        match assistant.ask(question).await {
            Ok(answer) => {
                stdout.write_all(answer.answer.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                for source in &answer.sources {
                    let page = source.page.map(|p| format!(" p.{p}")).unwrap_or_default();
                    let line = format!("  [{:.3}] {}{page}\n", source.score, source.document);
                    stdout.write_all(line.as_bytes()).await?;
                }
            }
            Err(e) => warn!("{e}"),
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
