//! Taleweave CLI - compile and play stories from the terminal
//!
//! `compile` prints the addressed outline and extracted artifacts as JSON.
//! `play` runs a story offline: text is printed, input is read from stdin,
//! and `:undo` reverts to the previous checkpoint.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use taleweave::{
    CompileConfig, Document, Engine, EngineConfig, Operation, ScriptedProvider, Seam, Session, compile,
};

#[derive(Parser)]
#[command(name = "taleweave")]
#[command(about = "Compile and play branching interactive audio fiction", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile documents and print the result
    Compile {
        /// Story documents (markup, .json/.yaml data, .script modules)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Compiler config (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Play a story in the terminal
    Play {
        /// Story documents
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Seed for every random draw
        #[arg(long, default_value = "taleweave")]
        seed: String,

        /// Engine config (JSON)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Session file; resumed when present and saved after every pause
        #[arg(long)]
        session: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Compile { files, config } => {
            let config = match config {
                Some(path) => CompileConfig::load(&path)?,
                None => CompileConfig::default(),
            }
            .with_env_overrides()?;
            let documents = load_documents(&files).await?;
            let story = compile(&documents, &config, &ScriptedProvider::new()).await?;
            println!("{}", serde_json::to_string_pretty(&story.summary())?);
        }
        Commands::Play {
            files,
            seed,
            config,
            session,
        } => {
            let config = match config {
                Some(path) => EngineConfig::load(&path)?,
                None => EngineConfig::default(),
            }
            .with_env_overrides()?;
            play(&files, seed, config, session.as_deref()).await?;
        }
    }

    Ok(())
}

async fn load_documents(files: &[PathBuf]) -> Result<Vec<Document>> {
    let mut documents = Vec::with_capacity(files.len());
    for file in files {
        documents.push(Document::load(file).await?);
    }
    Ok(documents)
}

async fn play(files: &[PathBuf], seed: String, config: EngineConfig, saved: Option<&Path>) -> Result<()> {
    let provider = ScriptedProvider::new();
    let documents = load_documents(files).await?;
    let mut story = compile(&documents, &CompileConfig::default(), &provider).await?;
    if let Some(title) = story.title() {
        println!("== {} ==\n", title);
    }

    let mut session = match saved {
        Some(path) if path.exists() => {
            let data = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading session {}", path.display()))?;
            let mut session = Session::from_json(&data)?;
            session.mark_resumed();
            session
        }
        _ => Session::new(&story, seed),
    };

    let engine = Engine::new(config);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let advance = engine.advance(&mut story, &mut session, &provider).await;
        for op in &advance.ops {
            print_op(op);
        }
        if let Some(path) = saved {
            tokio::fs::write(path, session.to_json()?)
                .await
                .with_context(|| format!("writing session {}", path.display()))?;
        }

        match advance.seam {
            Seam::Media | Seam::Grant => continue,
            Seam::Finish => break,
            Seam::Error => {
                if let Some(error) = &advance.error {
                    eprintln!("error: {}", error);
                }
                break;
            }
            Seam::Input => {
                stdout.write_all(b"> ").await?;
                stdout.flush().await?;
                let Some(line) = lines.next_line().await? else {
                    break;
                };
                match line.trim() {
                    ":quit" => break,
                    ":undo" => {
                        if let Err(error) = session.revert_last() {
                            eprintln!("cannot undo: {}", error);
                        }
                    }
                    reply => session.provide_input(reply),
                }
            }
        }
    }

    Ok(())
}

fn print_op(op: &Operation) {
    match op {
        Operation::PlayMedia { event: Some(event), .. } => {
            if event.from == "narrator" {
                println!("{}\n", event.body);
            } else {
                println!("{}: {}\n", event.from, event.body);
            }
        }
        Operation::PlayMedia { media, event: None, .. } => println!("[audio {}]", media),
        Operation::ShowMedia { media } => println!("[image {}]", media),
        Operation::Sleep { duration_ms } => println!("[pause {} ms]", duration_ms),
        Operation::GetInput { attributes } => {
            if let Some(prompt) = attributes.get("prompt").or_else(|| attributes.get("description")) {
                println!("{}", prompt);
            }
        }
        Operation::StoryEnd => println!("~ The End ~"),
        Operation::StoryError { reason } => eprintln!("story error: {}", reason),
    }
}
