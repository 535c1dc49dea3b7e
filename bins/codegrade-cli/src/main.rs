mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use codegrade_common::config::Provider;
use codegrade_common::languages::DEFAULT_LANGUAGES_PATH;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "codegrade-cli")]
#[command(about = "CodeGrade CLI - Manage languages and evaluate submissions", long_about = None)]
struct Cli {
    /// Path to the language table
    #[arg(long, global = true, default_value = DEFAULT_LANGUAGES_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured languages
    ListLangs,

    /// Add a language to the table
    AddLang {
        /// Language name (e.g., rust, go, kotlin)
        #[arg(short, long)]
        name: String,

        /// Default runtime version (e.g., 1.68.2)
        #[arg(short, long)]
        version: String,

        /// Alternative identifier accepted in requests (repeatable)
        #[arg(short, long = "alias")]
        aliases: Vec<String>,

        /// File name the source is uploaded as (defaults to main.<name>)
        #[arg(short, long)]
        file_name: Option<String>,

        /// Judge0 language id
        #[arg(long)]
        judge0_id: Option<u32>,
    },

    /// Remove a language from the table
    RemoveLang {
        /// Language name
        #[arg(short, long)]
        name: String,

        /// Skip confirmation
        #[arg(short, long, default_value = "false")]
        yes: bool,
    },

    /// Evaluate a submission request (JSON) and print the result
    Evaluate {
        /// Path to a SubmissionRequest JSON file
        #[arg(short, long)]
        request: PathBuf,

        /// Execution provider (overrides CODEGRADE_PROVIDER)
        #[arg(short, long)]
        provider: Option<Provider>,

        /// Execution service base URL (overrides CODEGRADE_EXECUTION_URL)
        #[arg(short, long)]
        url: Option<String>,
    },

    /// Run a source file once with optional stdin
    Run {
        #[arg(short, long)]
        language: String,

        /// Path to the source file
        #[arg(short, long)]
        source: PathBuf,

        /// Path to a file fed to the program as stdin
        #[arg(long)]
        stdin: Option<PathBuf>,

        /// Runtime version (defaults to the configured one)
        #[arg(short, long)]
        version: Option<String>,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if std::env::var("CODEGRADE_LOG_FORMAT").as_deref() == Ok("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::ListLangs => {
            commands::list_languages(&cli.config)?;
        }
        Commands::AddLang {
            name,
            version,
            aliases,
            file_name,
            judge0_id,
        } => {
            commands::add_language(
                &cli.config,
                &name,
                &version,
                aliases,
                file_name.as_deref(),
                judge0_id,
            )?;
        }
        Commands::RemoveLang { name, yes } => {
            commands::remove_language(&cli.config, &name, yes)?;
        }
        Commands::Evaluate {
            request,
            provider,
            url,
        } => {
            commands::evaluate(&cli.config, &request, provider, url.as_deref()).await?;
        }
        Commands::Run {
            language,
            source,
            stdin,
            version,
        } => {
            commands::run(
                &cli.config,
                &language,
                version.as_deref(),
                &source,
                stdin.as_deref(),
            )
            .await?;
        }
    }

    Ok(())
}
