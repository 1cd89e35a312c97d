use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use toolcall_agent::config::Config;
use toolcall_agent::transport::{self, AgentOverrides, ModelsFormat};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "toolcall")]
#[command(author, version, long_about = None)]
#[command(about = "Minimal tool-calling agent for Google Gemini")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (default: platform config dir, config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(clap::Args, Debug, Default)]
struct AgentArgs {
    /// Model to use (e.g., gemini-2.5-flash)
    #[arg(short, long)]
    model: Option<String>,

    /// System instruction sent with every dispatch
    #[arg(short, long)]
    system: Option<String>,

    /// Tool rounds allowed per input; each round costs one extra dispatch
    #[arg(long)]
    max_tool_rounds: Option<usize>,

    /// Directory file tools may access (repeatable; default: working directory)
    #[arg(long = "allow", value_name = "PATH")]
    allow: Vec<PathBuf>,

    /// Let file tools touch any path the process can reach
    #[arg(long)]
    unrestricted: bool,

    /// Refuse write_file calls
    #[arg(long)]
    read_only: bool,

    /// Append every dispatch (request and response) to this JSONL file
    #[arg(long, value_name = "FILE")]
    debug_log: Option<PathBuf>,

    /// Working directory for file tools (default: current directory)
    #[arg(long)]
    cwd: Option<PathBuf>,
}

impl AgentArgs {
    fn overrides(&self) -> AgentOverrides {
        AgentOverrides {
            model: self.model.clone(),
            system_instruction: self.system.clone(),
            max_tool_rounds: self.max_tool_rounds,
            allowed_paths: self.allow.clone(),
            unrestricted: self.unrestricted,
            read_only: self.read_only,
        }
    }

    fn working_dir(&self) -> Result<PathBuf> {
        let dir = match &self.cwd {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        dir.canonicalize()
            .with_context(|| format!("Working directory not found: {}", dir.display()))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat with the agent
    Chat {
        #[command(flatten)]
        agent: AgentArgs,
    },

    /// Send one prompt and print the answer
    Ask {
        /// Prompt to send
        prompt: String,

        /// Print the full numbered transcript after the answer
        #[arg(long)]
        transcript: bool,

        #[command(flatten)]
        agent: AgentArgs,
    },

    /// List models available to the configured API key
    Models {
        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: ModelsFormat,
    },
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "toolcall_agent=debug,toolcall=debug"
    } else {
        "toolcall_agent=info,toolcall=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Chat { agent } => {
            agent.overrides().apply(&mut config);
            let working_dir = agent.working_dir()?;
            tracing::debug!("Chat in {}", working_dir.display());
            transport::cli::run_chat(config, &working_dir, agent.debug_log.as_deref()).await?;
        }
        Commands::Ask {
            prompt,
            transcript,
            agent,
        } => {
            agent.overrides().apply(&mut config);
            let working_dir = agent.working_dir()?;
            transport::cli::run_ask(
                config,
                &working_dir,
                agent.debug_log.as_deref(),
                &prompt,
                transcript,
            )
            .await?;
        }
        Commands::Models { format } => {
            transport::cli::run_models(config, format).await?;
        }
    }

    Ok(())
}
