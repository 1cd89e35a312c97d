//! CLI transport for direct terminal interaction

use crate::agent::{AgentResponse, Session, TurnEvent};
use crate::config::Config;
use crate::llm::{CompletionBackend, DebugBackend, GeminiProvider, ModelInfo, Segment, Turn};
use crate::tools::{PathPolicy, ToolExecutor, ToolRegistry};
use anyhow::{Context, Result};
use colored::Colorize;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tabled::{settings::Style, Table, Tabled};

/// Output format for `models`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ModelsFormat {
    #[default]
    Table,
    Plain,
}

/// Command-line overrides applied on top of the loaded config
#[derive(Debug, Clone, Default)]
pub struct AgentOverrides {
    pub model: Option<String>,
    pub system_instruction: Option<String>,
    pub max_tool_rounds: Option<usize>,
    pub allowed_paths: Vec<PathBuf>,
    pub unrestricted: bool,
    pub read_only: bool,
}

impl AgentOverrides {
    pub fn apply(&self, config: &mut Config) {
        if let Some(model) = &self.model {
            config.llm.gemini.model = model.clone();
        }
        if let Some(instruction) = &self.system_instruction {
            config.agent.system_instruction = Some(instruction.clone());
        }
        if let Some(rounds) = self.max_tool_rounds {
            config.agent.max_tool_rounds = rounds;
        }
        if !self.allowed_paths.is_empty() {
            config.tools.allowed_paths = self.allowed_paths.clone();
        }
        config.tools.unrestricted |= self.unrestricted;
        config.tools.read_only |= self.read_only;
    }
}

/// Gemini provider configured from `[llm.gemini]`
pub fn build_provider(config: &Config) -> Result<GeminiProvider> {
    let gemini = &config.llm.gemini;
    let mut provider = GeminiProvider::new()?
        .with_model(&gemini.model)
        .with_max_tokens(gemini.max_tokens)
        .with_temperature(gemini.temperature)
        .with_base_url(&gemini.base_url);
    if let Some(secs) = gemini.request_timeout_secs {
        provider = provider.with_request_timeout(Duration::from_secs(secs))?;
    }
    Ok(provider)
}

/// Path policy from `[tools]`: confined to `allowed_paths`, or the working
/// directory when none are listed
///
/// Relative `allowed_paths` are taken from `working_dir`, matching how the
/// file tools resolve their own paths.
pub fn build_policy(config: &Config, working_dir: &Path) -> Result<PathPolicy> {
    let tools = &config.tools;
    let policy = if tools.unrestricted {
        tracing::warn!("File tools are unrestricted; any path the process can reach is allowed");
        PathPolicy::unrestricted()
    } else if tools.allowed_paths.is_empty() {
        PathPolicy::confined_to([working_dir])?
    } else {
        PathPolicy::confined_to(tools.allowed_paths.iter().map(|p| working_dir.join(p)))?
    };
    Ok(policy.with_read_only(tools.read_only))
}

/// Session over Gemini with the file tools, honoring every config section
pub fn build_session(
    config: &Config,
    working_dir: &Path,
    debug_log: Option<&Path>,
) -> Result<Session> {
    let mut backend: Arc<dyn CompletionBackend> = Arc::new(build_provider(config)?);
    if let Some(path) = debug_log {
        backend = Arc::new(
            DebugBackend::new(backend, path)
                .with_context(|| format!("Failed to open debug log {}", path.display()))?,
        );
        tracing::info!("Logging dispatches to {}", path.display());
    }

    let registry = Arc::new(ToolRegistry::with_file_tools(working_dir.to_path_buf()));
    let executor = ToolExecutor::new(registry, build_policy(config, working_dir)?)
        .with_timeout_secs(config.tools.tool_timeout_secs);

    let mut session = Session::new(backend, Arc::new(executor))
        .with_max_tool_rounds(config.agent.max_tool_rounds);
    if let Some(instruction) = &config.agent.system_instruction {
        session = session.with_system_instruction(instruction.clone());
    }
    Ok(session)
}

fn print_progress(event: &TurnEvent) {
    let line = match event {
        TurnEvent::Dispatching { dispatch } => format!("dispatch #{} to the model...", dispatch),
        TurnEvent::ToolCall { name, args } => format!("running tool: {}({})", name, args),
        TurnEvent::ToolResult {
            name,
            success,
            preview,
        } => {
            if *success {
                format!("{} returned: {}", name, preview)
            } else {
                format!("{} {}: {}", name, "failed".red(), preview)
            }
        }
        TurnEvent::RoundLimitReached { unanswered } => format!(
            "{} tool call(s) not executed: round limit reached",
            unanswered
        ),
    };
    eprintln!("{} {}", ">>>".dimmed(), line);
}

fn print_response(response: &AgentResponse) {
    let text = response.text();
    if text.is_empty() {
        println!("{}", "(no text in response)".dimmed());
    } else {
        println!("{}", text);
    }
    if response.unanswered_tool_calls > 0 {
        eprintln!(
            "{}",
            format!(
                "(model requested {} more tool call(s); raise --max-tool-rounds to allow them)",
                response.unanswered_tool_calls
            )
            .yellow()
        );
    }
    println!();
}

/// Interactive chat loop
pub async fn run_chat(config: Config, working_dir: &Path, debug_log: Option<&Path>) -> Result<()> {
    let mut session = build_session(&config, working_dir, debug_log)?.with_observer(print_progress);

    println!("{} ({})", "toolcall chat".bold(), session.model());
    println!("Working directory: {}", working_dir.display());
    println!("Type 'exit' or 'quit' to exit\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("{} ", "you>".green().bold());
        stdout.flush()?;

        let mut input = String::new();
        if stdin.lock().read_line(&mut input)? == 0 {
            println!();
            break;
        }
        let input = input.trim();

        if input.is_empty() {
            continue;
        }

        if matches!(input.to_lowercase().as_str(), "exit" | "quit") {
            println!("Goodbye!");
            break;
        }

        match session.run_turn_atomic(input).await {
            Ok(response) => {
                print!("{} ", "model>".cyan().bold());
                print_response(&response);
            }
            Err(e) => {
                eprintln!("{} {}\n", "Error:".red().bold(), e);
            }
        }
    }

    Ok(())
}

/// Run a single prompt and print the answer
pub async fn run_ask(
    config: Config,
    working_dir: &Path,
    debug_log: Option<&Path>,
    prompt: &str,
    transcript: bool,
) -> Result<()> {
    let mut session = build_session(&config, working_dir, debug_log)?.with_observer(print_progress);
    let response = session.run_turn(prompt).await?;

    print_response(&response);

    if transcript {
        println!("{}", "=".repeat(60));
        println!(
            "{} ({} turn(s), {} dispatch(es), {} tool round(s))",
            "Transcript".bold(),
            session.history().len(),
            response.dispatches,
            response.tool_rounds
        );
        print!("{}", format_transcript(session.history()));
        println!("{}", "=".repeat(60));
    }

    if let Some(usage) = &response.usage {
        tracing::info!(
            "Tokens: {} in, {} out, {} total",
            usage.input_tokens,
            usage.output_tokens,
            usage.total_tokens
        );
    }

    Ok(())
}

/// Numbered, human-readable rendering of a conversation
pub fn format_transcript(turns: &[Turn]) -> String {
    let mut out = String::new();
    for (i, turn) in turns.iter().enumerate() {
        out.push_str(&format!("\nTurn {}:\n", i + 1));
        out.push_str(&format!("  {}: {}\n", "role".bold(), turn.role.as_str()));
        for segment in &turn.segments {
            let line = match segment {
                Segment::Text { text } => format!("  {}: {}", "text".bold(), text),
                Segment::ToolCallRequest(call) => format!(
                    "  {}: {}({})",
                    "tool call".bold(),
                    call.name,
                    call.arguments
                ),
                Segment::ToolCallResult(result) => format!(
                    "  {}: {} -> {}",
                    "tool result".bold(),
                    result.name,
                    result.response.to_value()
                ),
            };
            out.push_str(&line);
            out.push('\n');
        }
    }
    out
}

/// List available models
pub async fn run_models(config: Config, format: ModelsFormat) -> Result<()> {
    let provider = build_provider(&config)?;
    let models = provider
        .list_models()
        .await
        .context("Failed to list Gemini models")?;

    match format {
        ModelsFormat::Plain => {
            for model in &models {
                println!("{}", model.name);
            }
        }
        ModelsFormat::Table => {
            println!("{}", render_models_table(&models));
            println!("{} model(s)", models.len());
        }
    }

    Ok(())
}

fn render_models_table(models: &[ModelInfo]) -> String {
    #[derive(Tabled)]
    struct ModelRow {
        #[tabled(rename = "Model")]
        name: String,
        #[tabled(rename = "Display Name")]
        display_name: String,
        #[tabled(rename = "Methods")]
        methods: String,
    }

    let rows: Vec<ModelRow> = models
        .iter()
        .map(|m| ModelRow {
            name: m.name.clone(),
            display_name: m.display_name.clone().unwrap_or_default(),
            methods: m.supported_generation_methods.join(", "),
        })
        .collect();

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ToolCall, ToolCallResult};
    use serde_json::json;

    #[test]
    fn test_overrides_apply_on_top_of_config() {
        let mut config = Config::default();
        config.tools.read_only = true;

        AgentOverrides {
            model: Some("gemini-2.0-flash".to_string()),
            max_tool_rounds: Some(4),
            allowed_paths: vec![PathBuf::from("/data")],
            ..Default::default()
        }
        .apply(&mut config);

        assert_eq!(config.llm.gemini.model, "gemini-2.0-flash");
        assert_eq!(config.agent.max_tool_rounds, 4);
        assert_eq!(config.tools.allowed_paths, vec![PathBuf::from("/data")]);
        // Flags only ever tighten or opt in; they never clear config switches
        assert!(config.tools.read_only);
        assert!(!config.tools.unrestricted);
    }

    #[test]
    fn test_policy_defaults_to_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let policy = build_policy(&Config::default(), dir.path()).unwrap();
        assert!(!policy.is_unrestricted());
        assert_eq!(policy.roots(), &[dir.path().canonicalize().unwrap()]);
    }

    #[test]
    fn test_policy_unrestricted_and_read_only() {
        let mut config = Config::default();
        config.tools.unrestricted = true;
        config.tools.read_only = true;
        let policy = build_policy(&config, Path::new(".")).unwrap();
        assert!(policy.is_unrestricted());
        assert!(policy.is_read_only());
    }

    #[test]
    fn test_relative_allowed_paths_follow_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("data")).unwrap();
        let outside = tempfile::tempdir().unwrap();

        let mut config = Config::default();
        config.tools.allowed_paths = vec![PathBuf::from("data"), outside.path().to_path_buf()];
        let policy = build_policy(&config, dir.path()).unwrap();

        assert_eq!(
            policy.roots(),
            &[
                dir.path().join("data").canonicalize().unwrap(),
                outside.path().canonicalize().unwrap(),
            ]
        );
    }

    #[test]
    fn test_models_format_values() {
        use clap::ValueEnum;

        assert_eq!(ModelsFormat::default(), ModelsFormat::Table);
        assert_eq!(
            ModelsFormat::from_str("plain", false).unwrap(),
            ModelsFormat::Plain
        );
        assert!(ModelsFormat::from_str("json", false).is_err());
    }

    #[test]
    fn test_transcript_lists_every_segment() {
        let turns = vec![
            Turn::user("what is here?"),
            Turn::model(vec![Segment::ToolCallRequest(ToolCall::new(
                "list_dir",
                json!({"directory_path": "."}),
            ))]),
            Turn::tool_results(vec![ToolCallResult::ok("list_dir", json!(["a.txt"]))]),
            Turn::model_text("Just a.txt"),
        ];

        let text = format_transcript(&turns);
        assert!(text.contains("Turn 1:"));
        assert!(text.contains("Turn 4:"));
        assert!(text.contains("what is here?"));
        assert!(text.contains(r#"list_dir({"directory_path":"."})"#));
        assert!(text.contains(r#"list_dir -> {"result":["a.txt"]}"#));
        assert!(text.contains("Just a.txt"));
    }

    #[test]
    fn test_models_table_has_rows() {
        let table = render_models_table(&[ModelInfo {
            name: "models/gemini-2.5-flash".to_string(),
            display_name: Some("Gemini 2.5 Flash".to_string()),
            supported_generation_methods: vec!["generateContent".to_string()],
        }]);
        assert!(table.contains("models/gemini-2.5-flash"));
        assert!(table.contains("Gemini 2.5 Flash"));
        assert!(table.contains("generateContent"));
    }
}
