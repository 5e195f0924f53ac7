use anyhow::{anyhow, Context, Result};
use clap::builder::NonEmptyStringValueParser;
use clap::{Parser, Subcommand, ValueEnum};
use cmmc_ai::{AppContext, ContentBlock, ConversationTurn, OrchestratorOutput, ProviderFactory};
use cmmc_core::{ComplianceCatalog, ConfigManager, LoggingConfig, ValidationEcho};
use colored::Colorize;
use serde_json::{json, Value as JsonValue};
use std::path::PathBuf;
use tabled::builder::Builder;
use tabled::settings::Style;
use tracing::warn;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DATA_NOT_LOADED: &str =
    "Data could not be loaded. Please ensure JSON files are in the data directory.";

#[derive(Parser)]
#[command(name = "cmmc-parser")]
#[command(about = "CMMC Objective Parser - browse practices and ask Bedrock about CMMC", long_about = None)]
#[command(version)]
struct Cli {
    /// Output format (json, pretty, table)
    #[arg(short, long, global = true, default_value = "pretty")]
    output: OutputFormat,

    /// Directory holding the practice, objective and assessment JSON files
    #[arg(long, global = true, env = "CMMC_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
    Table,
}

#[derive(Subcommand)]
enum Commands {
    /// List organization ids found in the assessments
    Orgs,

    /// List practices
    Practices,

    /// List the objectives of a practice
    Objectives {
        /// Practice label ("<code> - <title>"), internal id or practice code
        #[arg(short, long)]
        practice: String,
    },

    /// Ask a CMMC question; the model picks tier/intent filters and searches the knowledge base
    Ask {
        /// Question or input
        #[arg(value_parser = NonEmptyStringValueParser::new())]
        input: String,

        /// Include the full model conversation
        #[arg(long)]
        transcript: bool,
    },

    /// Query the knowledge base directly
    Search {
        /// Search query
        query: String,

        /// CMMC level/tier filter, e.g. "Level 2"
        #[arg(long)]
        tier: Option<String>,

        /// Intent filter, e.g. "policy" or "technical"
        #[arg(long)]
        intent: Option<String>,
    },

    /// Validate an input against a practice
    Validate {
        /// Input to validate
        input: String,

        /// Practice label ("<code> - <title>"), internal id or practice code
        #[arg(short, long)]
        practice: String,
    },

    /// Configuration and service status
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Notice {
    Success,
    Info,
    Warning,
}

#[derive(Debug)]
enum CommandOutput {
    /// Rows for json/table output, pre-rendered lines for pretty output
    Records {
        records: Vec<JsonValue>,
        lines: Vec<String>,
    },
    Data(JsonValue),
    Analysis {
        output: OrchestratorOutput,
        transcript: bool,
    },
    Text {
        notice: Option<Notice>,
        text: String,
        value: JsonValue,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut manager = with_bootstrap_logging(cli.verbose, std::io::stderr, ConfigManager::load)
        .context("Failed to load configuration")?;
    if let Some(dir) = &cli.data_dir {
        manager.config_mut().data.dir = dir.clone();
    }

    init_tracing(&manager.config().logging, cli.verbose);

    let catalog = match ComplianceCatalog::load(&manager.config().data) {
        Ok(catalog) => catalog,
        Err(e) => {
            warn!("Error loading data files: {}", e);
            ComplianceCatalog::default()
        }
    };

    let context = AppContext::from_config(manager.config(), catalog);

    match execute_command(&cli, &manager, &context).await {
        Ok(output) => {
            print_output(&cli.output, output)?;
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

/// Run `f` under a scoped subscriber so events emitted before `init_tracing`
/// (dotenv and config file loading) are not lost
fn with_bootstrap_logging<W, T>(verbose: bool, make_writer: W, f: impl FnOnce() -> T) -> T
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(std::env::var("CMMC_LOG_LEVEL").unwrap_or_else(|_| "warn".to_string()))
        })
    };

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(make_writer)
        .with_ansi(false)
        .finish();

    tracing::subscriber::with_default(subscriber, f)
}

fn init_tracing(logging: &LoggingConfig, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level))
    };

    let registry = tracing_subscriber::registry().with(filter);

    if logging.format == "compact" {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn execute_command(
    cli: &Cli,
    manager: &ConfigManager,
    context: &AppContext,
) -> Result<CommandOutput> {
    match &cli.command {
        Commands::Orgs => execute_orgs_command(context),
        Commands::Practices => execute_practices_command(context),
        Commands::Objectives { practice } => execute_objectives_command(context, practice),
        Commands::Ask { input, transcript } => {
            execute_ask_command(context, input, *transcript).await
        }
        Commands::Search {
            query,
            tier,
            intent,
        } => execute_search_command(context, query, tier.as_deref(), intent.as_deref()).await,
        Commands::Validate { input, practice } => {
            execute_validate_command(context, input, practice)
        }
        Commands::Status => execute_status_command(manager, context),
    }
}

fn require_practice_data(catalog: &ComplianceCatalog) -> Result<()> {
    if catalog.has_practice_data() {
        Ok(())
    } else {
        Err(anyhow!(DATA_NOT_LOADED))
    }
}

fn execute_orgs_command(context: &AppContext) -> Result<CommandOutput> {
    let org_ids = context.catalog().org_ids();

    if org_ids.is_empty() {
        return Ok(CommandOutput::Text {
            notice: Some(Notice::Warning),
            text: "No Assessment Data Found".to_string(),
            value: json!({ "organizations": [] }),
        });
    }

    Ok(CommandOutput::Records {
        records: org_ids
            .iter()
            .map(|id| json!({ "org_id": id.as_str() }))
            .collect(),
        lines: org_ids.iter().map(|id| id.to_string()).collect(),
    })
}

fn execute_practices_command(context: &AppContext) -> Result<CommandOutput> {
    let catalog = context.catalog();
    require_practice_data(catalog)?;

    Ok(CommandOutput::Records {
        records: catalog
            .practices()
            .iter()
            .map(|p| {
                json!({
                    "id": p.id.as_str(),
                    "practice_id": p.practice_id,
                    "title": p.title,
                })
            })
            .collect(),
        lines: catalog.practice_labels(),
    })
}

fn execute_objectives_command(context: &AppContext, selector: &str) -> Result<CommandOutput> {
    let catalog = context.catalog();
    require_practice_data(catalog)?;

    let practice = catalog.select_practice(selector)?;
    let objectives = catalog.objectives_for(&practice.id);

    if objectives.is_empty() {
        return Ok(CommandOutput::Text {
            notice: Some(Notice::Info),
            text: "No objectives found for this practice.".to_string(),
            value: json!({ "practice": practice.label(), "objectives": [] }),
        });
    }

    Ok(CommandOutput::Records {
        records: objectives
            .iter()
            .map(|o| {
                json!({
                    "objective_code": o.objective_code,
                    "objective_text": o.objective_text,
                })
            })
            .collect(),
        lines: objectives.iter().map(|o| o.label()).collect(),
    })
}

async fn execute_ask_command(
    context: &AppContext,
    input: &str,
    transcript: bool,
) -> Result<CommandOutput> {
    require_practice_data(context.catalog())?;

    if input.trim().is_empty() {
        return Err(anyhow!("Please enter a question or input."));
    }

    let output = context.orchestrator().run(input).await;

    Ok(CommandOutput::Analysis { output, transcript })
}

async fn execute_search_command(
    context: &AppContext,
    query: &str,
    tier: Option<&str>,
    intent: Option<&str>,
) -> Result<CommandOutput> {
    let outcome = context.gateway().search_outcome(query, tier, intent).await;
    let notice = outcome.is_failure().then_some(Notice::Warning);
    let text = outcome.into_text();

    Ok(CommandOutput::Text {
        notice,
        value: json!({
            "query": query,
            "tier": tier,
            "intent": intent,
            "result": text,
        }),
        text,
    })
}

fn execute_validate_command(
    context: &AppContext,
    input: &str,
    selector: &str,
) -> Result<CommandOutput> {
    let catalog = context.catalog();
    require_practice_data(catalog)?;

    let practice = catalog.select_practice(selector)?;
    let echo = ValidationEcho::new(input, &practice.label());

    Ok(CommandOutput::Text {
        notice: Some(Notice::Success),
        text: echo.message.clone(),
        value: serde_json::to_value(&echo)?,
    })
}

fn execute_status_command(manager: &ConfigManager, context: &AppContext) -> Result<CommandOutput> {
    let config = manager.config();
    let catalog = context.catalog();

    Ok(CommandOutput::Data(json!({
        "config_file": manager
            .config_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "NONE (using defaults)".to_string()),
        "region": config.bedrock.region,
        "model_id": config.bedrock.model_id,
        "knowledge_base_id": config.knowledge_base.knowledge_base_id.as_deref().unwrap_or("<unset>"),
        "top_k": context.gateway().top_k(),
        "providers": ProviderFactory::supported_providers().join(", "),
        "chat_model_available": context.chat_model().is_some(),
        "knowledge_base_configured": context.gateway().is_configured(),
        "data_dir": config.data.dir.display().to_string(),
        "practices": catalog.practices().len(),
        "objectives": catalog.objectives().len(),
        "assessments": catalog.assessments().len(),
    })))
}

fn print_output(format: &OutputFormat, output: CommandOutput) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&to_json(output)?)?);
        }
        OutputFormat::Pretty => print_pretty(output)?,
        OutputFormat::Table => print_table(output)?,
    }
    Ok(())
}

fn to_json(output: CommandOutput) -> Result<JsonValue> {
    Ok(match output {
        CommandOutput::Records { records, .. } => JsonValue::Array(records),
        CommandOutput::Data(value) => value,
        CommandOutput::Analysis { output, transcript } => analysis_json(output, transcript)?,
        CommandOutput::Text { value, .. } => value,
    })
}

fn analysis_json(output: OrchestratorOutput, transcript: bool) -> Result<JsonValue> {
    let mut value = json!({
        "status": if output.answer.is_failure() { "failure" } else { "success" },
        "answer": output.answer.text(),
        "inferred_tier": output.inferred.tier,
        "inferred_intent": output.inferred.intent,
    });
    if transcript {
        value["transcript"] = serde_json::to_value(&output.transcript)?;
    }
    Ok(value)
}

fn print_pretty(output: CommandOutput) -> Result<()> {
    match output {
        CommandOutput::Records { lines, .. } => {
            for line in lines {
                println!("{}", line);
            }
        }
        CommandOutput::Data(value) => print_pretty_value(&value)?,
        CommandOutput::Analysis { output, transcript } => {
            println!("{}", "AI Analysis".cyan().bold());
            println!(
                "{} `{}` | {} `{}`",
                "Inferred Tier:".bold(),
                output.inferred.tier.as_deref().unwrap_or("None"),
                "Inferred Intent:".bold(),
                output.inferred.intent.as_deref().unwrap_or("None"),
            );
            println!();
            if output.answer.is_failure() {
                println!("{}", output.answer.text().red());
            } else {
                println!("{}", output.answer.text());
            }
            if transcript {
                println!();
                print_transcript(&output.transcript);
            }
        }
        CommandOutput::Text { notice, text, .. } => match notice {
            Some(Notice::Success) => println!("{}", text.green()),
            Some(Notice::Info) => println!("{}", text.cyan()),
            Some(Notice::Warning) => println!("{}", text.yellow()),
            None => println!("{}", text),
        },
    }
    Ok(())
}

fn print_pretty_value(value: &JsonValue) -> Result<()> {
    match value {
        JsonValue::Object(map) => {
            for (key, val) in map {
                let key_colored = key.cyan().bold();
                match val {
                    JsonValue::String(s) => {
                        println!("{}: {}", key_colored, s.green());
                    }
                    JsonValue::Number(n) => {
                        println!("{}: {}", key_colored, n.to_string().yellow());
                    }
                    JsonValue::Bool(b) => {
                        let val_colored = if *b { "true".green() } else { "false".red() };
                        println!("{}: {}", key_colored, val_colored);
                    }
                    _ => {
                        println!("{}: {}", key_colored, val);
                    }
                }
            }
        }
        _ => {
            println!("{}", serde_json::to_string_pretty(value)?);
        }
    }
    Ok(())
}

fn print_transcript(transcript: &[ConversationTurn]) {
    println!("{}", "Transcript".cyan().bold());
    for turn in transcript {
        for block in &turn.content {
            let summary = match block {
                ContentBlock::Text(text) => text.clone(),
                ContentBlock::ToolUse(tool_use) => {
                    format!("tool use {} [{}] {}", tool_use.name, tool_use.id, tool_use.input)
                }
                ContentBlock::ToolResult(result) => format!(
                    "tool result [{}] {:?}",
                    result.tool_use_id(),
                    result.status
                ),
            };
            println!("{} {}", format!("{}:", turn.role).bold(), summary);
        }
    }
}

fn print_table(output: CommandOutput) -> Result<()> {
    let table = match output {
        CommandOutput::Records { records, .. } => render_records_table(&records),
        CommandOutput::Analysis { output, .. } => {
            render_key_value_table(&analysis_json(output, false)?)
        }
        CommandOutput::Data(value) => render_key_value_table(&value),
        text @ CommandOutput::Text { .. } => return print_pretty(text),
    };

    match table {
        Some(table) => println!("{}", table),
        None => println!("{}", "No rows".yellow()),
    }
    Ok(())
}

/// One column per key of the first row, whatever the row count
fn render_records_table(rows: &[JsonValue]) -> Option<String> {
    let headers: Vec<String> = rows.first()?.as_object()?.keys().cloned().collect();
    let mut builder = Builder::default();

    builder.push_record(headers.clone());
    for row in rows {
        builder.push_record(
            headers
                .iter()
                .map(|h| row.get(h).map(cell).unwrap_or_default()),
        );
    }

    let mut table = builder.build();
    table.with(Style::rounded());
    Some(table.to_string())
}

/// A single object as key/value rows
fn render_key_value_table(value: &JsonValue) -> Option<String> {
    let object = value.as_object()?;
    let mut builder = Builder::default();

    builder.push_record(["key".to_string(), "value".to_string()]);
    for (key, value) in object {
        builder.push_record([key.clone(), cell(value)]);
    }

    let mut table = builder.build();
    table.with(Style::rounded());
    Some(table.to_string())
}

fn cell(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Null => "None".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmmc_ai::RetrievalGateway;
    use cmmc_core::{Assessment, Objective, OrgId, Practice, PracticeId};
    use parking_lot::Mutex;
    use serde_json::Map;
    use std::io;
    use std::sync::Arc;

    #[test]
    fn test_cli_parses_ask_with_transcript() {
        let cli = Cli::try_parse_from([
            "cmmc-parser",
            "--output",
            "json",
            "ask",
            "What is required for AC.L2-3.1.1?",
            "--transcript",
        ])
        .unwrap();

        match cli.command {
            Commands::Ask { input, transcript } => {
                assert_eq!(input, "What is required for AC.L2-3.1.1?");
                assert!(transcript);
            }
            _ => panic!("expected ask"),
        }
    }

    #[test]
    fn test_cli_parses_search_filters() {
        let cli = Cli::try_parse_from([
            "cmmc-parser",
            "search",
            "mfa",
            "--tier",
            "Level 2",
            "--intent",
            "technical",
        ])
        .unwrap();

        match cli.command {
            Commands::Search { query, tier, intent } => {
                assert_eq!(query, "mfa");
                assert_eq!(tier.as_deref(), Some("Level 2"));
                assert_eq!(intent.as_deref(), Some("technical"));
            }
            _ => panic!("expected search"),
        }
    }

    #[test]
    fn test_cli_rejects_empty_question() {
        assert!(Cli::try_parse_from(["cmmc-parser", "ask", ""]).is_err());
    }

    #[test]
    fn test_records_table_uses_first_row_headers() {
        let rows = vec![
            json!({"objective_code": "3.1.1[a]", "objective_text": "authorized users are identified"}),
            json!({"objective_code": "3.1.1[b]", "objective_text": "processes are identified"}),
        ];

        let table = render_records_table(&rows).unwrap();
        assert!(table.contains("objective_code"));
        assert!(table.contains("3.1.1[b]"));
    }

    #[test]
    fn test_single_record_keeps_column_layout() {
        let rows = vec![json!({"objective_code": "3.1.1[a]", "objective_text": "authorized users are identified"})];

        let table = render_records_table(&rows).unwrap();
        assert!(table.contains("objective_code"));
        assert!(table.contains("objective_text"));
        assert!(!table.contains("value"));
    }

    #[test]
    fn test_key_value_table_for_status_data() {
        let table = render_key_value_table(&json!({"region": "us-east-1", "top_k": 5})).unwrap();
        assert!(table.contains("key"));
        assert!(table.contains("region"));
        assert!(table.contains("us-east-1"));
    }

    #[test]
    fn test_render_table_empty() {
        assert!(render_records_table(&[]).is_none());
        assert!(render_key_value_table(&json!([])).is_none());
    }

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    impl io::Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for SharedBuffer {
        type Writer = SharedBuffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_events_during_config_loading_are_captured() {
        let buffer = SharedBuffer::default();

        let loaded = with_bootstrap_logging(true, buffer.clone(), || {
            tracing::warn!("Failed to load .env file: stream did not contain valid UTF-8");
            tracing::info!("Configuration loaded");
            42
        });

        assert_eq!(loaded, 42);
        let logs = buffer.contents();
        assert!(logs.contains("Failed to load .env file"));
        assert!(logs.contains("Configuration loaded"));
    }

    fn sample_catalog(with_objectives: bool) -> ComplianceCatalog {
        let practices = vec![
            Practice {
                id: PracticeId::new("p1"),
                practice_id: "AC.L2-3.1.1".to_string(),
                title: "Authorized Access Control".to_string(),
            },
            Practice {
                id: PracticeId::new("p2"),
                practice_id: "AC.L2-3.1.2".to_string(),
                title: "Transaction & Function Control".to_string(),
            },
        ];
        let objectives = if with_objectives {
            vec![Objective {
                objective_code: "3.1.1[a]".to_string(),
                objective_text: "authorized users are identified".to_string(),
                practice_id: PracticeId::new("p1"),
            }]
        } else {
            Vec::new()
        };
        let assessments = vec![
            Assessment {
                org_id: OrgId::new("ORG-001"),
                extra: Map::new(),
            },
            Assessment {
                org_id: OrgId::new("ORG-001"),
                extra: Map::new(),
            },
            Assessment {
                org_id: OrgId::new("ORG-002"),
                extra: Map::new(),
            },
        ];
        ComplianceCatalog::new(practices, objectives, assessments)
    }

    fn context_with(catalog: ComplianceCatalog) -> AppContext {
        AppContext::new(catalog, None, RetrievalGateway::new(None, None))
    }

    fn expect_data_not_loaded(result: Result<CommandOutput>) {
        let err = result.unwrap_err();
        assert_eq!(err.to_string(), DATA_NOT_LOADED);
    }

    #[tokio::test]
    async fn test_practice_commands_require_both_tables() {
        let context = context_with(sample_catalog(false));

        expect_data_not_loaded(execute_practices_command(&context));
        expect_data_not_loaded(execute_objectives_command(&context, "p1"));
        expect_data_not_loaded(execute_validate_command(&context, "We use MFA", "p1"));
        expect_data_not_loaded(execute_ask_command(&context, "What is AC.L2-3.1.1?", false).await);
    }

    #[test]
    fn test_validate_echoes_input_and_practice_label() {
        let context = context_with(sample_catalog(true));

        match execute_validate_command(&context, "We use MFA", "AC.L2-3.1.1").unwrap() {
            CommandOutput::Text { notice, text, value } => {
                assert_eq!(notice, Some(Notice::Success));
                assert_eq!(
                    text,
                    "Validation: Input 'We use MFA' validated against 'AC.L2-3.1.1 - Authorized Access Control'."
                );
                assert_eq!(value["practice"], "AC.L2-3.1.1 - Authorized Access Control");
            }
            other => panic!("expected text output, got {:?}", other),
        }
    }

    #[test]
    fn test_objectives_for_practice_without_objectives() {
        let context = context_with(sample_catalog(true));

        match execute_objectives_command(&context, "AC.L2-3.1.2 - Transaction & Function Control")
            .unwrap()
        {
            CommandOutput::Text { notice, text, .. } => {
                assert_eq!(notice, Some(Notice::Info));
                assert_eq!(text, "No objectives found for this practice.");
            }
            other => panic!("expected text output, got {:?}", other),
        }

        match execute_objectives_command(&context, "p1").unwrap() {
            CommandOutput::Records { records, lines } => {
                assert_eq!(records.len(), 1);
                assert_eq!(lines, vec!["3.1.1[a] - authorized users are identified"]);
            }
            other => panic!("expected records, got {:?}", other),
        }
    }

    #[test]
    fn test_orgs_without_assessments_warns() {
        let context = context_with(ComplianceCatalog::default());

        match execute_orgs_command(&context).unwrap() {
            CommandOutput::Text { notice, text, value } => {
                assert_eq!(notice, Some(Notice::Warning));
                assert_eq!(text, "No Assessment Data Found");
                assert_eq!(value, json!({ "organizations": [] }));
            }
            other => panic!("expected text output, got {:?}", other),
        }
    }

    #[test]
    fn test_orgs_are_unique_in_first_seen_order() {
        let context = context_with(sample_catalog(false));

        match execute_orgs_command(&context).unwrap() {
            CommandOutput::Records { lines, .. } => {
                assert_eq!(lines, vec!["ORG-001", "ORG-002"]);
            }
            other => panic!("expected records, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ask_rejects_blank_input_before_model_call() {
        let context = context_with(sample_catalog(true));

        let err = execute_ask_command(&context, "   ", false).await.unwrap_err();
        assert_eq!(err.to_string(), "Please enter a question or input.");

        match execute_ask_command(&context, "What is AC.L2-3.1.1?", false).await.unwrap() {
            CommandOutput::Analysis { output, .. } => {
                assert_eq!(output.answer.text(), "AWS Bedrock client not initialized.");
            }
            other => panic!("expected analysis, got {:?}", other),
        }
    }
}
