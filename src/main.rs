//! contextfield: field simulation and protocol shell runner
//!
//! Usage:
//!   contextfield process notes.md --query "error handling"   → analyse a text file
//!   contextfield run shell.pareto --input query=rust          → execute a shell file
//!   contextfield run --builtin neural.field.process -i query=x → execute a built-in shell
//!   contextfield builtins [name]                              → list or print built-in shells
//!   contextfield config                                       → dump default config as TOML

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use contextfield::{FieldManager, ShellResponse};
use contextfield_core::ParamValue;
use contextfield_field::FieldConfig;
use contextfield_shell::{builtin_shell, builtin_source, StateMap, BUILTIN_NAMES};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "contextfield",
    about = "Semantic field simulation and Pareto-lang protocol shells",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file (TOML). Default: <config dir>/contextfield/config.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Inject a text file into the field and report resonance, residues and metrics
    Process {
        /// Text file to analyse ("-" reads stdin)
        path: String,
        /// Query to measure resonance against (default: the text itself)
        #[arg(short, long)]
        query: Option<String>,
        #[arg(short, long, value_enum, default_value_t = Format::Json)]
        format: Format,
    },
    /// Execute a protocol shell against the field
    Run {
        /// Shell file ("-" reads stdin)
        path: Option<String>,
        /// Run a built-in shell instead of a file
        #[arg(short, long, conflicts_with = "path")]
        builtin: Option<String>,
        /// Input values as key=value (repeatable)
        #[arg(short, long = "input")]
        inputs: Vec<String>,
        /// Text file processed into the field before the shell runs
        #[arg(long)]
        context: Option<PathBuf>,
        #[arg(short, long, value_enum, default_value_t = Format::Json)]
        format: Format,
    },
    /// List built-in shells, or print one
    Builtins {
        name: Option<String>,
    },
    /// Dump the default config as TOML
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Markdown,
    Yaml,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "contextfield=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Config => {
            println!("{}", FieldConfig::default().to_toml());
        }
        Commands::Builtins { name: Some(name) } => {
            let source = builtin_source(&name)
                .ok_or_else(|| anyhow::anyhow!("no built-in shell named '{}'", name))?;
            print!("{}", source);
        }
        Commands::Builtins { name: None } => {
            for name in BUILTIN_NAMES {
                let shell = builtin_shell(name)?;
                println!("{:<28} {}", name, shell.intent);
            }
        }
        Commands::Process { path, query, format } => {
            let mut manager = FieldManager::new(load_config(cli.config.as_deref()))?;
            let text = read_input(&path)?;
            let analysis = manager.process_context(&text, query.as_deref())?;
            match format {
                Format::Markdown => {
                    println!("{}", analysis.field_representation.to_markdown());
                    println!("## Recommendations\n");
                    for rec in &analysis.recommendations {
                        println!("- {}", rec);
                    }
                }
                Format::Yaml => print!("{}", serde_yaml_string(&analysis)?),
                Format::Json => println!("{}", serde_json::to_string_pretty(&analysis)?),
            }
        }
        Commands::Run {
            path,
            builtin,
            inputs,
            context,
            format,
        } => {
            let mut manager = FieldManager::new(load_config(cli.config.as_deref()))?;
            if let Some(context) = context {
                let text = std::fs::read_to_string(&context)
                    .with_context(|| format!("reading {}", context.display()))?;
                manager.process_context(&text, None)?;
            }
            let input = parse_inputs(&inputs)?;
            let response = match (builtin, path) {
                (Some(name), _) => manager.execute_builtin(&name, input)?,
                (None, Some(path)) => manager.execute_protocol_shell(&read_input(&path)?, input)?,
                (None, None) => anyhow::bail!("give a shell file or --builtin <name>"),
            };
            print_response(&response, format)?;
            if let Some(error) = &response.execution.error {
                anyhow::bail!("{}: {}", error.error_type, error.message);
            }
        }
    }

    Ok(())
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("contextfield").join("config.toml"))
}

fn load_config(path: Option<&Path>) -> FieldConfig {
    match path.map(Path::to_path_buf).or_else(default_config_path) {
        Some(path) => FieldConfig::load(&path),
        None => FieldConfig::default(),
    }
}

fn read_input(path: &str) -> anyhow::Result<String> {
    if path == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path))
}

/// `key=value` pairs; values are typed the same way shell parameters are.
fn parse_inputs(pairs: &[String]) -> anyhow::Result<StateMap> {
    pairs
        .iter()
        .map(|pair| {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("input '{}' is not key=value", pair))?;
            Ok((key.trim().to_string(), ParamValue::parse(value).to_json()))
        })
        .collect()
}

fn print_response(response: &ShellResponse, format: Format) -> anyhow::Result<()> {
    match format {
        Format::Yaml => print!("{}", response.execution.to_yaml()),
        Format::Markdown => {
            println!("{}\n", response.execution.summary_line());
            for update in &response.execution.field_updates {
                println!("- {}", update);
            }
        }
        Format::Json => println!("{}", serde_json::to_string_pretty(response)?),
    }
    Ok(())
}

fn serde_yaml_string<T: serde::Serialize>(value: &T) -> anyhow::Result<String> {
    Ok(serde_yaml::to_string(value)?)
}
