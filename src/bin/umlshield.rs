//! UML Shield CLI binary.
//!
//! Input validation and output escaping for PlantUML editors.
//!
//! # Commands
//!
//! - `validate` - Validate input and print the sanitized copy
//! - `escape` - Escape text for an output context
//! - `detect` - Detect the output context of a string
//! - `check` - Run a single injection check
//! - `process` - Run the full security pipeline

use std::io::{self, Read};
use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, Subcommand};
use serde::Serialize;
use umlshield::{
    security::{
        CommandInjectionProtector, EscapeContext, EscapeOptions, InjectionCheckResult,
        InjectionPrevention, InputType, InputValidator, Issue, OutputEscaper, SecurityMiddleware,
        TagStripper,
    },
    Config, VERSION,
};

#[derive(Parser)]
#[command(name = "umlshield")]
#[command(version = VERSION)]
#[command(about = "UML Shield - Input sanitization for PlantUML editors", long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/umlshield/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate input and print the sanitized copy
    Validate {
        /// Content to validate (or - for stdin)
        input: Option<String>,

        /// Input file path
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Input type (plantuml, actor, action, general, command, query)
        #[arg(short = 't', long = "type", default_value = "general")]
        input_type: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Escape text for an output context
    Escape {
        /// Content to escape (or - for stdin)
        input: Option<String>,

        /// Input file path
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Context (html, js, css, url, xml, plantuml, json, auto)
        #[arg(short, long, default_value = "html")]
        context: String,

        /// Advanced HTML escaping
        #[arg(long)]
        advanced: bool,

        /// Strip tags before HTML escaping
        #[arg(long)]
        strip_tags: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Detect the output context of a string
    Detect {
        /// Content to inspect (or - for stdin)
        input: Option<String>,

        /// Input file path
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run a single injection check
    Check {
        /// Content to check (or - for stdin)
        input: Option<String>,

        /// Input file path
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Check kind (command, sql, path, plantuml)
        #[arg(short, long, default_value = "command")]
        kind: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the full security pipeline
    Process {
        /// Content to process (or - for stdin)
        input: Option<String>,

        /// Input file path
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Output file path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Input type (plantuml, actor, action, general, command, query)
        #[arg(short = 't', long = "type", default_value = "general")]
        input_type: String,

        /// Output context (html, js, css, url, xml, plantuml, json, auto)
        #[arg(short, long, default_value = "html")]
        context: String,

        /// Reject anything that is not safe
        #[arg(long)]
        strict: bool,

        /// Withhold output above the threat threshold
        #[arg(long)]
        quarantine: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let config = load_config(cli.config)?;

    match cli.command {
        Commands::Validate {
            input,
            file,
            input_type,
            json,
        } => cmd_validate(&config, input, file, &input_type, json),

        Commands::Escape {
            input,
            file,
            output,
            context,
            advanced,
            strip_tags,
            json,
        } => cmd_escape(
            &config, input, file, output, &context, advanced, strip_tags, json,
        ),

        Commands::Detect { input, file, json } => cmd_detect(input, file, json),

        Commands::Check {
            input,
            file,
            kind,
            json,
        } => cmd_check(input, file, &kind, json),

        Commands::Process {
            input,
            file,
            output,
            input_type,
            context,
            strict,
            quarantine,
            json,
        } => {
            let mut config = config;
            config.middleware.strict_mode |= strict;
            config.middleware.quarantine_mode |= quarantine;
            cmd_process(&config, input, file, output, &input_type, &context, json)
        },
    }
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::from_file(path)?,
        None => Config::load_default()?,
    };
    Ok(config.with_env())
}

fn cmd_validate(
    config: &Config,
    input: Option<String>,
    file: Option<PathBuf>,
    input_type: &str,
    json_output: bool,
) -> anyhow::Result<()> {
    let content = read_input(input, file)?;
    let input_type = InputType::from_str(input_type)?;
    let validator = InputValidator::with_config(config.validator.clone())?;

    let result = validator.validate(Some(&content), input_type);

    if json_output {
        print_json(&result)?;
    } else {
        println!(
            "{} (level: {})",
            if result.is_valid { "VALID" } else { "INVALID" },
            result.security_level
        );
        print_issues(result.issues());
        println!();
        println!("{}", result.sanitized_input);
    }

    Ok(())
}

#[allow(clippy::too_many_arguments, clippy::fn_params_excessive_bools)]
fn cmd_escape(
    config: &Config,
    input: Option<String>,
    file: Option<PathBuf>,
    output: Option<PathBuf>,
    context: &str,
    advanced: bool,
    strip_tags: bool,
    json_output: bool,
) -> anyhow::Result<()> {
    let content = read_input(input, file)?;
    let context = EscapeContext::from_str(context)?;

    let strip_tags = strip_tags || config.escaper.strip_tags;
    let mut escaper = OutputEscaper::new();
    if strip_tags {
        escaper = escaper.with_sanitizer(std::sync::Arc::new(TagStripper::new()));
    }
    let options = EscapeOptions {
        advanced: advanced || config.escaper.advanced,
        sanitize: strip_tags,
    };

    let result = escaper.escape(&content, context, &options)?;

    if json_output {
        print_json(&result)?;
        return Ok(());
    }

    for warning in &result.warnings {
        eprintln!("warning: [{}] {}", warning.kind, warning.message);
    }
    write_output(output, &result.escaped)
}

fn cmd_detect(input: Option<String>, file: Option<PathBuf>, json_output: bool) -> anyhow::Result<()> {
    let content = read_input(input, file)?;
    let detection = OutputEscaper::new().detect_context(&content);

    if json_output {
        let scores: serde_json::Map<String, serde_json::Value> = detection
            .scores
            .iter()
            .map(|(ctx, score)| (ctx.to_string(), serde_json::json!(score)))
            .collect();
        print_json(&serde_json::json!({
            "context": detection.context,
            "scores": scores,
        }))?;
    } else {
        println!("{}", detection.context);
        for (ctx, score) in &detection.scores {
            println!("  {ctx:<10} {score}");
        }
    }

    Ok(())
}

fn cmd_check(
    input: Option<String>,
    file: Option<PathBuf>,
    kind: &str,
    json_output: bool,
) -> anyhow::Result<()> {
    let content = read_input(input, file)?;
    let prevention = InjectionPrevention::new();

    let result: InjectionCheckResult = match kind.to_ascii_lowercase().as_str() {
        "command" | "shell" => CommandInjectionProtector::new().validate_command(&content),
        "sql" | "query" => prevention.check_sql_injection(&content),
        "path" => prevention.check_path_traversal(&content),
        "plantuml" => prevention.check_plantuml_injection(&content),
        other => anyhow::bail!("Invalid check kind: {other}. Use: command, sql, path, plantuml"),
    };

    if json_output {
        print_json(&result)?;
    } else if result.is_safe {
        println!("SAFE");
    } else {
        println!("UNSAFE (level: {})", result.security_level);
        println!();
        print_issues(result.issues().iter());
        println!();
        println!("Sanitized: {}", result.sanitized);
    }

    Ok(())
}

fn cmd_process(
    config: &Config,
    input: Option<String>,
    file: Option<PathBuf>,
    output: Option<PathBuf>,
    input_type: &str,
    context: &str,
    json_output: bool,
) -> anyhow::Result<()> {
    let content = read_input(input, file)?;
    let input_type = InputType::from_str(input_type)?;
    let context = EscapeContext::from_str(context)?;
    let middleware = SecurityMiddleware::from_config(config)?;

    let runtime = tokio::runtime::Runtime::new()?;
    let result =
        runtime.block_on(middleware.process_securely(Some(&content), input_type, context));

    if json_output {
        print_json(&result)?;
        return Ok(());
    }

    eprintln!(
        "{} (threat score: {}, level: {}, {:.2}ms)",
        if result.is_secure { "SECURE" } else { "INSECURE" },
        result.threat_score,
        result.security_level,
        result.processing_time.as_secs_f64() * 1000.0
    );
    for factor in &result.risk_factors {
        eprintln!("  - {factor}");
    }
    if !result.recommendations.is_empty() {
        eprintln!();
        eprintln!("Recommendations:");
        for rec in &result.recommendations {
            eprintln!("  - {rec}");
        }
    }

    write_output(output, &result.processed_output)
}

fn print_issues<'a>(issues: impl Iterator<Item = &'a Issue>) {
    for issue in issues {
        println!("  [{}] {} - {}", issue.severity, issue.kind, issue.message);
        if !issue.matches.is_empty() {
            println!("      matches: {:?}", issue.matches);
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_input(input: Option<String>, file: Option<PathBuf>) -> anyhow::Result<String> {
    if let Some(path) = file {
        Ok(std::fs::read_to_string(path)?)
    } else if let Some(s) = input {
        if s == "-" {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        } else {
            Ok(s)
        }
    } else {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    }
}

fn write_output(output: Option<PathBuf>, content: &str) -> anyhow::Result<()> {
    if let Some(path) = output {
        std::fs::write(path, content)?;
    } else {
        println!("{content}");
    }
    Ok(())
}
