use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser as ClapParser, Subcommand, ValueEnum};
use sqon_core::{
    renumber_file, renumber_records, Focus, ParseOptions, ParseOutput, Parser, SectionKind,
    ValidationReport, Validator,
};

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Section to parse on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FocusArg {
    Schema,
    Records,
}

impl From<FocusArg> for Focus {
    fn from(arg: FocusArg) -> Self {
        match arg {
            FocusArg::Schema => Focus::Schema,
            FocusArg::Records => Focus::Records,
        }
    }
}

/// SQON schema, validation and records toolkit.
#[derive(ClapParser)]
#[command(name = "sqon", version, about = "SQON schema, validation and records toolkit")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a .sqon file and report schema, rules, records and errors
    Parse {
        /// Path to the .sqon file
        file: PathBuf,
        /// Parse only this section
        #[arg(long, value_enum)]
        focus: Option<FocusArg>,
        /// Skip validating records against the schema and rules
        #[arg(long)]
        no_validate: bool,
        /// Maximum number of records to keep
        #[arg(long, default_value_t = sqon_core::DEFAULT_MAX_RECORDS)]
        max_records: usize,
    },

    /// Validate a JSON data file against the schema and rules of a .sqon file
    Validate {
        /// Path to the .sqon file providing @schema and @validations
        file: PathBuf,
        /// JSON file holding one object or an array of objects
        #[arg(long)]
        data: PathBuf,
        /// Reject fields not declared in the schema
        #[arg(long)]
        strict: bool,
    },

    /// Resequence record markers to #0, #1, ...
    Renumber {
        /// Path to the .sqon file
        file: PathBuf,
        /// Rewrite the file instead of printing the result
        #[arg(long)]
        in_place: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Parse {
            file,
            focus,
            no_validate,
            max_records,
        } => {
            let mut options = ParseOptions::from_path(&file)
                .validate_records(!no_validate)
                .max_records(max_records);
            if let Some(focus) = focus {
                options = options.focus(focus.into());
            }
            cmd_parse(options, cli.output, cli.quiet);
        }
        Commands::Validate { file, data, strict } => {
            cmd_validate(&file, &data, strict, cli.output, cli.quiet);
        }
        Commands::Renumber { file, in_place } => {
            cmd_renumber(&file, in_place, cli.output, cli.quiet);
        }
    }
}

// ──────────────────────────────────────────────
// parse
// ──────────────────────────────────────────────

fn run_parser(options: ParseOptions, output: OutputFormat, quiet: bool) -> ParseOutput {
    let result = Parser::new(options).and_then(|parser| parser.parse());
    match result {
        Ok(out) => {
            tracing::debug!(
                records = out.records.len(),
                errors = out.errors.len(),
                "parse finished"
            );
            out
        }
        Err(e) => {
            report_error(&e.to_string(), output, quiet);
            process::exit(1);
        }
    }
}

fn cmd_parse(options: ParseOptions, output: OutputFormat, quiet: bool) {
    let out = run_parser(options, output, quiet);

    match output {
        OutputFormat::Json => {
            let pretty = serde_json::to_string_pretty(&out)
                .unwrap_or_else(|e| format!("serialization error: {}", e));
            println!("{}", pretty);
        }
        OutputFormat::Text => {
            if !quiet {
                println!(
                    "strict: {}",
                    if out.file_rules.strict { "TRUE" } else { "FALSE" }
                );
                println!("schema: {} field(s)", out.schema.field_count());
                println!("validations: {} rule(s)", out.validations.rule_count());
                println!("records: {}", out.records.len());
            }
            for e in &out.errors {
                eprintln!("{}", e);
            }
        }
    }

    if !out.is_ok() {
        process::exit(1);
    }
}

// ──────────────────────────────────────────────
// validate
// ──────────────────────────────────────────────

fn cmd_validate(file: &Path, data_path: &Path, strict: bool, output: OutputFormat, quiet: bool) {
    let out = run_parser(
        ParseOptions::from_path(file).validate_records(false),
        output,
        quiet,
    );
    if out.schema.is_empty() {
        let msg = format!("'{}' declares no usable @schema", file.display());
        report_error(&msg, output, quiet);
        process::exit(1);
    }
    if !quiet {
        // Records come from --data; problems in the file's own @records
        // section do not apply.
        for e in out
            .errors
            .iter()
            .filter(|e| e.section != Some(SectionKind::Records))
        {
            eprintln!("warning: {}", e);
        }
    }

    let data_str = match std::fs::read_to_string(data_path) {
        Ok(s) => s,
        Err(e) => {
            let msg = format!("error reading file '{}': {}", data_path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };
    let data: serde_json::Value = match serde_json::from_str(&data_str) {
        Ok(v) => v,
        Err(e) => {
            let msg = format!("error parsing JSON in '{}': {}", data_path.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };

    let validator = Validator::new(&out.schema, &out.validations)
        .strict(strict || out.file_rules.strict);
    let reports: Vec<ValidationReport> = match &data {
        serde_json::Value::Array(items) => validator.validate_documents(items),
        single => vec![validator.validate(single, true)],
    };
    let all_valid = reports.iter().all(|r| r.valid);

    match output {
        OutputFormat::Json => {
            let value = if data.is_array() {
                serde_json::to_value(&reports)
            } else {
                serde_json::to_value(&reports[0])
            };
            let pretty = value
                .and_then(|v| serde_json::to_string_pretty(&v))
                .unwrap_or_else(|e| format!("serialization error: {}", e));
            println!("{}", pretty);
        }
        OutputFormat::Text => {
            for (idx, report) in reports.iter().enumerate() {
                for d in &report.diagnostics {
                    if data.is_array() {
                        println!("[{}] {}", idx, d);
                    } else {
                        println!("{}", d);
                    }
                }
            }
            if !quiet {
                let failed = reports.iter().filter(|r| !r.valid).count();
                if all_valid {
                    println!("valid");
                } else {
                    println!("{} of {} document(s) invalid", failed, reports.len());
                }
            }
        }
    }

    if !all_valid {
        process::exit(1);
    }
}

// ──────────────────────────────────────────────
// renumber
// ──────────────────────────────────────────────

fn cmd_renumber(file: &Path, in_place: bool, output: OutputFormat, quiet: bool) {
    if in_place {
        match renumber_file(file) {
            Ok(count) => match output {
                OutputFormat::Json => {
                    println!(
                        "{}",
                        serde_json::json!({ "file": file.display().to_string(), "renumbered": count })
                    );
                }
                OutputFormat::Text => {
                    if !quiet {
                        println!("renumbered {} record(s) in {}", count, file.display());
                    }
                }
            },
            Err(e) => {
                report_error(&e.to_string(), output, quiet);
                process::exit(1);
            }
        }
        return;
    }

    let text = match std::fs::read_to_string(file) {
        Ok(s) => s,
        Err(e) => {
            let msg = format!("error reading file '{}': {}", file.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    };
    print!("{}", renumber_records(&text));
}

fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
