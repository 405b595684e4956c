//! Schema Dereferencer CLI
//!
//! Command-line interface for dereferencing `$ref` pointers and looking up
//! values by JSON pointer.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use schema_deref::{deref, get_at_pointer, is_url, load_document_auto, DerefOptions};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schema-deref")]
#[command(about = "Dereference $ref pointers in JSON Schema documents")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace); logs go to stderr
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace every $ref with the value it points to
    Deref {
        /// Document source: file path or URL (http:// or https://)
        source: String,

        /// Folder for relative file references (default: the source's folder)
        #[arg(long, env = "SCHEMA_DEREF_BASE_FOLDER")]
        base_folder: Option<PathBuf>,

        /// Fail when a reference cannot be resolved
        #[arg(long)]
        fail_on_missing: bool,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,

        /// Report dereference failures as JSON on stdout
        #[arg(long)]
        json_errors: bool,
    },

    /// Print the value at a JSON pointer (e.g. "#/definitions/id")
    Get {
        /// Document source: file path or URL (http:// or https://)
        source: String,

        /// JSON pointer to look up
        pointer: String,

        /// Dereference the document before the lookup
        #[arg(long)]
        deref: bool,

        /// Folder for relative file references (default: the source's folder)
        #[arg(long, env = "SCHEMA_DEREF_BASE_FOLDER")]
        base_folder: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Deref {
            source,
            base_folder,
            fail_on_missing,
            output,
            pretty,
            json_errors,
        } => {
            let options = options_for(&source, base_folder).fail_on_missing(fail_on_missing);
            run_deref(&source, &options, output, pretty, json_errors)
        }

        Commands::Get {
            source,
            pointer,
            deref: resolve_first,
            base_folder,
            pretty,
        } => {
            let options = options_for(&source, base_folder);
            run_get(&source, &pointer, resolve_first.then_some(&options), pretty)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

/// Install the stderr subscriber. `RUST_LOG` is honoured; `-v` raises the
/// level for this crate on top of it.
fn init_logging(verbosity: u8) {
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let level = match verbosity {
        0 => None,
        1 => Some("debug"),
        _ => Some("trace"),
    };
    if let Some(level) = level {
        if let Ok(directive) = format!("schema_deref={level}").parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Options with the base folder taken from the flag, else the folder of a
/// file source, else the working directory.
fn options_for(source: &str, base_folder: Option<PathBuf>) -> DerefOptions {
    let options = DerefOptions::new();
    match base_folder {
        Some(folder) => options.base_folder(folder),
        None if is_url(source) => options,
        None => {
            let parent = Path::new(source)
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            options.base_folder(parent)
        }
    }
}

fn run_deref(
    source: &str,
    options: &DerefOptions,
    output: Option<PathBuf>,
    pretty: bool,
    json_errors: bool,
) -> Result<(), u8> {
    let document = load_document_auto(source).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let resolved = deref(&document, options).map_err(|e| {
        if json_errors {
            match serde_json::to_string(&e) {
                Ok(json) => println!("{}", json),
                Err(_) => eprintln!("Error: {}", e),
            }
        } else {
            eprintln!("Error: {}", e);
        }
        e.exit_code() as u8
    })?;

    write_json(&resolved, pretty, output.as_deref())
}

fn run_get(
    source: &str,
    pointer: &str,
    deref_options: Option<&DerefOptions>,
    pretty: bool,
) -> Result<(), u8> {
    let mut document = load_document_auto(source).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    if let Some(options) = deref_options {
        document = deref(&document, options).map_err(|e| {
            eprintln!("Error: {}", e);
            e.exit_code() as u8
        })?;
    }

    match get_at_pointer(&document, pointer) {
        Some(value) => write_json(value, pretty, None),
        None => {
            eprintln!("Error: nothing at pointer {}", pointer);
            Err(1)
        }
    }
}

fn write_json(value: &Value, pretty: bool, output: Option<&Path>) -> Result<(), u8> {
    let json_output = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;

    match output {
        Some(path) => {
            std::fs::write(path, &json_output).map_err(|e| {
                eprintln!("Error writing to {}: {}", path.display(), e);
                3u8
            })?;
        }
        None => {
            println!("{}", json_output);
        }
    }

    Ok(())
}
