//! Command-line interface for legalmark
//!
//! Usage:
//!   legalmark resolve `<path>` [--format text|json] [--strict] [--highlight] [--config `<toml>`]
//!   legalmark fields `<path>`                 - Print the field report as JSON
//!
//! Log output goes to stderr and is controlled by `LEGALMARK_LOG` (default `warn`).

use clap::{Arg, ArgAction, ArgMatches, Command};
use legalmark::legal::config::{LegalmarkConfig, Loader};
use legalmark::legal::error::{format_source_context, FrontmatterError, ResolveError};
use legalmark::legal::loader::FsReader;
use legalmark::legal::pipeline::{Resolution, Resolver};
use legalmark::legal::value::Mapping;
use tracing_subscriber::EnvFilter;

fn main() {
    init_logging();

    let matches = Command::new("legalmark")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Resolve legal markdown documents")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("resolve")
                .about("Resolve a document and print the result")
                .arg(path_arg())
                .arg(
                    Arg::new("format")
                        .long("format")
                        .short('f')
                        .help("Output format")
                        .value_parser(["text", "json"])
                        .default_value("text"),
                )
                .arg(
                    Arg::new("strict")
                        .long("strict")
                        .help("Fail on malformed frontmatter and error diagnostics")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("highlight")
                        .long("highlight")
                        .help("Wrap template fields in highlighting spans")
                        .action(ArgAction::SetTrue),
                )
                .arg(config_arg()),
        )
        .subcommand(
            Command::new("fields")
                .about("Print the field report of a document as JSON")
                .arg(path_arg())
                .arg(config_arg()),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("resolve", resolve_matches)) => handle_resolve_command(resolve_matches),
        Some(("fields", fields_matches)) => handle_fields_command(fields_matches),
        _ => unreachable!(),
    }
}

fn init_logging() {
    let filter =
        EnvFilter::try_from_env("LEGALMARK_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn path_arg() -> Arg {
    Arg::new("path")
        .help("Path to the document")
        .required(true)
        .index(1)
}

fn config_arg() -> Arg {
    Arg::new("config")
        .long("config")
        .short('c')
        .help("Configuration file layered over the built-in defaults")
}

fn load_config(matches: &ArgMatches) -> LegalmarkConfig {
    let mut loader = Loader::new().with_optional_file("legalmark.toml");
    if let Some(path) = matches.get_one::<String>("config") {
        loader = loader.with_file(path);
    }
    for flag in ["strict", "highlight"] {
        let enabled = matches
            .try_get_one::<bool>(flag)
            .ok()
            .flatten()
            .copied()
            .unwrap_or(false);
        if enabled {
            loader = loader
                .set_override(&format!("resolve.{}", flag), true)
                .unwrap_or_else(|e| fail(&format!("Invalid option: {}", e)));
        }
    }
    loader
        .build()
        .unwrap_or_else(|e| fail(&format!("Configuration error: {}", e)))
}

fn run(matches: &ArgMatches) -> Resolution {
    let path = matches
        .get_one::<String>("path")
        .unwrap_or_else(|| fail("Missing document path"));
    let config = load_config(matches);

    Resolver::new(&FsReader, config.resolve)
        .with_render_config(config.render)
        .resolve_file(path, &Mapping::new())
        .unwrap_or_else(|e| report_fatal(path, e))
}

fn handle_resolve_command(matches: &ArgMatches) {
    let resolution = run(matches);
    let format = matches
        .get_one::<String>("format")
        .map(String::as_str)
        .unwrap_or("text");

    match format {
        "json" => print_json(&resolution),
        _ => {
            for diagnostic in &resolution.diagnostics {
                eprintln!("{}", diagnostic);
            }
            print!("{}", resolution.content);
        }
    }
}

fn handle_fields_command(matches: &ArgMatches) {
    let resolution = run(matches);
    print_json(&resolution.field_report);
}

fn print_json(value: &impl serde::Serialize) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => fail(&format!("Serialization error: {}", e)),
    }
}

fn report_fatal(path: &str, error: ResolveError) -> ! {
    eprintln!("Error: {}", error);
    if let ResolveError::Frontmatter(FrontmatterError::Malformed { line, .. }) = &error {
        if let Ok(source) = std::fs::read_to_string(path) {
            eprint!("{}", format_source_context(&source, *line));
        }
    }
    std::process::exit(1);
}

fn fail(message: &str) -> ! {
    eprintln!("{}", message);
    std::process::exit(1);
}
