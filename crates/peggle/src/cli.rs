//! Command-line driver for peggle.
//!
//! Reads a grammar file, parses an input file (or stdin with `-`) with its
//! entry rule, and prints the resulting tree as an s-expression.
#![allow(clippy::multiple_crate_versions)]

use anyhow::{Context, Result};
use facet::Facet;
use peggle::{parse_grammar_with, Options};
use std::fs::{self, File};
use std::io::{self, BufReader};

/// Parse input with a PEG grammar.
#[derive(Facet)]
struct Args {
    /// Path to the grammar file.
    #[facet(positional)]
    grammar: String,

    /// Path to the input file, or `-` to read stdin.
    #[facet(positional)]
    input: String,

    /// JSON file with parser options.
    #[facet(named, default)]
    config: Option<String>,

    /// Log level: off, error, warn, info, debug or trace.
    #[facet(named, default)]
    log: Option<String>,
}

fn main() -> Result<()> {
    let args: Args = facet_args::from_std_args().map_err(|e| anyhow::anyhow!("{e}"))?;

    let level: log::LevelFilter = args
        .log
        .as_deref()
        .unwrap_or("warn")
        .parse()
        .context("invalid log level")?;
    simplelog::TermLogger::init(
        level,
        simplelog::ConfigBuilder::new()
            .set_time_format_custom(&[])
            .build(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Never,
    )?;

    let options = match &args.config {
        Some(path) => {
            let json = fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
            Options::from_json(&json)?
        }
        None => Options::default(),
    };

    let source = fs::read_to_string(&args.grammar)
        .with_context(|| format!("reading {}", args.grammar))?;
    let grammar = parse_grammar_with(&source, options)
        .with_context(|| format!("building grammar from {}", args.grammar))?;
    log::info!("loaded {} rules, entry '{}'", grammar.len(), grammar.root().name());

    let tree = if args.input == "-" {
        grammar.parse_reader(io::stdin().lock())?
    } else {
        let file = File::open(&args.input).with_context(|| format!("opening {}", args.input))?;
        grammar.parse_reader(BufReader::new(file))?
    };
    println!("{tree}");
    Ok(())
}
