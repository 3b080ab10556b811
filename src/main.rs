use anyhow::{Context, Result};
use clap::{Arg, Command};
use log::LevelFilter;
use mailrisk::analyzer::Analyzer;
use mailrisk::config::Config;
use mailrisk::error::AnalysisError;
use mailrisk::scorer::ScorerSet;
use std::io::Read;
use std::path::Path;
use std::process;

fn main() -> Result<()> {
    let matches = Command::new("mailrisk")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Email phishing analyzer combining text, URL and HTML risk signals")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("/etc/mailrisk.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file and exit")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Validate the configuration and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug logging")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("message")
                .value_name("FILE")
                .help("Raw RFC 2822 message to analyze ('-' for stdin)")
                .default_value("-"),
        )
        .get_matches();

    let level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    if let Some(path) = matches.get_one::<String>("generate-config") {
        Config::generate_default(Path::new(path))
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("failed to write {path}"))?;
        println!("Default configuration written to {path}");
        return Ok(());
    }

    let config_path = matches.get_one::<String>("config").unwrap();
    let config = if Path::new(config_path).exists() {
        Config::load(Path::new(config_path))
            .map_err(|e| anyhow::anyhow!("invalid configuration {config_path}: {e}"))?
    } else {
        log::warn!("configuration file {config_path} not found, using defaults");
        Config::default()
    };

    if matches.get_flag("test-config") {
        println!("Configuration OK");
        return Ok(());
    }

    let raw = read_message(matches.get_one::<String>("message").unwrap())?;

    // Scorers load once; a missing one degrades its channel but never
    // blocks startup.
    let scorers = ScorerSet::from_config(&config.scorers);
    let analyzer = Analyzer::new(scorers, &config);

    match analyzer.analyze(&raw) {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Err(AnalysisError::Parse(reason)) => {
            eprintln!("error: {reason}");
            process::exit(2);
        }
    }
}

fn read_message(source: &str) -> Result<String> {
    if source == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("failed to read message from stdin")?;
        Ok(buffer)
    } else {
        std::fs::read_to_string(source).with_context(|| format!("failed to read {source}"))
    }
}
