use std::collections::HashMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use span_probes::config::loader::load_config;
use span_probes::trace::extract;

#[derive(Parser)]
#[command(name = "probe-cli")]
#[command(about = "Offline tools for span-probes configs and trace headers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and validate an agent config file
    Validate {
        /// Path to the TOML config
        config: PathBuf,
    },
    /// Decode propagation headers into a span context
    Decode {
        /// Header as `name:value`; repeatable
        #[arg(long = "header", short = 'H', value_parser = parse_header)]
        headers: Vec<(String, String)>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config } => {
            let loaded = load_config(&config)?;
            println!(
                "{}: ok (service {}, {} filter(s))",
                config.display(),
                loaded.service_name,
                loaded.probes.filters.len()
            );
        }
        Commands::Decode { headers } => {
            let carrier: HashMap<String, String> = headers.into_iter().collect();
            match extract(&carrier) {
                Some(ctx) => println!("{}", serde_json::to_string_pretty(&ctx)?),
                None => {
                    eprintln!("Error: no valid trace context in the given headers");
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected name:value, got {raw:?}"))?;
    Ok((name.trim().to_ascii_lowercase(), value.trim().to_string()))
}
