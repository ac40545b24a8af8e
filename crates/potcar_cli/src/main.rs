//! `potcar` command-line entry point.
//!
//! # Responsibility
//! - Parse commands and resolve runtime configuration.
//! - Drive `potcar_core` services and print human-readable reports.
//!
//! # Invariants
//! - Any failed command exits with status 1 and a message on stderr.

mod config;

use clap::{Parser, Subcommand};
use config::RuntimeConfig;
use log::error;
use potcar_core::{
    open_db, FamilyService, MultiPotcarIo, PotcarIo, PotcarService, UploadRequest,
};
use std::collections::BTreeMap;
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

type CliResult<T> = Result<T, Box<dyn Error>>;

/// Content-addressed POTCAR store
#[derive(Debug, Parser)]
#[command(name = "potcar", version)]
#[command(about = "Store, group and compose POTCAR pseudopotential files")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// SQLite database file
    #[arg(long, global = true, env = "POTCAR_DB")]
    db: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "POTCAR_LOG_LEVEL")]
    log_level: Option<String>,

    /// Directory for rolling log files
    #[arg(long, global = true, env = "POTCAR_LOG_DIR")]
    log_dir: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Upload a folder or tar archive of POTCAR files into a family
    UploadFamily {
        /// Folder, .tar, .tar.gz or .tgz
        #[arg(long)]
        path: PathBuf,
        /// Family name
        #[arg(long)]
        name: String,
        /// Family description (required for a new family)
        #[arg(long = "desc")]
        description: Option<String>,
        /// Fail instead of re-filing payloads that are already stored
        #[arg(long)]
        stop_if_existing: bool,
    },
    /// List families, optionally only those covering every given element
    ListFamilies {
        /// Element every listed family must cover (repeatable)
        #[arg(long = "element")]
        elements: Vec<String>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Write a concatenated POTCAR for the given elements, in order
    WritePotcar {
        #[arg(long)]
        family: String,
        /// Element in output order (repeatable)
        #[arg(long = "element", required = true)]
        elements: Vec<String>,
        /// Symbol override per element, e.g. `In=In_d`
        #[arg(long = "map", value_parser = parse_mapping)]
        mappings: Vec<(String, String)>,
        #[arg(long)]
        output: PathBuf,
    },
    /// Export shadow metadata as JSON (stdout when no output is given)
    ExportShadows {
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Import shadow metadata exported from another store
    ImportShadows {
        #[arg(long)]
        input: PathBuf,
    },
}

fn parse_mapping(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((element, symbol)) if !element.trim().is_empty() && !symbol.trim().is_empty() => {
            Ok((element.trim().to_string(), symbol.trim().to_string()))
        }
        _ => Err(format!("expected ELEMENT=SYMBOL, got `{value}`")),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("event=cli_command module=cli status=error error={err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CliResult<()> {
    let config = RuntimeConfig::resolve(cli.db, cli.log_level, cli.log_dir)?;
    potcar_core::init_logging(&config.log_level, &config.log_dir)?;

    if let Some(parent) = config.db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = open_db(&config.db_path)?;

    match cli.command {
        Command::UploadFamily {
            path,
            name,
            description,
            stop_if_existing,
        } => {
            let mut request = UploadRequest::new(path, name).stop_if_existing(stop_if_existing);
            request.description = description;
            let report = FamilyService::new(&conn)?.upload(&request)?;
            println!("family: {}", report.family.name);
            println!("found: {}", report.found);
            println!("newly stored: {}", report.newly_stored);
            for failure in &report.failures {
                eprintln!("skipped {}: {}", failure.source, failure.error);
            }
        }
        Command::ListFamilies { elements, json } => {
            let families = FamilyService::new(&conn)?;
            let listed = if elements.is_empty() {
                families.list_families()?
            } else {
                families.families_covering(&elements)?
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&listed)?);
            } else {
                for family in &listed {
                    println!(
                        "{}\t{} members\t{}",
                        family.name, family.member_count, family.description
                    );
                }
            }
        }
        Command::WritePotcar {
            family,
            elements,
            mappings,
            output,
        } => {
            let families = FamilyService::new(&conn)?;
            let mapping: BTreeMap<String, String> = mappings.into_iter().collect();
            let records = families.potcars_for_elements(&family, &elements, &mapping)?;
            let mut potcars = Vec::with_capacity(records.len());
            for record in records {
                potcars.push(PotcarIo::resolve(families.potcars(), record)?);
            }
            let written = MultiPotcarIo::new(potcars).write_file(&output)?;
            println!("wrote {written} bytes to {}", output.display());
        }
        Command::ExportShadows { output } => {
            let json = PotcarService::new(&conn)?.export_shadows_json()?;
            match output {
                Some(path) => std::fs::write(&path, json)?,
                None => println!("{json}"),
            }
        }
        Command::ImportShadows { input } => {
            let json = std::fs::read_to_string(&input)?;
            let imported = PotcarService::new(&conn)?.import_shadows_json(&json)?;
            println!("imported {imported} shadow records");
        }
    }
    Ok(())
}
