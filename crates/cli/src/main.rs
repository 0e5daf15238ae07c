mod config;
mod error;
mod logging;

use std::path::{Path, PathBuf};

use chrono::{Local, TimeZone, Utc};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use storage::CapabilityStore;
use tracing::debug;
use zcap::{Capability, CapabilityInvocation, Proof, Verifier};

use config::Config;
use error::{Error, Result};
use logging::LogLevels;

const CONFIG_FILE: &str = "zcap.toml";
const DB_FILE: &str = "capabilities.db";

#[derive(Parser)]
#[command(name = "zcap")]
#[command(about = "Verify authorization capability invocations", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Capability database (overrides the config file)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import trusted capability documents (a JSON object or array per file)
    Import {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List stored capabilities
    List,
    /// Print a stored capability
    Show { id: String },
    /// Remove a stored capability
    Remove { id: String },
    /// Verify an invocation request
    Verify {
        /// JSON file with the proof fields and an `invocation` object
        request: PathBuf,
    },
    /// Show the effective log levels
    Levels,
}

/// A verification request as read from disk.
#[derive(Debug, Deserialize)]
struct VerifyRequest {
    #[serde(flatten)]
    proof: Proof,
    invocation: CapabilityInvocation,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;
    let levels = LogLevels::from_config(&config.log)?;
    logging::init(&levels);

    let db_path = cli
        .db
        .clone()
        .or_else(|| config.store.path.clone())
        .unwrap_or_else(default_db_path);

    match cli.command {
        Commands::Import { files } => cmd_import(&db_path, &files),
        Commands::List => cmd_list(&db_path),
        Commands::Show { id } => cmd_show(&db_path, &id),
        Commands::Remove { id } => cmd_remove(&db_path, &id),
        Commands::Verify { request } => cmd_verify(&db_path, &config, &request),
        Commands::Levels => {
            cmd_levels(&levels);
            Ok(())
        }
    }
}

fn cmd_import(db_path: &Path, files: &[PathBuf]) -> Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let store = CapabilityStore::open(db_path)?;

    let mut imported = 0;
    for file in files {
        for capability in read_capabilities(file)? {
            store.insert(&capability)?;
            println!("imported {}", capability.id);
            imported += 1;
        }
    }

    println!("{imported} capabilities stored in {}", db_path.display());
    Ok(())
}

fn cmd_list(db_path: &Path) -> Result<()> {
    let store = open_store(db_path)?;
    let capabilities = store.list()?;

    if capabilities.is_empty() {
        println!("No capabilities stored.");
        return Ok(());
    }

    println!("{:<40}  {:<40}  {:<16}  EXPIRES", "ID", "TARGET", "IMPORTED");
    println!("{}", "-".repeat(120));

    let now = Utc::now();
    for summary in capabilities {
        let imported = Local
            .from_utc_datetime(&summary.imported_at.naive_utc())
            .format("%Y-%m-%d %H:%M");
        let expires = match summary.expires {
            Some(e) if e < now => format!("{} (expired)", e.format("%Y-%m-%d %H:%M")),
            Some(e) => e.format("%Y-%m-%d %H:%M").to_string(),
            None => "never".to_string(),
        };
        println!(
            "{:<40}  {:<40}  {:<16}  {expires}",
            summary.id, summary.target, imported
        );
    }

    Ok(())
}

fn cmd_show(db_path: &Path, id: &str) -> Result<()> {
    let store = open_store(db_path)?;
    let capability = store
        .get(id)?
        .ok_or_else(|| Error::CapabilityNotFound { id: id.to_string() })?;

    let json = serde_json::to_string_pretty(&capability).map_err(|source| Error::Json {
        path: db_path.to_path_buf(),
        source,
    })?;
    println!("{json}");
    Ok(())
}

fn cmd_remove(db_path: &Path, id: &str) -> Result<()> {
    let store = open_store(db_path)?;
    if !store.remove(id)? {
        return Err(Error::CapabilityNotFound { id: id.to_string() });
    }
    println!("removed {id}");
    Ok(())
}

fn cmd_verify(db_path: &Path, config: &Config, request_path: &Path) -> Result<()> {
    let request: VerifyRequest = read_json(request_path)?;
    let store = open_store(db_path)?;

    let verifier = Verifier::builder(&store)
        .with_options(&config.verifier)
        .build();

    debug!(request = %request_path.display(), "verifying invocation");
    verifier
        .verify(&request.proof, &request.invocation)
        .map_err(Error::Denied)?;

    println!("allowed");
    Ok(())
}

fn cmd_levels(levels: &LogLevels) {
    println!("default: {}", levels.level(""));

    let mut modules: Vec<_> = levels.all_levels().into_iter().collect();
    modules.sort();
    for (module, level) in modules {
        let located: Vec<&str> = logging::LEVELS
            .into_iter()
            .filter(|l| levels.is_enabled_for(&module, *l))
            .filter(|l| levels.is_caller_info_enabled(&module, *l))
            .map(|l| l.as_str())
            .collect();
        if located.is_empty() {
            println!("{module}: {level}");
        } else {
            println!("{module}: {level}  (caller info: {})", located.join(", "));
        }
    }

    println!("filter: {}", levels.directives());
}

fn read_capabilities(path: &Path) -> Result<Vec<Capability>> {
    let value: serde_json::Value = read_json(path)?;
    let parsed = if value.is_array() {
        serde_json::from_value::<Vec<Capability>>(value)
    } else {
        serde_json::from_value::<Capability>(value).map(|capability| vec![capability])
    };
    parsed.map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(|source| Error::Json {
        path: path.to_path_buf(),
        source,
    })
}

fn open_store(db_path: &Path) -> Result<CapabilityStore> {
    if !db_path.exists() {
        return Err(Error::DatabaseNotFound {
            path: db_path.to_path_buf(),
        });
    }

    Ok(CapabilityStore::open(db_path)?)
}

fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        Ok(Config::load(path)?)
    } else {
        Ok(Config::default())
    }
}

fn default_db_path() -> PathBuf {
    dirs_data_dir()
        .unwrap_or_else(|| ".zcap".into())
        .join(DB_FILE)
}

fn dirs_data_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share/zcap"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share")))
            .map(|p| p.join("zcap"))
    }
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|h| PathBuf::from(h).join("zcap"))
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        None
    }
}
