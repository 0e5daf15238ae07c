//! Per-module log levels and subscriber setup.

use crate::config::LogConfig;
use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};
use tracing::Level;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// All levels, most severe first.
pub const LEVELS: [Level; 5] = [Level::ERROR, Level::WARN, Level::INFO, Level::DEBUG, Level::TRACE];

/// Module-to-level table used to build the tracing filter.
///
/// Modules without an explicit level fall back to the default.
#[derive(Debug)]
pub struct LogLevels {
    inner: RwLock<Table>,
}

#[derive(Debug)]
struct Table {
    default: Level,
    levels: HashMap<String, Level>,
    caller_info: HashSet<(String, Level)>,
}

impl LogLevels {
    pub fn new(default: Level) -> Self {
        Self {
            inner: RwLock::new(Table {
                default,
                levels: HashMap::new(),
                caller_info: HashSet::new(),
            }),
        }
    }

    /// Build the table from the `[log]` config section.
    pub fn from_config(config: &LogConfig) -> Result<Self> {
        let levels = Self::new(parse_level(&config.level)?);
        for (module, level) in &config.modules {
            levels.set_level(module, parse_level(level)?);
        }
        for module in &config.caller_info {
            for level in LEVELS {
                levels.show_caller_info(module, level);
            }
        }
        Ok(levels)
    }

    pub fn set_level(&self, module: &str, level: Level) {
        self.write().levels.insert(module.to_string(), level);
    }

    pub fn level(&self, module: &str) -> Level {
        let table = self.read();
        table.levels.get(module).copied().unwrap_or(table.default)
    }

    pub fn all_levels(&self) -> HashMap<String, Level> {
        self.read().levels.clone()
    }

    pub fn is_enabled_for(&self, module: &str, level: Level) -> bool {
        level <= self.level(module)
    }

    pub fn show_caller_info(&self, module: &str, level: Level) {
        self.write().caller_info.insert((module.to_string(), level));
    }

    pub fn is_caller_info_enabled(&self, module: &str, level: Level) -> bool {
        self.read()
            .caller_info
            .contains(&(module.to_string(), level))
    }

    /// `EnvFilter` directives, default first, modules sorted.
    pub fn directives(&self) -> String {
        let table = self.read();
        let mut modules: Vec<_> = table.levels.iter().collect();
        modules.sort();

        let mut directives = vec![directive_level(table.default)];
        directives.extend(
            modules
                .into_iter()
                .map(|(module, level)| format!("{module}={}", directive_level(*level))),
        );
        directives.join(",")
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Table> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Table> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for LogLevels {
    fn default() -> Self {
        Self::new(Level::INFO)
    }
}

/// Install the global subscriber. `RUST_LOG` wins over the table when set.
///
/// Events whose module and level are in the caller-info set are printed
/// with file and line; everything else without.
pub fn init(levels: &LogLevels) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(levels.directives()));

    let located = levels.read().caller_info.clone();
    let plain = located.clone();

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(filter_fn(move |meta| {
                    !wants_caller_info(&plain, meta.target(), *meta.level())
                })),
        )
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_file(true)
                .with_line_number(true)
                .with_filter(filter_fn(move |meta| {
                    wants_caller_info(&located, meta.target(), *meta.level())
                })),
        )
        .try_init();
}

/// Whether an event from `target` at `level` is covered by a caller-info
/// entry. An entry for `zcap` also covers `zcap::verifier`.
fn wants_caller_info(entries: &HashSet<(String, Level)>, target: &str, level: Level) -> bool {
    entries.iter().any(|(module, entry_level)| {
        *entry_level == level
            && target
                .strip_prefix(module.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
    })
}

/// Parse a level name, accepting the `critical`/`warning` spellings.
pub fn parse_level(name: &str) -> Result<Level> {
    match name.to_ascii_lowercase().as_str() {
        "critical" => Ok(Level::ERROR),
        "warning" => Ok(Level::WARN),
        other => other
            .parse()
            .map_err(|_| Error::Config(format!("unknown log level '{name}'"))),
    }
}

fn directive_level(level: Level) -> String {
    level.as_str().to_ascii_lowercase()
}
