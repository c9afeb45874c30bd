use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    engine::{BusyPolicy, EngineConfig},
    errors::Error,
    intent::{RuleSet, GREETING},
    Result,
};

const DEFAULT_RESPONSE_DELAY_MS: u64 = 1500;
const DEFAULT_QUEUE_LIMIT: usize = 8;

/// Typed configuration for the assistant.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Config {
    pub engine: EngineConfig,
    /// Optional JSON rule file replacing the built-in topics.
    pub rules_file: Option<PathBuf>,
}

impl Config {
    /// Read `.env` (if present) and then the process environment.
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let response_delay = match lookup("DATACHAT_RESPONSE_DELAY_MS") {
            Some(raw) => Duration::from_millis(parse_num::<u64>("DATACHAT_RESPONSE_DELAY_MS", &raw)?),
            None => Duration::from_millis(DEFAULT_RESPONSE_DELAY_MS),
        };

        let queue_limit = match lookup("DATACHAT_QUEUE_LIMIT") {
            Some(raw) => parse_num::<usize>("DATACHAT_QUEUE_LIMIT", &raw)?,
            None => DEFAULT_QUEUE_LIMIT,
        };
        if queue_limit == 0 {
            return Err(Error::Config(
                "DATACHAT_QUEUE_LIMIT must be at least 1".to_string(),
            ));
        }

        let busy_policy = match lookup("DATACHAT_BUSY_POLICY")
            .map(|s| s.trim().to_lowercase())
            .as_deref()
        {
            None | Some("") | Some("reject") => BusyPolicy::Reject,
            Some("queue") => BusyPolicy::Queue {
                max_pending: queue_limit,
            },
            Some(other) => {
                return Err(Error::Config(format!(
                    "DATACHAT_BUSY_POLICY must be `reject` or `queue`, got `{other}`"
                )))
            }
        };

        let greeting = match lookup("DATACHAT_GREETING") {
            None => Some(GREETING.to_string()),
            Some(s) if is_disabled(&s) => None,
            Some(s) => Some(s),
        };

        let rules_file = lookup("DATACHAT_RULES_FILE")
            .and_then(non_empty)
            .map(PathBuf::from);

        Ok(Self {
            engine: EngineConfig {
                response_delay,
                busy_policy,
                greeting,
            },
            rules_file,
        })
    }

    /// Rules from `rules_file`, or the built-in topics when unset.
    pub fn rule_set(&self) -> Result<RuleSet> {
        match &self.rules_file {
            Some(path) => RuleSet::load(path).map_err(|e| match e {
                Error::Io(io) => Error::Config(format!(
                    "cannot read rules file {}: {io}",
                    path.display()
                )),
                other => other,
            }),
            None => Ok(RuleSet::canonical()),
        }
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| Error::Config(format!("{key} must be a non-negative integer, got `{raw}`")))
}

fn is_disabled(s: &str) -> bool {
    matches!(s.trim().to_lowercase().as_str(), "" | "off" | "none" | "false")
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // real env wins
        }

        env::set_var(key, unquote(v.trim()));
    }
}

fn unquote(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        &val[1..val.len() - 1]
    } else {
        val
    }
}
