//! Configuration module for tcpping.
//!
//! Loads target descriptors from environment variables.

use std::env;
use std::ffi::OsString;

/// Prefix marking an environment variable as a target descriptor.
pub const TASK_ENV_PREFIX: &str = "TCP_PING_";

const PROJECT_ID_ENV: &str = "PROJECT_ID";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Target descriptors as `(variable name, descriptor)`, ordered by name.
    pub descriptors: Vec<(String, String)>,
    /// Project used to build sink log names (default: empty)
    pub project_id: String,
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `TCP_PING_*`: one target descriptor each
    /// - `PROJECT_ID`: project part of the sink log name
    pub fn load() -> Self {
        Self::from_vars(relevant_vars(env::vars_os()))
    }

    /// Build configuration from arbitrary `(name, value)` pairs.
    pub fn from_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut cfg = Self::default();

        for (name, value) in vars {
            if name == PROJECT_ID_ENV {
                cfg.project_id = value;
            } else if name.starts_with(TASK_ENV_PREFIX) {
                cfg.descriptors.push((name, value));
            }
        }

        cfg.descriptors.sort();
        cfg
    }
}

fn is_relevant(name: &str) -> bool {
    name == PROJECT_ID_ENV || name.starts_with(TASK_ENV_PREFIX)
}

/// Keep our own variables, skipping any whose value is not UTF-8.
fn relevant_vars<I>(vars: I) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    vars.into_iter()
        .filter_map(|(name, value)| {
            let name = name.into_string().ok().filter(|n| is_relevant(n))?;
            match value.into_string() {
                Ok(value) => Some((name, value)),
                Err(_) => {
                    tracing::error!("Skipping {}: value is not valid UTF-8", name);
                    None
                }
            }
        })
        .collect()
}
