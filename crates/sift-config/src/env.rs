use std::env;

use regex::{Captures, Regex};

use crate::ConfigError;

/// Expand `${VAR_NAME}` placeholders from the process environment.
/// Every placeholder must resolve; unresolved names are collected and
/// reported together rather than one at a time.
pub fn interpolate_env(input: &str) -> Result<String, ConfigError> {
    let placeholder = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap();

    let mut missing: Vec<String> = Vec::new();
    let expanded = placeholder.replace_all(input, |caps: &Captures| {
        let name = &caps[1];
        env::var(name).unwrap_or_else(|_| {
            if !missing.iter().any(|m| m == name) {
                missing.push(name.to_string());
            }
            String::new()
        })
    });

    if missing.is_empty() {
        Ok(expanded.into_owned())
    } else {
        Err(ConfigError::MissingEnvVars(missing))
    }
}
