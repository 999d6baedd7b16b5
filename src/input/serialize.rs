//! Input serialization to dotenv, YAML and JSON forms.

use secrecy::ExposeSecret;

use crate::error::Result;
use crate::input::Input;

/// Render `input` as a dotenv-style file: one `NAME=value` line per var and
/// secret, each preceded by a `#`-comment line carrying its description
/// when non-empty.
pub fn to_dotenv(input: &Input) -> String {
    let mut out = String::new();
    for var in &input.vars {
        if !var.description.is_empty() {
            out.push_str(&format!("# {}\n", var.description));
        }
        out.push_str(&format!("{}={}\n", var.name, var.value));
    }
    for secret in &input.secrets {
        if !secret.description.is_empty() {
            out.push_str(&format!("# {}\n", secret.description));
        }
        let value = secret
            .value
            .as_ref()
            .map(|s| s.expose_secret().to_string())
            .unwrap_or_default();
        out.push_str(&format!("{}={}\n", secret.name, value));
    }
    out
}

/// Canonical YAML form.
pub fn to_yaml(input: &Input) -> Result<String> {
    Ok(serde_yaml::to_string(input)?)
}

/// Canonical JSON form.
pub fn to_json(input: &Input) -> Result<String> {
    Ok(serde_json::to_string_pretty(input)?)
}
