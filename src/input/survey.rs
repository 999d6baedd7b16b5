//! Four-source precedence resolution for declared inputs.

use std::collections::HashMap;
use std::path::Path;

use secrecy::SecretString;

use crate::error::{ArtError, Result};
use crate::input::{Input, var::Var};

/// Resolve every declared [`Var`] and [`Secret`] in `input` against the
/// four-source precedence stack (spec §4.5): existing value, environment
/// variable, interactive prompt (only when `interactive`), declared
/// default. Required-but-unresolved vars fail [`ArtError::InputRequired`]
/// unless running interactively.
pub fn survey(
    input: &mut Input,
    env: &HashMap<String, String>,
    interactive: bool,
    files_dir: &Path,
) -> Result<()> {
    for var in &mut input.vars {
        resolve_var(var, env, interactive)?;
    }
    for secret in &mut input.secrets {
        resolve_secret(secret, env, interactive)?;
    }
    for file in &mut input.files {
        resolve_file(file, files_dir)?;
    }
    Ok(())
}

fn resolve_var(var: &mut Var, env: &HashMap<String, String>, interactive: bool) -> Result<()> {
    if !var.value.is_empty() {
        return validate_or_prompt(var, interactive);
    }
    if let Some(v) = env.get(&var.name) {
        var.value = v.clone();
        return validate_or_prompt(var, interactive);
    }
    if interactive {
        let prompt = format!("{}: ", var.name);
        let answer: String = dialoguer::Input::new()
            .with_prompt(prompt)
            .default(var.default.clone())
            .interact_text()
            .map_err(|e| ArtError::io(e.to_string()))?;
        var.value = answer;
        return Ok(());
    }
    if !var.default.is_empty() {
        var.value = var.default.clone();
        return Ok(());
    }
    if var.required {
        return Err(ArtError::InputRequired(var.name.clone()));
    }
    Ok(())
}

fn validate_or_prompt(var: &mut Var, interactive: bool) -> Result<()> {
    match var.validate(&var.value) {
        Ok(()) => Ok(()),
        Err(e) if interactive => {
            let prompt = format!("{} (invalid: {e}), re-enter: ", var.name);
            let answer: String = dialoguer::Input::new()
                .with_prompt(prompt)
                .interact_text()
                .map_err(|e| ArtError::io(e.to_string()))?;
            var.value = answer;
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn resolve_secret(
    secret: &mut crate::input::secret::Secret,
    env: &HashMap<String, String>,
    interactive: bool,
) -> Result<()> {
    use secrecy::ExposeSecret;
    if secret.value.as_ref().map(|s| !s.expose_secret().is_empty()).unwrap_or(false) {
        return Ok(());
    }
    if let Some(v) = env.get(&secret.name) {
        secret.value = Some(SecretString::from(v.clone()));
        return Ok(());
    }
    if interactive {
        let prompt = format!("{}: ", secret.name);
        let answer = dialoguer::Password::new()
            .with_prompt(prompt)
            .interact()
            .map_err(|e| ArtError::io(e.to_string()))?;
        secret.value = Some(SecretString::from(answer));
        return Ok(());
    }
    if secret.required {
        return Err(ArtError::InputRequired(secret.name.clone()));
    }
    Ok(())
}

fn resolve_file(file: &mut crate::input::file::FileInput, files_dir: &Path) -> Result<()> {
    if !file.content.is_empty() {
        return Ok(());
    }
    if file.path.is_empty() {
        return Ok(());
    }
    let full = files_dir.join(&file.path);
    if full.exists() {
        file.content = std::fs::read_to_string(&full)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::var::VarType;

    #[test]
    fn existing_value_wins_over_env_and_default() {
        let mut var = Var {
            name: "HOST".into(),
            value: "already-set".into(),
            default: "fallback".into(),
            ..Default::default()
        };
        let mut env = HashMap::new();
        env.insert("HOST".into(), "from-env".into());
        resolve_var(&mut var, &env, false).unwrap();
        assert_eq!(var.value, "already-set");
    }

    #[test]
    fn env_wins_over_default() {
        let mut var = Var {
            name: "HOST".into(),
            default: "fallback".into(),
            ..Default::default()
        };
        let mut env = HashMap::new();
        env.insert("HOST".into(), "from-env".into());
        resolve_var(&mut var, &env, false).unwrap();
        assert_eq!(var.value, "from-env");
    }

    #[test]
    fn default_used_when_nothing_else_set() {
        let mut var = Var {
            name: "HOST".into(),
            default: "fallback".into(),
            var_type: VarType::String,
            ..Default::default()
        };
        resolve_var(&mut var, &HashMap::new(), false).unwrap();
        assert_eq!(var.value, "fallback");
    }

    #[test]
    fn required_missing_fails_non_interactive() {
        let mut var = Var {
            name: "HOST".into(),
            required: true,
            ..Default::default()
        };
        assert!(resolve_var(&mut var, &HashMap::new(), false).is_err());
    }

    #[test]
    fn optional_missing_leaves_value_empty() {
        let mut var = Var {
            name: "HOST".into(),
            required: false,
            ..Default::default()
        };
        resolve_var(&mut var, &HashMap::new(), false).unwrap();
        assert_eq!(var.value, "");
    }
}
