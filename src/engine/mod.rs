//! The build/execution engine: command parsing, environment merging and
//! sub-shell/function-call evaluation (spec §4.4 steps 5 and 7, reused
//! verbatim by the Builder and the Runner).

pub mod build_description;
pub mod env;
pub mod exec;
pub mod subshell;

use std::collections::HashMap;
use std::path::Path;

use crate::error::{ArtError, Result};

pub use build_description::{BuildDescription, Function, Include, IncludeCond, InputBinding, Profile};

const MAX_FUNCTION_CALL_DEPTH: usize = 8;

/// Run one command string: substitute `${NAME}` references against `env`,
/// resolve any `$[ … ]` sub-shell expressions, dispatch a bare `$(fx_name)`
/// function call recursively, or execute the result via the host shell.
fn execute_command(
    raw: &str,
    workdir: &Path,
    env: &HashMap<String, String>,
    functions: &HashMap<&str, &Function>,
    depth: usize,
) -> Result<()> {
    let substituted = self::env::substitute(raw, env)?;

    if let Some(fx_name) = subshell::has_function(&substituted) {
        if substituted.trim() == format!("$({fx_name})") {
            return run_function_by_name(&fx_name, workdir, env, functions, depth);
        }
    }

    let mut current = substituted;
    while subshell::has_shell(&current).is_some() {
        current = subshell::evaluate(&current, workdir, env)?;
    }

    exec::run(&current, workdir, env).map(|_| ())
}

fn run_function_by_name(
    name: &str,
    workdir: &Path,
    base_env: &HashMap<String, String>,
    functions: &HashMap<&str, &Function>,
    depth: usize,
) -> Result<()> {
    if depth >= MAX_FUNCTION_CALL_DEPTH {
        return Err(ArtError::invalid_build_file(format!(
            "function call depth exceeded invoking '{name}'"
        )));
    }
    let function = functions
        .get(name)
        .ok_or_else(|| ArtError::not_found(format!("function '{name}'")))?;
    run_function(function, base_env, workdir, functions, depth + 1)
}

/// Execute every command of `function` in order. Function-level env is
/// merged fresh for each command so it does not leak between the
/// function's own commands or persist past this call (spec §4.4, closing
/// paragraph of 4.4).
pub fn run_function(
    function: &Function,
    base_env: &HashMap<String, String>,
    workdir: &Path,
    functions: &HashMap<&str, &Function>,
    depth: usize,
) -> Result<()> {
    for command in &function.run {
        let merged = self::env::overlay(base_env, &function.env);
        execute_command(command, workdir, &merged, functions, depth)?;
    }
    Ok(())
}

/// Execute every run command of `profile` in order, against `env` (already
/// overlaid with build-description and profile env per step 5).
pub fn run_profile(
    profile: &Profile,
    env: &HashMap<String, String>,
    workdir: &Path,
    functions: &HashMap<&str, &Function>,
) -> Result<()> {
    for command in &profile.run {
        execute_command(command, workdir, env, functions, 0)
            .map_err(|e| match e {
                ArtError::NotFound(_) => ArtError::invalid_build_file(format!(
                    "profile '{}' references an unknown function: {e}",
                    profile.name
                )),
                other => other,
            })?;
    }
    Ok(())
}

/// Build a name-indexed lookup table over a build description's functions,
/// for use with [`run_profile`] and [`run_function`].
pub fn function_index(doc: &BuildDescription) -> HashMap<&str, &Function> {
    doc.functions.iter().map(|f| (f.name.as_str(), f)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn runs_a_profile_with_plain_commands() {
        let profile = Profile {
            name: "default".into(),
            run: vec!["true".to_string()],
            ..Default::default()
        };
        let functions = HashMap::new();
        run_profile(&profile, &HashMap::new(), Path::new("."), &functions).unwrap();
    }

    #[test]
    fn profile_referencing_unknown_function_fails_clearly() {
        let profile = Profile {
            name: "default".into(),
            run: vec!["$(missing_fx)".to_string()],
            ..Default::default()
        };
        let functions = HashMap::new();
        let err = run_profile(&profile, &HashMap::new(), Path::new("."), &functions).unwrap_err();
        assert!(err.to_string().contains("unknown function"));
    }

    #[test]
    fn function_call_recursion_is_depth_bounded() {
        let a = Function {
            name: "a".into(),
            run: vec!["$(b)".to_string()],
            ..Default::default()
        };
        let b = Function {
            name: "b".into(),
            run: vec!["$(a)".to_string()],
            ..Default::default()
        };
        let mut functions: HashMap<&str, &Function> = HashMap::new();
        functions.insert("a", &a);
        functions.insert("b", &b);
        let err = run_function_by_name("a", Path::new("."), &HashMap::new(), &functions, 0).unwrap_err();
        assert!(err.to_string().contains("depth"));
    }
}
