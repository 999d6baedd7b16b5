//! Variable substitution: `${NAME}` interpolation over an assembled
//! environment, recursive up to a bounded depth.
//!
//! Grounded on `original_source/core/lib.go`'s `MergeEnvironmentVars`; the
//! interactive-prompt branch there is reimplemented against the input
//! survey system rather than inline, since this core treats required-ness
//! at the input level (see `ArtError::unresolved_variable` doc).

use std::collections::HashMap;

use regex::Regex;

use crate::error::{ArtError, Result};

const MAX_SUBSTITUTION_DEPTH: usize = 16;

fn var_pattern() -> Regex {
    Regex::new(r"\$\{([^}]*)\}").expect("static pattern")
}

/// Replace every `${NAME}` in `value` with its binding in `env`, repeating
/// until no replacement changes the string or `MAX_SUBSTITUTION_DEPTH` is
/// reached. An unresolved reference that survives to the depth bound fails
/// `UnresolvedVariable`.
pub fn substitute(value: &str, env: &HashMap<String, String>) -> Result<String> {
    let pattern = var_pattern();
    let mut current = value.to_string();
    for _ in 0..MAX_SUBSTITUTION_DEPTH {
        if !pattern.is_match(&current) {
            return Ok(current);
        }
        let mut changed = false;
        let next = pattern
            .replace_all(&current, |caps: &regex::Captures| {
                let name = &caps[1];
                match env.get(name) {
                    Some(v) => {
                        changed = true;
                        v.clone()
                    }
                    None => caps[0].to_string(),
                }
            })
            .into_owned();
        if !changed {
            let name = pattern
                .captures(&next)
                .map(|c| c[1].to_string())
                .unwrap_or_default();
            return Err(ArtError::unresolved_variable(name));
        }
        current = next;
    }
    Err(ArtError::unresolved_variable(value))
}

/// Apply [`substitute`] to every value in `env`, one pass, returning a new
/// map. Keys are untouched.
pub fn substitute_all(env: &HashMap<String, String>) -> Result<HashMap<String, String>> {
    let mut out = HashMap::with_capacity(env.len());
    for (k, v) in env {
        out.insert(k.clone(), substitute(v, env)?);
    }
    Ok(out)
}

/// Overlay `overlay` onto `base`, returning the merged map (`overlay` wins
/// on key collision). Used to layer process env < build-description env <
/// profile env < function env (spec §4.4 step 5).
pub fn overlay(base: &HashMap<String, String>, overlay: &HashMap<String, String>) -> HashMap<String, String> {
    let mut merged = base.clone();
    for (k, v) in overlay {
        merged.insert(k.clone(), v.clone());
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_a_simple_reference() {
        let mut env = HashMap::new();
        env.insert("NAME".to_string(), "world".to_string());
        assert_eq!(substitute("hello ${NAME}", &env).unwrap(), "hello world");
    }

    #[test]
    fn substitutes_recursively() {
        let mut env = HashMap::new();
        env.insert("A".to_string(), "${B}".to_string());
        env.insert("B".to_string(), "done".to_string());
        assert_eq!(substitute("${A}", &env).unwrap(), "done");
    }

    #[test]
    fn fails_on_undeclared_reference() {
        let env = HashMap::new();
        assert!(substitute("${MISSING}", &env).is_err());
    }

    #[test]
    fn fails_on_cycle() {
        let mut env = HashMap::new();
        env.insert("A".to_string(), "${B}".to_string());
        env.insert("B".to_string(), "${A}".to_string());
        assert!(substitute("${A}", &env).is_err());
    }

    #[test]
    fn overlay_prefers_later_map() {
        let mut base = HashMap::new();
        base.insert("X".to_string(), "base".to_string());
        let mut over = HashMap::new();
        over.insert("X".to_string(), "overlay".to_string());
        let merged = overlay(&base, &over);
        assert_eq!(merged["X"], "overlay");
    }
}
