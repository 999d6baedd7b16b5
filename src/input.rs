//! Declared inputs: typed variables, secrets and files consumed by profiles
//! and functions.

pub mod file;
pub mod secret;
pub mod serialize;
pub mod survey;
pub mod var;

use serde::{Deserialize, Serialize};

pub use file::FileInput;
pub use secret::Secret;
pub use var::{Var, VarType};

/// An ordered declaration of vars, secrets and files. The source-of-truth
/// sort order on serialization is lexicographic by name (case-insensitive,
/// ties broken case-sensitively).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    #[serde(rename = "var", default)]
    pub vars: Vec<Var>,
    #[serde(rename = "secret", default)]
    pub secrets: Vec<Secret>,
    #[serde(rename = "file", default)]
    pub files: Vec<FileInput>,
}

fn sort_key(name: &str) -> (String, &str) {
    (name.to_lowercase(), name)
}

impl Input {
    /// Re-sort every declaration list by name (case-insensitive, ties
    /// broken case-sensitively).
    pub fn sort(&mut self) {
        self.vars.sort_by(|a, b| sort_key(&a.name).cmp(&sort_key(&b.name)));
        self.secrets.sort_by(|a, b| sort_key(&a.name).cmp(&sort_key(&b.name)));
        self.files.sort_by(|a, b| sort_key(&a.name).cmp(&sort_key(&b.name)));
    }

    /// Merge `other` into `self`, deduplicating by name (the incoming
    /// declaration wins ties) and re-sorting.
    pub fn merge(&mut self, other: Input) {
        for v in other.vars {
            if let Some(existing) = self.vars.iter_mut().find(|e| e.name == v.name) {
                *existing = v;
            } else {
                self.vars.push(v);
            }
        }
        for s in other.secrets {
            if let Some(existing) = self.secrets.iter_mut().find(|e| e.name == s.name) {
                *existing = s;
            } else {
                self.secrets.push(s);
            }
        }
        for f in other.files {
            if let Some(existing) = self.files.iter_mut().find(|e| e.name == f.name) {
                *existing = f;
            } else {
                self.files.push(f);
            }
        }
        self.sort();
    }

    pub fn var(&self, name: &str) -> Option<&Var> {
        self.vars.iter().find(|v| v.name == name)
    }

    pub fn secret(&self, name: &str) -> Option<&Secret> {
        self.secrets.iter().find(|s| s.name == name)
    }
}

/// Normalize a flow/step name: upper-case, replacing `-`, `.`, `/` with `_`.
fn normalize_flow_step_component(s: &str) -> String {
    s.to_uppercase().replace(['-', '.', '/'], "_")
}

/// The two reserved secret names auto-injected per flow step unless the
/// step's package source is `read` (spec §4.5).
pub fn reserved_secret_names(flow: &str, step: &str) -> (String, String) {
    let flow = normalize_flow_step_component(flow);
    let step = normalize_flow_step_component(step);
    (
        format!("{flow}_{step}_OXART_REG_USER"),
        format!("{flow}_{step}_OXART_REG_PWD"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_is_case_insensitive_with_case_sensitive_tiebreak() {
        let mut input = Input {
            vars: vec![
                Var { name: "Banana".into(), ..Default::default() },
                Var { name: "apple".into(), ..Default::default() },
                Var { name: "banana".into(), ..Default::default() },
            ],
            ..Default::default()
        };
        input.sort();
        let names: Vec<_> = input.vars.iter().map(|v| v.name.clone()).collect();
        assert_eq!(names, vec!["apple", "Banana", "banana"]);
    }

    #[test]
    fn merge_deduplicates_by_name_and_resorts() {
        let mut a = Input {
            vars: vec![Var { name: "b".into(), value: "old".into(), ..Default::default() }],
            ..Default::default()
        };
        let b = Input {
            vars: vec![
                Var { name: "a".into(), value: "new-a".into(), ..Default::default() },
                Var { name: "b".into(), value: "new-b".into(), ..Default::default() },
            ],
            ..Default::default()
        };
        a.merge(b);
        assert_eq!(a.vars.len(), 2);
        assert_eq!(a.vars[0].name, "a");
        assert_eq!(a.vars[1].value, "new-b");
    }

    #[test]
    fn reserved_secret_names_normalize_components() {
        let (user, pwd) = reserved_secret_names("my-flow", "step.one/extra");
        assert_eq!(user, "MY_FLOW_STEP_ONE_EXTRA_OXART_REG_USER");
        assert_eq!(pwd, "MY_FLOW_STEP_ONE_EXTRA_OXART_REG_PWD");
    }
}
