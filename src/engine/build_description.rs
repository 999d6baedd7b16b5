//! Build description: the immutable document a source directory carries to
//! describe how it is profiled, functioned and bound.
//!
//! Grounded on `original_source/build/build_file.go` (profile/function/
//! include shape) and `data/manifest.go` for the env-binding conventions;
//! rendered here in the declarative serde style the pack uses for
//! document models (see `leynos-whitaker`'s manifest types).

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ArtError, Result};
use crate::input::Input;
use crate::manifest::Network;

/// One `KEY=VALUE` or `KEY!=VALUE` include condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncludeCond {
    Eq(String, String),
    NotEq(String, String),
}

impl IncludeCond {
    fn matches(&self, env: &HashMap<String, String>) -> bool {
        match self {
            IncludeCond::Eq(k, v) => env.get(k).map(|x| x == v).unwrap_or(false),
            IncludeCond::NotEq(k, v) => env.get(k).map(|x| x != v).unwrap_or(true),
        }
    }

    fn parse(raw: &str) -> Result<Self> {
        if let Some((k, v)) = raw.split_once("!=") {
            return Ok(IncludeCond::NotEq(k.trim().to_string(), v.trim().to_string()));
        }
        if let Some((k, v)) = raw.split_once('=') {
            return Ok(IncludeCond::Eq(k.trim().to_string(), v.trim().to_string()));
        }
        Err(ArtError::invalid_build_file(format!(
            "include condition '{raw}' is not KEY=VALUE or KEY!=VALUE"
        )))
    }
}

/// A single `includes` entry: a path and zero or more gating conditions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Include {
    pub path: String,
    pub conditions: Vec<IncludeCond>,
}

/// Raw, pre-condition-parse shape accepted on the wire: either a bare
/// string path or a `[path, cond...]` tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
enum RawInclude {
    Path(String),
    Tuple(Vec<String>),
}

impl RawInclude {
    fn into_include(self) -> Result<Include> {
        match self {
            RawInclude::Path(path) => Ok(Include { path, conditions: vec![] }),
            RawInclude::Tuple(mut parts) => {
                if parts.is_empty() {
                    return Err(ArtError::invalid_build_file("include tuple must not be empty"));
                }
                let path = parts.remove(0);
                let conditions = parts
                    .iter()
                    .map(|c| IncludeCond::parse(c))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Include { path, conditions })
            }
        }
    }
}

/// A named build configuration: its target, environment and ordered
/// command list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    #[serde(default)]
    pub default: bool,
    #[serde(rename = "type", default)]
    pub profile_type: String,
    #[serde(default)]
    pub license: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub run: Vec<String>,
    #[serde(default)]
    pub target: String,
}

/// A named, optionally exported callable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub export: bool,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub run: Vec<String>,
    #[serde(default)]
    pub runtime: String,
    #[serde(default, rename = "input-binding")]
    pub input_binding: InputBinding,
    #[serde(default)]
    pub network: Option<Network>,
}

/// The variable/secret names a function declares it consumes; every entry
/// must name an input declared at the build-description level, except the
/// two well-known registry-credential secrets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputBinding {
    #[serde(default)]
    pub vars: Vec<String>,
    #[serde(default)]
    pub secrets: Vec<String>,
}

const RESERVED_BINDING_SUFFIXES: [&str; 2] = ["OXART_REG_USER", "OXART_REG_PWD"];

fn is_reserved_binding(name: &str) -> bool {
    RESERVED_BINDING_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// The document loaded from a source directory's `build.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildDescription {
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub profiles: Vec<Profile>,
    #[serde(default)]
    pub functions: Vec<Function>,
    #[serde(default)]
    pub input: Input,
    #[serde(rename = "includes", default)]
    raw_includes: Vec<RawInclude>,
}

impl BuildDescription {
    /// Parse from YAML or JSON bytes (both accepted with identical
    /// semantics, per spec §6).
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| ArtError::invalid_build_file(format!("not valid utf-8: {e}")))?;
        let trimmed = text.trim_start();
        let doc: BuildDescription = if trimmed.starts_with('{') {
            serde_json::from_str(text)?
        } else {
            serde_yaml::from_str(text)?
        };
        Ok(doc)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::parse(&bytes)
    }

    /// Recursively resolve `includes` relative to `base_dir`, merging env,
    /// labels, profiles and functions with the child winning name ties
    /// (spec §3). `includes` are gated by `KEY=VALUE`/`KEY!=VALUE`
    /// conditions matched against `env`.
    pub fn resolve_includes(&mut self, base_dir: &Path, env: &HashMap<String, String>) -> Result<()> {
        let raw = std::mem::take(&mut self.raw_includes);
        for raw_include in raw {
            let include = raw_include.into_include()?;
            if !include.conditions.iter().all(|c| c.matches(env)) {
                continue;
            }
            let mut child = BuildDescription::load(&base_dir.join(&include.path))?;
            child.resolve_includes(base_dir, env)?;
            self.merge_child(child);
        }
        Ok(())
    }

    fn merge_child(&mut self, child: BuildDescription) {
        for (k, v) in child.env {
            self.env.insert(k, v);
        }
        for profile in child.profiles {
            if let Some(existing) = self.profiles.iter_mut().find(|p| p.name == profile.name) {
                *existing = profile;
            } else {
                self.profiles.push(profile);
            }
        }
        for function in child.functions {
            if let Some(existing) = self.functions.iter_mut().find(|f| f.name == function.name) {
                *existing = function;
            } else {
                self.functions.push(function);
            }
        }
        self.input.merge(child.input);
    }

    /// Select a profile by explicit name, else the one marked
    /// `default=true`, else the first, failing `NoProfiles` if none exist.
    pub fn select_profile<'a>(&'a self, name: Option<&str>) -> Result<&'a Profile> {
        if let Some(name) = name {
            return self
                .profiles
                .iter()
                .find(|p| p.name == name)
                .ok_or_else(|| ArtError::invalid_build_file(format!("no such profile '{name}'")));
        }
        if let Some(default) = self.profiles.iter().find(|p| p.default) {
            return Ok(default);
        }
        self.profiles.first().ok_or(ArtError::NoProfiles)
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Validate that every function-level binding names a declared input,
    /// and that no profile targets `.` (spec §3 invariants).
    pub fn validate(&self) -> Result<()> {
        for profile in &self.profiles {
            if profile.target == "." {
                return Err(ArtError::invalid_build_file(format!(
                    "profile '{}' may not target '.'",
                    profile.name
                )));
            }
        }
        for function in &self.functions {
            for name in &function.input_binding.vars {
                if self.input.var(name).is_none() {
                    return Err(ArtError::invalid_build_file(format!(
                        "function '{}' binds undeclared var '{name}'",
                        function.name
                    )));
                }
            }
            for name in &function.input_binding.secrets {
                if !is_reserved_binding(name) && self.input.secret(name).is_none() {
                    return Err(ArtError::invalid_build_file(format!(
                        "function '{}' binds undeclared secret '{name}'",
                        function.name
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_yaml_and_json_identically() {
        let yaml = b"env:\n  FOO: bar\nprofiles:\n  - name: default\n    default: true\n    target: out\n";
        let json = br#"{"env":{"FOO":"bar"},"profiles":[{"name":"default","default":true,"target":"out"}]}"#;
        let from_yaml = BuildDescription::parse(yaml).unwrap();
        let from_json = BuildDescription::parse(json).unwrap();
        assert_eq!(from_yaml, from_json);
    }

    #[test]
    fn select_profile_falls_back_to_default_then_first() {
        let doc = BuildDescription {
            profiles: vec![
                Profile { name: "a".into(), ..Default::default() },
                Profile { name: "b".into(), default: true, ..Default::default() },
            ],
            ..Default::default()
        };
        assert_eq!(doc.select_profile(None).unwrap().name, "b");
        assert_eq!(doc.select_profile(Some("a")).unwrap().name, "a");
    }

    #[test]
    fn select_profile_fails_when_empty() {
        let doc = BuildDescription::default();
        assert!(matches!(doc.select_profile(None), Err(ArtError::NoProfiles)));
    }

    #[test]
    fn rejects_profile_targeting_dot() {
        let doc = BuildDescription {
            profiles: vec![Profile { name: "a".into(), target: ".".into(), ..Default::default() }],
            ..Default::default()
        };
        assert!(doc.validate().is_err());
    }

    #[test]
    fn rejects_function_binding_undeclared_var() {
        let doc = BuildDescription {
            functions: vec![Function {
                name: "f".into(),
                input_binding: InputBinding { vars: vec!["MISSING".into()], ..Default::default() },
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(doc.validate().is_err());
    }

    #[test]
    fn allows_reserved_credential_secret_bindings() {
        let doc = BuildDescription {
            functions: vec![Function {
                name: "f".into(),
                input_binding: InputBinding {
                    secrets: vec!["DEPLOY_PUSH_OXART_REG_USER".into()],
                    ..Default::default()
                },
                ..Default::default()
            }],
            ..Default::default()
        };
        assert!(doc.validate().is_ok());
    }

    #[test]
    fn includes_key_is_recognized_on_parse() {
        let yaml = b"includes:\n  - child.yaml\n";
        let doc = BuildDescription::parse(yaml).unwrap();
        assert_eq!(doc.raw_includes.len(), 1);
    }

    #[test]
    fn include_condition_gates_on_env() {
        let eq = IncludeCond::parse("FOO=bar").unwrap();
        let neq = IncludeCond::parse("FOO!=bar").unwrap();
        let mut env = HashMap::new();
        env.insert("FOO".to_string(), "bar".to_string());
        assert!(eq.matches(&env));
        assert!(!neq.matches(&env));
    }
}
