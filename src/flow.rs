//! The flow manager: declarative multi-step pipelines with per-step input
//! derivation (spec §4.7).
//!
//! Grounded on `original_source/flow/flow.go` (`Flow`/`Git` model,
//! `RequiresGitSource`/`IsValid` validation), `original_source/flow/step.go`
//! (`Step` and its `surveyBuildfile`/`surveyManifest` predicates), and
//! `original_source/flow/flowman.go` (`Merge`/`Run`/`postFlow` — the
//! TLS-first, HTTP-fallback POST to a runner's `/flow` endpoint).

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::BuildDescription;
use crate::error::{ArtError, Result};
use crate::input::Input;
use crate::name::PackageName;
use crate::registry::Registry;

const GIT_URI_DESC: &str = "the URI of the GIT repository";
const GIT_BRANCH_DESC: &str = "the branch to be used to clone the project from the GIT repository";
const GIT_USER_DESC: &str = "the user name to be used to authenticate with the GIT repository";
const GIT_PASSWORD_DESC: &str = "the password or token to be used to authenticate with the GIT repository";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Git coordinates for a flow whose steps are sourced from a source tree
/// rather than packaged manifests.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Git {
    #[serde(rename = "git_uri")]
    pub uri: String,
    #[serde(rename = "git_branch", default, skip_serializing_if = "String::is_empty")]
    pub branch: String,
    #[serde(rename = "git_login", default, skip_serializing_if = "String::is_empty")]
    pub login: String,
    #[serde(rename = "git_password", default, skip_serializing_if = "String::is_empty")]
    pub password: String,
}

/// How a step's package participates in the flow (spec §3 Flow).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepSource {
    Create,
    Merge,
    Read,
}

/// One step in a flow: either a bare function (git-sourced) or a function
/// (or merge) against a named package (package-sourced).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub function: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub package: String,
    #[serde(rename = "source", default, skip_serializing_if = "Option::is_none")]
    pub package_source: Option<StepSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Input>,
    #[serde(default)]
    pub privileged: bool,
}

impl Step {
    /// A function-only step needs a build description (git source) to
    /// survey — it names no package.
    fn surveys_buildfile(&self, requires_git_source: bool) -> bool {
        requires_git_source && !self.function.is_empty() && self.package.is_empty()
    }

    /// A step names a function against a package, or merges a package
    /// without naming a function.
    fn surveys_manifest(&self) -> bool {
        (!self.function.is_empty() && !self.package.is_empty())
            || (!self.package.is_empty() && self.function.is_empty() && self.package_source == Some(StepSource::Merge))
    }
}

/// A declarative multi-step pipeline (spec §3 Flow, §4.7).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flow {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git: Option<Git>,
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Input>,
    #[serde(rename = "use_runtimes", default = "default_true")]
    pub use_runtimes: bool,
}

fn default_true() -> bool {
    true
}

impl Flow {
    /// Parse a bare or merged flow from YAML bytes.
    pub fn from_yaml(bytes: &[u8]) -> Result<Self> {
        Ok(serde_yaml::from_slice(bytes)?)
    }

    /// Parse a merged flow from JSON bytes (the wire format `run` posts).
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_yaml(&bytes)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// A wrapped key-value item envelope suitable for ingestion by a
    /// catalog service (spec §4.7 "wrapped key-value item envelope"),
    /// supplemented from `original_source/flow/flowman.go`'s `Item`/
    /// `SaveOnixJSON`.
    pub fn to_item_envelope(&self) -> Result<Value> {
        let meta = serde_json::to_value(self)?;
        Ok(serde_json::json!({
            "key": format!("ART_FLOW_{}", self.name),
            "name": self.name,
            "description": format!("defines the execution flow for {}", self.name),
            "type": "ART_FLOW",
            "meta": meta,
        }))
    }

    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn step_by_fx(&self, fx_name: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.function == fx_name)
    }

    pub fn add_labels(&mut self, labels: &[(String, String)]) {
        for (k, v) in labels {
            self.labels.insert(k.clone(), v.clone());
        }
    }

    /// A git source is required when some step names a bare function with
    /// no package, and no step uses a package source instead.
    pub fn requires_git_source(&self) -> bool {
        let mut use_git = false;
        let mut use_package = false;
        for step in &self.steps {
            if step.package.is_empty() && !step.function.is_empty() {
                use_git = true;
            }
            if !step.package.is_empty() && step.package_source.is_some() && !step.function.is_empty() {
                use_package = true;
            }
        }
        use_git && !use_package
    }

    pub fn requires_secrets(&self) -> bool {
        self.steps
            .iter()
            .any(|s| s.input.as_ref().is_some_and(|i| !i.secrets.is_empty()))
    }

    pub fn requires_file(&self) -> bool {
        self.steps
            .iter()
            .any(|s| s.input.as_ref().is_some_and(|i| !i.files.is_empty()))
    }

    /// Constraints from spec §3: if any step is git-sourced no step may
    /// carry a source; otherwise the first step must be `create`, and any
    /// later `read` step must name the package of the preceding `create`
    /// or `merge`.
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(ArtError::invalid_build_file("flow has no steps"));
        }
        if self.requires_git_source() {
            self.validate_git_source()
        } else {
            self.validate_non_git_source()
        }
    }

    fn validate_git_source(&self) -> Result<()> {
        let git = self
            .git
            .as_ref()
            .ok_or_else(|| ArtError::invalid_build_file("flow with git source requires 'git' coordinates"))?;
        if git.uri.is_empty() {
            return Err(ArtError::invalid_build_file("git source flow requires 'git_uri'"));
        }
        if self.steps.iter().any(|s| s.package_source.is_some()) {
            return Err(ArtError::invalid_build_file(
                "flow with git source must not define a 'source' attribute on any step",
            ));
        }
        Ok(())
    }

    fn validate_non_git_source(&self) -> Result<()> {
        let first = &self.steps[0];
        if first.package_source != Some(StepSource::Create) {
            return Err(ArtError::invalid_build_file(
                "first step in a non-git-sourced flow must have source 'create'",
            ));
        }
        let mut previous_package = String::new();
        for step in &self.steps {
            match step.package_source {
                Some(StepSource::Create) | Some(StepSource::Merge) => {
                    previous_package = step.package.clone();
                }
                Some(StepSource::Read) if step.package != previous_package => {
                    return Err(ArtError::invalid_build_file(
                        "a 'read' step must name the package of the preceding 'create' or 'merge' step",
                    ));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Survey every step's effective input source, aggregate the result
    /// into `self.input` in step order, and fill git variables if
    /// required. `interactive` controls prompting; with `registry`/
    /// `build_description` absent the survey can still fill declared
    /// defaults and environment-sourced values.
    pub fn merge(
        &mut self,
        build_description: Option<&BuildDescription>,
        registry: Option<&Registry>,
        env: &HashMap<String, String>,
        interactive: bool,
        files_dir: &Path,
    ) -> Result<()> {
        let requires_git = self.requires_git_source();
        if requires_git {
            self.populate_git(env, interactive)?;
        }

        let mut aggregate = Input::default();
        for step in &mut self.steps {
            if step.surveys_buildfile(requires_git) {
                let doc = build_description
                    .ok_or_else(|| ArtError::invalid_build_file("a build description is required to merge this flow"))?;
                let mut input = doc.input.clone();
                crate::input::survey::survey(&mut input, env, interactive, files_dir)?;
                add_git_variables(&mut input);
                aggregate.merge(input.clone());
                step.input = Some(input);
            } else if step.surveys_manifest() {
                let name = PackageName::parse(&step.package)?;
                let registry = registry
                    .ok_or_else(|| ArtError::invalid_build_file("a registry is required to merge this flow"))?;
                let manifest = registry.manifest(&name)?;
                let mut input = manifest
                    .function(&step.function)
                    .and_then(|fx| fx.input.clone())
                    .unwrap_or_default();
                crate::input::survey::survey(&mut input, env, interactive, files_dir)?;
                let (user_name, pwd_name) = crate::input::reserved_secret_names(&self.name, &step.name);
                add_registry_credentials(&mut input, &user_name, &pwd_name, env, interactive)?;
                aggregate.merge(input.clone());
                step.input = Some(input);
            }
        }
        self.input = Some(aggregate);
        self.validate()
    }

    fn populate_git(&mut self, env: &HashMap<String, String>, interactive: bool) -> Result<()> {
        let mut uri = crate::input::Var {
            name: "GIT_URI".into(),
            description: GIT_URI_DESC.into(),
            required: true,
            var_type: crate::input::VarType::Uri,
            ..Default::default()
        };
        let mut branch = crate::input::Var {
            name: "GIT_BRANCH".into(),
            description: GIT_BRANCH_DESC.into(),
            ..Default::default()
        };
        let mut login = crate::input::Var {
            name: "GIT_USER".into(),
            description: GIT_USER_DESC.into(),
            ..Default::default()
        };
        let mut password = crate::input::Var {
            name: "GIT_PASSWORD".into(),
            description: GIT_PASSWORD_DESC.into(),
            ..Default::default()
        };
        resolve_into(&mut uri, env, interactive)?;
        resolve_into(&mut branch, env, interactive)?;
        resolve_into(&mut login, env, interactive)?;
        resolve_into(&mut password, env, interactive)?;
        self.git = Some(Git {
            uri: uri.value,
            branch: branch.value,
            login: login.value,
            password: password.value,
        });
        Ok(())
    }

    /// POST the merged flow JSON to `runner_name`'s `/flow` endpoint,
    /// trying HTTPS first and falling back to plain HTTP with a logged
    /// warning (spec §4.7, mirrors §4.6's retry discipline).
    pub async fn run(&self, runner_name: &str, creds: Option<&Credentials>, interactive: bool) -> Result<String> {
        let _ = interactive;
        let body = self.to_json()?.into_bytes();
        let https_url = format!("https://{runner_name}/flow");
        let http_url = format!("http://{runner_name}/flow");

        let client = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?;

        match post_with_retry(&client, &https_url, &body, creds).await {
            Ok(text) => Ok(text),
            Err(https_err) => match post_with_retry(&client, &http_url, &body, creds).await {
                Ok(text) => {
                    log::warn!("remote runner '{runner_name}' does not use TLS - this is a security risk");
                    Ok(text)
                }
                Err(_) => Err(https_err),
            },
        }
    }
}

async fn post_with_retry(
    client: &reqwest::Client,
    url: &str,
    body: &[u8],
    creds: Option<&Credentials>,
) -> Result<String> {
    let mut last_err: Option<ArtError> = None;
    for attempt in 0..MAX_ATTEMPTS {
        let mut request = client.post(url).header("Content-Type", "application/json").body(body.to_vec());
        if let Some(c) = creds {
            request = request.basic_auth(&c.user, Some(c.password.expose_secret()));
        }
        match request.send().await {
            Ok(resp) if resp.status().as_u16() < 300 => {
                return Ok(resp.text().await.unwrap_or_default());
            }
            Ok(resp) => {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_default();
                last_err = Some(ArtError::network(format!("{status}, {text}")));
            }
            Err(e) => last_err = Some(ArtError::network(e.to_string())),
        }
        if attempt + 1 < MAX_ATTEMPTS {
            tokio::time::sleep(RETRY_DELAY).await;
        }
    }
    Err(last_err.unwrap_or_else(|| ArtError::network("flow post failed with no recorded error")))
}

/// Basic-auth credentials for a flow run, re-exported here so callers
/// don't need to depend on [`crate::remote`] just to call [`Flow::run`].
#[derive(Clone)]
pub struct Credentials {
    pub user: String,
    pub password: SecretString,
}

impl From<crate::remote::Credentials> for Credentials {
    fn from(c: crate::remote::Credentials) -> Self {
        Credentials { user: c.user, password: c.password }
    }
}

fn resolve_into(var: &mut crate::input::Var, env: &HashMap<String, String>, interactive: bool) -> Result<()> {
    if let Some(v) = env.get(&var.name) {
        var.value = v.clone();
        return Ok(());
    }
    if interactive {
        let prompt = format!("{}: ", var.name);
        let answer: String = dialoguer::Input::new()
            .with_prompt(prompt)
            .allow_empty(!var.required)
            .interact_text()
            .map_err(|e| ArtError::io(e.to_string()))?;
        var.value = answer;
        return Ok(());
    }
    if var.required && var.value.is_empty() {
        return Err(ArtError::InputRequired(var.name.clone()));
    }
    Ok(())
}

fn add_git_variables(input: &mut Input) {
    for (name, description, required) in [
        ("GIT_URI", GIT_URI_DESC, true),
        ("GIT_BRANCH", GIT_BRANCH_DESC, false),
        ("GIT_USER", GIT_USER_DESC, false),
        ("GIT_PASSWORD", GIT_PASSWORD_DESC, false),
    ] {
        if input.var(name).is_none() {
            input.vars.push(crate::input::Var {
                name: name.to_string(),
                description: description.to_string(),
                required,
                var_type: crate::input::VarType::String,
                ..Default::default()
            });
        }
    }
    input.sort();
}

/// Auto-inject the two reserved registry-credential secrets for a
/// package-sourced step unless its source is `read` (spec §4.5).
fn add_registry_credentials(
    input: &mut Input,
    user_name: &str,
    pwd_name: &str,
    env: &HashMap<String, String>,
    interactive: bool,
) -> Result<()> {
    for name in [user_name, pwd_name] {
        if input.secret(name).is_none() {
            input.secrets.push(crate::input::Secret {
                name: name.to_string(),
                description: "registry credential injected for this flow step".to_string(),
                required: false,
                value: None,
            });
        }
    }
    crate::input::survey::survey(input, env, interactive, Path::new("."))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_git_flow() -> Flow {
        Flow {
            name: "demo".into(),
            steps: vec![Step {
                name: "build".into(),
                function: "build".into(),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn requires_git_source_when_no_step_names_a_package() {
        let flow = sample_git_flow();
        assert!(flow.requires_git_source());
    }

    #[test]
    fn git_source_flow_rejects_step_with_source_attribute() {
        let mut flow = sample_git_flow();
        flow.steps[0].package_source = Some(StepSource::Create);
        assert!(flow.validate_git_source().is_err());
    }

    #[test]
    fn non_git_flow_requires_first_step_create() {
        let mut flow = Flow {
            name: "demo".into(),
            steps: vec![Step {
                name: "one".into(),
                package: "localhost/library/demo:latest".into(),
                function: "build".into(),
                package_source: Some(StepSource::Read),
                ..Default::default()
            }],
            ..Default::default()
        };
        flow.git = None;
        assert!(flow.validate_non_git_source().is_err());
    }

    #[test]
    fn read_step_must_match_preceding_create_package() {
        let flow = Flow {
            name: "demo".into(),
            steps: vec![
                Step {
                    name: "one".into(),
                    package: "localhost/library/a:latest".into(),
                    function: "build".into(),
                    package_source: Some(StepSource::Create),
                    ..Default::default()
                },
                Step {
                    name: "two".into(),
                    package: "localhost/library/b:latest".into(),
                    function: "deploy".into(),
                    package_source: Some(StepSource::Read),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        assert!(flow.validate_non_git_source().is_err());
    }

    #[test]
    fn step_lookup_by_name_and_function() {
        let flow = sample_git_flow();
        assert!(flow.step("build").is_some());
        assert!(flow.step_by_fx("build").is_some());
        assert!(flow.step_by_fx("missing").is_none());
    }

    #[test]
    fn item_envelope_carries_flow_key_and_meta() {
        let flow = sample_git_flow();
        let envelope = flow.to_item_envelope().unwrap();
        assert_eq!(envelope["key"], "ART_FLOW_demo");
        assert_eq!(envelope["type"], "ART_FLOW");
    }

    #[test]
    fn yaml_round_trips() {
        let flow = sample_git_flow();
        let yaml = flow.to_yaml().unwrap();
        let parsed = Flow::from_yaml(yaml.as_bytes()).unwrap();
        assert_eq!(parsed.name, "demo");
    }
}
