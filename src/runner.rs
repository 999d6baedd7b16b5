//! The runner: opens a package into a working path and either executes an
//! exported function or launches a `content/app` package (spec §4.8).
//!
//! Grounded on `original_source/runner/app.go`/`lib.go` (entrypoint/var/
//! volume label parsing, the entrypoint-appearance poll, detached vs.
//! streaming launch) and `original_source/runner/runner.go` (export-
//! membership check before execution).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::ExposeSecret;

use crate::config::RegistryRoot;
use crate::engine::{self, BuildDescription};
use crate::error::{ArtError, Result};
use crate::manifest::Manifest;
use crate::name::PackageName;
use crate::registry::Registry;
use crate::remote::Credentials;

const ENTRYPOINT_WAIT_ATTEMPTS: u32 = 30;
const ENTRYPOINT_WAIT_INTERVAL: Duration = Duration::from_millis(250);

/// Launch strategy for a `content/app` package's entrypoint, injected so
/// the runner's polling/env-setup logic stays testable without spawning
/// real processes (spec §9 "dynamic dispatch" design note).
pub trait Launcher {
    fn launch(&self, entrypoint: &Path, workdir: &Path, env: &HashMap<String, String>, detached: bool) -> Result<()>;
}

/// Spawns the entrypoint as a child process, either detached (fire and
/// forget) or streaming its stdout/stderr to the caller's.
pub struct ProcessLauncher;

impl Launcher for ProcessLauncher {
    fn launch(&self, entrypoint: &Path, workdir: &Path, env: &HashMap<String, String>, detached: bool) -> Result<()> {
        let mut cmd = std::process::Command::new(entrypoint);
        cmd.current_dir(workdir);
        for (k, v) in env {
            cmd.env(k, v);
        }
        if detached {
            cmd.spawn()?;
            Ok(())
        } else {
            let status = cmd.status()?;
            if status.success() {
                Ok(())
            } else {
                Err(ArtError::io(format!(
                    "entrypoint '{}' exited with status {:?}",
                    entrypoint.display(),
                    status.code()
                )))
            }
        }
    }
}

/// Options for one `Runner::run` invocation.
pub struct RunOptions<'a> {
    pub name: PackageName,
    pub function: &'a str,
    pub credentials: Option<&'a Credentials>,
    pub path: PathBuf,
    pub ignore_exports: bool,
    pub clean: bool,
    pub detached: bool,
}

pub struct Runner<'a> {
    root: &'a RegistryRoot,
    launcher: &'a dyn Launcher,
}

impl<'a> Runner<'a> {
    pub fn new(root: &'a RegistryRoot, launcher: &'a dyn Launcher) -> Self {
        Self { root, launcher }
    }

    /// Open `opts.name` into `opts.path`, verify `opts.function` is
    /// exported (unless `opts.ignore_exports`), and execute it via the
    /// engine (spec §4.8, §4.4 step 7).
    pub fn run_function(&self, registry: &mut Registry, opts: &RunOptions) -> Result<()> {
        let seal = registry.open(&opts.name, &opts.path, None)?;

        if !opts.ignore_exports && seal.manifest.function(opts.function).is_none() {
            return Err(ArtError::not_found(format!(
                "function '{}' is not exported by package '{}'",
                opts.function,
                opts.name.fully_qualified()
            )));
        }

        let doc = BuildDescription::load(&opts.path.join("build.yaml"))?;
        let functions = engine::function_index(&doc);

        let mut env: HashMap<String, String> = std::env::vars().collect();
        env.insert("ART_PACKAGE_FQDN".into(), opts.name.fully_qualified());
        env.insert("ART_FX_NAME".into(), opts.function.to_string());
        if let Some(creds) = opts.credentials {
            env.insert("ART_REG_USER".into(), creds.user.clone());
            env.insert("ART_REG_PWD".into(), creds.password.expose_secret().to_string());
            env.insert("ART_REG_PASS".into(), creds.password.expose_secret().to_string());
        }
        let env = engine::env::substitute_all(&env)?;

        let function = functions
            .get(opts.function)
            .ok_or_else(|| ArtError::not_found(format!("function '{}'", opts.function)))?;
        engine::run_function(function, &env, &opts.path, &functions, 0)?;

        if opts.clean {
            registry.remove(&[opts.name.clone()])?;
        }
        Ok(())
    }

    /// Open a `content/app` package, validate its `app:*` labels, wait for
    /// its entrypoint to appear, and launch it (spec §4.8).
    pub fn run_app(&self, registry: &mut Registry, opts: &RunOptions) -> Result<()> {
        let seal = registry.open(&opts.name, &opts.path, None)?;
        if !seal.manifest.package_type.eq_ignore_ascii_case("content/app") {
            return Err(ArtError::invalid_build_file(format!(
                "package '{}' is not of type 'content/app'",
                opts.name.fully_qualified()
            )));
        }

        let entrypoint = entrypoint_label(&seal.manifest)
            .ok_or_else(|| ArtError::invalid_build_file("package manifest has no 'app:entrypoint' label"))?;

        let mut env: HashMap<String, String> = std::env::vars().collect();
        validate_vars(&seal.manifest, &mut env)?;
        assign_volume_vars(&seal.manifest, &mut env)?;

        let entry_path = opts.path.join(&entrypoint);
        wait_for_entrypoint(&entry_path)?;

        if opts.clean {
            registry.remove(&[opts.name.clone()])?;
        }

        self.launcher.launch(&entry_path, &opts.path, &env, opts.detached)
    }
}

fn entrypoint_label(manifest: &Manifest) -> Option<String> {
    manifest
        .labels
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("app:entrypoint"))
        .map(|(_, v)| v.clone())
}

/// Parse `app:var@NAME: required|optional[,default=VALUE]` labels,
/// failing if a required variable is absent from `env` with no default.
fn validate_vars(manifest: &Manifest, env: &mut HashMap<String, String>) -> Result<()> {
    for (key, value) in &manifest.labels {
        let Some(name) = key.strip_prefix("app:var@") else { continue };
        let mut parts = value.splitn(2, ',');
        let requirement = parts.next().unwrap_or("").trim();
        let default = parts.next().and_then(|rest| rest.split_once('=')).and_then(|(k, v)| {
            if k.trim().eq_ignore_ascii_case("default") {
                Some(v.trim().to_string())
            } else {
                None
            }
        });

        let required = requirement.eq_ignore_ascii_case("required");
        let optional = requirement.eq_ignore_ascii_case("optional");
        if !required && !optional {
            return Err(ArtError::invalid_build_file(format!(
                "invalid 'app:var@{name}' requirement '{requirement}', expected 'required' or 'optional'"
            )));
        }

        if required && !env.contains_key(name) {
            match default {
                Some(d) => {
                    env.insert(name.to_string(), d);
                }
                None => {
                    return Err(ArtError::InputRequired(name.to_uppercase()));
                }
            }
        }
    }
    Ok(())
}

/// Parse `app:volume@NAME: <n>` labels, assigning `NAME=/volume_<n>`.
fn assign_volume_vars(manifest: &Manifest, env: &mut HashMap<String, String>) -> Result<()> {
    for (key, value) in &manifest.labels {
        let Some(name) = key.strip_prefix("app:volume@") else { continue };
        let number: u32 = value
            .trim()
            .parse()
            .map_err(|_| ArtError::invalid_build_file(format!("invalid volume number '{value}' for '{key}'")))?;
        env.insert(name.to_string(), format!("/volume_{number}"));
    }
    Ok(())
}

fn wait_for_entrypoint(path: &Path) -> Result<()> {
    for _ in 0..ENTRYPOINT_WAIT_ATTEMPTS {
        if path.exists() {
            return Ok(());
        }
        std::thread::sleep(ENTRYPOINT_WAIT_INTERVAL);
    }
    if path.exists() {
        Ok(())
    } else {
        Err(ArtError::TargetMissing(path.display().to_string()))
    }
}
