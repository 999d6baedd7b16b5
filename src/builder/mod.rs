//! The Builder: source preparation, profile execution, archiving and
//! sealing (spec §4.4). Grounded on `original_source/build/builder.go`'s
//! `Build` method, stage for stage.

pub mod archive;
pub mod ignore;
pub mod source;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::config::RegistryRoot;
use crate::engine::{self, BuildDescription, Function, Profile};
use crate::error::{ArtError, Result};
use crate::manifest::{FxInfo, Manifest};
use crate::name::PackageName;
use crate::registry::Registry;
use crate::seal::Seal;

use source::{SourceMeta, SourceProvider};

const TARGET_WAIT_ATTEMPTS: usize = 30;
const TARGET_WAIT_INTERVAL: Duration = Duration::from_millis(500);

/// Inputs to one build (spec §4.4 opening paragraph).
pub struct BuildOptions<'a> {
    pub from: &'a str,
    pub from_path: Option<&'a str>,
    pub token: Option<&'a str>,
    pub name: PackageName,
    pub profile: Option<&'a str>,
    pub copy: bool,
    pub interactive: bool,
    pub target_override: Option<&'a str>,
}

pub struct Builder<'a> {
    root: &'a RegistryRoot,
    source_provider: &'a dyn SourceProvider,
}

impl<'a> Builder<'a> {
    pub fn new(root: &'a RegistryRoot, source_provider: &'a dyn SourceProvider) -> Self {
        Self { root, source_provider }
    }

    /// Run the full pipeline and register the produced package, returning
    /// its seal.
    pub fn build(&self, opts: &BuildOptions) -> Result<Seal> {
        // 1. Workdir allocation.
        let workdir = self.root.build_dir().join(unique_hex12());
        let source_dir = workdir.join("source");
        std::fs::create_dir_all(&source_dir)?;
        let result = self.build_in(opts, &workdir, &source_dir);
        let _ = std::fs::remove_dir_all(&workdir);
        result
    }

    fn build_in(&self, opts: &BuildOptions, workdir: &Path, source_dir: &Path) -> Result<Seal> {
        // 2. Source acquisition.
        let meta = self
            .source_provider
            .acquire(opts.from, opts.from_path, opts.token, opts.copy, source_dir)?;
        let effective_source = if opts.copy {
            source_dir.to_path_buf()
        } else {
            resolve_local_source(opts)
        };

        // 3. Build description load (or synthesis).
        let doc = match opts.target_override {
            None => {
                let mut doc = BuildDescription::load(&effective_source.join("build.yaml"))?;
                let base_env = doc.env.clone();
                doc.resolve_includes(&effective_source, &base_env)?;
                // The "no '.' target" invariant guards against the packaging
                // build file re-packaging itself; it does not apply to a
                // caller-supplied target override, which never reads build.yaml.
                doc.validate()?;
                doc
            }
            Some(target) => synthesize_content_description(target),
        };

        // 4. Profile selection.
        let profile = doc.select_profile(opts.profile)?.clone();

        // 5. Unique reference naming (moved ahead of env assembly: ART_REF
        // below needs it).
        let reference = unique_reference(&meta.commit);

        // 6. Environment assembly, with the spec §6 build-time variables
        // injected the way the original builder's `getBuildEnv` and
        // `LoadBuildFileWithEnv` do (`build/builder.go:717-723`,
        // `data/buildFile.go:192-196`), so a profile command referencing
        // `${ART_REF}` or `${ART_PACKAGE_NAME}` resolves.
        let process_env: HashMap<String, String> = std::env::vars().collect();
        let engine_env = build_time_env(opts, &reference, &meta, workdir);
        let env = engine::env::overlay(&process_env, &engine_env);
        let env = engine::env::overlay(&env, &doc.env);
        let env = engine::env::overlay(&env, &profile.env);
        let env = engine::env::substitute_all(&env)?;

        // 7. Command execution.
        let functions = engine::function_index(&doc);
        engine::run_profile(&profile, &env, &effective_source, &functions)?;

        // 8. Target wait.
        let target_path = effective_source.join(&profile.target);
        wait_for_target(&target_path)?;
        if !target_path.is_dir() {
            return Err(ArtError::TargetNotDir(target_path.display().to_string()));
        }

        // 9. Archive.
        let zip_path = workdir.join(format!("{reference}.zip"));
        archive::zip_directory(&target_path, &zip_path)?;

        // 10. Seal.
        let zip_bytes = std::fs::read(&zip_path)?;
        let manifest = build_manifest(&doc, &profile, &reference, &meta, &zip_bytes)?;
        let seal = Seal::new(manifest, &zip_bytes)?;

        // 11. Registry add.
        let mut registry = Registry::open(self.root.clone())?;
        registry.add(&zip_path, &seal, &opts.name)?;

        Ok(seal)
    }
}

/// The spec §6 environment variables the engine exposes to a running build
/// profile, assembled before `doc.env`/`profile.env` so a build file can
/// still override them (spec §6; `build/builder.go:717-723`,
/// `data/buildFile.go:192-196`).
fn build_time_env(opts: &BuildOptions<'_>, reference: &str, meta: &SourceMeta, workdir: &Path) -> HashMap<String, String> {
    let mut env = HashMap::new();
    env.insert("ART_REF".into(), reference.to_string());
    env.insert("ART_BUILD_PATH".into(), opts.from.to_string());
    env.insert("ART_GIT_COMMIT".into(), meta.commit.clone());
    env.insert("ART_WORK_DIR".into(), workdir.display().to_string());
    env.insert("ART_FROM_URI".into(), opts.from.to_string());
    env.insert("ART_OS".into(), std::env::consts::OS.to_string());
    env.insert("ART_ARCH".into(), std::env::consts::ARCH.to_string());
    env.insert("ART_SHELL".into(), std::env::var("SHELL").unwrap_or_default());
    env.insert("ART_PACKAGE_DOMAIN".into(), opts.name.domain.clone());
    env.insert("ART_PACKAGE_GROUP".into(), opts.name.group.clone());
    env.insert("ART_PACKAGE_NAME".into(), opts.name.name.clone());
    env.insert("ART_PACKAGE_TAG".into(), opts.name.tag.clone());
    env.insert("ART_PACKAGE_FQDN".into(), opts.name.fully_qualified());
    env
}

fn resolve_local_source(opts: &BuildOptions) -> PathBuf {
    let mut root = PathBuf::from(opts.from);
    if let Some(sub) = opts.from_path {
        root = root.join(sub);
    }
    root
}

fn synthesize_content_description(target: &str) -> BuildDescription {
    BuildDescription {
        profiles: vec![Profile {
            name: "content".into(),
            default: true,
            profile_type: "content/file".into(),
            target: target.into(),
            ..Default::default()
        }],
        ..Default::default()
    }
}

/// `<UTC_YYYYMMDDhhmmss+3ms>-<short_commit>` (spec §4.4 step 6).
fn unique_reference(commit: &str) -> String {
    let now = Utc::now();
    let millis = now.format("%3f").to_string();
    let stamp = format!("{}{millis}", now.format("%Y%m%d%H%M%S"));
    if commit.is_empty() {
        stamp
    } else {
        let short = &commit[..commit.len().min(10)];
        format!("{stamp}-{short}")
    }
}

/// A 12-hex-character name for a transient build workdir, derived from
/// process id, thread id and wall-clock time since this core carries no
/// UUID dependency the teacher didn't already bring in.
fn unique_hex12() -> String {
    let mut hasher = Sha256::new();
    hasher.update(std::process::id().to_le_bytes());
    hasher.update(format!("{:?}", std::thread::current().id()).as_bytes());
    hasher.update(
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
            .to_le_bytes(),
    );
    let digest = hasher.finalize();
    hex::encode(digest)[..12].to_string()
}

fn wait_for_target(target: &Path) -> Result<()> {
    for _ in 0..TARGET_WAIT_ATTEMPTS {
        if target.exists() {
            return Ok(());
        }
        std::thread::sleep(TARGET_WAIT_INTERVAL);
    }
    if target.exists() {
        Ok(())
    } else {
        Err(ArtError::TargetMissing(target.display().to_string()))
    }
}

fn build_manifest(
    doc: &BuildDescription,
    profile: &Profile,
    reference: &str,
    meta: &SourceMeta,
    zip_bytes: &[u8],
) -> Result<Manifest> {
    let functions = doc
        .functions
        .iter()
        .filter(|f| f.export)
        .map(function_info)
        .collect();

    Ok(Manifest {
        package_type: profile.profile_type.clone(),
        license: profile.license.clone(),
        os: std::env::consts::OS.to_string(),
        ref_: reference.to_string(),
        profile: profile.name.clone(),
        labels: profile.labels.clone().into_iter().collect(),
        source: meta.source_uri.clone(),
        commit: meta.commit.clone(),
        branch: meta.branch.clone(),
        target: profile
            .target
            .rsplit(|c: char| c == '/' || c == '\\')
            .next()
            .unwrap_or(&profile.target)
            .to_string(),
        time: rfc850_now(),
        size: human_size(zip_bytes.len()),
        functions,
        ..Default::default()
    })
}

/// Survey-definition-only function metadata: declares the function's
/// input without populating values (spec §4.4 step 10).
fn function_info(function: &Function) -> FxInfo {
    FxInfo {
        name: function.name.clone(),
        description: String::new(),
        input: None,
        credits: 0,
        runtime: function.runtime.clone(),
        network: function.network.clone(),
    }
}

/// RFC850 timestamp (`Monday, 02-Jan-06 15:04:05 MST`), matching the
/// original builder's `time.Now().Format(time.RFC850)` (spec §3, §6).
fn rfc850_now() -> String {
    Utc::now().format("%A, %d-%b-%y %H:%M:%S UTC").to_string()
}

fn human_size(bytes: usize) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} {}", UNITS[unit])
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use source::LocalSourceProvider;
    use tempfile::tempdir;

    #[test]
    fn human_size_formats_bytes_and_kilobytes() {
        assert_eq!(human_size(5), "5 B");
        assert!(human_size(2048).ends_with("KB"));
    }

    #[test]
    fn unique_reference_includes_short_commit_when_present() {
        let r = unique_reference("0123456789abcdef");
        assert!(r.ends_with("0123456789"));
    }

    #[test]
    fn unique_reference_omits_suffix_when_commit_absent() {
        let r = unique_reference("");
        assert!(!r.contains('-'));
    }

    /// Spec §6: a build profile must see `ART_REF`/`ART_PACKAGE_*` and the
    /// platform/source variables without the build file declaring them.
    #[test]
    fn build_time_env_exposes_reference_and_package_vars() {
        let opts = BuildOptions {
            from: "https://example.com/repo.git",
            from_path: None,
            token: None,
            name: PackageName::parse("library/demo:latest").unwrap(),
            profile: None,
            copy: false,
            interactive: false,
            target_override: None,
        };
        let meta = SourceMeta { commit: "abc123".into(), ..Default::default() };
        let env = build_time_env(&opts, "20240101000000-abc123", &meta, Path::new("/tmp/workdir"));

        assert_eq!(env.get("ART_REF").unwrap(), "20240101000000-abc123");
        assert_eq!(env.get("ART_BUILD_PATH").unwrap(), opts.from);
        assert_eq!(env.get("ART_FROM_URI").unwrap(), opts.from);
        assert_eq!(env.get("ART_GIT_COMMIT").unwrap(), "abc123");
        assert_eq!(env.get("ART_WORK_DIR").unwrap(), "/tmp/workdir");
        assert_eq!(env.get("ART_OS").unwrap(), std::env::consts::OS);
        assert_eq!(env.get("ART_PACKAGE_GROUP").unwrap(), "library");
        assert_eq!(env.get("ART_PACKAGE_NAME").unwrap(), "demo");
        assert_eq!(env.get("ART_PACKAGE_TAG").unwrap(), "latest");
        assert_eq!(env.get("ART_PACKAGE_FQDN").unwrap(), &opts.name.fully_qualified());
    }

    /// End-to-end scenario S1 — content-only build.
    #[test]
    fn content_only_build_produces_a_verifiable_package() {
        let src = tempdir().unwrap();
        std::fs::write(src.path().join("data.txt"), b"hello").unwrap();

        let registry_dir = tempdir().unwrap();
        let root = RegistryRoot::open(registry_dir.path()).unwrap();
        let provider = LocalSourceProvider;
        let builder = Builder::new(&root, &provider);

        let opts = BuildOptions {
            from: src.path().to_str().unwrap(),
            from_path: None,
            token: None,
            name: PackageName::parse("src").unwrap(),
            profile: None,
            copy: false,
            interactive: false,
            target_override: Some("."),
        };

        let seal = builder.build(&opts).unwrap();
        assert!(seal.digest.starts_with("sha256:"));
        assert_eq!(seal.manifest.package_type, "content/file");
    }
}
