//! Command-line surface: thin subcommand wiring over the core's modules.
//!
//! Grounded on the teacher's `clap::Parser` derive layout for `Args`/
//! `Command`, and on `original_source/cli/cmd/*.go` for the subcommand
//! names and flag shapes (`build`, `push`, `pull`, `open`, `tag`, `ls`,
//! `rm`, `run`, `flow run`).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::error::Result;

#[derive(Debug, Parser)]
#[command(name = "art", about = "content-addressed package registry and build/execution engine")]
pub struct Args {
    /// Root directory for the local registry (defaults to the current directory).
    #[arg(long, global = true)]
    pub registry_root: Option<PathBuf>,

    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build a package from a source directory.
    Build {
        /// Source location: a local path.
        from: String,
        #[arg(long)]
        from_path: Option<String>,
        #[arg(long)]
        token: Option<String>,
        /// Target package name, e.g. group/name:tag.
        name: String,
        #[arg(long)]
        profile: Option<String>,
        #[arg(long)]
        copy: bool,
        #[arg(short, long)]
        interactive: bool,
        /// Skip build.yaml and package `target` directly (content-only build).
        #[arg(long)]
        target: Option<String>,
    },
    /// Push a package to a remote registry.
    Push {
        name: String,
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Pull a package from a remote registry.
    Pull {
        name: String,
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Extract a package into a directory.
    Open { name: String, path: PathBuf },
    /// Move or add a tag.
    Tag { src: String, dst: String },
    /// List packages in the local registry.
    Ls,
    /// Remove one or more tags.
    Rm { names: Vec<String> },
    /// Pack one or more packages into a single archive file.
    Export { names: Vec<String>, dst_uri: PathBuf },
    /// Open a package and execute one of its exported functions.
    Run {
        name: String,
        function: String,
        path: PathBuf,
        #[arg(long)]
        detached: bool,
        #[arg(long)]
        clean: bool,
        #[arg(long)]
        ignore_exports: bool,
        #[arg(short, long)]
        user: Option<String>,
    },
    /// Merge and send a flow to a runner for execution.
    FlowRun {
        flow_path: PathBuf,
        runner: String,
        #[arg(long)]
        build_path: Option<PathBuf>,
        #[arg(short, long)]
        user: Option<String>,
        #[arg(short, long)]
        interactive: bool,
    },
}

/// Parse `USER:PASSWORD` into a [`crate::remote::Credentials`].
pub fn parse_credentials(spec: &str) -> Result<crate::remote::Credentials> {
    let (user, password) = spec
        .split_once(':')
        .ok_or_else(|| crate::error::ArtError::Auth("credentials must be USER:PASSWORD".into()))?;
    Ok(crate::remote::Credentials {
        user: user.to_string(),
        password: secrecy::SecretString::from(password.to_string()),
    })
}
