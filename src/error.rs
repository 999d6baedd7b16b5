//! Error types for the artisan core.

use thiserror::Error;

/// Unified error type for every artisan core operation.
///
/// Each variant corresponds to one of the error `Kind`s described in the
/// core design: callers translate these into exit codes or user-facing
/// messages; the library itself never panics on these paths.
#[derive(Error, Debug)]
pub enum ArtError {
    #[error("invalid package name: {0}")]
    InvalidName(String),

    #[error("invalid build description: {0}")]
    InvalidBuildFile(String),

    #[error("build description has no profiles and no target override")]
    NoProfiles,

    #[error("unresolved variable reference: {0}")]
    UnresolvedVariable(String),

    #[error("sub-shell invoking the engine CLI produced unwrapped output: {0}")]
    UnsafeSubshell(String),

    #[error("target path did not appear within the polling window: {0}")]
    TargetMissing(String),

    #[error("target path is not a directory: {0}")]
    TargetNotDir(String),

    #[error("digest mismatch: computed {computed} but seal declares {declared}")]
    DigestMismatch { computed: String, declared: String },

    #[error("archive entry escapes extraction root: {0}")]
    UnsafeArchive(String),

    #[error("manifest os '{manifest_os}' is incompatible with host os '{host_os}'")]
    OsMismatch {
        manifest_os: String,
        host_os: String,
    },

    #[error("package verification was rejected: {0}")]
    VerifyRejected(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("package id prefix '{0}' is ambiguous")]
    AmbiguousId(String),

    #[error("required input '{0}' was not supplied")]
    InputRequired(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error(transparent)]
    StdIo(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("walkdir error: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("shell parsing error: {0}")]
    ShellWords(#[from] shell_words::ParseError),
}

/// Result type alias using [`ArtError`].
pub type Result<T> = std::result::Result<T, ArtError>;

impl ArtError {
    pub fn invalid_name(msg: impl Into<String>) -> Self {
        Self::InvalidName(msg.into())
    }

    pub fn invalid_build_file(msg: impl Into<String>) -> Self {
        Self::InvalidBuildFile(msg.into())
    }

    pub fn unresolved_variable(name: impl Into<String>) -> Self {
        Self::UnresolvedVariable(name.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists(what.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats_carry_context() {
        let err = ArtError::invalid_name("bad domain");
        assert_eq!(err.to_string(), "invalid package name: bad domain");

        let err = ArtError::DigestMismatch {
            computed: "sha256:aaa".into(),
            declared: "sha256:bbb".into(),
        };
        assert!(err.to_string().contains("sha256:aaa"));
        assert!(err.to_string().contains("sha256:bbb"));
    }

    #[test]
    fn helper_constructors_build_expected_variants() {
        assert!(matches!(ArtError::not_found("x"), ArtError::NotFound(_)));
        assert!(matches!(
            ArtError::already_exists("x"),
            ArtError::AlreadyExists(_)
        ));
    }
}
