//! Typed file declarations.

use serde::{Deserialize, Serialize};

/// A declared file input. `path` names a location under the registry's
/// `files/` directory; `content` is populated at survey-time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub content: String,
}
