//! Typed variable declarations.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ArtError, Result};
use crate::name::PackageName;

/// The declared type of a [`Var`], constraining what [`Var::validate`]
/// accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarType {
    String,
    Path,
    Uri,
    Name,
}

impl Default for VarType {
    fn default() -> Self {
        VarType::String
    }
}

/// A declared string-valued input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Var {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(rename = "type", default)]
    pub var_type: VarType,
    #[serde(default)]
    pub default: String,
    #[serde(default)]
    pub value: String,
}

impl Var {
    /// Validate `value` against this variable's declared type. `path`
    /// attempts absolute-path normalization, `uri` parses as a URI, `name`
    /// parses as a [`PackageName`]; `string` always succeeds.
    pub fn validate(&self, value: &str) -> Result<()> {
        match self.var_type {
            VarType::String => Ok(()),
            VarType::Path => {
                let _ = std::path::Path::new(value)
                    .canonicalize()
                    .or_else(|_| {
                        if std::path::Path::new(value).is_absolute() {
                            Ok(std::path::PathBuf::from(value))
                        } else {
                            Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, "not an absolute path"))
                        }
                    })
                    .map_err(|e| ArtError::invalid_build_file(format!("var '{}' is not a valid path: {e}", self.name)))?;
                Ok(())
            }
            VarType::Uri => {
                Url::parse(value)
                    .map_err(|e| ArtError::invalid_build_file(format!("var '{}' is not a valid uri: {e}", self.name)))?;
                Ok(())
            }
            VarType::Name => {
                PackageName::parse(value)?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_type_accepts_anything() {
        let v = Var {
            var_type: VarType::String,
            ..Default::default()
        };
        assert!(v.validate("whatever at all").is_ok());
    }

    #[test]
    fn uri_type_rejects_non_uri() {
        let v = Var {
            var_type: VarType::Uri,
            ..Default::default()
        };
        assert!(v.validate("not a uri").is_err());
        assert!(v.validate("https://example.com/path").is_ok());
    }

    #[test]
    fn name_type_validates_package_name() {
        let v = Var {
            var_type: VarType::Name,
            ..Default::default()
        };
        assert!(v.validate("group/name:tag").is_ok());
        assert!(v.validate("http://bad").is_err());
    }
}
