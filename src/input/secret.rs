//! Typed secret declarations.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

/// A declared sensitive-valued input. `value` is never included in Debug
/// output and is redacted by `secrecy`'s `SecretString`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Secret {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<SecretString>,
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.description == other.description
            && self.required == other.required
            && self.value.as_ref().map(|s| s.expose_secret())
                == other.value.as_ref().map(|s| s.expose_secret())
    }
}
impl Eq for Secret {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_output_does_not_leak_value() {
        let s = Secret {
            name: "token".into(),
            value: Some(SecretString::from("super-secret".to_string())),
            ..Default::default()
        };
        let dbg = format!("{s:?}");
        assert!(!dbg.contains("super-secret"));
    }
}
