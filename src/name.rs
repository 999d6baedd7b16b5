//! Package name parsing and canonicalization.
//!
//! A package name is the four-component identifier `domain/group/name:tag`.
//! Every component but `name` is optional on input and defaulted on parse;
//! the canonical form produced by [`PackageName::fully_qualified`] always
//! carries all four.

use std::fmt;

use crate::error::{ArtError, Result};

const DEFAULT_DOMAIN: &str = "localhost";
const DEFAULT_GROUP: &str = "library";
const DEFAULT_TAG: &str = "latest";

/// A fully parsed, canonicalized package name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageName {
    pub domain: String,
    pub group: String,
    pub name: String,
    pub tag: String,
}

fn is_allowed_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':' | '/')
}

fn validate_component(component: &str, label: &str) -> Result<()> {
    if component.is_empty() {
        return Err(ArtError::invalid_name(format!("{label} is empty")));
    }
    if component.chars().any(|c| c.is_whitespace() || c == '%' || c.is_control()) {
        return Err(ArtError::invalid_name(format!(
            "{label} '{component}' contains a forbidden character"
        )));
    }
    Ok(())
}

fn validate_domain(domain: &str) -> Result<()> {
    if domain.contains("://") {
        return Err(ArtError::invalid_name(format!(
            "domain '{domain}' must not carry a scheme"
        )));
    }
    if domain.starts_with('-') || domain.starts_with(':') {
        return Err(ArtError::invalid_name(format!(
            "domain '{domain}' must not start with '-' or ':'"
        )));
    }
    let host_part = domain.split(':').next().unwrap_or(domain);
    if host_part.is_empty() {
        return Err(ArtError::invalid_name("domain host part is empty".into()));
    }
    for label in host_part.split('.') {
        if label.is_empty() || label.starts_with('-') {
            return Err(ArtError::invalid_name(format!(
                "domain '{domain}' has an invalid label '{label}'"
            )));
        }
        if !label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(ArtError::invalid_name(format!(
                "domain '{domain}' has a non-alphanumeric label '{label}'"
            )));
        }
    }
    if let Some((_, port)) = domain.split_once(':') {
        port.parse::<u16>().map_err(|_| {
            ArtError::invalid_name(format!("domain port '{port}' is not a valid port number"))
        })?;
    }
    Ok(())
}

impl PackageName {
    /// Parse `[domain[:port]/][group/]name[:tag]`, filling in defaults for
    /// any component except `name`.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ArtError::invalid_name("empty package name".into()));
        }
        if input.contains("://") {
            return Err(ArtError::invalid_name(format!(
                "'{input}' must not carry a URI scheme"
            )));
        }
        if !input.chars().all(is_allowed_char) {
            return Err(ArtError::invalid_name(format!(
                "'{input}' contains a character outside [a-zA-Z0-9.-_:/]"
            )));
        }

        let segments: Vec<&str> = input.split('/').collect();
        let (domain, group, name_tag) = match segments.as_slice() {
            [name_tag] => (None, None, *name_tag),
            [group, name_tag] => (None, Some(*group), *name_tag),
            [domain, group, name_tag] => (Some(*domain), Some(*group), *name_tag),
            _ => {
                return Err(ArtError::invalid_name(format!(
                    "'{input}' has too many '/'-separated segments"
                )));
            }
        };

        let (name, tag) = match name_tag.split_once(':') {
            Some((n, t)) => (n, Some(t)),
            None => (name_tag, None),
        };

        validate_component(name, "name")?;

        let domain = domain.unwrap_or(DEFAULT_DOMAIN).to_ascii_lowercase();
        validate_domain(&domain)?;

        let group = group.unwrap_or(DEFAULT_GROUP);
        validate_component(group, "group")?;

        let tag = tag.unwrap_or(DEFAULT_TAG);
        validate_component(tag, "tag")?;

        Ok(PackageName {
            domain,
            group: group.to_string(),
            name: name.to_string(),
            tag: tag.to_string(),
        })
    }

    /// Render the fully qualified, canonical form: `domain/group/name:tag`.
    pub fn fully_qualified(&self) -> String {
        format!("{}/{}/{}:{}", self.domain, self.group, self.name, self.tag)
    }

    /// Render the shortest form that omits components equal to their
    /// default value.
    pub fn short(&self) -> String {
        let mut prefix = String::new();
        if self.domain != DEFAULT_DOMAIN {
            prefix.push_str(&self.domain);
            prefix.push('/');
        }
        if self.group != DEFAULT_GROUP || !prefix.is_empty() {
            if self.domain == DEFAULT_DOMAIN && self.group == DEFAULT_GROUP {
                // keep prefix empty
            } else {
                prefix.push_str(&self.group);
                prefix.push('/');
            }
        }
        let mut out = format!("{prefix}{}", self.name);
        if self.tag != DEFAULT_TAG {
            out.push(':');
            out.push_str(&self.tag);
        }
        out
    }

    /// The `domain/group/name` portion, without the tag.
    pub fn repository(&self) -> String {
        format!("{}/{}/{}", self.domain, self.group, self.name)
    }

    /// Build a new name in the same repository under a different tag.
    pub fn with_tag(&self, tag: impl Into<String>) -> Self {
        PackageName {
            tag: tag.into(),
            ..self.clone()
        }
    }

    /// Whether `input` parses as a package name, without keeping the result.
    pub fn is_valid_str(input: &str) -> bool {
        Self::parse(input).is_ok()
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fully_qualified())
    }
}
