//! Package manifest: the metadata carried inside a sealed package.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{ArtError, Result};

/// Metadata describing a built package.
///
/// Field order here is the canonical serialization order used by
/// [`crate::seal::canonical_manifest_json`] — it must not be reordered
/// without updating the digest algorithm's test vectors.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub author: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub authority: String,
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub package_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub license: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub ref_: String,
    #[serde(default)]
    pub profile: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub runtime: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source_path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub commit: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub branch: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub target: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub size: String,
    #[serde(rename = "SKU", default, skip_serializing_if = "String::is_empty")]
    pub sku: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub functions: Vec<FxInfo>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub open_policy: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub run_policy: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sign_policy: String,
}

impl Manifest {
    /// Find an exported function by name.
    pub fn function(&self, name: &str) -> Option<&FxInfo> {
        self.functions.iter().find(|fx| fx.name == name)
    }

    /// Render a human-readable Markdown summary of this manifest's exported
    /// functions, their declared variables and secrets.
    ///
    /// Supplemented from `original_source/data/manifest.go`'s
    /// `ToMarkDownBytes`: useful documentation output with no coupling to
    /// any out-of-scope CLI/i18n concern.
    pub fn to_markdown(&self, package_name: &str) -> String {
        let mut out = format!("# Package {package_name} Manifest\n\n");
        for fx in &self.functions {
            out.push_str(&format!("## Function: {}\n\n{}\n\n", fx.name, fx.description));
            if let Some(input) = &fx.input {
                if !input.vars.is_empty() {
                    out.push_str("### Variables\n\n|name|description|default|\n|---|---|---|\n");
                    for v in &input.vars {
                        out.push_str(&format!(
                            "|{}|{}|{}|\n",
                            v.name, v.description, v.default
                        ));
                    }
                    out.push('\n');
                }
                if !input.secrets.is_empty() {
                    out.push_str("### Secrets\n\n|name|description|\n|---|---|\n");
                    for s in &input.secrets {
                        out.push_str(&format!("|{}|{}|\n", s.name, s.description));
                    }
                    out.push('\n');
                }
            }
        }
        out
    }
}

/// Exported function metadata carried in a manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct FxInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<crate::input::Input>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub credits: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub runtime: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<Network>,
}

fn is_zero(v: &i64) -> bool {
    *v == 0
}

/// Network groups/rules attached to an exported function, and the IP
/// allocation algorithm described in spec §9 ("Open question — IP
/// allocation for networks").
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Network {
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub rules: Vec<String>,
}

/// One resolved network group: its tags and the IPs allocated to it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpGroup {
    pub tags: Vec<String>,
    pub ips: Vec<String>,
}

struct ParsedGroup {
    name: String,
    tags: Vec<String>,
    min: usize,
    max: usize,
}

fn parse_group(spec: &str) -> Result<ParsedGroup> {
    let parts: Vec<&str> = spec.split(':').collect();
    if parts.len() != 4 {
        return Err(ArtError::invalid_build_file(format!(
            "network group '{spec}' must have exactly 4 ':'-separated sections"
        )));
    }
    let name = parts[0].to_string();
    let tags = parts[1].split(',').map(|s| s.to_string()).collect();
    let min: usize = parts[2]
        .parse()
        .map_err(|_| ArtError::invalid_build_file(format!("invalid minimum in group '{name}'")))?;
    let max = if parts[3].eq_ignore_ascii_case("*") {
        usize::MAX
    } else {
        parts[3]
            .parse()
            .map_err(|_| ArtError::invalid_build_file(format!("invalid maximum in group '{name}'")))?
    };
    Ok(ParsedGroup { name, tags, min, max })
}

/// A single `NAME_FROM:NAME_TO:PROTOCOL/PORT` network rule, parsed and
/// validated for section count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRule {
    pub from: String,
    pub to: String,
    pub protocol_port: String,
}

pub fn parse_rule(spec: &str) -> Result<NetworkRule> {
    let parts: Vec<&str> = spec.split(':').collect();
    if parts.len() != 3 {
        return Err(ArtError::invalid_build_file(format!(
            "network rule '{spec}' must have exactly 3 ':'-separated sections"
        )));
    }
    Ok(NetworkRule {
        from: parts[0].to_string(),
        to: parts[1].to_string(),
        protocol_port: parts[2].to_string(),
    })
}

impl Network {
    /// Allocate each group's minimum first in declaration order, then
    /// distribute remaining IPs across groups that still have headroom in
    /// declaration order. Errors if IPs remain after every group reaches
    /// its maximum.
    pub fn allocate_ips(&self, ips: &[String]) -> Result<HashMap<String, IpGroup>> {
        let mut unique = std::collections::HashSet::new();
        for ip in ips {
            if !unique.insert(ip) {
                return Err(ArtError::invalid_build_file("IPs in list must be unique".into()));
            }
        }

        let groups: Vec<ParsedGroup> = self
            .groups
            .iter()
            .map(|g| parse_group(g))
            .collect::<Result<_>>()?;

        let mut result: HashMap<String, IpGroup> = HashMap::new();
        let mut ix = 0usize;
        let total_capacity: usize = groups.iter().map(|g| g.max).fold(0usize, |acc, m| {
            acc.saturating_add(if m == usize::MAX { ips.len() } else { m })
        });

        for group in &groups {
            let entry = result.entry(group.name.clone()).or_insert_with(|| IpGroup {
                tags: group.tags.clone(),
                ips: Vec::new(),
            });
            for _ in 0..group.min {
                if ix >= ips.len() {
                    return Err(ArtError::invalid_build_file(format!(
                        "not enough IPs, need at least {}",
                        ix + 1
                    )));
                }
                entry.ips.push(ips[ix].clone());
                ix += 1;
            }
        }

        while ix < ips.len() {
            let before = ix;
            for group in &groups {
                if ix >= ips.len() {
                    break;
                }
                let entry = result.entry(group.name.clone()).or_insert_with(|| IpGroup {
                    tags: group.tags.clone(),
                    ips: Vec::new(),
                });
                if entry.ips.len() >= group.max {
                    continue;
                }
                entry.ips.push(ips[ix].clone());
                ix += 1;
            }
            if ix == before {
                // no group had headroom this pass; avoid an infinite loop
                break;
            }
        }

        if ix < ips.len() {
            if total_capacity < ips.len() {
                return Err(ArtError::invalid_build_file(format!(
                    "too many IPs, {} surplus IPs found",
                    ips.len() - total_capacity
                )));
            }
            return Err(ArtError::invalid_build_file(format!(
                "not enough headroom to allocate remaining {} IPs",
                ips.len() - ix
            )));
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_minimums_then_distributes() {
        let net = Network {
            groups: vec!["a:t1:1:2".into(), "b:t2:1:*".into()],
            rules: vec![],
        };
        let ips: Vec<String> = (0..4).map(|i| format!("10.0.0.{i}")).collect();
        let allocated = net.allocate_ips(&ips).unwrap();
        assert_eq!(allocated["a"].ips.len(), 2);
        assert_eq!(allocated["b"].ips.len(), 2);
    }

    #[test]
    fn errors_when_not_enough_ips_for_minimums() {
        let net = Network {
            groups: vec!["a:t1:3:3".into()],
            rules: vec![],
        };
        let ips = vec!["10.0.0.1".to_string()];
        assert!(net.allocate_ips(&ips).is_err());
    }

    #[test]
    fn errors_on_duplicate_ips() {
        let net = Network {
            groups: vec!["a:t1:1:1".into()],
            rules: vec![],
        };
        let ips = vec!["10.0.0.1".to_string(), "10.0.0.1".to_string()];
        assert!(net.allocate_ips(&ips).is_err());
    }

    #[test]
    fn errors_when_groups_have_no_headroom_for_surplus() {
        let net = Network {
            groups: vec!["a:t1:1:1".into()],
            rules: vec![],
        };
        let ips: Vec<String> = (0..3).map(|i| format!("10.0.0.{i}")).collect();
        assert!(net.allocate_ips(&ips).is_err());
    }

    #[test]
    fn rejects_malformed_group_sections() {
        let net = Network {
            groups: vec!["a:t1:1".into()],
            rules: vec![],
        };
        assert!(net.allocate_ips(&["10.0.0.1".to_string()]).is_err());
    }

    #[test]
    fn parse_rule_rejects_wrong_section_count() {
        assert!(parse_rule("a:b:c:d").is_err());
        assert!(parse_rule("a:b").is_err());
        assert!(parse_rule("a:b:tcp/80").is_ok());
    }

    #[test]
    fn manifest_renders_markdown_for_exported_functions() {
        let manifest = Manifest {
            functions: vec![FxInfo {
                name: "build".into(),
                description: "builds the thing".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let md = manifest.to_markdown("localhost/library/demo:latest");
        assert!(md.contains("# Package localhost/library/demo:latest Manifest"));
        assert!(md.contains("## Function: build"));
    }
}
