//! Sealing: the digest algorithm that makes a package verifiable.

use std::collections::BTreeMap;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ArtError, Result};
use crate::manifest::Manifest;

/// Serialize `value` as canonical JSON: declared field order, two-space
/// indentation, no trailing newline, UTF-8.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(
        &mut buf,
        serde_json::ser::PrettyFormatter::with_indent(b"  "),
    );
    value.serialize(&mut ser)?;
    Ok(buf)
}

fn deserialize_signatures<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Shape {
        Single(String),
        Map(BTreeMap<String, String>),
        Absent,
    }
    // Open question (spec §9): `authority` was a single string in one
    // legacy variant, a map in another. Accept either; normalize the
    // single-string form to a one-element map under the "default" key.
    match Option::<Shape>::deserialize(deserializer)? {
        Some(Shape::Single(s)) => {
            let mut m = BTreeMap::new();
            m.insert("default".to_string(), s);
            Ok(m)
        }
        Some(Shape::Map(m)) => Ok(m),
        None | Some(Shape::Absent) => Ok(BTreeMap::new()),
    }
}

/// The triplet `{manifest, digest, signatures}` that makes a package
/// verifiable. Serializes as `{"manifest": ..., "digest": "...",
/// "seal": {...}}` per the seal JSON contract.
///
/// `signatures` is a `BTreeMap`, not a `HashMap`: the digest and package id
/// hash this struct's canonical JSON, and a `HashMap`'s randomized iteration
/// order would make re-serializing a reloaded seal produce different bytes
/// — and therefore a different digest — on every run (spec §8 property 1).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Seal {
    pub manifest: Manifest,
    pub digest: String,
    #[serde(
        rename = "seal",
        default,
        deserialize_with = "deserialize_signatures",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub signatures: BTreeMap<String, String>,
}

impl Seal {
    /// Compute `"sha256:" || base64(SHA-256(zip_bytes ‖ canonical_manifest_json))`.
    pub fn compute_digest(zip_bytes: &[u8], manifest: &Manifest) -> Result<String> {
        let manifest_json = canonical_json(manifest)?;
        let mut hasher = Sha256::new();
        hasher.update(zip_bytes);
        hasher.update(&manifest_json);
        let checksum = hasher.finalize();
        Ok(format!("sha256:{}", STANDARD.encode(checksum)))
    }

    /// Build a seal whose digest is computed from `zip_bytes` and
    /// `manifest`, with no signatures yet attached.
    pub fn new(manifest: Manifest, zip_bytes: &[u8]) -> Result<Self> {
        let digest = Self::compute_digest(zip_bytes, &manifest)?;
        Ok(Seal {
            manifest,
            digest,
            signatures: BTreeMap::new(),
        })
    }

    /// Recompute the digest from `zip_bytes` and compare byte-equal to the
    /// digest stored in this seal.
    pub fn validate(&self, zip_bytes: &[u8]) -> Result<()> {
        let computed = Self::compute_digest(zip_bytes, &self.manifest)?;
        if computed == self.digest {
            Ok(())
        } else {
            Err(ArtError::DigestMismatch {
                computed,
                declared: self.digest.clone(),
            })
        }
    }

    /// `hex(SHA-256(json-indent(seal)))`, computed over the fully populated
    /// seal including digest and signatures. Adding or removing a
    /// signature therefore changes the package id — this is intentional.
    pub fn package_id(&self) -> Result<String> {
        let json = canonical_json(self)?;
        let mut hasher = Sha256::new();
        hasher.update(&json);
        Ok(hex::encode(hasher.finalize()))
    }
}

/// The first 12 hex characters of a package id, used for user-facing
/// listing and deletion.
pub fn short_id(id: &str) -> &str {
    let end = id.len().min(12);
    &id[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_manifest() -> Manifest {
        Manifest {
            package_type: "content/file".into(),
            os: "linux".into(),
            ref_: "20240101000000-abc123".into(),
            profile: "default".into(),
            time: "Monday, 01-Jan-24 00:00:00 UTC".into(),
            size: "5 B".into(),
            ..Default::default()
        }
    }

    /// Invariant (spec §8 property 1): digest round-trip.
    #[test]
    fn digest_round_trips() {
        let zip_bytes = b"pretend this is a zip";
        let manifest = sample_manifest();
        let seal = Seal::new(manifest, zip_bytes).unwrap();
        assert!(seal.digest.starts_with("sha256:"));
        seal.validate(zip_bytes).unwrap();
    }

    #[test]
    fn validate_rejects_tampered_zip() {
        let zip_bytes = b"original bytes";
        let manifest = sample_manifest();
        let seal = Seal::new(manifest, zip_bytes).unwrap();
        let tampered = b"tampered bytes!";
        assert!(seal.validate(tampered).is_err());
    }

    #[test]
    fn package_id_changes_when_signature_added() {
        let manifest = sample_manifest();
        let seal = Seal::new(manifest, b"data").unwrap();
        let id_unsigned = seal.package_id().unwrap();

        let mut signed = seal.clone();
        signed
            .signatures
            .insert("authority-1".into(), "deadbeef".into());
        let id_signed = signed.package_id().unwrap();

        assert_ne!(id_unsigned, id_signed);
    }

    /// Invariant (spec §8 property 1): a seal's digest must not depend on
    /// map iteration order surviving a JSON round-trip — serializing,
    /// reparsing, then reserializing a seal with multiple labels or
    /// signatures must reproduce byte-identical canonical JSON.
    #[test]
    fn digest_survives_a_json_round_trip_with_multiple_labels_and_signatures() {
        let mut manifest = sample_manifest();
        manifest.labels.insert("b-label".into(), "2".into());
        manifest.labels.insert("a-label".into(), "1".into());
        manifest.labels.insert("c-label".into(), "3".into());

        let zip_bytes = b"payload";
        let mut seal = Seal::new(manifest, zip_bytes).unwrap();
        seal.signatures.insert("zzz-authority".into(), "sig-z".into());
        seal.signatures.insert("aaa-authority".into(), "sig-a".into());

        let json = canonical_json(&seal).unwrap();
        let reloaded: Seal = serde_json::from_slice(&json).unwrap();
        let rejson = canonical_json(&reloaded).unwrap();

        assert_eq!(json, rejson);
        reloaded.validate(zip_bytes).unwrap();
    }

    #[test]
    fn short_id_takes_first_twelve_chars() {
        let id = "abcdef0123456789";
        assert_eq!(short_id(id), "abcdef012345");
    }

    #[test]
    fn single_string_signature_normalizes_to_map() {
        let json = r#"{"manifest":{"os":"","ref":"","profile":"","time":"","size":""},"digest":"sha256:x","seal":"sig-value"}"#;
        let seal: Seal = serde_json::from_str(json).unwrap();
        assert_eq!(seal.signatures.get("default"), Some(&"sig-value".to_string()));
    }
}
