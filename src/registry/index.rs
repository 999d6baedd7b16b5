//! The registry index: `Repository → list(Package)`, persisted as
//! `repository.json` (spec §3 Local Registry Index, §6 file-store layout).

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ArtError, Result};
use crate::name::PackageName;

/// One indexed package: its id, the tags it is currently reachable under,
/// and listing metadata. `file_ref` names the two files in the file-store
/// by manifest reference, never by package id (spec §3 invariant).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub id: String,
    pub tags: Vec<String>,
    pub size: String,
    pub created: DateTime<Utc>,
    #[serde(rename = "type")]
    pub package_type: String,
    pub file_ref: String,
}

impl Package {
    pub fn short_id(&self) -> &str {
        crate::seal::short_id(&self.id)
    }
}

/// One indexed repository: its fully qualified `domain/group/name` and the
/// packages reachable under it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub name: String,
    #[serde(default)]
    pub packages: Vec<Package>,
}

/// The full on-disk index: a list of repositories, keyed by fully
/// qualified repository name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    #[serde(default)]
    repositories: Vec<Repository>,
}

impl Index {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    fn repository_mut(&mut self, repo: &str) -> &mut Repository {
        if let Some(ix) = self.repositories.iter().position(|r| r.name == repo) {
            return &mut self.repositories[ix];
        }
        self.repositories.push(Repository {
            name: repo.to_string(),
            packages: vec![],
        });
        self.repositories.last_mut().expect("just pushed")
    }

    fn repository(&self, repo: &str) -> Option<&Repository> {
        self.repositories.iter().find(|r| r.name == repo)
    }

    /// Resolve a fully qualified name to the package currently reachable
    /// under its tag.
    pub fn find_by_name(&self, name: &PackageName) -> Option<&Package> {
        self.repository(&name.repository())?
            .packages
            .iter()
            .find(|p| p.tags.contains(&name.tag))
    }

    /// Resolve every `repository:tag` name currently pointing at a package
    /// id prefix. Returns `AmbiguousId` when the prefix matches packages
    /// across more than one distinct id.
    pub fn find_names_by_id(&self, id_prefix: &str) -> Result<Vec<String>> {
        let mut matched_ids: Vec<&str> = vec![];
        let mut names = vec![];
        for repo in &self.repositories {
            for pkg in &repo.packages {
                if pkg.id.starts_with(id_prefix) {
                    if !matched_ids.contains(&pkg.id.as_str()) {
                        matched_ids.push(&pkg.id);
                    }
                    for tag in &pkg.tags {
                        names.push(format!("{}:{}", repo.name, tag));
                    }
                }
            }
        }
        if matched_ids.len() > 1 {
            return Err(ArtError::AmbiguousId(id_prefix.to_string()));
        }
        Ok(names)
    }

    /// Insert or attach `package` under `(repo, tag)`. Fails `AlreadyExists`
    /// only when the exact same id is already present under the exact same
    /// tag (idempotent no-op in every other add path is handled by the
    /// caller via `tag`).
    pub fn add(&mut self, repo: &str, tag: &str, package: Package) -> Result<()> {
        let repository = self.repository_mut(repo);
        if let Some(existing) = repository
            .packages
            .iter()
            .find(|p| p.tags.contains(&tag.to_string()))
        {
            if existing.id == package.id {
                return Err(ArtError::already_exists(format!("{repo}:{tag}")));
            }
        }
        Self::retag_internal(repository, tag, &package.id);
        if let Some(existing) = repository.packages.iter_mut().find(|p| p.id == package.id) {
            if !existing.tags.contains(&tag.to_string()) {
                existing.tags.push(tag.to_string());
            }
        } else {
            let mut package = package;
            if !package.tags.contains(&tag.to_string()) {
                package.tags.push(tag.to_string());
            }
            repository.packages.push(package);
        }
        Ok(())
    }

    /// Remove `tag` from whichever package in `repo` holds it, per §4.3
    /// step 2: if the losing package reaches zero tags, give it a
    /// synthetic preservation tag so its files are not immediately
    /// orphaned.
    fn retag_internal(repository: &mut Repository, tag: &str, incoming_id: &str) {
        if let Some(ix) = repository
            .packages
            .iter()
            .position(|p| p.tags.contains(&tag.to_string()) && p.id != incoming_id)
        {
            let package = &mut repository.packages[ix];
            package.tags.retain(|t| t != tag);
            if package.tags.is_empty() {
                package.tags.push(format!("dst-{}", package.short_id()));
            }
        }
    }

    /// Move `dst` tag onto the package currently resolved by `src` within
    /// the same repository (spec §4.3 `tag`).
    pub fn tag(&mut self, repo: &str, src_tag: &str, dst_tag: &str) -> Result<()> {
        let src_id = self
            .repository(repo)
            .and_then(|r| r.packages.iter().find(|p| p.tags.contains(&src_tag.to_string())))
            .map(|p| p.id.clone())
            .ok_or_else(|| ArtError::not_found(format!("{repo}:{src_tag}")))?;
        let repository = self.repository_mut(repo);
        Self::retag_internal(repository, dst_tag, &src_id);
        if let Some(package) = repository.packages.iter_mut().find(|p| p.id == src_id) {
            if !package.tags.contains(&dst_tag.to_string()) {
                package.tags.push(dst_tag.to_string());
            }
        }
        Ok(())
    }

    pub fn remove_tags(&mut self, names: &[(String, String)]) -> Result<()> {
        for (repo, tag) in names {
            let repository = self.repository_mut(repo);
            let before = repository
                .packages
                .iter()
                .any(|p| p.tags.contains(tag));
            if !before {
                return Err(ArtError::not_found(format!("{repo}:{tag}")));
            }
            for package in &mut repository.packages {
                package.tags.retain(|t| t != tag);
            }
        }
        self.repositories.retain(|r| !r.packages.is_empty());
        Ok(())
    }

    pub fn remove_all(&mut self) {
        self.repositories.clear();
    }

    /// All `(id, file_ref)` pairs that no longer carry any tag.
    pub fn orphaned(&self) -> Vec<(String, String)> {
        self.repositories
            .iter()
            .flat_map(|r| &r.packages)
            .filter(|p| p.tags.is_empty())
            .map(|p| (p.id.clone(), p.file_ref.clone()))
            .collect()
    }

    /// Every `file_ref` still referenced by at least one tagged package.
    pub fn referenced_files(&self) -> Vec<String> {
        self.repositories
            .iter()
            .flat_map(|r| &r.packages)
            .filter(|p| !p.tags.is_empty())
            .map(|p| p.file_ref.clone())
            .collect()
    }

    pub fn prune_orphans(&mut self) {
        for repo in &mut self.repositories {
            repo.packages.retain(|p| !p.tags.is_empty());
        }
        self.repositories.retain(|r| !r.packages.is_empty());
    }

    pub fn list(&self) -> Vec<(&str, &Package)> {
        self.repositories
            .iter()
            .flat_map(|r| r.packages.iter().map(move |p| (r.name.as_str(), p)))
            .collect()
    }
}

#[derive(Debug, Default)]
pub struct TagResult;

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(id: &str, tags: &[&str]) -> Package {
        Package {
            id: id.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            size: "1 KB".into(),
            created: Utc::now(),
            package_type: "content/file".into(),
            file_ref: format!("{id}-ref"),
        }
    }

    #[test]
    fn add_then_find_by_name_resolves() {
        let mut idx = Index::default();
        idx.add("localhost/library/demo", "latest", pkg("aaa", &[])).unwrap();
        let name = PackageName::parse("localhost/library/demo:latest").unwrap();
        assert_eq!(idx.find_by_name(&name).unwrap().id, "aaa");
    }

    #[test]
    fn adding_same_id_under_same_tag_twice_fails_already_exists() {
        let mut idx = Index::default();
        idx.add("r", "latest", pkg("aaa", &[])).unwrap();
        let err = idx.add("r", "latest", pkg("aaa", &[])).unwrap_err();
        assert!(matches!(err, ArtError::AlreadyExists(_)));
    }

    #[test]
    fn find_names_by_id_detects_ambiguity() {
        let mut idx = Index::default();
        idx.add("r1", "a", pkg("aaabbb", &[])).unwrap();
        idx.add("r2", "b", pkg("aaaccc", &[])).unwrap();
        assert!(idx.find_names_by_id("aaa").is_err());
    }

    #[test]
    fn remove_tags_errors_when_not_found() {
        let mut idx = Index::default();
        assert!(idx.remove_tags(&[("r".to_string(), "missing".to_string())]).is_err());
    }

    #[test]
    fn prune_orphans_drops_untagged_packages() {
        let mut idx = Index::default();
        idx.add("r", "latest", pkg("aaa", &[])).unwrap();
        idx.remove_tags(&[("r".to_string(), "latest".to_string())]).unwrap();
        idx.prune_orphans();
        assert!(idx.list().is_empty());
    }
}
