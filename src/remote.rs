//! The remote client: a thin HTTP client keyed by a fully qualified
//! registry domain (spec §4.6).
//!
//! Grounded on `original_source/core/http.go`'s `Curl`/`Get` (TLS-first
//! with an insecure-fallback transport, bounded retry with a fixed delay,
//! Basic auth token) and `registry/remoteRegistry.go`'s
//! `RemoveByNameFilter`. Async surface follows the teacher's
//! `forge/traits.rs` `#[async_trait]` pattern.

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::{ArtError, Result};
use crate::seal::Seal;

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const ENV_REG_USER: &str = "ART_REG_USER";
const ENV_REG_PWD: &str = "ART_REG_PWD";

/// Basic-auth credentials for a remote registry.
#[derive(Clone)]
pub struct Credentials {
    pub user: String,
    pub password: SecretString,
}

impl Credentials {
    /// Fall back to the well-known `ART_REG_USER`/`ART_REG_PWD` environment
    /// variables when the caller supplied no explicit credentials.
    pub fn from_env_or(explicit: Option<Credentials>) -> Option<Credentials> {
        if explicit.is_some() {
            return explicit;
        }
        let user = std::env::var(ENV_REG_USER).ok()?;
        let password = std::env::var(ENV_REG_PWD).ok()?;
        Some(Credentials { user, password: SecretString::from(password) })
    }
}

/// Summary info for one repository on the remote, as returned by
/// `get_all_repository_info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryInfo {
    pub name: String,
    pub tags: Vec<String>,
}

/// Per-package info as stored/returned by the remote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageInfo {
    pub id: String,
    pub tags: Vec<String>,
    pub size: String,
}

/// Digest info returned by `get_digest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestInfo {
    pub digest: String,
}

/// The narrow client interface the core consumes; the server's wire
/// format is out of scope (spec §1).
#[async_trait]
pub trait RemoteClient {
    async fn get_all_repository_info(&self, creds: Option<&Credentials>) -> Result<Vec<RepositoryInfo>>;
    async fn get_package_info(&self, group: &str, name: &str, id: &str, creds: Option<&Credentials>) -> Result<PackageInfo>;
    async fn upsert_package_info(&self, name: &str, info: &PackageInfo, creds: Option<&Credentials>) -> Result<()>;
    async fn delete_package_info(&self, group: &str, name: &str, tag: &str, creds: Option<&Credentials>) -> Result<()>;
    async fn delete_package(&self, id: &str, creds: Option<&Credentials>) -> Result<()>;
    async fn get_digest(&self, group: &str, name: &str, tag: &str, creds: Option<&Credentials>) -> Result<DigestInfo>;
    async fn get_seal(&self, group: &str, name: &str, tag: &str, creds: Option<&Credentials>) -> Result<Seal>;
    async fn push_blob(&self, group: &str, name: &str, reference: &str, bytes: Vec<u8>, creds: Option<&Credentials>) -> Result<()>;
    async fn pull_blob(&self, group: &str, name: &str, reference: &str, creds: Option<&Credentials>) -> Result<Vec<u8>>;

    /// Delete every `repository:tag` matching `filter`; a no-op report
    /// when `dry_run` is set (spec §4.6 "Removal by filter", testable
    /// scenario S6).
    async fn remove_by_name_filter(&self, filter: &str, dry_run: bool) -> Result<Vec<String>>;
}

/// A thin HTTP client for one registry domain: tries TLS, falls back to
/// plain HTTP with a logged warning, and retries idempotent requests with
/// a bounded, fixed-delay loop.
pub struct HttpRemoteClient {
    domain: String,
    https_client: Client,
    http_client: Client,
    max_attempts: u32,
    retry_delay: Duration,
}

impl HttpRemoteClient {
    pub fn new(domain: impl Into<String>) -> Result<Self> {
        let domain = domain.into();
        if domain.starts_with("http") {
            return Err(ArtError::invalid_name(format!(
                "remote registry domain '{domain}' should not specify a protocol scheme"
            )));
        }
        if domain.contains('/') {
            return Err(ArtError::invalid_name(format!(
                "remote registry domain '{domain}' should not contain slashes"
            )));
        }
        let https_client = Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        let http_client = Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self {
            domain,
            https_client,
            http_client,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
        })
    }

    fn basic_auth(request: reqwest::RequestBuilder, creds: Option<&Credentials>) -> reqwest::RequestBuilder {
        match creds {
            Some(c) => request.basic_auth(&c.user, Some(c.password.expose_secret())),
            None => request,
        }
    }

    /// TLS first, then plain HTTP fallback with a warning, retried up to
    /// `max_attempts` times against `valid_codes`.
    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Vec<u8>>,
        creds: Option<&Credentials>,
        valid_codes: &[StatusCode],
    ) -> Result<reqwest::Response> {
        let https_url = format!("https://{}{}", self.domain, path);
        let http_url = format!("http://{}{}", self.domain, path);

        let mut last_err: Option<ArtError> = None;
        for attempt in 0..self.max_attempts {
            let (client, url) = if attempt == 0 {
                (&self.https_client, &https_url)
            } else {
                match self
                    .try_once(&self.https_client, method.clone(), &https_url, body.clone(), creds, valid_codes)
                    .await
                {
                    Ok(resp) => return Ok(resp),
                    Err(_) => (&self.http_client, &http_url),
                }
            };
            match self.try_once(client, method.clone(), url, body.clone(), creds, valid_codes).await {
                Ok(resp) => {
                    if attempt > 0 {
                        log::warn!("falling back to plain HTTP for '{}'", self.domain);
                    }
                    return Ok(resp);
                }
                Err(e) => {
                    last_err = Some(e);
                    if attempt + 1 < self.max_attempts {
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| ArtError::network("request failed with no recorded error")))
    }

    async fn try_once(
        &self,
        client: &Client,
        method: reqwest::Method,
        url: &str,
        body: Option<Vec<u8>>,
        creds: Option<&Credentials>,
        valid_codes: &[StatusCode],
    ) -> Result<reqwest::Response> {
        let mut request = client.request(method, url);
        request = Self::basic_auth(request, creds);
        if let Some(bytes) = body {
            request = request.body(bytes);
        }
        let response = request.send().await.map_err(|e| ArtError::network(e.to_string()))?;
        if response.status() == StatusCode::UNAUTHORIZED || response.status() == StatusCode::FORBIDDEN {
            return Err(ArtError::Auth(format!("authentication rejected for '{url}'")));
        }
        if !valid_codes.is_empty() && !valid_codes.contains(&response.status()) {
            return Err(ArtError::network(format!(
                "unexpected status {} from '{url}'",
                response.status()
            )));
        }
        Ok(response)
    }
}

#[async_trait]
impl RemoteClient for HttpRemoteClient {
    async fn get_all_repository_info(&self, creds: Option<&Credentials>) -> Result<Vec<RepositoryInfo>> {
        let resp = self
            .request(reqwest::Method::GET, "/repository", None, creds, &[StatusCode::OK])
            .await?;
        Ok(resp.json().await.map_err(|e| ArtError::network(e.to_string()))?)
    }

    async fn get_package_info(&self, group: &str, name: &str, id: &str, creds: Option<&Credentials>) -> Result<PackageInfo> {
        let path = format!("/package/{group}/{name}/{id}");
        let resp = self.request(reqwest::Method::GET, &path, None, creds, &[StatusCode::OK]).await?;
        Ok(resp.json().await.map_err(|e| ArtError::network(e.to_string()))?)
    }

    async fn upsert_package_info(&self, name: &str, info: &PackageInfo, creds: Option<&Credentials>) -> Result<()> {
        let path = format!("/package/{name}");
        let body = serde_json::to_vec(info)?;
        self.request(
            reqwest::Method::PUT,
            &path,
            Some(body),
            creds,
            &[StatusCode::OK, StatusCode::CREATED],
        )
        .await?;
        Ok(())
    }

    async fn delete_package_info(&self, group: &str, name: &str, tag: &str, creds: Option<&Credentials>) -> Result<()> {
        let path = format!("/package/{group}/{name}/{tag}");
        self.request(reqwest::Method::DELETE, &path, None, creds, &[StatusCode::OK, StatusCode::NO_CONTENT])
            .await?;
        Ok(())
    }

    async fn delete_package(&self, id: &str, creds: Option<&Credentials>) -> Result<()> {
        let path = format!("/package/{id}/blob");
        self.request(reqwest::Method::DELETE, &path, None, creds, &[StatusCode::OK, StatusCode::NO_CONTENT])
            .await?;
        Ok(())
    }

    async fn get_digest(&self, group: &str, name: &str, tag: &str, creds: Option<&Credentials>) -> Result<DigestInfo> {
        let path = format!("/package/{group}/{name}/{tag}/digest");
        let resp = self.request(reqwest::Method::GET, &path, None, creds, &[StatusCode::OK]).await?;
        Ok(resp.json().await.map_err(|e| ArtError::network(e.to_string()))?)
    }

    async fn get_seal(&self, group: &str, name: &str, tag: &str, creds: Option<&Credentials>) -> Result<Seal> {
        let path = format!("/package/{group}/{name}/{tag}/seal");
        let resp = self.request(reqwest::Method::GET, &path, None, creds, &[StatusCode::OK]).await?;
        Ok(resp.json().await.map_err(|e| ArtError::network(e.to_string()))?)
    }

    async fn push_blob(&self, group: &str, name: &str, reference: &str, bytes: Vec<u8>, creds: Option<&Credentials>) -> Result<()> {
        let path = format!("/package/{group}/{name}/{reference}/blob");
        self.request(reqwest::Method::PUT, &path, Some(bytes), creds, &[StatusCode::OK, StatusCode::CREATED])
            .await?;
        Ok(())
    }

    async fn pull_blob(&self, group: &str, name: &str, reference: &str, creds: Option<&Credentials>) -> Result<Vec<u8>> {
        let path = format!("/package/{group}/{name}/{reference}/blob");
        let resp = self.request(reqwest::Method::GET, &path, None, creds, &[StatusCode::OK]).await?;
        Ok(resp.bytes().await.map_err(|e| ArtError::network(e.to_string()))?.to_vec())
    }

    async fn remove_by_name_filter(&self, filter: &str, dry_run: bool) -> Result<Vec<String>> {
        let pattern = Regex::new(filter)?;
        let repos = self.get_all_repository_info(None).await?;
        let mut removed = vec![];
        for repo in repos {
            for tag in repo.tags {
                let full_name = format!("{}:{tag}", repo.name);
                if pattern.is_match(&full_name) {
                    if !dry_run {
                        let (group, name) = split_repository(&repo.name);
                        self.delete_package_info(&group, &name, &tag, None).await?;
                    }
                    removed.push(full_name);
                }
            }
        }
        Ok(removed)
    }
}

fn split_repository(repo: &str) -> (String, String) {
    match repo.rsplit_once('/') {
        Some((group, name)) => (group.to_string(), name.to_string()),
        None => (String::new(), repo.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_domain_with_scheme() {
        assert!(HttpRemoteClient::new("https://example.com").is_err());
    }

    #[test]
    fn rejects_domain_with_slashes() {
        assert!(HttpRemoteClient::new("example.com/registry").is_err());
    }

    #[test]
    fn accepts_a_bare_domain() {
        assert!(HttpRemoteClient::new("registry.example.com:8443").is_ok());
    }

    #[test]
    fn split_repository_separates_group_and_name() {
        assert_eq!(split_repository("acme/demo"), ("acme".to_string(), "demo".to_string()));
        assert_eq!(split_repository("demo"), (String::new(), "demo".to_string()));
    }

    /// Invariant for spec §4.6/testable scenario S6's filter matching.
    #[test]
    fn filter_regex_matches_fully_qualified_name_and_tag() {
        let pattern = Regex::new(r"^acme/.*:nightly$").unwrap();
        assert!(pattern.is_match("acme/demo:nightly"));
        assert!(!pattern.is_match("acme/demo:latest"));
    }

    #[test]
    fn from_env_or_prefers_explicit_credentials() {
        let explicit = Credentials { user: "alice".into(), password: SecretString::from("pw".to_string()) };
        let resolved = Credentials::from_env_or(Some(explicit));
        assert_eq!(resolved.unwrap().user, "alice");
    }

    #[test]
    fn from_env_or_returns_none_without_env_vars_set() {
        std::env::remove_var(ENV_REG_USER);
        std::env::remove_var(ENV_REG_PWD);
        assert!(Credentials::from_env_or(None).is_none());
    }
}
