//! # OCI Registry Client
//!
//! Pulls compatibility artifacts from OCI distribution registries.
//!
//! ## Protocol
//!
//! ```text
//! GET /v2/<repo>/manifests/<tag|digest>   (401 -> bearer token -> retry)
//!   └─▶ layer whose mediaType matches ──▶ GET /v2/<repo>/blobs/<digest>
//!                                              └─▶ sha256 check ──▶ YAML decode
//! ```
//!
//! Anonymous pulls work for public repositories. Credentials for token
//! requests come from `COMPSPEC_REGISTRY_USERNAME` / `COMPSPEC_REGISTRY_PASSWORD`.

use super::{Attempt, Cancellation, FetchPolicy, classify_status, with_retry};
use compspec_core::primitives::MAX_DOCUMENT_SIZE;
use compspec_core::{CompatibilityArtifact, CompspecError};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

const DEFAULT_REGISTRY: &str = "docker.io";
const DOCKER_HUB_API: &str = "registry-1.docker.io";
const DEFAULT_TAG: &str = "latest";

const MANIFEST_ACCEPT: &str = "application/vnd.oci.image.manifest.v1+json, \
     application/vnd.docker.distribution.manifest.v2+json";

// =============================================================================
// REFERENCES
// =============================================================================

/// A parsed `registry/repository[:tag|@digest]` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub registry: String,
    pub repository: String,
    /// Tag or `algorithm:hex` digest.
    pub reference: String,
}

impl Reference {
    /// Parse an image or artifact reference.
    ///
    /// The first path component is a registry host if it contains `.` or `:`
    /// or is `localhost`; otherwise Docker Hub is assumed. A missing tag
    /// means `latest`.
    pub fn parse(raw: &str) -> Result<Self, CompspecError> {
        let raw = raw.trim();
        let invalid = |reason: &str| CompspecError::fetch(raw, format!("invalid reference: {}", reason));

        let (name, reference) = match raw.split_once('@') {
            Some((name, digest)) => (name, digest.to_string()),
            None => {
                let tail_start = raw.rfind('/').map_or(0, |i| i + 1);
                match raw[tail_start..].rfind(':') {
                    Some(i) => (
                        &raw[..tail_start + i],
                        raw[tail_start + i + 1..].to_string(),
                    ),
                    None => (raw, DEFAULT_TAG.to_string()),
                }
            }
        };

        if name.is_empty() {
            return Err(invalid("empty repository"));
        }
        if reference.is_empty() {
            return Err(invalid("empty tag or digest"));
        }

        let (registry, repository) = match name.split_once('/') {
            Some((first, rest))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (first.to_string(), rest.to_string())
            }
            Some(_) => (DEFAULT_REGISTRY.to_string(), name.to_string()),
            None => (DEFAULT_REGISTRY.to_string(), format!("library/{}", name)),
        };

        if repository.is_empty() || repository.split('/').any(str::is_empty) {
            return Err(invalid("empty path component"));
        }

        Ok(Self {
            registry,
            repository,
            reference,
        })
    }

    /// Host serving the distribution API for this registry.
    #[must_use]
    pub fn api_host(&self) -> &str {
        if self.registry == DEFAULT_REGISTRY {
            DOCKER_HUB_API
        } else {
            &self.registry
        }
    }

    #[must_use]
    pub fn is_digest(&self) -> bool {
        self.reference.contains(':')
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = if self.is_digest() { '@' } else { ':' };
        write!(f, "{}/{}{}{}", self.registry, self.repository, sep, self.reference)
    }
}

// =============================================================================
// AUTH CHALLENGE
// =============================================================================

/// Parameters of a `WWW-Authenticate: Bearer ...` challenge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Challenge {
    pub realm: String,
    pub service: Option<String>,
    pub scope: Option<String>,
}

impl Challenge {
    /// Parse a bearer challenge. Returns `None` for other schemes.
    #[must_use]
    pub fn parse(header: &str) -> Option<Self> {
        let (scheme, params) = header.trim().split_once(' ')?;
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }

        let params = parse_params(params);
        Some(Self {
            realm: params.get("realm").filter(|r| !r.is_empty())?.clone(),
            service: params.get("service").cloned(),
            scope: params.get("scope").cloned(),
        })
    }
}

/// Split `k="v",k2=v2` into pairs. Commas inside quotes are kept.
fn parse_params(raw: &str) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    let mut key = String::new();
    let mut value = String::new();
    let mut in_value = false;
    let mut quoted = false;

    for c in raw.chars().chain(std::iter::once(',')) {
        match c {
            '"' if in_value => quoted = !quoted,
            '=' if !in_value => in_value = true,
            ',' if !quoted => {
                let k = key.trim().to_ascii_lowercase();
                if !k.is_empty() {
                    params.insert(k, value.trim().to_string());
                }
                key.clear();
                value.clear();
                in_value = false;
            }
            _ if in_value => value.push(c),
            _ => key.push(c),
        }
    }
    params
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

// =============================================================================
// MANIFEST
// =============================================================================

#[derive(Debug, Deserialize)]
struct ImageManifest {
    #[serde(default)]
    layers: Vec<Descriptor>,
}

#[derive(Debug, Deserialize)]
struct Descriptor {
    #[serde(rename = "mediaType")]
    media_type: String,
    digest: String,
    #[serde(default)]
    size: u64,
}

/// Check `bytes` against a `sha256:<hex>` digest.
pub fn verify_digest(target: &str, digest: &str, bytes: &[u8]) -> Result<(), CompspecError> {
    let expected = digest.strip_prefix("sha256:").ok_or_else(|| {
        CompspecError::fetch(target, format!("unsupported digest algorithm in {}", digest))
    })?;

    let actual = format!("{:x}", Sha256::digest(bytes));
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(CompspecError::fetch(
            target,
            format!("digest mismatch: expected {}, got sha256:{}", digest, actual),
        ));
    }
    Ok(())
}

// =============================================================================
// CLIENT
// =============================================================================

/// Registry client with token caching per repository.
pub struct RegistryClient {
    http: reqwest::Client,
    policy: FetchPolicy,
    cancel: Cancellation,
    plain_http: bool,
    credentials: Option<(String, String)>,
    tokens: Mutex<BTreeMap<String, String>>,
}

impl RegistryClient {
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        policy: FetchPolicy,
        cancel: Cancellation,
        plain_http: bool,
    ) -> Self {
        Self {
            http,
            policy,
            cancel,
            plain_http,
            credentials: None,
            tokens: Mutex::new(BTreeMap::new()),
        }
    }

    /// Use basic credentials when requesting bearer tokens.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Option<(String, String)>) -> Self {
        self.credentials = credentials;
        self
    }

    /// Read credentials from `COMPSPEC_REGISTRY_USERNAME` / `_PASSWORD`.
    #[must_use]
    pub fn credentials_from_env() -> Option<(String, String)> {
        let user = std::env::var("COMPSPEC_REGISTRY_USERNAME").ok()?;
        let password = std::env::var("COMPSPEC_REGISTRY_PASSWORD").unwrap_or_default();
        Some((user, password))
    }

    fn url(&self, reference: &Reference, kind: &str, id: &str) -> String {
        let scheme = if self.plain_http { "http" } else { "https" };
        format!(
            "{}://{}/v2/{}/{}/{}",
            scheme,
            reference.api_host(),
            reference.repository,
            kind,
            id
        )
    }

    /// Download the artifact layer with `media_type` from `reference`.
    pub async fn fetch_artifact(
        &self,
        reference: &Reference,
        media_type: &str,
    ) -> Result<CompatibilityArtifact, CompspecError> {
        let target = reference.to_string();

        let manifest_url = self.url(reference, "manifests", &reference.reference);
        let manifest_bytes = self.get(reference, &manifest_url, MANIFEST_ACCEPT).await?;
        let manifest: ImageManifest = serde_json::from_slice(&manifest_bytes)
            .map_err(|e| CompspecError::fetch(&target, format!("invalid manifest: {}", e)))?;

        let layer = manifest
            .layers
            .iter()
            .find(|l| l.media_type == media_type)
            .ok_or_else(|| {
                CompspecError::fetch(&target, format!("no layer with media type {}", media_type))
            })?;

        if layer.size > MAX_DOCUMENT_SIZE {
            return Err(CompspecError::fetch(
                &target,
                format!(
                    "layer of {} bytes exceeds maximum allowed {} bytes",
                    layer.size, MAX_DOCUMENT_SIZE
                ),
            ));
        }

        let blob_url = self.url(reference, "blobs", &layer.digest);
        let blob = self.get(reference, &blob_url, media_type).await?;
        verify_digest(&target, &layer.digest, &blob)?;

        tracing::debug!(artifact = %target, digest = %layer.digest, "Pulled artifact layer");

        serde_yaml::from_slice(&blob).map_err(|e| {
            CompspecError::fetch(&target, format!("not a compatibility artifact: {}", e))
        })
    }

    async fn get(
        &self,
        reference: &Reference,
        url: &str,
        accept: &str,
    ) -> Result<Vec<u8>, CompspecError> {
        with_retry(url, &self.policy, &self.cancel, || {
            self.attempt_get(reference, url, accept)
        })
        .await
    }

    async fn attempt_get(
        &self,
        reference: &Reference,
        url: &str,
        accept: &str,
    ) -> Result<Vec<u8>, Attempt> {
        let mut resp = self.send(reference, url, accept).await?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            let challenge = resp
                .headers()
                .get(reqwest::header::WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok())
                .and_then(Challenge::parse)
                .ok_or_else(|| {
                    Attempt::Fatal(CompspecError::fetch(url, "unauthorized"))
                })?;

            let token = self.fetch_token(reference, &challenge).await?;
            if let Ok(mut tokens) = self.tokens.lock() {
                tokens.insert(reference.repository.clone(), token);
            }
            resp = self.send(reference, url, accept).await?;
        }

        let status = resp.status();
        if !status.is_success() {
            return Err(classify_status(url, status));
        }
        if resp
            .content_length()
            .is_some_and(|len| len > MAX_DOCUMENT_SIZE)
        {
            return Err(Attempt::Fatal(CompspecError::fetch(
                url,
                format!("response exceeds maximum allowed {} bytes", MAX_DOCUMENT_SIZE),
            )));
        }

        Ok(resp.bytes().await?.to_vec())
    }

    async fn send(
        &self,
        reference: &Reference,
        url: &str,
        accept: &str,
    ) -> Result<reqwest::Response, Attempt> {
        let token = self
            .tokens
            .lock()
            .ok()
            .and_then(|t| t.get(&reference.repository).cloned());

        let mut req = self
            .http
            .get(url)
            .header(reqwest::header::ACCEPT, accept);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        Ok(req.send().await?)
    }

    async fn fetch_token(
        &self,
        reference: &Reference,
        challenge: &Challenge,
    ) -> Result<String, Attempt> {
        let scope = challenge
            .scope
            .clone()
            .unwrap_or_else(|| format!("repository:{}:pull", reference.repository));

        let mut query = vec![("scope", scope)];
        if let Some(service) = &challenge.service {
            query.push(("service", service.clone()));
        }

        let mut req = self.http.get(&challenge.realm).query(&query);
        if let Some((user, password)) = &self.credentials {
            req = req.basic_auth(user, Some(password));
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(classify_status(&challenge.realm, status));
        }

        let body: TokenResponse = resp.json().await?;
        body.token
            .or(body.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                Attempt::Fatal(CompspecError::fetch(
                    &challenge.realm,
                    "token response has no token",
                ))
            })
    }
}

// =============================================================================
// TESTS
// =============================================================================
