//! # Schema Loader
//!
//! Retrieves schema documents by URL. `http://` and `https://` URLs are
//! downloaded under the fetch policy; `file://` URLs and bare paths are read
//! from disk.

use super::{Attempt, Cancellation, FetchPolicy, classify_status, with_retry};
use crate::documents::validate_file_size;
use compspec_core::primitives::MAX_DOCUMENT_SIZE;
use compspec_core::{CompspecError, SchemaDocument};
use std::path::Path;

/// Async schema retrieval.
#[derive(Clone)]
pub struct SchemaLoader {
    http: reqwest::Client,
    policy: FetchPolicy,
    cancel: Cancellation,
}

impl SchemaLoader {
    #[must_use]
    pub fn new(http: reqwest::Client, policy: FetchPolicy, cancel: Cancellation) -> Self {
        Self {
            http,
            policy,
            cancel,
        }
    }

    /// Load and decode the schema at `url`.
    pub async fn load(&self, url: &str) -> Result<SchemaDocument, CompspecError> {
        let bytes = if url.starts_with("http://") || url.starts_with("https://") {
            with_retry(url, &self.policy, &self.cancel, || self.download(url)).await?
        } else {
            read_local(url)?
        };
        SchemaDocument::from_json(url, &bytes)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, Attempt> {
        let resp = self.http.get(url).send().await?;
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
                format!("schema exceeds maximum allowed {} bytes", MAX_DOCUMENT_SIZE),
            )));
        }

        Ok(resp.bytes().await?.to_vec())
    }
}

fn read_local(url: &str) -> Result<Vec<u8>, CompspecError> {
    let path = Path::new(url.strip_prefix("file://").unwrap_or(url));
    validate_file_size(path, MAX_DOCUMENT_SIZE).map_err(|e| CompspecError::fetch(url, e))?;
    std::fs::read(path).map_err(|e| CompspecError::fetch(url, e))
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn loader() -> SchemaLoader {
        SchemaLoader::new(
            reqwest::Client::new(),
            FetchPolicy::default(),
            Cancellation::never(),
        )
    }

    #[tokio::test]
    async fn loads_file_url() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("schema.json");
        std::fs::write(
            &path,
            r#"{"graph": {"id": "io.archspec", "nodes": {"cpu": {}, "cpu.target": {}}}}"#,
        )
        .expect("write");

        let url = format!("file://{}", path.display());
        let doc = loader().load(&url).await.expect("load");
        assert_eq!(doc.id, "io.archspec");
        assert_eq!(doc.nodes.len(), 2);
    }

    #[tokio::test]
    async fn missing_file_is_fetch_error() {
        let err = loader()
            .load("/definitely/not/here.json")
            .await
            .expect_err("missing");
        assert!(matches!(err, CompspecError::Fetch { .. }));
    }

    #[tokio::test]
    async fn non_graph_document_is_fetch_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("schema.json");
        std::fs::write(&path, r#"{"nodes": {}}"#).expect("write");

        let err = loader()
            .load(&path.display().to_string())
            .await
            .expect_err("no graph id");
        assert!(err.to_string().contains("not a graph document"));
    }
}
