//! File and remote exchange collaborator.
//!
//! Import/export and the default-workspace lane never touch the debounced
//! local save path; they go through this boundary, supplied by the host
//! environment. The engine only ever sees the [`Exchange`] trait.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{PersistenceError, Result};

/// Host-supplied file and remote primitives.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Read a local file to a string.
    async fn read_file(&self, path: &Path) -> Result<String>;

    /// Write a string to a local file, creating parent directories.
    async fn write_file(&self, path: &Path, contents: &str) -> Result<()>;

    /// Fetch a named remote resource.
    async fn fetch_file(&self, resource: &str) -> Result<String>;

    /// Post contents to a named remote resource.
    async fn post_file(&self, resource: &str, contents: &str) -> Result<()>;
}

/// Default host exchange: local files via tokio::fs, remote resources via
/// HTTP against a fixed base URL.
///
/// Relative paths resolve under `export_dir`, so engine callers can pass
/// bare filenames.
pub struct HostExchange {
    export_dir: PathBuf,
    remote_base: String,
    client: reqwest::Client,
}

impl HostExchange {
    pub fn new(export_dir: impl Into<PathBuf>, remote_base: impl Into<String>) -> Self {
        Self {
            export_dir: export_dir.into(),
            remote_base: remote_base.into(),
            client: reqwest::Client::new(),
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.export_dir.join(path)
        }
    }

    fn resource_url(&self, resource: &str) -> String {
        format!("{}/{}", self.remote_base.trim_end_matches('/'), resource)
    }
}

#[async_trait]
impl Exchange for HostExchange {
    async fn read_file(&self, path: &Path) -> Result<String> {
        let path = self.resolve(path);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| PersistenceError::Io {
                operation: "read",
                path,
                source: e,
            })
    }

    async fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
        let path = self.resolve(path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PersistenceError::Io {
                    operation: "create directory",
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        tokio::fs::write(&path, contents)
            .await
            .map_err(|e| PersistenceError::Io {
                operation: "write",
                path,
                source: e,
            })
    }

    async fn fetch_file(&self, resource: &str) -> Result<String> {
        let url = self.resource_url(resource);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| exchange_error("fetch", resource, e.to_string()))?;

        if !response.status().is_success() {
            return Err(exchange_error(
                "fetch",
                resource,
                format!("server returned {}", response.status()),
            ));
        }

        response
            .text()
            .await
            .map_err(|e| exchange_error("fetch", resource, e.to_string()))
    }

    async fn post_file(&self, resource: &str, contents: &str) -> Result<()> {
        let url = self.resource_url(resource);
        let response = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(contents.to_string())
            .send()
            .await
            .map_err(|e| exchange_error("post", resource, e.to_string()))?;

        if !response.status().is_success() {
            return Err(exchange_error(
                "post",
                resource,
                format!("server returned {}", response.status()),
            ));
        }
        Ok(())
    }
}

fn exchange_error(operation: &'static str, resource: &str, detail: String) -> PersistenceError {
    PersistenceError::Exchange {
        operation,
        resource: resource.to_string(),
        detail,
    }
}
