use std::{
    ffi::OsString,
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;

use crate::{cache::PARTIAL_SUFFIX, config::Settings, error::ProvisionError};

/// Model hub client speaking the Hugging Face HTTP protocol.
pub struct HubClient {
    client: Client,
    base: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WhoAmI {
    name: String,
}

impl HubClient {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(&settings.hf_endpoint, settings.hf_token.clone(), settings.request_timeout)
    }

    pub fn new(base: &str, token: Option<String>, timeout_secs: Option<u64>) -> Result<Self> {
        let mut builder = Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")));
        if let Some(secs) = timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build()?;
        Ok(Self { client, base: base.trim_end_matches('/').to_string(), token })
    }

    pub fn file_url(&self, repo: &str, revision: &str, file: &str) -> String {
        format!("{}/{}/resolve/{}/{}", self.base, repo, revision, file)
    }

    /// Validate the token and return the account name it belongs to.
    pub async fn whoami(&self) -> Result<String> {
        let token = self
            .token
            .as_deref()
            .ok_or_else(|| ProvisionError::Auth("no token configured".into()))?;
        let url = format!("{}/api/whoami-v2", self.base);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .with_context(|| format!("requesting {url}"))?;

        match resp.status() {
            StatusCode::OK => {
                let who: WhoAmI = resp.json().await.context("decoding whoami response")?;
                Ok(who.name)
            }
            status => {
                let text = resp.text().await.unwrap_or_default();
                Err(ProvisionError::Auth(format!("{} {}", status, text.trim())).into())
            }
        }
    }

    /// Stream one file to `dest` through a `.part` sibling. Returns bytes written.
    pub async fn download(&self, repo: &str, revision: &str, file: &str, dest: &Path) -> Result<u64> {
        let url = self.file_url(repo, revision, file);
        let mut req = self.client.get(&url);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await.with_context(|| format!("requesting {url}"))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ProvisionError::Download { url, status: status.as_u16() }.into());
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let part = partial_path(dest);
        let mut out = tokio::fs::File::create(&part)
            .await
            .with_context(|| format!("creating {}", part.display()))?;

        let mut written = 0u64;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let bytes = chunk.with_context(|| format!("reading body of {url}"))?;
            out.write_all(&bytes).await?;
            written += bytes.len() as u64;
        }
        out.flush().await?;
        drop(out);

        tokio::fs::rename(&part, dest)
            .await
            .with_context(|| format!("moving {} into place", part.display()))?;
        tracing::debug!(%url, dest = %dest.display(), bytes = written, "downloaded");
        Ok(written)
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut s: OsString = dest.as_os_str().to_owned();
    s.push(".");
    s.push(PARTIAL_SUFFIX);
    PathBuf::from(s)
}

/// Persist the token where hub tooling looks for it, readable by the owner only.
pub fn store_token(path: &Path, token: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let mut opts = fs::OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    let mut file = opts
        .open(path)
        .with_context(|| format!("writing token to {}", path.display()))?;
    file.write_all(token.as_bytes())
        .with_context(|| format!("writing token to {}", path.display()))?;
    // An existing file keeps its old mode under `open`
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}
