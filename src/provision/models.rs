//! Hub authentication and model weight downloads.

use anyhow::{Context, Result};

use crate::{
    cache::ModelCache,
    config::Settings,
    external::hub::{store_token, HubClient},
    manifest::Manifest,
    printer::StatusPrinter,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadReport {
    pub downloaded: usize,
    pub reused: usize,
    pub bytes: u64,
    pub checkpoints: usize,
}

/// Returns false, after a warning, when no token is configured.
pub async fn authenticate(settings: &Settings, hub: &HubClient, printer: &StatusPrinter) -> Result<bool> {
    let Some(token) = settings.hf_token.as_deref() else {
        printer.warn("HF_TOKEN is not set; skipping hub login, gated models may fail to download");
        return Ok(false);
    };
    let account = hub.whoami().await?;
    store_token(&settings.hf_token_path, token)?;
    printer.ok(format!("logged in to {} as {}", settings.hf_endpoint, account));
    Ok(true)
}

pub async fn download_weights(
    settings: &Settings,
    manifest: &Manifest,
    hub: &HubClient,
    printer: &StatusPrinter,
) -> Result<DownloadReport> {
    let cache = ModelCache::new(&settings.model_cache_dir);
    cache.ensure()?;

    let mut report = DownloadReport::default();
    for model in &manifest.models {
        for file in &model.files {
            if cache.contains(&model.repo, file) {
                tracing::debug!(repo = %model.repo, %file, "already cached");
                report.reused += 1;
                continue;
            }
            let dest = cache.file_path(&model.repo, file)?;
            printer.info(format!("downloading {}/{}", model.repo, file));
            let bytes = hub
                .download(&model.repo, &model.revision, file, &dest)
                .await
                .with_context(|| format!("downloading {} from {}", file, model.repo))?;
            report.downloaded += 1;
            report.bytes += bytes;
        }
    }

    report.checkpoints = cache.checkpoint_count(&manifest.checkpoint_extensions);
    Ok(report)
}

/// Report what a download run would fetch, without touching disk or network.
pub fn plan_downloads(manifest: &Manifest, hub: &HubClient, printer: &StatusPrinter) {
    printer.dry(format!("{} model files from {} repos", manifest.model_file_count(), manifest.models.len()));
    for model in &manifest.models {
        for file in &model.files {
            printer.dry(format!("GET {}", hub.file_url(&model.repo, &model.revision, file)));
        }
    }
}
