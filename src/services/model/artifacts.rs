// Model Artifact Fetcher
// Resolves the tokenizer/model files from a local directory or the model hub cache

use super::ModelError;
use crate::services::config_store::ModelConfig;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

const DOWNLOAD_TIMEOUT_SECS: u64 = 900;
const CONNECT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct ModelArtifacts {
    pub model_path: PathBuf,
    pub tokenizer_path: PathBuf,
}

pub struct ArtifactFetcher {
    client: Client,
    config: ModelConfig,
}

impl ArtifactFetcher {
    pub fn new(config: ModelConfig) -> Result<Self, ModelError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client, config })
    }

    /// `model.name` pointing at an existing directory means local artifacts
    pub fn local_dir(&self) -> Option<PathBuf> {
        let path = Path::new(&self.config.name);
        path.is_dir().then(|| path.to_path_buf())
    }

    /// `<cache>/<org--name>/<revision>/<file>`
    pub fn cache_path(&self, file: &str) -> PathBuf {
        self.config
            .resolved_cache_dir()
            .join(self.config.name.replace('/', "--"))
            .join(&self.config.revision)
            .join(file)
    }

    pub fn file_url(&self, file: &str) -> String {
        format!(
            "{}/{}/resolve/{}/{}",
            self.config.hub_url.trim_end_matches('/'),
            self.config.name,
            self.config.revision,
            file
        )
    }

    pub async fn fetch(&self) -> Result<ModelArtifacts, ModelError> {
        if let Some(dir) = self.local_dir() {
            let artifacts = ModelArtifacts {
                model_path: dir.join(&self.config.model_file),
                tokenizer_path: dir.join(&self.config.tokenizer_file),
            };
            for path in [&artifacts.tokenizer_path, &artifacts.model_path] {
                if !path.is_file() {
                    return Err(ModelError::MissingArtifact(path.display().to_string()));
                }
            }
            info!(dir = %dir.display(), "model.artifacts.local");
            return Ok(artifacts);
        }

        let tokenizer_path = self.fetch_file(&self.config.tokenizer_file).await?;
        let model_path = self.fetch_file(&self.config.model_file).await?;
        Ok(ModelArtifacts {
            model_path,
            tokenizer_path,
        })
    }

    async fn fetch_file(&self, file: &str) -> Result<PathBuf, ModelError> {
        let target = self.cache_path(file);
        if target.is_file() {
            info!(path = %target.display(), "model.artifact.cached");
            return Ok(target);
        }

        let url = self.file_url(file);
        let t0 = Instant::now();
        info!(url = %url, "model.artifact.download");

        let mut request = self.client.get(&url);
        if let Some(token) = &self.config.hub_token {
            request = request.bearer_auth(token);
        }
        let mut response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "model.artifact.download_failed");
            return Err(ModelError::HubStatus {
                status: status.as_u16(),
                url,
            });
        }

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Stream into a sibling temp file so a partial download never looks cached
        let partial = target.with_extension("part");
        let mut out = tokio::fs::File::create(&partial).await?;
        let mut bytes: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            out.write_all(&chunk).await?;
            bytes += chunk.len() as u64;
        }
        out.flush().await?;
        drop(out);
        tokio::fs::rename(&partial, &target).await?;

        info!(
            path = %target.display(),
            bytes,
            download_ms = t0.elapsed().as_millis(),
            "model.artifact.stored"
        );
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(name: &str, cache: &Path) -> ModelConfig {
        ModelConfig {
            name: name.to_string(),
            cache_dir: Some(cache.to_path_buf()),
            ..ModelConfig::default()
        }
    }

    #[test]
    fn test_cache_path_layout() {
        let cache = tempfile::tempdir().unwrap();
        let fetcher = ArtifactFetcher::new(config_with("org/detector", cache.path())).unwrap();
        let path = fetcher.cache_path("onnx/model.onnx");
        assert_eq!(
            path,
            cache.path().join("org--detector").join("main").join("onnx/model.onnx")
        );
    }

    #[test]
    fn test_file_url() {
        let cache = tempfile::tempdir().unwrap();
        let mut config = config_with("org/detector", cache.path());
        config.hub_url = "https://hub.example/".to_string();
        let fetcher = ArtifactFetcher::new(config).unwrap();
        assert_eq!(
            fetcher.file_url("tokenizer.json"),
            "https://hub.example/org/detector/resolve/main/tokenizer.json"
        );
    }

    #[tokio::test]
    async fn test_cached_files_skip_download() {
        let cache = tempfile::tempdir().unwrap();
        let mut config = config_with("org/detector", cache.path());
        // Unroutable hub: any network access would fail the test
        config.hub_url = "http://127.0.0.1:9".to_string();
        let fetcher = ArtifactFetcher::new(config).unwrap();

        for file in ["tokenizer.json", "onnx/model.onnx"] {
            let path = fetcher.cache_path(file);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, b"stub").unwrap();
        }

        let artifacts = fetcher.fetch().await.unwrap();
        assert!(artifacts.model_path.ends_with("onnx/model.onnx"));
        assert!(artifacts.tokenizer_path.ends_with("tokenizer.json"));
    }

    #[tokio::test]
    async fn test_local_dir_resolution() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("onnx")).unwrap();
        std::fs::write(dir.path().join("onnx/model.onnx"), b"stub").unwrap();
        std::fs::write(dir.path().join("tokenizer.json"), b"{}").unwrap();

        let config = config_with(&dir.path().to_string_lossy(), dir.path());
        let fetcher = ArtifactFetcher::new(config).unwrap();
        assert!(fetcher.local_dir().is_some());

        let artifacts = fetcher.fetch().await.unwrap();
        assert_eq!(artifacts.model_path, dir.path().join("onnx/model.onnx"));
    }

    #[tokio::test]
    async fn test_unreachable_hub_is_error() {
        let cache = tempfile::tempdir().unwrap();
        let mut config = config_with("org/detector", cache.path());
        config.hub_url = "http://127.0.0.1:9".to_string();
        let fetcher = ArtifactFetcher::new(config).unwrap();
        let err = fetcher.fetch().await.unwrap_err();
        assert!(matches!(err, ModelError::HttpError(_)));
        assert!(!fetcher.cache_path("tokenizer.json").exists());
    }
}
