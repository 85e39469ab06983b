//! Media store that downloads assets over HTTP into a local directory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use campussync_common::{AssetId, EntityId, Error, Result};

use crate::provider::MediaStore;

/// Asset index file name in the media root.
pub const INDEX_FILENAME: &str = "assets.json";

/// Prefix of in-flight downloads inside the media root.
const PARTIAL_PREFIX: &str = ".incoming-";

/// Extension used when neither the URL nor the response reveals one.
const DEFAULT_EXTENSION: &str = "jpg";

/// A registered asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRecord {
    /// File name inside the media root.
    pub file_name: String,
    /// URL the asset was downloaded from.
    pub source_url: String,
    /// Entity the asset was sideloaded for.
    pub owner: EntityId,
    /// Download size in bytes.
    pub size: u64,
    /// Registration time.
    pub stored_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct AssetIndex {
    next_id: u64,
    assets: BTreeMap<AssetId, AssetRecord>,
}

impl Default for AssetIndex {
    fn default() -> Self {
        Self {
            next_id: 1,
            assets: BTreeMap::new(),
        }
    }
}

/// HTTP-sideloading media store.
///
/// Downloads are awaited inline with no timeout and no retry. A slow source
/// stalls only its own caller: bodies stream into a private temp file and the
/// index lock is taken just to register the finished file.
pub struct HttpMediaStore {
    http: Client,
    root: PathBuf,
    public_base_url: String,
    index: RwLock<AssetIndex>,
}

impl HttpMediaStore {
    /// Open a media store rooted at `root`, serving files under `public_base_url`.
    ///
    /// # Errors
    /// - Root cannot be created
    /// - Existing index cannot be parsed
    /// - HTTP client cannot be built
    pub fn open(root: impl AsRef<Path>, public_base_url: impl Into<String>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.exists() {
            std::fs::create_dir_all(&root)?;
        }

        let index_path = root.join(INDEX_FILENAME);
        let index = if index_path.exists() {
            let content = std::fs::read_to_string(&index_path)?;
            serde_json::from_str(&content).map_err(|e| Error::Serialization(e.to_string()))?
        } else {
            AssetIndex::default()
        };

        let http = Client::builder()
            .user_agent(concat!("campussync/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            root,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            index: RwLock::new(index),
        })
    }

    /// Look up a registered asset.
    pub async fn record(&self, id: AssetId) -> Option<AssetRecord> {
        self.index.read().await.assets.get(&id).cloned()
    }

    async fn persist_index(&self, index: &AssetIndex) -> Result<()> {
        let json =
            serde_json::to_vec_pretty(index).map_err(|e| Error::Serialization(e.to_string()))?;
        let temp = self.root.join(format!("{}.tmp", INDEX_FILENAME));
        fs::write(&temp, &json).await?;
        fs::rename(&temp, self.root.join(INDEX_FILENAME)).await?;
        Ok(())
    }

    /// Stream a response body into `path`.
    async fn download_to(&self, response: reqwest::Response, path: &Path, url: &str) -> Result<u64> {
        let mut file = fs::File::create(path).await?;
        let mut size = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| Error::Network(format!("Download of {} interrupted: {}", url, e)))?;
            size += chunk.len() as u64;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(size)
    }

    /// Move a finished download into place and record it in the index.
    ///
    /// # Postconditions
    /// - On success the file is named `<id>-<file_name>` and the index on
    ///   disk lists it
    /// - On failure neither the file nor the index entry remains
    async fn register(
        &self,
        partial: &Path,
        file_name: &str,
        url: &str,
        owner: EntityId,
        size: u64,
    ) -> Result<AssetId> {
        let mut index = self.index.write().await;
        let id = AssetId::new(index.next_id)
            .ok_or_else(|| Error::Storage("Identifier space exhausted".to_string()))?;
        let stored_name = format!("{}-{}", id, file_name);
        let path = self.root.join(&stored_name);
        fs::rename(partial, &path).await?;

        index.next_id += 1;
        index.assets.insert(
            id,
            AssetRecord {
                file_name: stored_name,
                source_url: url.to_string(),
                owner,
                size,
                stored_at: Utc::now(),
            },
        );
        if let Err(e) = self.persist_index(&index).await {
            index.assets.remove(&id);
            index.next_id -= 1;
            let _ = fs::remove_file(&path).await;
            return Err(e);
        }
        Ok(id)
    }
}

#[async_trait]
impl MediaStore for HttpMediaStore {
    fn name(&self) -> &str {
        "http"
    }

    async fn sideload(&self, url: &str, owner: EntityId) -> Result<AssetId> {
        let parsed = url::Url::parse(url)
            .map_err(|e| Error::InvalidInput(format!("Invalid media URL {}: {}", url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::NotPermitted(format!(
                "Only http(s) media can be sideloaded: {}",
                url
            )));
        }

        debug!("Downloading media from {}", url);
        let response = self
            .http
            .get(parsed.clone())
            .send()
            .await
            .map_err(|e| Error::Network(format!("Failed to download {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::Network(format!(
                "Download failed for {}: {}",
                url,
                response.status()
            )));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or("").trim().to_string());
        let file_name = derive_file_name(&parsed, content_type.as_deref());

        let partial = self
            .root
            .join(format!("{}{}", PARTIAL_PREFIX, Uuid::new_v4().simple()));
        let registered = match self.download_to(response, &partial, url).await {
            Ok(size) => self
                .register(&partial, &file_name, url, owner, size)
                .await
                .map(|id| (id, size)),
            Err(e) => Err(e),
        };
        let (id, size) = match registered {
            Ok(registered) => registered,
            Err(e) => {
                let _ = fs::remove_file(&partial).await;
                return Err(e);
            }
        };

        info!("Stored asset {} ({} bytes) from {}", id, size, url);
        Ok(id)
    }

    async fn url(&self, id: AssetId) -> Result<Option<String>> {
        let index = self.index.read().await;
        Ok(index
            .assets
            .get(&id)
            .map(|record| format!("{}/{}", self.public_base_url, record.file_name)))
    }
}

/// Choose a file name for a downloaded asset.
///
/// Uses the last URL path segment; when it has no extension, one is taken
/// from the response content type, defaulting to `.jpg`.
fn derive_file_name(url: &url::Url, content_type: Option<&str>) -> String {
    let base: String = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();
    let base = base.trim_matches('.').to_string();

    if base.contains('.') {
        return base;
    }

    match content_type.and_then(extension_for_mime) {
        Some(ext) => format!("image-{}.{}", Uuid::new_v4().simple(), ext),
        None if base.is_empty() => format!("asset.{}", DEFAULT_EXTENSION),
        None => format!("{}.{}", base, DEFAULT_EXTENSION),
    }
}

fn extension_for_mime(mime: &str) -> Option<&'static str> {
    match mime {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    /// Serve one connection: send headers announcing a 1 KiB PNG, a few body
    /// bytes, then either hang or hang up.
    async fn truncated_server(hang: bool) -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 2048];
            let _ = socket.read(&mut request).await;
            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: 1024\r\n\r\nPNG",
                )
                .await
                .unwrap();
            socket.flush().await.unwrap();
            if hang {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
        });
        addr
    }

    fn entries(root: &Path) -> Vec<String> {
        std::fs::read_dir(root)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    fn url(raw: &str) -> url::Url {
        url::Url::parse(raw).unwrap()
    }

    #[test]
    fn test_file_name_from_path() {
        let name = derive_file_name(&url("https://example.com/uploads/logo.png?v=2"), None);
        assert_eq!(name, "logo.png");
    }

    #[test]
    fn test_file_name_from_content_type() {
        let name = derive_file_name(&url("https://cdn.example.com/img/12345"), Some("image/webp"));
        assert!(name.starts_with("image-"));
        assert!(name.ends_with(".webp"));
    }

    #[test]
    fn test_file_name_default_extension() {
        assert_eq!(
            derive_file_name(&url("https://cdn.example.com/img/12345"), Some("text/html")),
            "12345.jpg"
        );
        assert_eq!(derive_file_name(&url("https://cdn.example.com/"), None), "asset.jpg");
    }

    #[tokio::test]
    async fn test_unknown_asset_has_no_url() {
        let temp = TempDir::new().unwrap();
        let store = HttpMediaStore::open(temp.path(), "http://localhost/media/").unwrap();

        assert!(store.url(AssetId::new(1).unwrap()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_url_rejected_without_network() {
        let temp = TempDir::new().unwrap();
        let store = HttpMediaStore::open(temp.path(), "http://localhost/media").unwrap();

        let result = store.sideload("not a url", EntityId::new(1).unwrap()).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));

        let result = store
            .sideload("file:///etc/passwd", EntityId::new(1).unwrap())
            .await;
        assert!(matches!(result, Err(Error::NotPermitted(_))));
    }

    #[tokio::test]
    async fn test_interrupted_download_leaves_no_files() {
        let temp = TempDir::new().unwrap();
        let store = HttpMediaStore::open(temp.path(), "http://localhost/media").unwrap();
        let addr = truncated_server(false).await;

        let result = store
            .sideload(&format!("http://{}/logo.png", addr), EntityId::new(1).unwrap())
            .await;
        assert!(matches!(result, Err(Error::Network(_))));
        assert!(entries(temp.path()).is_empty(), "{:?}", entries(temp.path()));

        assert!(store.url(AssetId::new(1).unwrap()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stalled_download_does_not_block_lookups() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(HttpMediaStore::open(temp.path(), "http://localhost/media").unwrap());
        let addr = truncated_server(true).await;

        let downloader = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .sideload(&format!("http://{}/logo.png", addr), EntityId::new(1).unwrap())
                    .await
            })
        };
        // Let the download reach the body.
        tokio::time::sleep(Duration::from_millis(300)).await;

        let lookup = tokio::time::timeout(Duration::from_secs(2), store.url(AssetId::new(1).unwrap()))
            .await
            .expect("lookup waited on the download");
        assert!(lookup.unwrap().is_none());
        assert!(!downloader.is_finished());

        downloader.abort();
    }
}
