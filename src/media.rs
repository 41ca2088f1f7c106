use std::{
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::Context;
use async_trait::async_trait;
use aws_config::{defaults, BehaviorVersion};
use aws_credential_types::Credentials;
use aws_sdk_s3::{
    config::{Builder as S3ConfigBuilder, Region},
    Client,
};
use aws_smithy_types::byte_stream::ByteStream;
use bytes::Bytes;
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::MediaConfig;

/// Path segment every managed asset URL contains; the object key starts there.
const UPLOAD_SEGMENT: &str = "upload";

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Stores the object and returns its public URL.
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<String>;
    async fn delete_object(&self, key: &str) -> anyhow::Result<()>;
}

#[derive(Clone)]
pub struct S3MediaStore {
    client: Client,
    bucket: String,
    public_url: String,
}

impl S3MediaStore {
    pub async fn new(cfg: &MediaConfig) -> anyhow::Result<Self> {
        let shared = defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.region.clone()))
            .credentials_provider(Credentials::new(
                &cfg.access_key,
                &cfg.secret_key,
                None,
                None,
                "static",
            ))
            .endpoint_url(&cfg.endpoint)
            .load()
            .await;

        let conf = S3ConfigBuilder::from(&shared)
            .endpoint_url(&cfg.endpoint)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: Client::from_conf(conf),
            bucket: cfg.bucket.clone(),
            public_url: cfg.public_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MediaStore for S3MediaStore {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> anyhow::Result<String> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .context("s3 put_object")?;
        Ok(format!("{}/{}", self.public_url, key))
    }

    async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("s3 delete_object")?;
        Ok(())
    }
}

/// A client-supplied file spooled to local disk. The file is removed when the
/// value is dropped or consumed by [`upload`].
pub struct TempUpload {
    file: NamedTempFile,
    pub content_type: String,
    pub file_name: Option<String>,
}

impl TempUpload {
    pub fn write(
        dir: impl AsRef<Path>,
        body: &[u8],
        content_type: &str,
        file_name: Option<String>,
    ) -> anyhow::Result<Self> {
        std::fs::create_dir_all(dir.as_ref()).context("create upload tmp dir")?;
        let mut file = tempfile::Builder::new()
            .prefix("upload-")
            .tempfile_in(dir)
            .context("create temp file")?;
        file.write_all(body).context("write temp file")?;
        Ok(Self {
            file,
            content_type: content_type.to_string(),
            file_name,
        })
    }

    /// [`TempUpload::write`] on the blocking pool.
    pub async fn spool(
        dir: PathBuf,
        body: Bytes,
        content_type: String,
        file_name: Option<String>,
    ) -> anyhow::Result<Self> {
        tokio::task::spawn_blocking(move || Self::write(dir, &body, &content_type, file_name))
            .await
            .context("temp upload task")?
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    fn extension(&self) -> &str {
        ext_from_mime(&self.content_type)
            .or_else(|| {
                self.file_name
                    .as_deref()
                    .and_then(|n| Path::new(n).extension())
                    .and_then(|e| e.to_str())
            })
            .unwrap_or("bin")
    }

    fn discard(self) {
        let path = self.file.path().to_path_buf();
        if let Err(e) = self.file.close() {
            warn!(error = %e, path = %path.display(), "failed to remove temp upload");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedMedia {
    pub key: String,
    pub url: String,
}

/// Pushes a spooled file to the media store. The temp file is removed
/// whether or not the upload succeeds.
pub async fn upload(store: &dyn MediaStore, file: TempUpload) -> anyhow::Result<UploadedMedia> {
    let key = format!("{}/{}.{}", UPLOAD_SEGMENT, Uuid::new_v4(), file.extension());
    let result = async {
        let body = tokio::fs::read(file.path())
            .await
            .context("read temp upload")?;
        store
            .put_object(&key, Bytes::from(body), &file.content_type)
            .await
            .with_context(|| format!("put_object {}", key))
    }
    .await;
    file.discard();

    let url = result?;
    debug!(%key, %url, "media uploaded");
    Ok(UploadedMedia { key, url })
}

/// Best-effort removal of freshly uploaded assets whose owning write failed.
pub async fn rollback(store: &dyn MediaStore, uploaded: &[&UploadedMedia]) {
    for m in uploaded {
        if let Err(e) = store.delete_object(&m.key).await {
            warn!(error = ?e, key = %m.key, "failed to remove orphaned upload");
        }
    }
}

/// Deletes a previously uploaded asset by its public URL.
pub async fn delete(store: &dyn MediaStore, url: &str) -> anyhow::Result<()> {
    let key = object_key_from_url(url)?;
    store
        .delete_object(&key)
        .await
        .with_context(|| format!("delete_object {}", key))
}

/// Extracts the object key (`upload/...`) from a public asset URL.
pub fn object_key_from_url(url: &str) -> anyhow::Result<String> {
    let without_scheme = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    let path = without_scheme.split(['?', '#']).next().unwrap_or_default();
    let parts: Vec<&str> = path.split('/').collect();
    let idx = parts
        .iter()
        .position(|p| *p == UPLOAD_SEGMENT)
        .ok_or_else(|| anyhow::anyhow!("unrecognized media url: {}", url))?;
    if idx + 1 >= parts.len() || parts[idx + 1..].iter().all(|p| p.is_empty()) {
        anyhow::bail!("media url has no object after '{}': {}", UPLOAD_SEGMENT, url);
    }
    Ok(parts[idx..].join("/"))
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}
