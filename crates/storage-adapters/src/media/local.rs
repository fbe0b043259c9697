//! # Local media store
//!
//! Filesystem implementation of `MediaStorage`. Objects live flat under a
//! root directory; retrieval links carry an expiry and an HMAC-SHA256
//! signature over `name` and expiry, verified by [`SignedObjectReader`].
//! The content type given at upload is kept in a hidden sidecar file and is
//! the only type ever served back.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use domains::{DomainError, MediaStorage, Result, SignedObject, SignedObjectReader};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use tokio::fs;
use tokio::sync::OnceCell;
use tracing::{debug, info};

type HmacSha256 = Hmac<Sha256>;

/// Fallback for objects stored without a recorded type.
const OCTET_STREAM: &str = "application/octet-stream";

pub struct LocalMediaStore {
    /// Root directory for all uploads (e.g. "./data/media")
    root: PathBuf,
    /// Public prefix the retrieval route is mounted under
    /// (e.g. "http://localhost:8000/api/v1/media")
    public_base_url: String,
    signing_key: SecretString,
    root_ready: OnceCell<()>,
}

impl LocalMediaStore {
    pub fn new(root: PathBuf, public_base_url: &str, signing_key: SecretString) -> Self {
        Self {
            root,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            signing_key,
            root_ready: OnceCell::new(),
        }
    }

    /// Creates the root directory once; later calls return immediately.
    async fn ensure_root(&self) -> Result<()> {
        self.root_ready
            .get_or_try_init(|| async {
                fs::create_dir_all(&self.root).await.map_err(io_error)?;
                info!(root = %self.root.display(), "media root ready");
                Ok::<_, DomainError>(())
            })
            .await
            .map(|_| ())
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        let safe = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !safe {
            return Err(DomainError::invalid(format!("invalid object name `{key}`")));
        }
        Ok(self.root.join(key))
    }

    /// Sidecar holding the content type of an already-validated `key`.
    /// Object names never start with `.`, so sidecars cannot collide with them.
    fn content_type_path(&self, key: &str) -> PathBuf {
        self.root.join(format!(".{key}.type"))
    }

    fn mac(&self, key: &str, expires: i64) -> Result<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.signing_key.expose_secret().as_bytes())
            .map_err(|e| DomainError::Internal(format!("signing key rejected: {e}")))?;
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        Ok(mac)
    }

    /// Hex signature for `key` valid until `expires` (unix seconds).
    pub fn sign(&self, key: &str, expires: i64) -> Result<String> {
        Ok(hex::encode(self.mac(key, expires)?.finalize().into_bytes()))
    }

    /// Checks a link's signature and expiry against `now` (unix seconds).
    pub fn verify(&self, key: &str, expires: i64, signature: &str, now: i64) -> Result<()> {
        let raw = hex::decode(signature).map_err(|_| DomainError::invalid("malformed signature"))?;
        self.mac(key, expires)?
            .verify_slice(&raw)
            .map_err(|_| DomainError::invalid("signature mismatch"))?;
        if now > expires {
            return Err(DomainError::invalid("link expired"));
        }
        Ok(())
    }
}

#[async_trait]
impl MediaStorage for LocalMediaStore {
    async fn put_object(&self, key: &str, content_type: &str, data: Bytes) -> Result<u64> {
        self.ensure_root().await?;
        let path = self.object_path(key)?;
        fs::write(&path, &data).await.map_err(io_error)?;
        fs::write(self.content_type_path(key), content_type.trim()).await.map_err(io_error)?;
        debug!(path = %path.display(), size = data.len(), content_type, "object written");
        Ok(data.len() as u64)
    }

    async fn presigned_url(&self, key: &str, ttl: Duration) -> Result<String> {
        self.object_path(key)?;
        let expires = Utc::now().timestamp() + ttl.as_secs() as i64;
        let signature = self.sign(key, expires)?;
        Ok(format!(
            "{}/{key}?expires={expires}&signature={signature}",
            self.public_base_url
        ))
    }
}

#[async_trait]
impl SignedObjectReader for LocalMediaStore {
    async fn open_signed(&self, key: &str, expires: i64, signature: &str) -> Result<SignedObject> {
        let path = self.object_path(key)?;
        self.verify(key, expires, signature, Utc::now().timestamp())?;

        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DomainError::not_found("media", key));
            }
            Err(e) => return Err(io_error(e)),
        };
        // Served with the type recorded at upload, never one guessed from the name.
        let content_type = match fs::read_to_string(self.content_type_path(key)).await {
            Ok(recorded) if !recorded.trim().is_empty() => recorded.trim().to_string(),
            Ok(_) => OCTET_STREAM.to_string(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => OCTET_STREAM.to_string(),
            Err(e) => return Err(io_error(e)),
        };

        Ok(SignedObject { content_type, data: Bytes::from(data) })
    }
}

fn io_error(err: std::io::Error) -> DomainError {
    match err.kind() {
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted => {
            DomainError::Unavailable(err.to_string())
        }
        _ => DomainError::Internal(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &tempfile::TempDir) -> LocalMediaStore {
        LocalMediaStore::new(
            dir.path().join("nested").join("media"),
            "http://media.test/api/v1/media/",
            SecretString::from("test-key".to_string()),
        )
    }

    /// Splits a link produced by `presigned_url` into its parts.
    fn parse_link(url: &str) -> (String, i64, String) {
        let rest = url.strip_prefix("http://media.test/api/v1/media/").unwrap();
        let (key, query) = rest.split_once('?').unwrap();
        let mut expires = 0;
        let mut signature = String::new();
        for pair in query.split('&') {
            match pair.split_once('=').unwrap() {
                ("expires", v) => expires = v.parse().unwrap(),
                ("signature", v) => signature = v.to_string(),
                _ => {}
            }
        }
        (key.to_string(), expires, signature)
    }

    #[tokio::test]
    async fn stored_object_reads_back_through_its_link() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let bytes = Bytes::from_static(b"\x89PNG\r\n\x1a\nrest");

        let size = store.put_object("abc.png", "image/png", bytes.clone()).await.unwrap();
        assert_eq!(size, bytes.len() as u64);

        let url = store.presigned_url("abc.png", Duration::from_secs(24 * 3600)).await.unwrap();
        let (key, expires, signature) = parse_link(&url);
        assert_eq!(key, "abc.png");
        assert!(expires >= Utc::now().timestamp() + 24 * 3600 - 5);

        let object = store.open_signed(&key, expires, &signature).await.unwrap();
        assert_eq!(object.data, bytes);
        assert_eq!(object.content_type, "image/png");
    }

    #[tokio::test]
    async fn recorded_type_wins_over_the_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store
            .put_object("page.html", "image/png", Bytes::from_static(b"<script>alert(1)</script>"))
            .await
            .unwrap();

        let expires = Utc::now().timestamp() + 60;
        let signature = store.sign("page.html", expires).unwrap();
        let object = store.open_signed("page.html", expires, &signature).await.unwrap();
        assert_eq!(object.content_type, "image/png");
    }

    #[tokio::test]
    async fn object_without_recorded_type_is_opaque() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.put_object("legacy.html", "image/png", Bytes::from_static(b"<p>")).await.unwrap();
        fs::remove_file(store.content_type_path("legacy.html")).await.unwrap();

        let expires = Utc::now().timestamp() + 60;
        let signature = store.sign("legacy.html", expires).unwrap();
        let object = store.open_signed("legacy.html", expires, &signature).await.unwrap();
        assert_eq!(object.content_type, OCTET_STREAM);
    }

    #[tokio::test]
    async fn tampered_links_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        store.put_object("a.jpg", "image/jpeg", Bytes::from_static(b"jpeg")).await.unwrap();
        store.put_object("b.jpg", "image/jpeg", Bytes::from_static(b"other")).await.unwrap();

        let url = store.presigned_url("a.jpg", Duration::from_secs(60)).await.unwrap();
        let (_, expires, signature) = parse_link(&url);

        assert!(store.open_signed("b.jpg", expires, &signature).await.is_err());
        assert!(store.open_signed("a.jpg", expires + 3600, &signature).await.is_err());
        assert!(store.open_signed("a.jpg", expires, "zz").await.is_err());
    }

    #[test]
    fn links_stop_working_after_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let expires = 1_700_000_000;
        let signature = store.sign("a.png", expires).unwrap();

        assert!(store.verify("a.png", expires, &signature, expires - 1).is_ok());
        assert!(store.verify("a.png", expires, &signature, expires).is_ok());
        assert!(store.verify("a.png", expires, &signature, expires + 1).is_err());
    }

    #[tokio::test]
    async fn path_traversal_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let err = store
            .put_object("../escape.png", "image/png", Bytes::from_static(b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Invalid(_)));
    }

    #[tokio::test]
    async fn unknown_object_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir);
        let expires = Utc::now().timestamp() + 60;
        let signature = store.sign("ghost.png", expires).unwrap();

        let err = store.open_signed("ghost.png", expires, &signature).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound(..)));
    }
}
