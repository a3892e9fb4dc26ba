//! Blob storage for uploaded document contents.
//!
//! The record service only needs three things from a blob store: keep bytes
//! under a path hint, drop them again, and hand out a time-limited download
//! URL. [`MemoryBlobStore`] keeps blobs in-process and signs URLs with
//! HMAC-SHA256 over the handle and expiry.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use bytes::Bytes;
use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use url::Url;

use crate::config::BlobConfig;
use crate::error::BlobError;

type HmacSha256 = Hmac<Sha256>;

/// Opaque reference to a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobHandle(String);

impl BlobHandle {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn store(&self, bytes: Bytes, path_hint: &str) -> Result<BlobHandle, BlobError>;

    async fn remove(&self, handle: &BlobHandle) -> Result<(), BlobError>;

    async fn signed_url(&self, handle: &BlobHandle, ttl: Duration) -> Result<Url, BlobError>;
}

/// In-process blob store issuing signed, expiring URLs.
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Bytes>>,
    base_url: Url,
    signing_key: SecretString,
}

impl MemoryBlobStore {
    pub fn new(config: BlobConfig) -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
            base_url: config.base_url,
            signing_key: config.signing_key,
        }
    }

    fn sign(&self, handle: &str, expires: i64) -> Result<String, BlobError> {
        let mut mac = HmacSha256::new_from_slice(self.signing_key.expose_secret().as_bytes())
            .map_err(|e| BlobError::Signing(e.to_string()))?;
        mac.update(handle.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        Ok(URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes()))
    }

    fn handle_from_url(&self, url: &Url) -> Option<String> {
        let base = self.base_url.path().trim_end_matches('/');
        url.path()
            .strip_prefix(base)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|rest| !rest.is_empty())
            .map(str::to_string)
    }

    /// Check a URL issued by [`BlobStore::signed_url`] and return the blob.
    pub fn open(&self, url: &Url) -> Result<Bytes, BlobError> {
        let rejected = || BlobError::Rejected("invalid download URL".to_string());
        let handle = self.handle_from_url(url).ok_or_else(rejected)?;
        let mut expires = None;
        let mut signature = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "expires" => expires = value.parse::<i64>().ok(),
                "signature" => signature = Some(value.into_owned()),
                _ => {}
            }
        }
        let (Some(expires), Some(signature)) = (expires, signature) else {
            return Err(rejected());
        };

        let expected = self.sign(&handle, expires)?;
        if !bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
            return Err(rejected());
        }
        if Utc::now().timestamp() > expires {
            return Err(BlobError::Rejected("download URL expired".to_string()));
        }
        self.blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&handle)
            .cloned()
            .ok_or(BlobError::NotFound(handle))
    }

    pub fn contains(&self, handle: &BlobHandle) -> bool {
        self.blobs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(handle.as_str())
    }

    pub fn len(&self) -> usize {
        self.blobs.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn validate_hint(path_hint: &str) -> Result<(), BlobError> {
    if path_hint.trim().is_empty() {
        return Err(BlobError::Rejected("empty path".to_string()));
    }
    if path_hint.starts_with('/') || path_hint.split('/').any(|s| s.is_empty() || s == "..") {
        return Err(BlobError::Rejected(format!("invalid path '{path_hint}'")));
    }
    Ok(())
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn store(&self, bytes: Bytes, path_hint: &str) -> Result<BlobHandle, BlobError> {
        validate_hint(path_hint)?;
        let mut blobs = self.blobs.write().unwrap_or_else(PoisonError::into_inner);
        if blobs.contains_key(path_hint) {
            return Err(BlobError::Rejected(format!("'{path_hint}' already exists")));
        }
        blobs.insert(path_hint.to_string(), bytes);
        Ok(BlobHandle::new(path_hint))
    }

    async fn remove(&self, handle: &BlobHandle) -> Result<(), BlobError> {
        self.blobs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(handle.as_str())
            .map(|_| ())
            .ok_or_else(|| BlobError::NotFound(handle.as_str().to_string()))
    }

    async fn signed_url(&self, handle: &BlobHandle, ttl: Duration) -> Result<Url, BlobError> {
        if !self.contains(handle) {
            return Err(BlobError::NotFound(handle.as_str().to_string()));
        }
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let expires = Utc::now().timestamp().saturating_add(ttl_secs);
        let signature = self.sign(handle.as_str(), expires)?;

        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|()| BlobError::Signing("base URL cannot hold a path".to_string()))?;
            segments.pop_if_empty();
            segments.extend(handle.as_str().split('/'));
        }
        url.query_pairs_mut()
            .append_pair("expires", &expires.to_string())
            .append_pair("signature", &signature);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryBlobStore {
        MemoryBlobStore::new(BlobConfig {
            base_url: Url::parse("https://files.example.com/crm/").expect("url"),
            signing_key: SecretString::from("test-key".to_string()),
            url_ttl: Duration::from_secs(60),
        })
    }

    #[tokio::test]
    async fn signed_url_round_trips_through_open() {
        let blobs = store();
        let handle = blobs
            .store(Bytes::from_static(b"%PDF"), "deal/abc-contract.pdf")
            .await
            .expect("store");
        let url = blobs
            .signed_url(&handle, Duration::from_secs(60))
            .await
            .expect("url");
        assert!(url.as_str().starts_with("https://files.example.com/crm/deal/abc-contract.pdf?expires="));
        assert_eq!(blobs.open(&url).expect("open"), Bytes::from_static(b"%PDF"));
    }

    #[tokio::test]
    async fn tampered_signature_is_rejected() {
        let blobs = store();
        let handle = blobs
            .store(Bytes::from_static(b"x"), "general/a.txt")
            .await
            .expect("store");
        let url = blobs
            .signed_url(&handle, Duration::from_secs(60))
            .await
            .expect("url");
        let other = blobs
            .store(Bytes::from_static(b"y"), "general/b.txt")
            .await
            .expect("store");
        let mut forged = url.clone();
        forged.set_path(&format!("/crm/{}", other.as_str()));
        assert!(matches!(blobs.open(&forged), Err(BlobError::Rejected(_))));
    }

    #[tokio::test]
    async fn expired_urls_are_rejected() {
        let blobs = store();
        let handle = blobs
            .store(Bytes::from_static(b"x"), "general/old.txt")
            .await
            .expect("store");
        let expires = Utc::now().timestamp() - 10;
        let signature = blobs.sign(handle.as_str(), expires).expect("sign");
        let url = Url::parse(&format!(
            "https://files.example.com/crm/general/old.txt?expires={expires}&signature={signature}"
        ))
        .expect("url");
        let err = blobs.open(&url).expect_err("expired");
        assert!(err.to_string().contains("expired"));
    }

    #[tokio::test]
    async fn store_rejects_traversal_and_duplicates() {
        let blobs = store();
        assert!(blobs.store(Bytes::new(), "../etc/passwd").await.is_err());
        assert!(blobs.store(Bytes::new(), "/abs").await.is_err());
        blobs
            .store(Bytes::new(), "general/dup.txt")
            .await
            .expect("first");
        assert!(blobs.store(Bytes::new(), "general/dup.txt").await.is_err());
    }

    #[tokio::test]
    async fn remove_and_sign_missing_blobs() {
        let blobs = store();
        let handle = BlobHandle::new("general/missing.txt");
        assert!(matches!(blobs.remove(&handle).await, Err(BlobError::NotFound(_))));
        assert!(matches!(
            blobs.signed_url(&handle, Duration::from_secs(1)).await,
            Err(BlobError::NotFound(_))
        ));
    }
}
