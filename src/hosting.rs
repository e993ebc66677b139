use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::error::{GenerationError, Result};

/// Turns raw image bytes into a publicly fetchable URL.
///
/// Video jobs take image URLs, not bytes, so every source image is uploaded
/// once before submission.
pub trait ImageHost: Send + Sync {
    fn upload(
        &self,
        data: &[u8],
        content_type: &str,
    ) -> impl Future<Output = Result<String>> + Send;
}

/// Memoizes hosted URLs per item key so repeat generations skip the upload.
///
/// Two concurrent calls for the same uncached key may both upload; the
/// last URL wins.
pub struct UploadCache<H> {
    host: H,
    urls: Mutex<HashMap<String, String>>,
}

impl<H: ImageHost> UploadCache<H> {
    pub fn new(host: H) -> Self {
        Self {
            host,
            urls: Mutex::new(HashMap::new()),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Return the cached URL for `key`, uploading `data` on a miss.
    pub async fn url_for(&self, key: &str, data: &[u8], content_type: &str) -> Result<String> {
        if let Some(url) = self.cached(key)? {
            debug!(key, "image URL cache hit");
            return Ok(url);
        }

        let url = self.host.upload(data, content_type).await?;
        if url.trim().is_empty() {
            return Err(GenerationError::InvalidResponse(format!(
                "Image host returned an empty URL for {}",
                key
            )));
        }

        debug!(key, %url, "image uploaded");
        self.urls()?.insert(key.to_string(), url.clone());
        Ok(url)
    }

    pub fn cached(&self, key: &str) -> Result<Option<String>> {
        Ok(self.urls()?.get(key).cloned())
    }

    /// Forget the URL for `key` (e.g. after the user replaced the image).
    pub fn invalidate(&self, key: &str) -> Result<bool> {
        Ok(self.urls()?.remove(key).is_some())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.urls()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn urls(&self) -> Result<MutexGuard<'_, HashMap<String, String>>> {
        self.urls
            .lock()
            .map_err(|e| GenerationError::Other(format!("Upload cache lock poisoned: {}", e)))
    }
}
