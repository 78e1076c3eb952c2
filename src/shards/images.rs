use anyhow::Context;
use bytes::Bytes;
use tracing::warn;
use uuid::Uuid;

use crate::storage::StorageClient;

pub struct UploadItem {
    pub body: Bytes,
    pub content_type: String,
}

pub(crate) fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

/// Store each image under `shards/<user_id>/` and return their public URLs,
/// in upload order. Callers must have checked content types with
/// [`ext_from_mime`].
pub async fn upload_images(
    storage: &dyn StorageClient,
    user_id: Uuid,
    images: Vec<UploadItem>,
) -> anyhow::Result<Vec<String>> {
    anyhow::ensure!(!images.is_empty(), "no images provided");

    let mut urls = Vec::with_capacity(images.len());
    for img in images {
        let ext = ext_from_mime(&img.content_type).unwrap_or("bin");
        let key = format!("shards/{}/{}.{}", user_id, Uuid::new_v4(), ext);
        storage
            .put_object(&key, img.body, &img.content_type)
            .await
            .with_context(|| format!("put_object {key}"))?;
        urls.push(storage.public_url(&key));
    }
    Ok(urls)
}

pub async fn delete_images(storage: &dyn StorageClient, urls: &[String]) -> usize {
    let mut deleted = 0;
    for key in urls.iter().filter_map(|u| storage.key_for_url(u)) {
        match storage.delete_object(&key).await {
            Ok(()) => deleted += 1,
            Err(e) => warn!(error = %e, %key, "failed to delete shard image"),
        }
    }
    deleted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{join_public_url, strip_public_url};
    use async_trait::async_trait;
    use std::sync::Mutex;

    const BASE: &str = "https://cdn.test/bucket";

    #[derive(Default)]
    struct RecordingStorage {
        puts: Mutex<Vec<(String, String)>>,
        deletes: Mutex<Vec<String>>,
        fail_deletes: bool,
    }

    #[async_trait]
    impl StorageClient for RecordingStorage {
        async fn put_object(&self, key: &str, _body: Bytes, ct: &str) -> anyhow::Result<()> {
            self.puts.lock().unwrap().push((key.into(), ct.into()));
            Ok(())
        }
        async fn delete_object(&self, key: &str) -> anyhow::Result<()> {
            if self.fail_deletes {
                anyhow::bail!("storage down");
            }
            self.deletes.lock().unwrap().push(key.into());
            Ok(())
        }
        fn public_url(&self, key: &str) -> String {
            join_public_url(BASE, key)
        }
        fn key_for_url(&self, url: &str) -> Option<String> {
            strip_public_url(BASE, url)
        }
    }

    #[test]
    fn test_ext_from_mime() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/png"), Some("png"));
        assert_eq!(ext_from_mime("image/webp"), Some("webp"));
        assert_eq!(ext_from_mime("application/octet-stream"), None);
    }

    #[tokio::test]
    async fn uploads_under_user_prefix_and_returns_urls() {
        let storage = RecordingStorage::default();
        let user = Uuid::new_v4();
        let urls = upload_images(
            &storage,
            user,
            vec![
                UploadItem { body: Bytes::from_static(b"a"), content_type: "image/png".into() },
                UploadItem { body: Bytes::from_static(b"b"), content_type: "image/jpeg".into() },
            ],
        )
        .await
        .unwrap();

        assert_eq!(urls.len(), 2);
        let puts = storage.puts.lock().unwrap();
        assert!(puts[0].0.starts_with(&format!("shards/{user}/")));
        assert!(puts[0].0.ends_with(".png"));
        assert_eq!(puts[1].1, "image/jpeg");
        assert_eq!(urls[0], format!("{BASE}/{}", puts[0].0));
    }

    #[tokio::test]
    async fn empty_upload_is_an_error() {
        let storage = RecordingStorage::default();
        assert!(upload_images(&storage, Uuid::new_v4(), vec![]).await.is_err());
    }

    #[tokio::test]
    async fn deletes_only_own_uploads() {
        let storage = RecordingStorage::default();
        let urls = vec![
            format!("{BASE}/shards/u/1.png"),
            "https://imgur.com/x.png".to_string(),
        ];
        assert_eq!(delete_images(&storage, &urls).await, 1);
        assert_eq!(*storage.deletes.lock().unwrap(), vec!["shards/u/1.png".to_string()]);
    }

    #[tokio::test]
    async fn delete_failures_are_swallowed() {
        let storage = RecordingStorage { fail_deletes: true, ..Default::default() };
        let urls = vec![format!("{BASE}/shards/u/1.png")];
        assert_eq!(delete_images(&storage, &urls).await, 0);
    }
}
