use base64::Engine;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use crate::attention::EncodedImage;
use crate::ingest::UploadedImage;

/// Encoded image bytes plus the content type they are served with.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub bytes: Arc<[u8]>,
    pub content_type: String,
}

impl StoredObject {
    pub fn data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.content_type,
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

impl From<EncodedImage> for StoredObject {
    fn from(image: EncodedImage) -> Self {
        Self {
            bytes: image.bytes.into(),
            content_type: image.mime_type.to_string(),
        }
    }
}

impl From<&UploadedImage> for StoredObject {
    fn from(upload: &UploadedImage) -> Self {
        Self {
            bytes: upload.shared_data(),
            content_type: upload.mime_type().to_string(),
        }
    }
}

pub fn object_url(id: Uuid) -> String {
    format!("/api/objects/{}", id)
}

/// Server-held preview and overlay images, addressable until revoked.
#[derive(Debug, Default)]
pub struct ObjectStore {
    objects: Mutex<HashMap<Uuid, StoredObject>>,
}

impl ObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn objects(&self) -> MutexGuard<'_, HashMap<Uuid, StoredObject>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn put(&self, object: impl Into<StoredObject>) -> Uuid {
        let id = Uuid::new_v4();
        self.objects().insert(id, object.into());
        log::debug!("Registered object {}", id);
        id
    }

    pub fn get(&self, id: Uuid) -> Option<StoredObject> {
        self.objects().get(&id).cloned()
    }

    /// Returns whether the object was still live.
    pub fn revoke(&self, id: Uuid) -> bool {
        let removed = self.objects().remove(&id).is_some();
        if removed {
            log::debug!("Revoked object {}", id);
        }
        removed
    }

    pub fn revoke_all(&self, ids: impl IntoIterator<Item = Uuid>) {
        let mut objects = self.objects();
        for id in ids {
            objects.remove(&id);
        }
    }

    pub fn data_url(&self, id: Uuid) -> Option<String> {
        self.objects().get(&id).map(StoredObject::data_url)
    }

    pub fn len(&self) -> usize {
        self.objects().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jpeg_bytes() -> EncodedImage {
        EncodedImage {
            bytes: vec![0xFF, 0xD8, 0xFF, 0xD9],
            mime_type: "image/jpeg",
        }
    }

    #[test]
    fn put_get_and_revoke() {
        let store = ObjectStore::new();
        let id = store.put(jpeg_bytes());
        let object = store.get(id).unwrap();
        assert_eq!(&*object.bytes, &[0xFF, 0xD8, 0xFF, 0xD9]);
        assert_eq!(object.content_type, "image/jpeg");

        assert!(store.revoke(id));
        assert!(!store.revoke(id));
        assert!(store.get(id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn data_url_embeds_base64() {
        let store = ObjectStore::new();
        let id = store.put(jpeg_bytes());
        assert_eq!(store.data_url(id).unwrap(), "data:image/jpeg;base64,/9j/2Q==");
        assert!(store.data_url(Uuid::new_v4()).is_none());
    }

    #[test]
    fn uploads_keep_their_content_type() {
        let upload = UploadedImage::new(vec![1, 2, 3], "image/png", None);
        let store = ObjectStore::new();
        let id = store.put(&upload);
        assert_eq!(store.get(id).unwrap().content_type, "image/png");
        assert_eq!(object_url(id), format!("/api/objects/{}", id));
    }

    #[test]
    fn preview_shares_the_upload_buffer() {
        let upload = UploadedImage::new(vec![9; 4096], "image/jpeg", None);
        let store = ObjectStore::new();
        let id = store.put(&upload);
        let preview = store.get(id).unwrap();
        assert!(Arc::ptr_eq(&preview.bytes, &upload.shared_data()));
    }

    #[test]
    fn revoke_all_skips_unknown_ids() {
        let store = ObjectStore::new();
        let keep = store.put(jpeg_bytes());
        let drop = store.put(jpeg_bytes());
        store.revoke_all([drop, Uuid::new_v4()]);
        assert_eq!(store.len(), 1);
        assert!(store.get(keep).is_some());
    }
}
