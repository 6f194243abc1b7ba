use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use crate::error::Result;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ObjectAcl {
    #[default]
    Private,
    PublicRead,
}

impl ObjectAcl {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectAcl::Private => "private",
            ObjectAcl::PublicRead => "public-read",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PutOptions {
    pub content_type: &'static str,
    pub acl: ObjectAcl,
}

impl PutOptions {
    pub fn private_text() -> Self {
        Self {
            content_type: "text/plain",
            acl: ObjectAcl::Private,
        }
    }

    pub fn private_json() -> Self {
        Self {
            content_type: "application/json",
            acl: ObjectAcl::Private,
        }
    }

    pub fn private_binary() -> Self {
        Self {
            content_type: "application/octet-stream",
            acl: ObjectAcl::Private,
        }
    }

    pub fn public_html() -> Self {
        Self {
            content_type: "text/html",
            acl: ObjectAcl::PublicRead,
        }
    }
}

/// Flat key/value object storage, used as the durable state table.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool>;

    /// `None` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        options: PutOptions,
    ) -> Result<()>;

    /// Deleting a missing key succeeds.
    async fn delete(&self, key: &str) -> Result<()>;

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Removes every object, returning how many were deleted.
    async fn delete_all(&self) -> Result<usize>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub options: PutOptions,
}

/// Process-local store for local runs and tests.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<BTreeMap<String, StoredObject>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn object(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().await.get(key).cloned()
    }

    pub async fn keys(&self) -> Vec<String> {
        self.objects.lock().await.keys().cloned().collect()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.objects.lock().await.contains_key(key))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .objects
            .lock()
            .await
            .get(key)
            .map(|object| object.body.clone()))
    }

    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        options: PutOptions,
    ) -> Result<()> {
        self.objects
            .lock()
            .await
            .insert(key.to_string(), StoredObject { body, options });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.lock().await.remove(key);
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .objects
            .lock()
            .await
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete_all(&self) -> Result<usize> {
        let mut objects = self.objects.lock().await;
        let count = objects.len();
        objects.clear();
        Ok(count)
    }
}
