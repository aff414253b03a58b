//! Per-site chat history.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::ChatMessage;

/// Ordered log of role-tagged messages per site id.
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn load(&self, site_id: &str) -> Result<Vec<ChatMessage>>;
    async fn append(&self, site_id: &str, messages: &[ChatMessage]) -> Result<()>;
    /// Returns the number of messages removed.
    async fn clear(&self, site_id: &str) -> Result<usize>;
}

/// One pretty-printed JSON array per site under `<data_dir>/chats/`.
///
/// Writes go through a temp file and a rename; a single mutex serialises
/// all read-modify-write cycles for the store.
pub struct FileChatStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl FileChatStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            dir: data_dir.join("chats"),
            lock: Mutex::new(()),
        }
    }

    fn path_for(&self, site_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", site_id))
    }

    async fn read(&self, path: &Path) -> Result<Vec<ChatMessage>> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("Corrupt chat history: {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    async fn write(&self, path: &Path, messages: &[ChatMessage]) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        let json = serde_json::to_string_pretty(messages).context("Failed to serialize chat history")?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl ChatStore for FileChatStore {
    async fn load(&self, site_id: &str) -> Result<Vec<ChatMessage>> {
        let _guard = self.lock.lock().await;
        self.read(&self.path_for(site_id)).await
    }

    async fn append(&self, site_id: &str, messages: &[ChatMessage]) -> Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.path_for(site_id);
        let mut all = self.read(&path).await?;
        all.extend_from_slice(messages);
        self.write(&path, &all).await
    }

    async fn clear(&self, site_id: &str) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let path = self.path_for(site_id);
        let removed = self.read(&path).await?.len();
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_load_missing_is_empty() {
        let dir = tempdir().unwrap();
        let store = FileChatStore::new(dir.path());
        assert!(store.load("acme").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_preserves_order_and_is_per_site() {
        let dir = tempdir().unwrap();
        let store = FileChatStore::new(dir.path());
        store.append("acme", &[ChatMessage::user("one")]).await.unwrap();
        store
            .append("acme", &[ChatMessage::assistant("two"), ChatMessage::user("three")])
            .await
            .unwrap();
        store.append("other", &[ChatMessage::user("x")]).await.unwrap();

        let history = store.load("acme").await.unwrap();
        let texts: Vec<String> = history.iter().map(|m| m.content.as_text()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
        assert_eq!(store.load("other").await.unwrap().len(), 1);
        assert!(dir.path().join("chats/acme.json").exists());
        assert!(!dir.path().join("chats/acme.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_clear() {
        let dir = tempdir().unwrap();
        let store = FileChatStore::new(dir.path());
        store
            .append("acme", &[ChatMessage::user("a"), ChatMessage::assistant("b")])
            .await
            .unwrap();
        assert_eq!(store.clear("acme").await.unwrap(), 2);
        assert!(store.load("acme").await.unwrap().is_empty());
        assert_eq!(store.clear("acme").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("chats")).unwrap();
        std::fs::write(dir.path().join("chats/acme.json"), "{not json").unwrap();
        let store = FileChatStore::new(dir.path());
        let err = store.load("acme").await.unwrap_err();
        assert!(err.to_string().contains("Corrupt chat history"));
    }

    #[tokio::test]
    async fn test_concurrent_appends_are_not_lost() {
        let dir = tempdir().unwrap();
        let store = std::sync::Arc::new(FileChatStore::new(dir.path()));
        let mut handles = Vec::new();
        for i in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .append("acme", &[ChatMessage::user(format!("m{i}"))])
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.load("acme").await.unwrap().len(), 10);
    }
}
