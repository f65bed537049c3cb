//! Best-effort persistence: user profiles (with email), message log and
//! download log in a single JSON file.
//!
//! The whole file is rewritten after each mutation. Log writes swallow
//! errors (logged, never surfaced); only email updates propagate failure,
//! since the email wizard tells the user whether the address was saved.

use std::{collections::HashMap, path::PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{domain::UserId, Result};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MessageLogEntry {
    pub user_id: i64,
    pub message: String,
    pub direction: Direction,
    pub timestamp: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadLogEntry {
    pub user_id: i64,
    pub book_title: String,
    pub format: String,
    pub timestamp: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    #[serde(default)]
    users: HashMap<i64, UserProfile>,
    #[serde(default)]
    messages: Vec<MessageLogEntry>,
    #[serde(default)]
    downloads: Vec<DownloadLogEntry>,
}

pub struct Store {
    path: PathBuf,
    data: Mutex<StoreData>,
}

impl Store {
    /// Open the store, loading existing data if the file is present.
    /// A missing or unreadable file starts an empty store (best-effort
    /// persistence, never a startup failure).
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = match std::fs::read_to_string(&path) {
            Ok(txt) => serde_json::from_str(&txt).unwrap_or_else(|e| {
                tracing::warn!(error = %e, path = %path.display(), "store file corrupt, starting empty");
                StoreData::default()
            }),
            Err(_) => StoreData::default(),
        };
        Self {
            path,
            data: Mutex::new(data),
        }
    }

    pub async fn get_email(&self, user: UserId) -> Option<String> {
        let data = self.data.lock().await;
        data.users.get(&user.0).and_then(|u| u.email.clone())
    }

    pub async fn set_email(&self, user: UserId, email: &str) -> Result<()> {
        let mut data = self.data.lock().await;
        data.users.entry(user.0).or_default().email = Some(email.to_string());
        self.persist(&data)
    }

    /// Merge-on-save user profile update. Best-effort.
    pub async fn save_user(&self, user: UserId, username: Option<&str>, first_name: Option<&str>) {
        let mut data = self.data.lock().await;
        let profile = data.users.entry(user.0).or_default();
        if let Some(u) = username {
            profile.username = Some(u.to_string());
        }
        if let Some(f) = first_name {
            profile.first_name = Some(f.to_string());
        }
        if let Err(e) = self.persist(&data) {
            tracing::warn!(error = %e, "failed to save user");
        }
    }

    /// Append to the message log. Best-effort.
    pub async fn log_message(&self, user: UserId, message: &str, direction: Direction) {
        let mut data = self.data.lock().await;
        data.messages.push(MessageLogEntry {
            user_id: user.0,
            message: message.to_string(),
            direction,
            timestamp: Utc::now().to_rfc3339(),
        });
        if let Err(e) = self.persist(&data) {
            tracing::warn!(error = %e, "failed to log message");
        }
    }

    /// Append to the download log. Best-effort.
    pub async fn log_download(&self, user: UserId, book_title: &str, format: &str) {
        let mut data = self.data.lock().await;
        data.downloads.push(DownloadLogEntry {
            user_id: user.0,
            book_title: book_title.to_string(),
            format: format.to_string(),
            timestamp: Utc::now().to_rfc3339(),
        });
        if let Err(e) = self.persist(&data) {
            tracing::warn!(error = %e, "failed to log download");
        }
    }

    fn persist(&self, data: &StoreData) -> Result<()> {
        let txt = serde_json::to_string_pretty(data)?;
        std::fs::write(&self.path, txt)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_file(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis();
        let pid = std::process::id();
        PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}.json"))
    }

    #[tokio::test]
    async fn email_round_trips_through_the_file() {
        let path = tmp_file("bookbot-store");
        let store = Store::open(&path);

        assert_eq!(store.get_email(UserId(7)).await, None);
        store.set_email(UserId(7), "a@b.cc").await.unwrap();
        assert_eq!(store.get_email(UserId(7)).await.as_deref(), Some("a@b.cc"));

        // Reopen from disk.
        let reopened = Store::open(&path);
        assert_eq!(
            reopened.get_email(UserId(7)).await.as_deref(),
            Some("a@b.cc")
        );

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn save_user_merges_and_keeps_email() {
        let path = tmp_file("bookbot-store-merge");
        let store = Store::open(&path);

        store.set_email(UserId(1), "x@y.zz").await.unwrap();
        store.save_user(UserId(1), Some("reader"), Some("R")).await;

        assert_eq!(store.get_email(UserId(1)).await.as_deref(), Some("x@y.zz"));

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn logs_are_appended() {
        let path = tmp_file("bookbot-store-log");
        let store = Store::open(&path);

        store.log_message(UserId(2), "/search war", Direction::In).await;
        store.log_download(UserId(2), "War and Peace", "fb2").await;

        let txt = std::fs::read_to_string(&path).unwrap();
        let v: serde_json::Value = serde_json::from_str(&txt).unwrap();
        assert_eq!(v["messages"][0]["message"], "/search war");
        assert_eq!(v["downloads"][0]["format"], "fb2");

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn corrupt_store_file_starts_empty() {
        let path = tmp_file("bookbot-store-corrupt");
        std::fs::write(&path, "{not json").unwrap();

        let store = Store::open(&path);
        assert_eq!(store.get_email(UserId(3)).await, None);

        let _ = std::fs::remove_file(&path);
    }
}
