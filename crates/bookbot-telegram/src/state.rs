//! Ephemeral per-chat session state.
//!
//! Keeps the last-seen search results keyed by short book id so the
//! search → format → delivery flow never re-queries the catalog, plus the
//! email-wizard state. Everything here is in-memory and lost on restart.

use std::collections::HashMap;

use tokio::sync::Mutex;

use bookbot_core::opds::{BookRecord, FormatTag};

/// Book queued for email delivery while we wait for an address.
#[derive(Clone, Debug)]
pub struct PendingBook {
    pub short_id: String,
    pub download_url: String,
    pub title: String,
    pub format: FormatTag,
}

impl PendingBook {
    /// Scratch filename for the downloaded payload. Includes the book id:
    /// the storage dir is shared, and concurrent deliveries of different
    /// books must not clobber each other's files.
    pub fn suggested_filename(&self) -> String {
        format!("book_{}.{}", self.short_id, self.format)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ChatSession {
    pub last_query: Option<String>,
    pub last_page: u32,
    /// Short book id -> full record from the last search.
    pub results: HashMap<String, BookRecord>,
    /// `Some` while the email wizard is active; the inner book (if any)
    /// is sent once a valid address arrives.
    pub awaiting_email: Option<Option<PendingBook>>,
}

#[derive(Default)]
pub struct ChatSessions {
    inner: Mutex<HashMap<i64, ChatSession>>,
}

impl ChatSessions {
    pub async fn set_search(&self, chat_id: i64, query: &str, page: u32) {
        let mut map = self.inner.lock().await;
        let session = map.entry(chat_id).or_default();
        session.last_query = Some(query.to_string());
        session.last_page = page;
    }

    pub async fn last_search(&self, chat_id: i64) -> Option<(String, u32)> {
        let map = self.inner.lock().await;
        let session = map.get(&chat_id)?;
        Some((session.last_query.clone()?, session.last_page))
    }

    pub async fn remember_books(&self, chat_id: i64, books: Vec<(String, BookRecord)>) {
        let mut map = self.inner.lock().await;
        let session = map.entry(chat_id).or_default();
        for (short_id, record) in books {
            session.results.insert(short_id, record);
        }
    }

    pub async fn book(&self, chat_id: i64, short_id: &str) -> Option<BookRecord> {
        let map = self.inner.lock().await;
        map.get(&chat_id)?.results.get(short_id).cloned()
    }

    /// Start the email wizard, optionally queueing a book to send.
    pub async fn start_email_wizard(&self, chat_id: i64, pending: Option<PendingBook>) {
        let mut map = self.inner.lock().await;
        map.entry(chat_id).or_default().awaiting_email = Some(pending);
    }

    pub async fn is_awaiting_email(&self, chat_id: i64) -> bool {
        let map = self.inner.lock().await;
        map.get(&chat_id)
            .map(|s| s.awaiting_email.is_some())
            .unwrap_or(false)
    }

    /// Finish the wizard, returning the queued book if there was one.
    pub async fn finish_email_wizard(&self, chat_id: i64) -> Option<PendingBook> {
        let mut map = self.inner.lock().await;
        map.get_mut(&chat_id)?.awaiting_email.take().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> BookRecord {
        BookRecord {
            id: id.to_string(),
            title: "T".to_string(),
            author: "A".to_string(),
            description: None,
            cover_url: None,
            formats: vec![],
        }
    }

    #[tokio::test]
    async fn search_state_is_per_chat() {
        let sessions = ChatSessions::default();
        sessions.set_search(1, "war", 0).await;
        sessions.set_search(2, "peace", 3).await;

        assert_eq!(sessions.last_search(1).await, Some(("war".to_string(), 0)));
        assert_eq!(sessions.last_search(2).await, Some(("peace".to_string(), 3)));
        assert_eq!(sessions.last_search(3).await, None);
    }

    #[tokio::test]
    async fn remembered_books_are_retrievable_by_short_id() {
        let sessions = ChatSessions::default();
        sessions
            .remember_books(1, vec![("42".to_string(), record("tag:book:42"))])
            .await;

        assert!(sessions.book(1, "42").await.is_some());
        assert!(sessions.book(1, "43").await.is_none());
        assert!(sessions.book(2, "42").await.is_none());
    }

    #[tokio::test]
    async fn email_wizard_hands_back_the_pending_book_once() {
        let sessions = ChatSessions::default();
        assert!(!sessions.is_awaiting_email(1).await);

        sessions
            .start_email_wizard(
                1,
                Some(PendingBook {
                    short_id: "1".to_string(),
                    download_url: "http://x/b/1/fb2".to_string(),
                    title: "T".to_string(),
                    format: FormatTag::Fb2,
                }),
            )
            .await;
        assert!(sessions.is_awaiting_email(1).await);

        let pending = sessions.finish_email_wizard(1).await;
        assert_eq!(pending.unwrap().title, "T");
        assert!(!sessions.is_awaiting_email(1).await);
        assert!(sessions.finish_email_wizard(1).await.is_none());
    }

    #[test]
    fn scratch_filenames_are_unique_per_book() {
        let pending = |id: &str| PendingBook {
            short_id: id.to_string(),
            download_url: format!("http://x/b/{id}/epub"),
            title: "T".to_string(),
            format: FormatTag::Epub,
        };

        assert_eq!(pending("847493").suggested_filename(), "book_847493.epub");
        assert_ne!(
            pending("847493").suggested_filename(),
            pending("123").suggested_filename()
        );
    }
}
