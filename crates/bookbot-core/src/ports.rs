use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::{domain::ChatId, opds::BookRecord, Result};

/// Hexagonal port for the book catalog.
///
/// The OPDS client is the first implementation; handlers and the HTTP API
/// consume this trait so tests can substitute a canned catalog.
#[async_trait]
pub trait BookLookup: Send + Sync {
    /// Free-text search against one result page. Empty page is `Ok(vec![])`.
    async fn search(&self, query: &str, page: u32) -> Result<Vec<BookRecord>>;

    /// Fetch one acquisition link and return the path of the stored file.
    async fn download(&self, source_url: &str, suggested_filename: &str) -> Result<PathBuf>;
}

/// Delivery sink: hands a local file to the user (chat document upload).
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn send_document(
        &self,
        chat_id: ChatId,
        path: &Path,
        display_filename: &str,
        caption: Option<&str>,
    ) -> Result<()>;
}

/// Email delivery port (book as attachment).
#[async_trait]
pub trait Mailer: Send + Sync {
    /// False when no API key was configured; callers fall back to a
    /// user-facing "email not configured" reply.
    fn is_configured(&self) -> bool;

    async fn send_book(
        &self,
        to: &str,
        book_title: &str,
        attachment: &[u8],
        filename: &str,
    ) -> Result<()>;
}
