//! Catalog client: OPDS search + archive-aware asset retrieval.
//!
//! Both operations are stateless and fail-fast: one outbound request per
//! call, no retries, no caching. Failures collapse into the coarse
//! `SearchFailed` / `DownloadFailed` kinds after logging the cause.

use std::{
    io::{Cursor, Read},
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use zip::ZipArchive;

use crate::{
    errors::Error,
    opds::{books_from_feed, parse_feed, BookRecord},
    ports::BookLookup,
    Result,
};

/// ZIP local-file-header signature (`PK\x03\x04`).
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

#[derive(Clone, Debug)]
pub struct CatalogClient {
    http: reqwest::Client,
    base_url: String,
    storage_dir: PathBuf,
}

impl CatalogClient {
    pub fn new(
        base_url: impl Into<String>,
        storage_dir: impl Into<PathBuf>,
        http_timeout: Duration,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(http_timeout)
            .build()
            .expect("reqwest client build");
        Self {
            http,
            base_url: base_url.into(),
            storage_dir: storage_dir.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    async fn fetch_feed(&self, query: &str, page: u32) -> Result<String> {
        let url = format!("{}/opds/search", self.base_url);
        let page = page.to_string();
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("searchTerm", query),
                ("searchType", "books"),
                ("pageNumber", page.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::External(format!("catalog request error: {e}")))?;

        let resp = resp
            .error_for_status()
            .map_err(|e| Error::External(format!("catalog returned error status: {e}")))?;

        resp.text()
            .await
            .map_err(|e| Error::External(format!("catalog body error: {e}")))
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| Error::External(format!("download request error: {e}")))?;

        let resp = resp
            .error_for_status()
            .map_err(|e| Error::External(format!("download returned error status: {e}")))?;

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Error::External(format!("download body error: {e}")))?;

        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl BookLookup for CatalogClient {
    /// Search the catalog. Empty feed is an empty list, never an error;
    /// any network or parse failure is a single `SearchFailed` with no
    /// partial results.
    async fn search(&self, query: &str, page: u32) -> Result<Vec<BookRecord>> {
        tracing::info!(query, page, "searching catalog");

        let body = self.fetch_feed(query, page).await.map_err(|e| {
            tracing::error!(error = %e, "catalog search request failed");
            Error::SearchFailed
        })?;

        let feed = parse_feed(&body).map_err(|e| {
            tracing::error!(error = %e, "catalog feed parse failed");
            Error::SearchFailed
        })?;

        let books = books_from_feed(&feed, &self.base_url);
        tracing::info!(count = books.len(), "catalog search done");
        Ok(books)
    }

    /// Fetch an asset and land exactly one file in the storage directory.
    ///
    /// ZIP payloads (detected by the local-file-header signature) are
    /// assumed to be single-document archives: only the first entry is
    /// extracted, under its own name. A partially-written file may remain
    /// on failure; writes are best-effort, not atomic, and cleanup is the
    /// caller's concern.
    async fn download(&self, source_url: &str, suggested_filename: &str) -> Result<PathBuf> {
        tracing::info!(url = source_url, filename = suggested_filename, "downloading asset");

        let bytes = self.fetch_bytes(source_url).await.map_err(|e| {
            tracing::error!(error = %e, "asset fetch failed");
            Error::DownloadFailed
        })?;

        let path = store_payload(&bytes, suggested_filename, &self.storage_dir).map_err(|e| {
            tracing::error!(error = %e, "asset store failed");
            Error::DownloadFailed
        })?;

        tracing::info!(path = %path.display(), "asset stored");
        Ok(path)
    }
}

/// Write a fetched payload into `dest_dir` and return the resulting path.
///
/// ZIP with at least one entry: extract the first entry under its own
/// (sanitized) name. Zero-entry ZIP or any other payload: write the raw
/// bytes under `suggested_filename`.
pub fn store_payload(bytes: &[u8], suggested_filename: &str, dest_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dest_dir)?;

    if bytes.len() > ZIP_MAGIC.len() && bytes[..4] == ZIP_MAGIC {
        tracing::debug!("payload carries ZIP signature, extracting first entry");
        let mut zip = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| Error::External(format!("zip error: {e}")))?;

        if zip.len() > 0 {
            let mut entry = zip
                .by_index(0)
                .map_err(|e| Error::External(format!("zip error: {e}")))?;
            let name = entry_file_name(entry.name(), suggested_filename);

            let mut content = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut content)?;

            let path = dest_dir.join(name);
            std::fs::write(&path, &content)?;
            return Ok(path);
        }
    }

    let path = dest_dir.join(suggested_filename);
    std::fs::write(&path, bytes)?;
    Ok(path)
}

/// Keep only the file-name portion of an archive entry name so a crafted
/// entry cannot escape the storage directory.
fn entry_file_name(entry_name: &str, fallback: &str) -> String {
    let normalized = entry_name.replace('\\', "/");
    Path::new(&normalized)
        .file_name()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn tmp(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_millis();
        let pid = std::process::id();
        let dir = PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}"));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        use zip::write::{FileOptions, ZipWriter};

        let mut zw = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            zw.start_file(*name, FileOptions::default()).unwrap();
            zw.write_all(data).unwrap();
        }
        zw.finish().unwrap().into_inner()
    }

    #[test]
    fn zip_payload_extracts_first_entry_under_its_own_name() {
        let dir = tmp("bookbot-zip");
        let payload = build_zip(&[("book.fb2", b"<FictionBook/>")]);
        assert_eq!(&payload[..4], &ZIP_MAGIC);

        let path = store_payload(&payload, "fallback.bin", &dir).unwrap();
        assert_eq!(path.file_name().unwrap(), "book.fb2");
        assert_eq!(std::fs::read(&path).unwrap(), b"<FictionBook/>");
    }

    #[test]
    fn multi_entry_zip_ignores_everything_after_the_first() {
        // Known limitation: the catalog packages single-document archives,
        // so entries beyond the first are dropped.
        let dir = tmp("bookbot-multizip");
        let payload = build_zip(&[("first.fb2", b"one"), ("second.fb2", b"two")]);

        let path = store_payload(&payload, "fallback.bin", &dir).unwrap();
        assert_eq!(path.file_name().unwrap(), "first.fb2");
        assert_eq!(std::fs::read(&path).unwrap(), b"one");
        assert!(!dir.join("second.fb2").exists());
    }

    #[test]
    fn zip_entry_with_path_components_is_flattened() {
        let dir = tmp("bookbot-traversal");
        let payload = build_zip(&[("../nested/book.fb2", b"x")]);

        let path = store_payload(&payload, "fallback.bin", &dir).unwrap();
        assert_eq!(path.parent().unwrap(), dir);
        assert_eq!(path.file_name().unwrap(), "book.fb2");
    }

    #[test]
    fn empty_zip_falls_back_to_raw_write() {
        let dir = tmp("bookbot-emptyzip");
        let payload = build_zip(&[]);

        let path = store_payload(&payload, "book_1.fb2", &dir).unwrap();
        assert_eq!(path.file_name().unwrap(), "book_1.fb2");
        assert_eq!(std::fs::read(&path).unwrap(), payload);
    }

    #[test]
    fn non_zip_payload_is_written_verbatim() {
        let dir = tmp("bookbot-raw");
        let payload = b"plain text book";

        let path = store_payload(payload, "book_2.txt", &dir).unwrap();
        assert_eq!(path.file_name().unwrap(), "book_2.txt");
        assert_eq!(std::fs::read(&path).unwrap(), payload);
    }

    // Port 1 on loopback refuses the connection without touching the
    // network; the client must collapse the transport failure into the
    // single coarse error kind for each operation.
    #[tokio::test]
    async fn unreachable_catalog_search_is_search_failed() {
        let dir = tmp("bookbot-searchfail");
        let client =
            CatalogClient::new("http://127.0.0.1:1", &dir, Duration::from_millis(500));

        let err = client.search("war", 0).await.unwrap_err();
        assert!(matches!(err, Error::SearchFailed));
    }

    #[tokio::test]
    async fn unreachable_catalog_download_is_download_failed() {
        let dir = tmp("bookbot-dlfail");
        let client =
            CatalogClient::new("http://127.0.0.1:1", &dir, Duration::from_millis(500));

        let err = client
            .download("http://127.0.0.1:1/b/1/fb2", "book_1.fb2")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DownloadFailed));
    }

    #[test]
    fn corrupt_zip_is_an_error() {
        let dir = tmp("bookbot-corrupt");
        // Valid signature, garbage afterwards.
        let mut payload = ZIP_MAGIC.to_vec();
        payload.extend_from_slice(b"this is not a central directory");

        assert!(store_payload(&payload, "book.fb2", &dir).is_err());
    }
}
