//! HTTP API mirroring the bot's search/download actions for the companion
//! web client.
//!
//! Two endpoints, no caller auth (explicit non-goal):
//! - `GET /api/search?q=&page=` -> `{"books": [...]}`
//! - `POST /api/download` -> downloads and hands the file to the chat
//!   delivery sink. The client supplies the `downloadUrl` it got from a
//!   previous search (MVP trust model, kept from the original design).

use std::sync::Arc;

use poem::{
    get, handler,
    http::StatusCode,
    listener::TcpListener,
    middleware::{Cors, Tracing},
    post,
    web::{Data, Json, Query},
    EndpointExt, IntoResponse, Response, Route, Server,
};
use serde::Deserialize;

use bookbot_core::{
    domain::ChatId,
    ports::{BookLookup, DeliverySink},
};

pub struct ApiState {
    pub catalog: Arc<dyn BookLookup>,
    pub delivery: Arc<dyn DeliverySink>,
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: Option<String>,
    page: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadRequest {
    book_id: Option<String>,
    format: Option<String>,
    chat_id: Option<i64>,
    download_url: Option<String>,
    title: Option<String>,
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(serde_json::json!({ "error": message }))).into_response()
}

#[handler]
async fn api_search(
    Query(params): Query<SearchParams>,
    state: Data<&Arc<ApiState>>,
) -> Response {
    let Some(query) = params.q.filter(|q| !q.trim().is_empty()) else {
        return error_body(
            StatusCode::BAD_REQUEST,
            "Query parameter \"q\" is required",
        );
    };
    let page = params.page.unwrap_or(0);

    match state.catalog.search(&query, page).await {
        Ok(books) => Json(serde_json::json!({ "books": books })).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "api search failed");
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

#[handler]
async fn api_download(
    Json(req): Json<DownloadRequest>,
    state: Data<&Arc<ApiState>>,
) -> Response {
    let (Some(book_id), Some(format), Some(chat_id)) =
        (req.book_id, req.format, req.chat_id)
    else {
        return error_body(
            StatusCode::BAD_REQUEST,
            "Missing bookId, format, or chatId",
        );
    };
    let Some(download_url) = req.download_url.filter(|u| !u.trim().is_empty()) else {
        return error_body(StatusCode::BAD_REQUEST, "Missing downloadUrl");
    };

    let filename = format!("book_{book_id}.{format}");
    let path = match state.catalog.download(&download_url, &filename).await {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(error = %e, "api download failed");
            return error_body(StatusCode::INTERNAL_SERVER_ERROR, "Download failed");
        }
    };

    let display = match &req.title {
        Some(title) => format!("{title}.{format}"),
        None => filename.clone(),
    };
    let caption = req
        .title
        .as_deref()
        .map(|t| format!("Here is your book: {t}"));

    if let Err(e) = state
        .delivery
        .send_document(ChatId(chat_id), &path, &display, caption.as_deref())
        .await
    {
        tracing::error!(error = %e, "api delivery failed");
        return error_body(StatusCode::INTERNAL_SERVER_ERROR, "Download failed");
    }

    Json(serde_json::json!({
        "success": true,
        "message": "Book sent to Telegram",
    }))
    .into_response()
}

pub fn app(state: Arc<ApiState>) -> impl poem::Endpoint {
    Route::new()
        .at("/api/search", get(api_search))
        .at("/api/download", post(api_download))
        .with(Cors::new())
        .with(Tracing)
        .data(state)
}

pub async fn run(state: Arc<ApiState>, port: u16) -> anyhow::Result<()> {
    let bind_addr = format!("0.0.0.0:{port}");
    tracing::info!(%bind_addr, "starting HTTP API");
    Server::new(TcpListener::bind(bind_addr))
        .run(app(state))
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};

    use async_trait::async_trait;
    use poem::test::TestClient;

    use bookbot_core::{
        opds::{BookRecord, FormatLink, FormatTag},
        Error, Result,
    };

    struct FakeCatalog {
        fail: bool,
    }

    #[async_trait]
    impl BookLookup for FakeCatalog {
        async fn search(&self, query: &str, _page: u32) -> Result<Vec<BookRecord>> {
            if self.fail {
                return Err(Error::SearchFailed);
            }
            Ok(vec![BookRecord {
                id: format!("tag:book:{query}"),
                title: "T".to_string(),
                author: "A".to_string(),
                description: None,
                cover_url: None,
                formats: vec![FormatLink {
                    format: FormatTag::Fb2,
                    download_url: "http://x/b/1/fb2".to_string(),
                }],
            }])
        }

        async fn download(&self, _url: &str, suggested: &str) -> Result<PathBuf> {
            if self.fail {
                return Err(Error::DownloadFailed);
            }
            Ok(PathBuf::from("/tmp").join(suggested))
        }
    }

    struct NullDelivery;

    #[async_trait]
    impl DeliverySink for NullDelivery {
        async fn send_document(
            &self,
            _chat_id: ChatId,
            _path: &Path,
            _display_filename: &str,
            _caption: Option<&str>,
        ) -> Result<()> {
            Ok(())
        }
    }

    fn client(fail: bool) -> TestClient<impl poem::Endpoint> {
        let state = Arc::new(ApiState {
            catalog: Arc::new(FakeCatalog { fail }),
            delivery: Arc::new(NullDelivery),
        });
        TestClient::new(app(state))
    }

    #[tokio::test]
    async fn search_requires_query_param() {
        let cli = client(false);
        let resp = cli.get("/api/search").send().await;
        resp.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn search_returns_books_json() {
        let cli = client(false);
        let resp = cli.get("/api/search?q=war&page=0").send().await;
        resp.assert_status_is_ok();

        let json = resp.json().await;
        let books = json.value().object().get("books").array();
        assert_eq!(books.len(), 1);
    }

    #[tokio::test]
    async fn search_failure_maps_to_500() {
        let cli = client(true);
        let resp = cli.get("/api/search?q=war").send().await;
        resp.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn download_requires_all_fields() {
        let cli = client(false);
        let resp = cli
            .post("/api/download")
            .body_json(&serde_json::json!({ "bookId": "1" }))
            .send()
            .await;
        resp.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn download_happy_path_reports_success() {
        let cli = client(false);
        let resp = cli
            .post("/api/download")
            .body_json(&serde_json::json!({
                "bookId": "847493",
                "format": "fb2",
                "chatId": 42,
                "downloadUrl": "http://x/b/847493/fb2",
                "title": "War and Peace",
            }))
            .send()
            .await;
        resp.assert_status_is_ok();

        let json = resp.json().await;
        assert!(json.value().object().get("success").bool());
    }
}
