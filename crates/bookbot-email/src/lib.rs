//! Resend adapter (email delivery).
//!
//! Sends a book as an attachment through the Resend HTTP API. When no API
//! key is configured the adapter stays inert and callers offer the user a
//! different delivery path.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

use bookbot_core::{errors::Error, ports::Mailer, Result};

#[derive(Clone, Debug)]
pub struct ResendMailer {
    api_key: Option<String>,
    from: String,
    http: reqwest::Client,
}

const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";

impl ResendMailer {
    pub fn new(api_key: Option<String>, from: impl Into<String>) -> Self {
        if api_key.is_none() {
            tracing::warn!("RESEND_API_KEY is not set, email delivery disabled");
        }
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .expect("reqwest client build");
        Self {
            api_key,
            from: from.into(),
            http,
        }
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    async fn send_book(
        &self,
        to: &str,
        book_title: &str,
        attachment: &[u8],
        filename: &str,
    ) -> Result<()> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(Error::Mail("email delivery is not configured".to_string()));
        };

        tracing::info!(to, book_title, "sending book via email");

        let body = serde_json::json!({
            "from": self.from,
            "to": [to],
            "subject": format!("Your book: {book_title}"),
            "text": format!("Here is the book you requested: {book_title}"),
            "attachments": [{
                "filename": filename,
                "content": BASE64.encode(attachment),
            }],
        });

        let resp = self
            .http
            .post(RESEND_ENDPOINT)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Mail(format!("resend request error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Mail(format!(
                "resend returned {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let v: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| Error::Mail(format!("resend json error: {e}")))?;
        let id = v.get("id").and_then(|i| i.as_str()).unwrap_or("<none>");
        tracing::info!(to, id, "email sent");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_mailer_refuses_to_send() {
        let mailer = ResendMailer::new(None, "Bot <bot@example.com>");
        assert!(!mailer.is_configured());

        let err = mailer
            .send_book("a@b.cc", "T", b"bytes", "t.fb2")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Mail(_)));
    }
}
