//! Telegram adapter (teloxide).
//!
//! Implements the `bookbot-core` `DeliverySink` port over the Telegram Bot
//! API and hosts the dispatcher (router + handlers).

use std::path::Path;

use async_trait::async_trait;

use teloxide::{prelude::*, types::InputFile};

use tokio::time::sleep;

use bookbot_core::{domain::ChatId, errors::Error, ports::DeliverySink, Result};

pub mod handlers;
pub mod router;
pub mod state;

#[derive(Clone)]
pub struct TelegramDelivery {
    bot: Bot,
}

impl TelegramDelivery {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }
}

#[async_trait]
impl DeliverySink for TelegramDelivery {
    async fn send_document(
        &self,
        chat_id: ChatId,
        path: &Path,
        display_filename: &str,
        caption: Option<&str>,
    ) -> Result<()> {
        let path = path.to_path_buf();
        let display_filename = display_filename.to_string();

        self.with_retry(|| {
            let input = InputFile::file(path.clone()).file_name(display_filename.clone());
            let mut req = self.bot.send_document(Self::tg_chat(chat_id), input);
            if let Some(c) = caption {
                req = req.caption(c.to_string());
            }
            req
        })
        .await?;

        Ok(())
    }
}
