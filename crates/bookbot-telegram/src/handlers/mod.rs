//! Telegram update handlers.
//!
//! Each handler:
//! - logs the incoming update to the store (best-effort)
//! - drives the search -> format -> delivery flow against the catalog port
//! - reports failures to the user without crashing the dispatcher

use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{CallbackQuery, Message},
};

use bookbot_core::{domain::UserId, store::Direction};

use crate::router::AppState;

mod callback;
mod commands;
mod text;

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    callback::handle_callback(bot, q, state).await
}

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let user_id = UserId(user.id.0 as i64);

    let Some(text) = msg.text() else {
        // Only text updates matter to this bot.
        return Ok(());
    };

    tracing::info!(
        user = user_id.0,
        username = user.username.as_deref().unwrap_or("unknown"),
        text,
        "incoming message"
    );
    state
        .store
        .save_user(user_id, user.username.as_deref(), Some(&user.first_name))
        .await;
    state.store.log_message(user_id, text, Direction::In).await;

    if text.starts_with('/') {
        return commands::handle_command(bot, msg, state).await;
    }

    // Free text is only meaningful while the email wizard is active.
    if state.sessions.is_awaiting_email(msg.chat.id.0).await {
        return text::handle_email_input(bot, msg, state).await;
    }

    bot.send_message(
        msg.chat.id,
        "Send /search <title or author> to find a book.",
    )
    .await?;
    Ok(())
}
