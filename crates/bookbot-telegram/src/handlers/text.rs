use std::sync::{Arc, LazyLock};

use regex::Regex;
use teloxide::prelude::*;

use bookbot_core::domain::UserId;

use crate::router::AppState;
use crate::state::PendingBook;

/// Email wizard input step: validate, save, then send any queued book.
pub async fn handle_email_input(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let email = msg.text().unwrap_or_default().trim().to_string();
    let Some(user) = msg.from() else {
        return Ok(());
    };
    let user_id = UserId(user.id.0 as i64);

    if !is_valid_email(&email) {
        bot.send_message(msg.chat.id, "Invalid email format. Please try again.")
            .await?;
        return Ok(());
    }

    if let Err(e) = state.store.set_email(user_id, &email).await {
        tracing::error!(error = %e, "failed to save email");
        bot.send_message(msg.chat.id, "Failed to save email. Please try again later.")
            .await?;
        return Ok(());
    }

    let pending = state.sessions.finish_email_wizard(msg.chat.id.0).await;

    let Some(book) = pending else {
        bot.send_message(msg.chat.id, format!("\u{2705} Email saved: {email}"))
            .await?;
        return Ok(());
    };

    bot.send_message(msg.chat.id, format!("Email saved: {email}. Sending book..."))
        .await?;

    match send_book_by_email(&state, &email, &book).await {
        Ok(()) => {
            bot.send_message(msg.chat.id, "Book sent to your email!")
                .await?;
        }
        Err(e) => {
            tracing::error!(error = %e, "email send failed");
            bot.send_message(msg.chat.id, "Failed to send email. Please try again later.")
                .await?;
        }
    }

    Ok(())
}

pub(super) async fn send_book_by_email(
    state: &Arc<AppState>,
    email: &str,
    book: &PendingBook,
) -> bookbot_core::Result<()> {
    let suggested = book.suggested_filename();
    let path = state.catalog.download(&book.download_url, &suggested).await?;

    let bytes = tokio::fs::read(&path).await?;
    let filename = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(&suggested)
        .to_string();

    state
        .mailer
        .send_book(email, &book.title, &bytes, &filename)
        .await
}

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"));

pub(super) fn is_valid_email(s: &str) -> bool {
    EMAIL_RE.is_match(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation_matches_the_wizard_rules() {
        assert!(is_valid_email("reader@example.com"));
        assert!(is_valid_email("a.b+c@sub.domain.org"));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("two@@example.com"));
        assert!(!is_valid_email("spaces in@example.com"));
        assert!(!is_valid_email("nodot@example"));
    }
}
