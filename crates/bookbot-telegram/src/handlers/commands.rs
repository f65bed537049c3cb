use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode},
};

use bookbot_core::{domain::BookId, formatting::escape_html};

use crate::router::AppState;

pub async fn handle_command(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let text = msg.text().unwrap_or_default().to_owned();
    let (name, args) = split_command(&text);

    match name {
        "start" => handle_start(bot, msg).await,
        "search" => handle_search_command(bot, msg, state, args).await,
        "email" => {
            // Same entry point as the menu button.
            state.sessions.start_email_wizard(msg.chat.id.0, None).await;
            bot.send_message(msg.chat.id, "Please enter your email address:")
                .await?;
            Ok(())
        }
        _ => {
            bot.send_message(msg.chat.id, "Unknown command. Try /start.")
                .await?;
            Ok(())
        }
    }
}

/// `/search@my_bot war and peace` -> ("search", "war and peace")
fn split_command(text: &str) -> (&str, &str) {
    let text = text.strip_prefix('/').unwrap_or(text);
    let (name, args) = match text.split_once(char::is_whitespace) {
        Some((n, a)) => (n, a.trim()),
        None => (text, ""),
    };
    let name = name.split('@').next().unwrap_or(name);
    (name, args)
}

async fn handle_start(bot: Bot, msg: Message) -> ResponseResult<()> {
    let user_name = msg
        .from()
        .map(|u| u.first_name.clone())
        .unwrap_or_else(|| "there".to_string());

    let keyboard = InlineKeyboardMarkup::new([
        [InlineKeyboardButton::callback(
            "\u{1F50D} Search for a book",
            "menu_search",
        )],
        [InlineKeyboardButton::callback(
            "\u{1F4E7} Change email",
            "menu_email",
        )],
    ]);

    bot.send_message(
        msg.chat.id,
        format!(
            "\u{1F44B} Hello, {user_name}!\n\nI'm your personal book assistant. \
             I can help you find and download ebooks.\n\nWhat would you like to do?"
        ),
    )
    .reply_markup(keyboard)
    .await?;
    Ok(())
}

async fn handle_search_command(
    bot: Bot,
    msg: Message,
    state: Arc<AppState>,
    args: &str,
) -> ResponseResult<()> {
    if args.is_empty() {
        bot.send_message(msg.chat.id, "Please provide a book name: /search <name>")
            .await?;
        return Ok(());
    }

    state.sessions.set_search(msg.chat.id.0, args, 0).await;
    run_search(&bot, msg.chat.id, &state, args, 0).await
}

/// Shared by `/search` and the `next_page` callback.
pub(super) async fn run_search(
    bot: &Bot,
    chat_id: teloxide::types::ChatId,
    state: &Arc<AppState>,
    query: &str,
    page: u32,
) -> ResponseResult<()> {
    bot.send_message(
        chat_id,
        format!("Searching for \"{query}\" (Page {})...", page + 1),
    )
    .await?;

    let books = match state.catalog.search(query, page).await {
        Ok(books) => books,
        Err(e) => {
            tracing::error!(error = %e, "search failed");
            bot.send_message(chat_id, "An error occurred while searching.")
                .await?;
            return Ok(());
        }
    };

    if books.is_empty() {
        bot.send_message(chat_id, "No books found.").await?;
        return Ok(());
    }

    let many_results = books.len() >= 5;
    let mut remembered = Vec::with_capacity(books.len());

    for book in books {
        let short_id = BookId::from_catalog_id(&book.id).0;

        let keyboard = InlineKeyboardMarkup::new([[
            InlineKeyboardButton::callback("\u{1F4D6} Select", format!("book_{short_id}")),
            InlineKeyboardButton::callback("\u{1F441} Preview", format!("preview_{short_id}")),
        ]]);

        // Title/author only; the description is expanded on preview.
        let text = format!(
            "<b>{}</b>\n{}",
            escape_html(&book.title),
            escape_html(&book.author)
        );
        bot.send_message(chat_id, text)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboard)
            .await?;

        remembered.push((short_id, book));
    }

    state.sessions.remember_books(chat_id.0, remembered).await;

    if many_results {
        let keyboard = InlineKeyboardMarkup::new([[InlineKeyboardButton::callback(
            "Next Page \u{27A1}",
            "next_page",
        )]]);
        bot.send_message(chat_id, "More results?")
            .reply_markup(keyboard)
            .await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_splitting() {
        assert_eq!(split_command("/start"), ("start", ""));
        assert_eq!(split_command("/search war and peace"), ("search", "war and peace"));
        assert_eq!(split_command("/search@my_bot tolstoy"), ("search", "tolstoy"));
    }
}
