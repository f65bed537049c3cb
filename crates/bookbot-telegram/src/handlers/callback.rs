use std::sync::Arc;

use teloxide::{
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode},
};

use bookbot_core::{
    domain::{ChatId as CoreChatId, UserId},
    formatting::{escape_html, truncate_text},
    opds::{BookRecord, FormatTag},
};

use crate::router::AppState;
use crate::state::PendingBook;

use super::{commands, text};

const PREVIEW_MAX_CHARS: usize = 300;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Action {
    MenuSearch,
    MenuEmail,
    ChangeEmail,
    KeepEmail,
    NextPage,
    Preview(String),
    Hide(String),
    SelectBook(String),
    ChooseFormat(String, FormatTag),
    DownloadViaChat(String, FormatTag),
    SendToEmail(String, FormatTag),
    Unknown,
}

fn parse_action(data: &str) -> Action {
    match data {
        "menu_search" => return Action::MenuSearch,
        "menu_email" => return Action::MenuEmail,
        "change_email" => return Action::ChangeEmail,
        "keep_email" => return Action::KeepEmail,
        "next_page" => return Action::NextPage,
        _ => {}
    }

    if let Some(id) = data.strip_prefix("preview_") {
        return Action::Preview(id.to_string());
    }
    if let Some(id) = data.strip_prefix("hide_") {
        return Action::Hide(id.to_string());
    }
    if let Some(id) = data.strip_prefix("book_") {
        return Action::SelectBook(id.to_string());
    }
    if let Some(rest) = data.strip_prefix("fmt_") {
        if let Some((id, format)) = split_id_format(rest) {
            return Action::ChooseFormat(id, format);
        }
    }
    if let Some(rest) = data.strip_prefix("dl_") {
        if let Some((id, format)) = split_id_format(rest) {
            return Action::DownloadViaChat(id, format);
        }
    }
    if let Some(rest) = data.strip_prefix("mail_") {
        if let Some((id, format)) = split_id_format(rest) {
            return Action::SendToEmail(id, format);
        }
    }

    Action::Unknown
}

fn split_id_format(rest: &str) -> Option<(String, FormatTag)> {
    let (id, format) = rest.split_once('_')?;
    let format = format.parse::<FormatTag>().ok()?;
    Some((id.to_string(), format))
}

pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let cb_id = q.id.clone();
    let data = q.data.clone().unwrap_or_default();
    let Some(msg) = q.message.as_ref() else {
        bot.answer_callback_query(cb_id).await?;
        return Ok(());
    };
    let chat_id = msg.chat.id;
    let message_id = msg.id;
    let user_id = UserId(q.from.id.0 as i64);

    tracing::info!(user = user_id.0, data, "callback");
    let action = parse_action(&data);

    // Acknowledge immediately; long actions show a toast.
    let ack = match &action {
        Action::NextPage => Some("Loading next page..."),
        Action::DownloadViaChat(..) => Some("Downloading..."),
        _ => None,
    };
    let mut req = bot.answer_callback_query(cb_id);
    if let Some(toast) = ack {
        req = req.text(toast.to_string());
    }
    req.await?;

    match action {
        Action::MenuSearch => {
            bot.send_message(
                chat_id,
                "\u{1F4DA} Send me a book title or author name to search.\n\n\
                 Example: /search War and Peace",
            )
            .await?;
        }

        Action::MenuEmail => {
            match state.store.get_email(user_id).await {
                Some(email) => {
                    let keyboard = InlineKeyboardMarkup::new([
                        [InlineKeyboardButton::callback(
                            "\u{270F} Change email",
                            "change_email",
                        )],
                        [InlineKeyboardButton::callback(
                            "\u{274C} Keep current",
                            "keep_email",
                        )],
                    ]);
                    bot.send_message(
                        chat_id,
                        format!("Your current email: {email}\n\nWould you like to change it?"),
                    )
                    .reply_markup(keyboard)
                    .await?;
                }
                None => {
                    state.sessions.start_email_wizard(chat_id.0, None).await;
                    bot.send_message(chat_id, "Please enter your email address:")
                        .await?;
                }
            }
        }

        Action::ChangeEmail => {
            state.sessions.start_email_wizard(chat_id.0, None).await;
            bot.send_message(chat_id, "Please enter your email address:")
                .await?;
        }

        Action::KeepEmail => {
            bot.send_message(chat_id, "\u{2705} Keeping your current email.")
                .await?;
        }

        Action::NextPage => {
            match state.sessions.last_search(chat_id.0).await {
                Some((query, page)) => {
                    let next = page + 1;
                    state.sessions.set_search(chat_id.0, &query, next).await;
                    commands::run_search(&bot, chat_id, &state, &query, next).await?;
                }
                None => {
                    bot.send_message(chat_id, "Search session expired. Please search again.")
                        .await?;
                }
            }
        }

        Action::Preview(short_id) => {
            let Some(book) = state.sessions.book(chat_id.0, &short_id).await else {
                return Ok(());
            };

            let keyboard = InlineKeyboardMarkup::new([[
                InlineKeyboardButton::callback("\u{1F4D6} Select", format!("book_{short_id}")),
                InlineKeyboardButton::callback("\u{1F53C} Hide", format!("hide_{short_id}")),
            ]]);

            let base = book_card(&book);
            let expanded = match &book.description {
                Some(d) => format!(
                    "{base}\n\n\u{1F4D6} {}",
                    escape_html(&truncate_text(d, PREVIEW_MAX_CHARS))
                ),
                None => format!("{base}\n\n<i>No description available</i>"),
            };

            // Edit-in-place failures (message too old, unchanged text) are
            // deliberately swallowed.
            let _ = bot
                .edit_message_text(chat_id, message_id, expanded)
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboard)
                .await;
        }

        Action::Hide(short_id) => {
            let Some(book) = state.sessions.book(chat_id.0, &short_id).await else {
                return Ok(());
            };

            let keyboard = InlineKeyboardMarkup::new([[
                InlineKeyboardButton::callback("\u{1F4D6} Select", format!("book_{short_id}")),
                InlineKeyboardButton::callback("\u{1F441} Preview", format!("preview_{short_id}")),
            ]]);

            let _ = bot
                .edit_message_text(chat_id, message_id, book_card(&book))
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboard)
                .await;
        }

        Action::SelectBook(short_id) => {
            let title = state
                .sessions
                .book(chat_id.0, &short_id)
                .await
                .map(|b| b.title)
                .unwrap_or_else(|| format!("Book {short_id}"));

            let keyboard = InlineKeyboardMarkup::new([[
                InlineKeyboardButton::callback("\u{1F4D5} FB2", format!("fmt_{short_id}_fb2")),
                InlineKeyboardButton::callback("\u{1F4D7} EPUB", format!("fmt_{short_id}_epub")),
            ]]);
            bot.send_message(chat_id, format!("Choose format for \"{title}\":"))
                .reply_markup(keyboard)
                .await?;
        }

        Action::ChooseFormat(short_id, format) => {
            let keyboard = InlineKeyboardMarkup::new([[
                InlineKeyboardButton::callback(
                    "\u{1F4F2} Download via Telegram",
                    format!("dl_{short_id}_{format}"),
                ),
                InlineKeyboardButton::callback(
                    "\u{1F4E7} Send to Email",
                    format!("mail_{short_id}_{format}"),
                ),
            ]]);
            bot.send_message(chat_id, "How would you like to get the book?")
                .reply_markup(keyboard)
                .await?;
        }

        Action::DownloadViaChat(short_id, format) => {
            handle_chat_download(&bot, chat_id, user_id, &state, &short_id, format).await?;
        }

        Action::SendToEmail(short_id, format) => {
            handle_email_delivery(&bot, chat_id, user_id, &state, &short_id, format).await?;
        }

        Action::Unknown => {}
    }

    Ok(())
}

fn book_card(book: &BookRecord) -> String {
    format!(
        "<b>{}</b>\n{}",
        escape_html(&book.title),
        escape_html(&book.author)
    )
}

fn find_download_url(book: &BookRecord, format: FormatTag) -> Option<String> {
    book.formats
        .iter()
        .find(|f| f.format == format)
        .map(|f| f.download_url.clone())
}

async fn handle_chat_download(
    bot: &Bot,
    chat_id: teloxide::types::ChatId,
    user_id: UserId,
    state: &Arc<AppState>,
    short_id: &str,
    format: FormatTag,
) -> ResponseResult<()> {
    let book = state.sessions.book(chat_id.0, short_id).await;
    let Some(url) = book.as_ref().and_then(|b| find_download_url(b, format)) else {
        bot.send_message(chat_id, "Download URL not found. Please search again.")
            .await?;
        return Ok(());
    };
    let title = book.map(|b| b.title).unwrap_or_else(|| format!("Book {short_id}"));

    let suggested = format!("book_{short_id}.{format}");
    let path = match state.catalog.download(&url, &suggested).await {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(error = %e, "chat download failed");
            bot.send_message(chat_id, "Failed to download book. It might be unavailable.")
                .await?;
            return Ok(());
        }
    };

    // Prefer the extracted entry's own name over the synthetic one.
    let display = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(&suggested)
        .to_string();

    match state
        .delivery
        .send_document(CoreChatId(chat_id.0), &path, &display, None)
        .await
    {
        Ok(()) => {
            state
                .store
                .log_download(user_id, &title, format.as_str())
                .await;
        }
        Err(e) => {
            tracing::error!(error = %e, "document upload failed");
            bot.send_message(chat_id, "Failed to send the file. Please try again.")
                .await?;
        }
    }

    Ok(())
}

async fn handle_email_delivery(
    bot: &Bot,
    chat_id: teloxide::types::ChatId,
    user_id: UserId,
    state: &Arc<AppState>,
    short_id: &str,
    format: FormatTag,
) -> ResponseResult<()> {
    let book = state.sessions.book(chat_id.0, short_id).await;
    let Some(url) = book.as_ref().and_then(|b| find_download_url(b, format)) else {
        bot.send_message(chat_id, "Download URL not found. Please search again.")
            .await?;
        return Ok(());
    };
    let title = book.map(|b| b.title).unwrap_or_else(|| format!("Book {short_id}"));

    if !state.mailer.is_configured() {
        bot.send_message(chat_id, "Email delivery is not configured on this bot.")
            .await?;
        return Ok(());
    }

    let pending = PendingBook {
        short_id: short_id.to_string(),
        download_url: url,
        title: title.clone(),
        format,
    };

    let Some(email) = state.store.get_email(user_id).await else {
        // No address yet: queue the book and enter the wizard.
        state
            .sessions
            .start_email_wizard(chat_id.0, Some(pending))
            .await;
        bot.send_message(chat_id, "Please enter your email address:")
            .await?;
        return Ok(());
    };

    bot.send_message(chat_id, format!("Sending \"{title}\" to {email}..."))
        .await?;

    match text::send_book_by_email(state, &email, &pending).await {
        Ok(()) => {
            bot.send_message(chat_id, "Sent!").await?;
        }
        Err(e) => {
            tracing::error!(error = %e, "email delivery failed");
            bot.send_message(chat_id, "Failed to send email.").await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_menu_and_paging_actions() {
        assert_eq!(parse_action("menu_search"), Action::MenuSearch);
        assert_eq!(parse_action("menu_email"), Action::MenuEmail);
        assert_eq!(parse_action("change_email"), Action::ChangeEmail);
        assert_eq!(parse_action("keep_email"), Action::KeepEmail);
        assert_eq!(parse_action("next_page"), Action::NextPage);
    }

    #[test]
    fn parses_book_flow_actions() {
        assert_eq!(
            parse_action("book_847493"),
            Action::SelectBook("847493".to_string())
        );
        assert_eq!(
            parse_action("preview_847493"),
            Action::Preview("847493".to_string())
        );
        assert_eq!(
            parse_action("fmt_847493_fb2"),
            Action::ChooseFormat("847493".to_string(), FormatTag::Fb2)
        );
        assert_eq!(
            parse_action("dl_847493_epub"),
            Action::DownloadViaChat("847493".to_string(), FormatTag::Epub)
        );
        assert_eq!(
            parse_action("mail_847493_fb2"),
            Action::SendToEmail("847493".to_string(), FormatTag::Fb2)
        );
    }

    #[test]
    fn garbage_callback_data_is_unknown() {
        assert_eq!(parse_action(""), Action::Unknown);
        assert_eq!(parse_action("fmt_847493"), Action::Unknown);
        assert_eq!(parse_action("dl_847493_nope"), Action::Unknown);
        assert_eq!(parse_action("something_else"), Action::Unknown);
    }

    #[test]
    fn finds_download_url_by_format() {
        let book = BookRecord {
            id: "tag:book:1".to_string(),
            title: "T".to_string(),
            author: "A".to_string(),
            description: None,
            cover_url: None,
            formats: vec![
                bookbot_core::opds::FormatLink {
                    format: FormatTag::Fb2,
                    download_url: "http://x/b/1/fb2".to_string(),
                },
                bookbot_core::opds::FormatLink {
                    format: FormatTag::Epub,
                    download_url: "http://x/b/1/epub".to_string(),
                },
            ],
        };

        assert_eq!(
            find_download_url(&book, FormatTag::Epub).as_deref(),
            Some("http://x/b/1/epub")
        );
        assert_eq!(find_download_url(&book, FormatTag::Pdf), None);
    }
}
