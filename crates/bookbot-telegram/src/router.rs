use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use bookbot_core::{
    config::Config,
    ports::{BookLookup, DeliverySink, Mailer},
    store::Store,
};

use crate::handlers;
use crate::state::ChatSessions;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub catalog: Arc<dyn BookLookup>,
    pub store: Arc<Store>,
    pub mailer: Arc<dyn Mailer>,
    pub delivery: Arc<dyn DeliverySink>,
    pub sessions: Arc<ChatSessions>,
}

pub async fn run_polling(bot: Bot, state: Arc<AppState>) -> anyhow::Result<()> {
    if let Ok(me) = bot.get_me().await {
        tracing::info!(bot = %me.username(), "bot started");
    }
    tracing::info!(catalog = %state.cfg.catalog_url, "catalog configured");
    tracing::info!(storage = %state.cfg.storage_dir.display(), "storage directory");

    let handler = dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback))
        .branch(Update::filter_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}
