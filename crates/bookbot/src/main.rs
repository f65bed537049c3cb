use std::sync::Arc;

use teloxide::Bot;

use bookbot_api::ApiState;
use bookbot_core::{
    catalog::CatalogClient,
    config::Config,
    ports::{BookLookup, DeliverySink, Mailer},
    store::Store,
};
use bookbot_email::ResendMailer;
use bookbot_telegram::{
    router::{run_polling, AppState},
    state::ChatSessions,
    TelegramDelivery,
};

#[tokio::main]
async fn main() -> Result<(), bookbot_core::Error> {
    bookbot_core::logging::init("bookbot")?;

    let cfg = Arc::new(Config::load()?);

    let catalog: Arc<dyn BookLookup> = Arc::new(CatalogClient::new(
        cfg.catalog_url.clone(),
        cfg.storage_dir.clone(),
        cfg.http_timeout,
    ));
    let store = Arc::new(Store::open(cfg.store_file.clone()));
    let mailer: Arc<dyn Mailer> = Arc::new(ResendMailer::new(
        cfg.resend_api_key.clone(),
        cfg.email_from.clone(),
    ));

    let bot = Bot::new(cfg.bot_token.clone());
    let delivery: Arc<dyn DeliverySink> = Arc::new(TelegramDelivery::new(bot.clone()));

    // HTTP API runs alongside the bot; its failure should not take the
    // bot down.
    let api_state = Arc::new(ApiState {
        catalog: catalog.clone(),
        delivery: delivery.clone(),
    });
    let api_port = cfg.api_port;
    tokio::spawn(async move {
        if let Err(e) = bookbot_api::run(api_state, api_port).await {
            tracing::error!(error = %e, "HTTP API stopped");
        }
    });

    let state = Arc::new(AppState {
        cfg,
        catalog,
        store,
        mailer,
        delivery,
        sessions: Arc::new(ChatSessions::default()),
    });

    run_polling(bot, state)
        .await
        .map_err(|e| bookbot_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
