/// Core error type for the bot.
///
/// Adapter crates map their specific errors into this type so the bot core
/// can handle failures consistently. Catalog operations deliberately
/// collapse into the two coarse kinds (`SearchFailed` / `DownloadFailed`):
/// callers only decide what to tell the user, never inspect the cause.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("failed to search books")]
    SearchFailed,

    #[error("failed to download file")]
    DownloadFailed,

    #[error("mail error: {0}")]
    Mail(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
