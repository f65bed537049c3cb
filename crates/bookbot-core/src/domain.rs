/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Short book id used in callback data (`book_{id}`, `fmt_{id}_{format}`).
///
/// Derived from the trailing segment of the catalog's entry id, which is
/// stable across requests for the same entry but only unique per catalog.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BookId(pub String);

impl BookId {
    /// Catalog ids look like `tag:root:book:847493`; the trailing segment is
    /// short enough for Telegram callback data.
    pub fn from_catalog_id(id: &str) -> Self {
        let short = id.rsplit(':').next().unwrap_or(id);
        Self(short.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_id_takes_trailing_segment() {
        assert_eq!(BookId::from_catalog_id("tag:root:book:847493").0, "847493");
        assert_eq!(BookId::from_catalog_id("847493").0, "847493");
    }
}
