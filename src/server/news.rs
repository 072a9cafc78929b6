//! News list extraction from the upstream bot's answer.
//!
//! The bot answers the news prompt with a card: a JSON object whose `data`
//! field is itself a JSON string holding `variables.data.defaultValue`, the
//! list of items. A few other shapes are accepted, and plain text falls back
//! to paragraph parsing.

use serde_json::Value;
use tracing::{debug, warn};

use crate::protocol::NewsItem;

/// Extract news items from an answer. Items without a title are dropped.
#[must_use]
pub fn parse_news_response(text: &str) -> Vec<NewsItem> {
    match serde_json::from_str::<Value>(text) {
        Ok(value) => parse_json(&value),
        Err(_) => {
            debug!("News answer is not JSON, parsing paragraphs");
            parse_paragraphs(text)
        }
    }
}

fn parse_json(value: &Value) -> Vec<NewsItem> {
    if let Some(inner) = value.get("data").and_then(Value::as_str) {
        return match serde_json::from_str::<Value>(inner) {
            Ok(card) => items(card_entries(&card)),
            Err(e) => {
                warn!("News card data is not valid JSON: {e}");
                Vec::new()
            }
        };
    }
    if value.get("type").and_then(Value::as_str) == Some("card") {
        return items(value.get("data").and_then(card_entries));
    }
    if value.is_array() {
        return items(Some(value));
    }
    items(value.get("news"))
}

fn card_entries(card: &Value) -> Option<&Value> {
    card.get("variables")?.get("data")?.get("defaultValue")
}

fn items(list: Option<&Value>) -> Vec<NewsItem> {
    list.and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| serde_json::from_value::<NewsItem>(entry.clone()).ok())
                .filter(|item| !item.title.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

/// Blank lines separate items; a line starting with `http` is the link; the
/// first other line is the title and the rest is concatenated as content.
fn parse_paragraphs(text: &str) -> Vec<NewsItem> {
    let mut news = Vec::new();
    let mut current = NewsItem::default();

    for line in text.trim().lines().map(str::trim) {
        if line.is_empty() {
            if !current.title.is_empty() {
                news.push(std::mem::take(&mut current));
            }
        } else if line.starts_with("http") {
            current.url = line.to_string();
        } else if current.title.is_empty() {
            current.title = line.to_string();
        } else {
            current.content.push_str(line);
        }
    }
    if !current.title.is_empty() {
        news.push(current);
    }
    news
}
