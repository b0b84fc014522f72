//! Panel payload normalization
//!
//! Xtream panels are inconsistent: ids come as strings or numbers, fields go
//! missing, guide text is base64 encoded. Responses are kept as untyped
//! `serde_json::Value` documents up to this module and turned into the domain
//! models here, with a fallback for every field.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use super::xtream::XtreamError;
use crate::models::{Category, Channel, ContentType, Credentials, EpgIndex, EpgProgram};

/// Display name used when the panel sends none
pub const UNNAMED_ITEM: &str = "Unnamed";

/// Date format of the `start`/`end` guide fields
const EPG_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Error reported by the panel inside an otherwise valid response
///
/// Covers a truthy top-level `error` field and `user_info.auth == 0`.
pub fn panel_error(doc: &Value) -> Option<String> {
    if let Some(error) = doc.get("error") {
        let reported = match error {
            Value::Null => None,
            Value::Bool(false) => None,
            Value::Bool(true) => Some("panel reported an error".to_string()),
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.trim().to_string()),
            other => Some(other.to_string()),
        };
        if reported.is_some() {
            return reported;
        }
    }

    let auth = doc.get("user_info").and_then(|info| info.get("auth"));
    if auth.and_then(int_of) == Some(0) {
        return Some("authentication rejected".to_string());
    }

    None
}

/// Whether an account check response describes a usable account
pub fn is_authorized(doc: &Value) -> bool {
    doc.get("user_info").map(Value::is_object).unwrap_or(false) && panel_error(doc).is_none()
}

/// Parse a category listing of one content type
pub fn parse_categories(doc: &Value, content_type: ContentType) -> Result<Vec<Category>, XtreamError> {
    let items = match list_of(doc)? {
        Some(items) => items,
        None => return Ok(Vec::new()),
    };

    let categories = items
        .iter()
        .filter_map(|item| {
            // A category without an id cannot be queried for its items
            let id = item.get("category_id").and_then(id_of)?;
            let name = item
                .get("category_name")
                .and_then(text_of)
                .unwrap_or_else(|| UNNAMED_ITEM.to_string());
            Some(Category {
                id,
                name,
                content_type,
            })
        })
        .collect();

    Ok(categories)
}

/// Parse the items of a category
///
/// Items are never dropped: an item without `stream_id` or `series_id` gets a
/// random id and no stream URL.
pub fn parse_channels(
    doc: &Value,
    credentials: &Credentials,
    category: &Category,
) -> Result<Vec<Channel>, XtreamError> {
    let items = match list_of(doc)? {
        Some(items) => items,
        None => return Ok(Vec::new()),
    };

    Ok(items
        .iter()
        .map(|item| parse_channel(item, credentials, category))
        .collect())
}

fn parse_channel(item: &Value, credentials: &Credentials, category: &Category) -> Channel {
    let content_type = category.content_type;
    let panel_id = item
        .get("stream_id")
        .and_then(id_of)
        .or_else(|| item.get("series_id").and_then(id_of));

    let (id, stream_url) = match panel_id {
        Some(id) => {
            let url = credentials.stream_url(content_type, &id);
            (id, url)
        }
        None => (Uuid::new_v4().to_string(), String::new()),
    };

    let name = item
        .get("name")
        .and_then(text_of)
        .unwrap_or_else(|| UNNAMED_ITEM.to_string());

    let icon = match content_type {
        ContentType::Series => item
            .get("cover")
            .and_then(text_of)
            .or_else(|| item.get("stream_icon").and_then(text_of)),
        _ => item.get("stream_icon").and_then(text_of),
    };

    let epg_channel_id = match content_type {
        ContentType::Live => item.get("epg_channel_id").and_then(text_of),
        _ => None,
    };

    Channel {
        id,
        name,
        stream_url,
        icon,
        epg_channel_id,
        category_id: category.id.clone(),
        content_type,
    }
}

/// Parse a guide payload (`{"epg_listings": [...]}`)
///
/// With `channel_id` every program lands in that bucket and the bucket exists
/// even when empty. Without it programs are grouped by their own
/// `channel_id`, falling back to `epg_id`.
pub fn parse_epg(doc: &Value, channel_id: Option<&str>) -> Result<EpgIndex, XtreamError> {
    let listings = match doc {
        Value::Null => None,
        Value::Array(items) => Some(items.as_slice()),
        Value::Object(_) => match doc.get("epg_listings") {
            None | Some(Value::Null) => None,
            Some(Value::Array(items)) => Some(items.as_slice()),
            Some(other) => {
                return Err(XtreamError::Parse(format!(
                    "epg_listings is not a list: {}",
                    kind_of(other)
                )))
            }
        },
        other => {
            return Err(XtreamError::Parse(format!(
                "unexpected guide payload: {}",
                kind_of(other)
            )))
        }
    };

    let mut index = EpgIndex::new();
    if let Some(id) = channel_id {
        index.insert(id, Vec::new());
    }

    for entry in listings.unwrap_or_default() {
        let bucket = match channel_id {
            Some(id) => id.to_string(),
            None => match entry
                .get("channel_id")
                .and_then(text_of)
                .or_else(|| entry.get("epg_id").and_then(id_of))
            {
                Some(id) => id,
                None => continue,
            },
        };
        if let Some(program) = parse_program(entry, bucket) {
            index.push(program);
        }
    }

    Ok(index)
}

fn parse_program(entry: &Value, channel_id: String) -> Option<EpgProgram> {
    let start = entry
        .get("start_timestamp")
        .and_then(timestamp_of)
        .or_else(|| entry.get("start").and_then(datetime_of))?;
    let stop = entry
        .get("stop_timestamp")
        .and_then(timestamp_of)
        .or_else(|| entry.get("end").and_then(datetime_of))
        .or_else(|| entry.get("stop").and_then(datetime_of))?;

    let title = entry
        .get("title")
        .and_then(Value::as_str)
        .map(decode_text)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| UNNAMED_ITEM.to_string());
    let description = entry
        .get("description")
        .and_then(Value::as_str)
        .map(decode_text)
        .filter(|d| !d.is_empty());

    Some(EpgProgram::new(channel_id, title, description, start, stop))
}

/// Punctuation common in program titles
const TITLE_PUNCTUATION: &str = ".,:;!?'\"-&/";

/// Decode base64 guide text, keeping the raw value when it is not base64
///
/// Plain words of base64 alphabet characters also decode, so the decoded
/// form is used only when it re-encodes to the input and reads as text.
pub fn decode_text(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let Ok(bytes) = STANDARD.decode(trimmed) else {
        return trimmed.to_string();
    };
    if STANDARD.encode(&bytes) != trimmed {
        return trimmed.to_string();
    }
    match String::from_utf8(bytes) {
        Ok(text) if looks_like_text(&text) => text.trim().to_string(),
        _ => trimmed.to_string(),
    }
}

/// At least three quarters of the visible characters are letters, digits or
/// title punctuation, and there are no control characters
fn looks_like_text(text: &str) -> bool {
    if text.chars().any(|c| c.is_control() && !c.is_whitespace()) {
        return false;
    }
    let visible: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
    if visible.is_empty() {
        return false;
    }
    let texty = visible
        .iter()
        .filter(|c| c.is_alphanumeric() || TITLE_PUNCTUATION.contains(**c))
        .count();
    texty * 4 >= visible.len() * 3
}

// =============================================================================
// Field helpers
// =============================================================================

/// The list inside a listing response; `None` when the panel sent nothing
fn list_of(doc: &Value) -> Result<Option<&[Value]>, XtreamError> {
    match doc {
        Value::Array(items) => Ok(Some(items.as_slice())),
        Value::Null => Ok(None),
        // Some panels answer an empty object instead of an empty list
        Value::Object(map) if map.is_empty() => Ok(None),
        other => Err(XtreamError::Parse(format!(
            "expected a list, got {}",
            kind_of(other)
        ))),
    }
}

/// Identifier that may be sent as a string or a number
fn id_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Non-empty trimmed string
fn text_of(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn int_of(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn timestamp_of(value: &Value) -> Option<DateTime<Utc>> {
    int_of(value).and_then(|secs| DateTime::from_timestamp(secs, 0))
}

fn datetime_of(value: &Value) -> Option<DateTime<Utc>> {
    let raw = value.as_str()?.trim();
    NaiveDateTime::parse_from_str(raw, EPG_DATE_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn creds() -> Credentials {
        Credentials {
            server_url: "http://ex.com:80".to_string(),
            username: "u".to_string(),
            password: "p".to_string(),
        }
    }

    fn category(content_type: ContentType) -> Category {
        Category {
            id: "5".to_string(),
            name: "News".to_string(),
            content_type,
        }
    }

    #[test]
    fn test_panel_error_detection() {
        assert!(panel_error(&json!({"error": "Invalid"})).is_some());
        assert!(panel_error(&json!({"error": true})).is_some());
        assert!(panel_error(&json!({"user_info": {"auth": 0}})).is_some());
        assert!(panel_error(&json!({"user_info": {"auth": "0"}})).is_some());
        assert!(panel_error(&json!({"error": ""})).is_none());
        assert!(panel_error(&json!({"error": null})).is_none());
        assert!(panel_error(&json!({"user_info": {"auth": 1}})).is_none());
        assert!(panel_error(&json!([])).is_none());
    }

    #[test]
    fn test_is_authorized() {
        assert!(is_authorized(&json!({"user_info": {"auth": 1, "status": "Active"}})));
        assert!(!is_authorized(&json!({"user_info": {"auth": 0}})));
        assert!(!is_authorized(&json!({"server_info": {}})));
        assert!(!is_authorized(&json!({"user_info": "yes"})));
        assert!(!is_authorized(&Value::Null));
    }

    #[test]
    fn test_parse_categories_mixed_ids() {
        let doc = json!([
            {"category_id": "1", "category_name": "Sports"},
            {"category_id": 2, "category_name": "Kids"},
            {"category_id": "3"},
            {"category_name": "No id"}
        ]);
        let categories = parse_categories(&doc, ContentType::Movie).unwrap();
        assert_eq!(categories.len(), 3);
        assert_eq!(categories[1].id, "2");
        assert_eq!(categories[2].name, UNNAMED_ITEM);
        assert!(categories.iter().all(|c| c.content_type == ContentType::Movie));
    }

    #[test]
    fn test_parse_categories_empty_shapes() {
        assert!(parse_categories(&Value::Null, ContentType::Live).unwrap().is_empty());
        assert!(parse_categories(&json!({}), ContentType::Live).unwrap().is_empty());
        assert!(parse_categories(&json!("oops"), ContentType::Live).is_err());
    }

    #[test]
    fn test_parse_live_channel() {
        let doc = json!([{
            "stream_id": 42,
            "name": "News 24",
            "stream_icon": "http://img/1.png",
            "epg_channel_id": "news24.uk"
        }]);
        let channels = parse_channels(&doc, &creds(), &category(ContentType::Live)).unwrap();
        let channel = &channels[0];
        assert_eq!(channel.id, "42");
        assert_eq!(channel.stream_url, "http://ex.com:80/live/u/p/42.m3u8");
        assert_eq!(channel.icon.as_deref(), Some("http://img/1.png"));
        assert_eq!(channel.epg_channel_id.as_deref(), Some("news24.uk"));
        assert_eq!(channel.category_id, "5");
    }

    #[test]
    fn test_movie_channel_has_no_epg_link() {
        let doc = json!([{"stream_id": "7", "name": "Film", "epg_channel_id": "x"}]);
        let channels = parse_channels(&doc, &creds(), &category(ContentType::Movie)).unwrap();
        assert_eq!(channels[0].stream_url, "http://ex.com:80/movie/u/p/7.mp4");
        assert!(channels[0].epg_channel_id.is_none());
    }

    #[test]
    fn test_series_uses_series_id_and_cover() {
        let doc = json!([{"series_id": 9, "name": "Show", "cover": "http://img/c.jpg"}]);
        let channels = parse_channels(&doc, &creds(), &category(ContentType::Series)).unwrap();
        assert_eq!(channels[0].id, "9");
        assert_eq!(channels[0].stream_url, "");
        assert_eq!(channels[0].icon.as_deref(), Some("http://img/c.jpg"));
    }

    #[test]
    fn test_item_without_id_is_kept() {
        let doc = json!([{"name": "Mystery"}, {}]);
        let channels = parse_channels(&doc, &creds(), &category(ContentType::Live)).unwrap();
        assert_eq!(channels.len(), 2);
        assert!(!channels[0].id.is_empty());
        assert_ne!(channels[0].id, channels[1].id);
        assert_eq!(channels[1].name, UNNAMED_ITEM);
        assert!(!channels[0].is_playable());
    }

    #[test]
    fn test_decode_text() {
        assert_eq!(decode_text("TmV3cyBhdCBUZW4="), "News at Ten");
        assert_eq!(decode_text("Hello World"), "Hello World");
        assert_eq!(decode_text("News"), "News");
        assert_eq!(decode_text("  "), "");
    }

    #[test]
    fn test_decode_text_keeps_plain_words() {
        // Valid base64 whose decoded bytes are not title text
        assert_eq!(decode_text("Wild"), "Wild");
        assert_eq!(decode_text("Kids"), "Kids");
        assert_eq!(decode_text("Star"), "Star");
        assert_eq!(decode_text("Golf"), "Golf");
    }

    #[test]
    fn test_decode_text_short_titles() {
        assert_eq!(decode_text("RnVu"), "Fun");
        assert_eq!(decode_text("Qy5TLkku"), "C.S.I.");
        assert_eq!(decode_text("VG9kYXkncyBoZWFkbGluZXM="), "Today's headlines");
    }

    #[test]
    fn test_parse_short_epg() {
        let doc = json!({"epg_listings": [
            {
                "id": "1",
                "title": "TmV3cyBhdCBUZW4=",
                "description": "VG9kYXkncyBoZWFkbGluZXM=",
                "start_timestamp": "1700000000",
                "stop_timestamp": "1700003600",
                "channel_id": "news24.uk"
            },
            {
                "title": "Weather",
                "start": "2023-11-14 23:13:20",
                "end": "2023-11-14 23:30:00"
            },
            {"title": "No times"}
        ]});
        let index = parse_epg(&doc, Some("42")).unwrap();
        let programs = index.programs_for("42");
        assert_eq!(programs.len(), 2);
        assert_eq!(programs[0].title, "News at Ten");
        assert_eq!(programs[0].description.as_deref(), Some("Today's headlines"));
        assert_eq!(programs[0].id, "42-1700000000-1700003600");
        assert_eq!(programs[1].start.timestamp(), 1700003600);
    }

    #[test]
    fn test_parse_full_epg_groups_by_channel() {
        let doc = json!({"epg_listings": [
            {"title": "A", "start_timestamp": 10, "stop_timestamp": 20, "channel_id": "a.tv"},
            {"title": "B", "start_timestamp": 10, "stop_timestamp": 20, "channel_id": "b.tv"},
            {"title": "A2", "start_timestamp": 20, "stop_timestamp": 30, "channel_id": "a.tv"},
            {"title": "orphan", "start_timestamp": 20, "stop_timestamp": 30}
        ]});
        let index = parse_epg(&doc, None).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.programs_for("a.tv").len(), 2);
        assert_eq!(index.programs_for("b.tv").len(), 1);
    }

    #[test]
    fn test_parse_epg_empty_and_malformed() {
        let index = parse_epg(&json!({"epg_listings": []}), Some("1")).unwrap();
        assert!(index.contains("1"));
        assert!(index.programs_for("1").is_empty());

        assert!(parse_epg(&Value::Null, None).unwrap().is_empty());
        assert!(parse_epg(&json!({"epg_listings": "nope"}), None).is_err());
        assert!(parse_epg(&json!(12), None).is_err());
    }
}
