//! Text rendering helpers shared by the tools
//!
//! Jira returns rich text as Atlassian Document Format (ADF) and timestamps
//! as `2024-01-15T10:30:00.000+0000`. Tool output is plain text, so both are
//! flattened here.

use chrono::{DateTime, FixedOffset};
use serde_json::{json, Value};

const ATTACHMENT_PREFIX: &str = "!xray-attachment://";

/// Flatten an ADF document to plain text, one line per block
pub fn adf_to_text(node: &Value) -> String {
    let mut blocks = Vec::new();
    collect_blocks(node, &mut blocks);
    blocks.join("\n")
}

fn collect_blocks(node: &Value, blocks: &mut Vec<String>) {
    match node.get("type").and_then(Value::as_str) {
        Some("paragraph") | Some("heading") | Some("codeBlock") => {
            blocks.push(inline_text(node));
        }
        Some("listItem") => {
            let start = blocks.len();
            for child in children(node) {
                collect_blocks(child, blocks);
            }
            if let Some(first) = blocks.get_mut(start) {
                first.insert_str(0, "- ");
            }
        }
        Some("text") => blocks.push(inline_text(node)),
        _ => {
            for child in children(node) {
                collect_blocks(child, blocks);
            }
        }
    }
}

fn inline_text(node: &Value) -> String {
    let attr = |name: &str| {
        node.get("attrs")
            .and_then(|attrs| attrs.get(name))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    match node.get("type").and_then(Value::as_str) {
        Some("text") => node
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        Some("hardBreak") => "\n".to_string(),
        Some("mention") => attr("text"),
        Some("emoji") => attr("shortName"),
        Some("inlineCard") => attr("url"),
        _ => children(node).map(inline_text).collect(),
    }
}

fn children(node: &Value) -> impl Iterator<Item = &Value> {
    node.get("content")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

/// Readable description text, or `None` when the field is empty
pub fn description_text(description: Option<&Value>) -> Option<String> {
    let text = match description? {
        Value::String(text) => text.clone(),
        Value::Null => return None,
        other => adf_to_text(other),
    };
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Single-paragraph ADF document for a plain-text description
pub fn adf_document(text: &str) -> Value {
    let content = if text.is_empty() {
        json!([])
    } else {
        json!([{ "type": "text", "text": text }])
    };
    json!({
        "type": "doc",
        "version": 1,
        "content": [{ "type": "paragraph", "content": content }]
    })
}

fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .ok()
}

/// `YYYY-MM-DD HH:MM` in the timestamp's own offset
pub fn format_timestamp(raw: &str) -> String {
    parse_timestamp(raw)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| raw.to_string())
}

/// `YYYY-MM-DD`
pub fn format_date(raw: &str) -> String {
    parse_timestamp(raw)
        .map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| raw.to_string())
}

/// Render Xray attachment markup as a readable link
///
/// `!xray-attachment://UUID|props!` becomes a labelled line pointing at the
/// attachment endpoint of the Xray API. Markup that does not parse is left
/// as it is.
pub fn rewrite_xray_attachments(text: &str, xray_base_url: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(ATTACHMENT_PREFIX) {
        out.push_str(&rest[..start]);
        let body = &rest[start + ATTACHMENT_PREFIX.len()..];

        let Some(end) = body.find('!') else {
            out.push_str(&rest[start..]);
            return out;
        };

        let inner = &body[..end];
        let (id, props) = match inner.split_once('|') {
            Some((id, props)) => (id, Some(props)),
            None => (inner, None),
        };

        if is_attachment_id(id) {
            out.push_str(&format!("📎 **[Attachment: {}]**", id));
            if let Some(props) = props.filter(|p| !p.is_empty()) {
                out.push_str(&format!(" ({})", props));
            }
            out.push_str(&format!("\n   Link: {}/attachment/{}", xray_base_url, id));
        } else {
            out.push_str(&rest[start..start + ATTACHMENT_PREFIX.len() + end + 1]);
        }

        rest = &body[end + 1..];
    }

    out.push_str(rest);
    out
}

fn is_attachment_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_hexdigit() || c == '-')
}

/// Comma-joined list, or the fallback when empty
pub fn join_or<S: AsRef<str>>(items: &[S], fallback: &str) -> String {
    if items.is_empty() {
        fallback.to_string()
    } else {
        items
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adf_paragraphs_are_joined() {
        let doc = json!({
            "type": "doc",
            "version": 1,
            "content": [
                {"type": "paragraph", "content": [
                    {"type": "text", "text": "Given a user"},
                    {"type": "hardBreak"},
                    {"type": "text", "text": "and a cart"}
                ]},
                {"type": "bulletList", "content": [
                    {"type": "listItem", "content": [
                        {"type": "paragraph", "content": [{"type": "text", "text": "one"}]}
                    ]}
                ]},
                {"type": "paragraph", "content": [
                    {"type": "mention", "attrs": {"text": "@qa"}},
                    {"type": "text", "text": " checks"}
                ]}
            ]
        });

        assert_eq!(adf_to_text(&doc), "Given a user\nand a cart\n- one\n@qa checks");
    }

    #[test]
    fn test_description_text_variants() {
        assert_eq!(description_text(None), None);
        assert_eq!(description_text(Some(&Value::Null)), None);
        assert_eq!(
            description_text(Some(&json!("plain text"))),
            Some("plain text".to_string())
        );
        assert_eq!(description_text(Some(&adf_document(""))), None);
        assert_eq!(
            description_text(Some(&adf_document("Checks login"))),
            Some("Checks login".to_string())
        );
    }

    #[test]
    fn test_adf_document_shape() {
        let doc = adf_document("Hello");
        assert_eq!(doc["type"], "doc");
        assert_eq!(doc["version"], 1);
        assert_eq!(doc["content"][0]["content"][0]["text"], "Hello");
        assert_eq!(adf_document("")["content"][0]["content"], json!([]));
    }

    #[test]
    fn test_timestamps() {
        assert_eq!(
            format_timestamp("2024-01-15T10:30:00.000+0000"),
            "2024-01-15 10:30"
        );
        assert_eq!(format_date("2024-01-15T10:30:00.000+0200"), "2024-01-15");
        assert_eq!(format_timestamp("2024-03-01T08:05:00Z"), "2024-03-01 08:05");
        assert_eq!(format_timestamp("yesterday"), "yesterday");
    }

    #[test]
    fn test_attachment_rewrite() {
        let text = "Open !xray-attachment://3f2a-9b|width=200! then check";
        let rewritten = rewrite_xray_attachments(text, "https://xray.example/api/v2");
        assert_eq!(
            rewritten,
            "Open 📎 **[Attachment: 3f2a-9b]** (width=200)\n   Link: https://xray.example/api/v2/attachment/3f2a-9b then check"
        );

        let no_props = rewrite_xray_attachments("!xray-attachment://abc!", "https://x");
        assert_eq!(
            no_props,
            "📎 **[Attachment: abc]**\n   Link: https://x/attachment/abc"
        );
    }

    #[test]
    fn test_attachment_rewrite_leaves_bad_markup() {
        let unterminated = "see !xray-attachment://abc";
        assert_eq!(rewrite_xray_attachments(unterminated, "https://x"), unterminated);

        let not_an_id = "!xray-attachment://not an id! done";
        assert_eq!(rewrite_xray_attachments(not_an_id, "https://x"), not_an_id);

        assert_eq!(rewrite_xray_attachments("plain", "https://x"), "plain");
    }

    #[test]
    fn test_join_or() {
        assert_eq!(join_or::<String>(&[], "None"), "None");
        assert_eq!(join_or(&["a", "b"], "None"), "a, b");
    }
}
