//! Flattening of Atlassian Document Format, the rich-text JSON Jira uses for
//! descriptions and comment bodies.

use serde_json::Value;

const BLOCK_NODES: &[&str] = &[
    "paragraph",
    "heading",
    "blockquote",
    "codeBlock",
    "listItem",
    "panel",
    "rule",
    "tableRow",
];

/// Plain text of an ADF document, one line per block.
///
/// Plain strings pass through unchanged, since `acli` emits them for
/// work items created without rich text. Returns `None` when there is no text.
pub fn extract_text_from_adf(value: &Value) -> Option<String> {
    if let Value::String(s) = value {
        return Some(s.clone());
    }

    let mut out = String::new();
    flatten(value, &mut out);
    let text = out
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string();
    (!text.is_empty()).then_some(text)
}

fn flatten(node: &Value, out: &mut String) {
    match node {
        Value::Array(nodes) => nodes.iter().for_each(|n| flatten(n, out)),
        Value::Object(obj) => {
            let kind = obj.get("type").and_then(Value::as_str).unwrap_or_default();
            match kind {
                "text" => {
                    if let Some(text) = obj.get("text").and_then(Value::as_str) {
                        out.push_str(text);
                    }
                }
                "hardBreak" => out.push('\n'),
                "mention" | "emoji" => {
                    if let Some(text) = obj
                        .get("attrs")
                        .and_then(|a| a.get("text"))
                        .and_then(Value::as_str)
                    {
                        out.push_str(text);
                    }
                }
                _ => {
                    if let Some(content) = obj.get("content") {
                        flatten(content, out);
                    }
                    if BLOCK_NODES.contains(&kind) && !out.ends_with('\n') {
                        out.push('\n');
                    }
                }
            }
        }
        _ => {}
    }
}
