//! Deterministic text rewrites on tool/parameter descriptions (spec.md
//! §4.4). The rule order is part of the contract — a later rule can see
//! the output of an earlier one — so this is a `Vec`, not a `HashMap`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

const MIN_LENGTH: usize = 20;

struct Rule {
    pattern: Regex,
    replacement: &'static str,
}

static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    let specs: &[(&str, &str)] = &[
        (r"(?i)this tool (enables|allows) (users? |you )?to\s*", ""),
        (r"(?i)this (tool|endpoint|function|method) (is used to|can be used to)\s*", ""),
        (r"(?i)\bin order to\b", "to"),
        (r"(?i)\brepositor(y|ies)\b", "repo"),
        (r"(?i)\bretrieve\b", "get"),
        (r"(?i)\bretrieves\b", "gets"),
        (r"(?i)\bcreate a new\b", "create"),
        (r"(?i)\bconfiguration\b", "config"),
        (r"(?i)\bidentifier\b", "id"),
        (r"(?i)\bapplication\b", "app"),
        (r"(?i)\binformation\b", "info"),
        (r"(?i)\bdocumentation\b", "docs"),
        (r"\.{2,}", "."),
        (r"[ \t]{2,}", " "),
    ];
    specs
        .iter()
        .map(|(pattern, replacement)| Rule {
            pattern: Regex::new(pattern).expect("rule pattern is valid regex"),
            replacement,
        })
        .collect()
});

/// Applies the ordered rewrite table to a single description string, then
/// re-capitalizes the first letter and trims surrounding whitespace. Passes
/// through unchanged if shorter than [`MIN_LENGTH`].
fn compress_description(input: &str) -> String {
    if input.len() < MIN_LENGTH {
        return input.to_string();
    }

    let mut text = input.to_string();
    for rule in RULES.iter() {
        text = rule.pattern.replace_all(&text, rule.replacement).into_owned();
    }

    let trimmed = text.trim();
    let mut chars = trimmed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Stateless compressor applied to the whole `tools/list` payload. A named
/// type (rather than a bare function) so call sites in the pipeline read
/// like the other stage types (`ResultCompressionOutcome`, `DeltaOutcome`).
pub struct DefinitionCompressor;

impl DefinitionCompressor {
    /// Rewrites `tool.description` and recurses into `inputSchema`
    /// (`description`, then `properties.*`, then `items`), in place.
    pub fn compress_tool(tool: &mut Value) {
        if let Some(description) = tool.get("description").and_then(Value::as_str) {
            let rewritten = compress_description(description);
            tool["description"] = Value::String(rewritten);
        }
        if let Some(schema) = tool.get_mut("inputSchema") {
            Self::compress_schema(schema);
        }
    }

    fn compress_schema(schema: &mut Value) {
        if let Some(description) = schema.get("description").and_then(Value::as_str) {
            let rewritten = compress_description(description);
            schema["description"] = Value::String(rewritten);
        }

        if let Some(Value::Object(properties)) = schema.get_mut("properties") {
            for (_, property_schema) in properties.iter_mut() {
                Self::compress_schema(property_schema);
            }
        }

        match schema.get_mut("items") {
            Some(items @ Value::Object(_)) => Self::compress_schema(items),
            Some(Value::Array(items)) => {
                for item in items.iter_mut() {
                    Self::compress_schema(item);
                }
            }
            _ => {}
        }
    }

    pub fn compress_tools(tools: &mut [Value]) {
        for tool in tools.iter_mut() {
            Self::compress_tool(tool);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn short_descriptions_pass_through_unchanged() {
        assert_eq!(compress_description("short desc"), "short desc");
    }

    #[test]
    fn filler_phrase_and_synonym_rewrite_apply_in_order() {
        let input = "This tool enables users to retrieve repository information for a project..";
        let out = compress_description(input);
        assert!(out.starts_with("Get repo info"), "got: {out}");
        assert!(!out.contains(".."));
    }

    #[test]
    fn compress_tool_recurses_through_schema() {
        let mut tool = json!({
            "name": "list_items",
            "description": "This tool enables users to retrieve repository identifier values",
            "inputSchema": {
                "type": "object",
                "description": "This tool enables users to configure the repository identifier lookup",
                "properties": {
                    "repo": {
                        "type": "string",
                        "description": "This tool enables users to retrieve the repository identifier"
                    }
                },
                "items": {
                    "description": "This tool enables users to retrieve nested repository identifier info"
                }
            }
        });
        DefinitionCompressor::compress_tool(&mut tool);
        let desc = tool["description"].as_str().unwrap();
        assert!(desc.to_lowercase().contains("get repo id"), "got: {desc}");
        let prop_desc = tool["inputSchema"]["properties"]["repo"]["description"]
            .as_str()
            .unwrap();
        assert!(prop_desc.to_lowercase().contains("get repo id"), "got: {prop_desc}");
    }

    #[test]
    fn idempotent_below_threshold() {
        let input = "tiny";
        assert_eq!(compress_description(input), compress_description(&compress_description(input)));
    }
}
