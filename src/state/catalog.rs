//! The current tool catalog, as last reported by the upstream's
//! `tools/list` (after definition compression). Replaced wholesale on every
//! successful response.

use serde_json::Value;

use crate::json::clone_json;

#[derive(Debug, Clone)]
pub struct Tool {
    pub name: String,
    pub raw: Value,
}

#[derive(Default)]
pub struct ToolCatalog {
    tools: Vec<Tool>,
}

impl ToolCatalog {
    /// Replaces the catalog with `tools` (a JSON array of tool objects).
    pub fn replace(&mut self, tools: &[Value]) {
        self.tools = tools
            .iter()
            .filter_map(|t| {
                let name = t.get("name")?.as_str()?.to_string();
                Some(Tool {
                    name,
                    raw: clone_json(t),
                })
            })
            .collect();
    }

    pub fn all(&self) -> &[Tool] {
        &self.tools
    }

    pub fn get(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn replace_is_wholesale() {
        let mut catalog = ToolCatalog::default();
        catalog.replace(&[json!({"name": "a"}), json!({"name": "b"})]);
        assert_eq!(catalog.len(), 2);
        catalog.replace(&[json!({"name": "c"})]);
        assert_eq!(catalog.len(), 1);
        assert!(catalog.get("a").is_none());
        assert!(catalog.get("c").is_some());
    }
}
