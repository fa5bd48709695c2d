// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

use serde::{Deserialize, Serialize};

/// Configuration record of the plugin that owns a listener.
///
/// It is handed unchanged to every handler invocation. Only `name` is read
/// here: it labels log lines and the broker connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plugin {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub config: serde_json::Value,
}

impl Plugin {
    pub fn new(name: &str) -> Self {
        Plugin {
            name: name.to_owned(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_with_missing_fields() {
        let plugin: Plugin = serde_json::from_value(json!({
            "name": "js-sbom",
            "config": { "project": { "required": true } }
        }))
        .unwrap();

        assert_eq!(plugin.name, "js-sbom");
        assert!(plugin.depends_on.is_empty());
        assert_eq!(plugin.config["project"]["required"], json!(true));
    }
}
