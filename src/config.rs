//! Configuration file handling.
//!
//! A YAML file mirrors the command-line surface and adds what flags cannot
//! express: document metadata (`openapi.info`, security schemes), generator
//! entries and the custom call rules of §`properties`. Command-line flags
//! override file values; when no `--config` is given and a file named
//! `openapi-analyzer.yaml` exists in the working directory it is loaded
//! implicitly.

use crate::custom_rules::CustomRulesConfig;
use crate::schema::{Document, Info, SecurityScheme};
use anyhow::{Context as _, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Implicit configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "openapi-analyzer.yaml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub plugin: String,
    pub dir: String,
    pub output: String,
    pub depends: Vec<String>,
    pub strict_mode: bool,
    pub log_level: String,
    pub openapi: OpenApiConfig,
    pub generators: Vec<GeneratorConfig>,
    /// Custom request/response wrapper rules.
    pub properties: CustomRulesConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OpenApiConfig {
    /// Document version override (3.0.0 | 3.0.3 | 3.1.0).
    pub openapi: String,
    pub info: Option<Info>,
    pub security_schemes: Option<BTreeMap<String, SecurityScheme>>,
}

impl OpenApiConfig {
    /// Copies configured document metadata onto the finished document.
    pub fn apply_to_doc(&self, doc: &mut Document) {
        if !self.openapi.is_empty() {
            doc.openapi = self.openapi.clone();
        }
        if let Some(info) = &self.info {
            if !info.title.is_empty() {
                doc.info.title = info.title.clone();
            }
            if !info.version.is_empty() {
                doc.info.version = info.version.clone();
            }
            if info.description.is_some() {
                doc.info.description = info.description.clone();
            }
            if info.terms_of_service.is_some() {
                doc.info.terms_of_service = info.terms_of_service.clone();
            }
        }
        if let Some(schemes) = &self.security_schemes {
            doc.components.security_schemes = schemes.clone();
        }
    }
}

/// One generator entry: a registered generator by name, or a script file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub name: Option<String>,
    pub file: Option<String>,
    pub output: Option<String>,
}

/// Loads and parses a configuration file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse config file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
plugin: tide
dir: ./server
output: docs
depends:
  - shared-types
strictMode: true
logLevel: debug
openapi:
  openapi: "3.0.3"
  info:
    title: Shop API
    version: "1.2.0"
  securitySchemes:
    oauth2:
      type: oauth2
generators:
  - name: ts
    output: ./web/src/api
properties:
  response:
    - type: "server::e"
      method: "success"
      status: 200
      contentType: "application/json"
      data:
        type: object
        properties:
          code: { type: integer }
          data: { type: "args[0]" }
"#;
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("openapi-analyzer.yaml");
        fs::write(&path, yaml).unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.plugin, "tide");
        assert_eq!(config.dir, "./server");
        assert_eq!(config.depends, vec!["shared-types".to_string()]);
        assert!(config.strict_mode);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.openapi.openapi, "3.0.3");
        assert_eq!(config.openapi.info.as_ref().unwrap().title, "Shop API");
        assert!(config
            .openapi
            .security_schemes
            .as_ref()
            .unwrap()
            .contains_key("oauth2"));
        assert_eq!(config.generators.len(), 1);
        assert_eq!(config.properties.response.len(), 1);
        assert_eq!(config.properties.response[0].method, "success");
    }

    #[test]
    fn test_empty_config_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cfg.yaml");
        fs::write(&path, "{}").unwrap();
        let config = load_config(&path).unwrap();
        assert!(config.plugin.is_empty());
        assert!(!config.strict_mode);
        assert!(config.generators.is_empty());
    }

    #[test]
    fn test_invalid_yaml_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("cfg.yaml");
        fs::write(&path, "plugin: [unclosed").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_apply_to_doc() {
        let mut doc = Document::new();
        let config = OpenApiConfig {
            openapi: "3.0.0".to_string(),
            info: Some(Info {
                title: "Shop API".to_string(),
                version: "2.0".to_string(),
                description: Some("desc".to_string()),
                terms_of_service: None,
            }),
            security_schemes: None,
        };
        config.apply_to_doc(&mut doc);
        assert_eq!(doc.openapi, "3.0.0");
        assert_eq!(doc.info.title, "Shop API");
        assert_eq!(doc.info.description.as_deref(), Some("desc"));
    }
}
