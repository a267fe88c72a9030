use serde::Deserialize;
use std::collections::BTreeMap;

use super::schema::{OptionDef, OptionSchema};
use crate::error::{EngineError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EffectKind {
    /// Draws onto the composite with the selected blend mode
    Standard,
    /// Replaces the composite with a transform of it
    PostProcess,
}

impl EffectKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Standard => "visualizer",
            Self::PostProcess => "post-process",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileInputSpec {
    pub key: String,
    pub label: String,
    pub accept: String,
}

#[derive(Debug, Deserialize)]
struct FileInputDef {
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    accept: String,
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    post_process: bool,
    #[serde(default)]
    options: BTreeMap<String, OptionDef>,
    #[serde(default)]
    options_form: Option<String>,
    #[serde(default)]
    file_inputs: BTreeMap<String, FileInputDef>,
}

/// Parsed `manifest.json` of an effect.
#[derive(Clone, Debug)]
pub struct EffectManifest {
    pub id: String,
    pub name: String,
    pub description: String,
    pub post_process: bool,
    pub file_inputs: Vec<FileInputSpec>,
}

impl EffectManifest {
    /// Parses the manifest and resolves its option schema. Declared options
    /// win; an `options_form` is only consulted when none are declared.
    pub fn parse(json: &str) -> Result<(Self, OptionSchema)> {
        let raw: RawManifest =
            serde_json::from_str(json).map_err(|e| EngineError::InvalidSchema(format!("manifest: {}", e)))?;

        if raw.id.trim().is_empty() {
            return Err(EngineError::InvalidSchema("manifest: empty id".into()));
        }

        let schema = if !raw.options.is_empty() {
            OptionSchema::from_defs(&raw.options)?
        } else if let Some(form) = &raw.options_form {
            OptionSchema::infer_from_form(form)
        } else {
            OptionSchema::default()
        };

        let file_inputs = raw
            .file_inputs
            .into_iter()
            .map(|(key, def)| FileInputSpec {
                label: def.label.unwrap_or_else(|| key.clone()),
                accept: def.accept,
                key,
            })
            .collect();

        let manifest = Self {
            id: raw.id,
            name: raw.name,
            description: raw.description,
            post_process: raw.post_process,
            file_inputs,
        };
        Ok((manifest, schema))
    }

    pub fn kind(&self) -> EffectKind {
        if self.post_process {
            EffectKind::PostProcess
        } else {
            EffectKind::Standard
        }
    }

    pub fn file_input(&self, key: &str) -> Option<&FileInputSpec> {
        self.file_inputs.iter().find(|f| f.key == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_post_process_with_form() {
        let json = r#"{
            "id": "mosaic",
            "name": "Mosaic",
            "post_process": true,
            "options_form": "<input type=\"range\" name=\"tile\" min=\"2\" max=\"64\" value=\"8\">",
            "file_inputs": { "mask": { "accept": "image/*" } }
        }"#;
        let (manifest, schema) = EffectManifest::parse(json).unwrap();
        assert_eq!(manifest.kind(), EffectKind::PostProcess);
        assert_eq!(schema.len(), 1);
        let mask = manifest.file_input("mask").unwrap();
        assert_eq!(mask.label, "mask");
        assert_eq!(mask.accept, "image/*");
    }

    #[test]
    fn declared_options_beat_form() {
        let json = r#"{
            "id": "x",
            "name": "X",
            "options": { "a": { "type": "boolean" } },
            "options_form": "<input type=\"range\" name=\"b\">"
        }"#;
        let (manifest, schema) = EffectManifest::parse(json).unwrap();
        assert_eq!(manifest.kind(), EffectKind::Standard);
        assert!(schema.get("a").is_some());
        assert!(schema.get("b").is_none());
    }

    #[test]
    fn rejects_malformed_manifest() {
        assert!(EffectManifest::parse("{").is_err());
        assert!(EffectManifest::parse(r#"{ "id": " ", "name": "n" }"#).is_err());
    }
}
