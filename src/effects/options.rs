use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

/// Binary asset chosen for a declared file input.
#[derive(Clone, PartialEq, Eq)]
pub struct FileHandle {
    name: String,
    bytes: Arc<[u8]>,
}

impl FileHandle {
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(name, bytes))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum OptionValue {
    Number(f64),
    Bool(bool),
    Text(String),
    File(FileHandle),
}

impl OptionValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Text(s) => s.trim().parse().ok(),
            Self::File(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Number(n) => Some(*n != 0.0),
            Self::Text(s) => match s.trim() {
                "true" | "1" | "on" => Some(true),
                "false" | "0" | "off" => Some(false),
                _ => None,
            },
            Self::File(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileHandle> {
        match self {
            Self::File(f) => Some(f),
            _ => None,
        }
    }

    /// Parses a command-line style value: number, then bool, else text.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if let Ok(n) = trimmed.parse::<f64>() {
            return Self::Number(n);
        }
        match trimmed {
            "true" => Self::Bool(true),
            "false" => Self::Bool(false),
            _ => Self::Text(raw.to_string()),
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Text(s) => write!(f, "{:?}", s),
            Self::File(h) => write!(f, "<file {}>", h.name()),
        }
    }
}

pub type OptionMap = BTreeMap<String, OptionValue>;

/// Immutable snapshot of a slot's options. Updates build a new map and swap
/// the whole snapshot, so a render never sees half an update.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Options(Arc<OptionMap>);

impl Options {
    pub fn new(map: OptionMap) -> Self {
        Self(Arc::new(map))
    }

    pub fn map(&self) -> &OptionMap {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.0.get(key)
    }

    pub fn number(&self, key: &str, default: f64) -> f64 {
        self.get(key).and_then(OptionValue::as_number).unwrap_or(default)
    }

    pub fn number_f32(&self, key: &str, default: f32) -> f32 {
        self.number(key, default as f64) as f32
    }

    pub fn flag(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(OptionValue::as_bool).unwrap_or(default)
    }

    pub fn text<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).and_then(OptionValue::as_text).unwrap_or(default)
    }

    pub fn file(&self, key: &str) -> Option<&FileHandle> {
        self.get(key).and_then(OptionValue::as_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cli_values() {
        assert_eq!(OptionValue::parse("0.5"), OptionValue::Number(0.5));
        assert_eq!(OptionValue::parse("true"), OptionValue::Bool(true));
        assert_eq!(OptionValue::parse("#ff0000"), OptionValue::Text("#ff0000".into()));
    }

    #[test]
    fn getters_coerce_and_default() {
        let mut map = OptionMap::new();
        map.insert("speed".into(), OptionValue::Text("2".into()));
        map.insert("on".into(), OptionValue::Number(1.0));
        let opts = Options::new(map);

        assert_eq!(opts.number("speed", 0.0), 2.0);
        assert!(opts.flag("on", false));
        assert_eq!(opts.text("mode", "bar"), "bar");
        assert!(opts.file("font").is_none());
    }
}
