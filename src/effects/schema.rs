use rand::Rng;
use serde::Deserialize;
use std::collections::BTreeMap;

use super::options::{OptionMap, OptionValue};
use crate::error::{EngineError, Result};
use crate::render::text::format_color;

#[derive(Clone, Debug, PartialEq)]
pub enum OptionKind {
    Range { min: f64, max: f64, step: Option<f64> },
    Boolean,
    Choice { choices: Vec<String> },
    Color,
    Text,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OptionSpec {
    pub kind: OptionKind,
    pub default: OptionValue,
}

/// Option declaration as written in a manifest.
#[derive(Debug, Deserialize)]
pub struct OptionDef {
    #[serde(rename = "type")]
    pub option_type: String,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub step: Option<f64>,
    #[serde(default)]
    pub choices: Vec<String>,
}

/// Name -> kind/bounds description of an effect's options, used for
/// defaults and by automix to draw fresh values.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OptionSchema {
    entries: BTreeMap<String, OptionSpec>,
}

impl OptionSchema {
    pub fn from_defs(defs: &BTreeMap<String, OptionDef>) -> Result<Self> {
        let mut entries = BTreeMap::new();
        for (name, def) in defs {
            entries.insert(name.clone(), spec_from_def(name, def)?);
        }
        Ok(Self { entries })
    }

    /// Derives a schema from an HTML options form: `input` elements
    /// (range, number, checkbox, color, text) and `select` elements.
    /// File inputs and unnamed controls are skipped.
    pub fn infer_from_form(markup: &str) -> Self {
        let mut entries = BTreeMap::new();
        let mut rest = markup;

        while let Some(start) = rest.find('<') {
            rest = &rest[start + 1..];
            let Some(end) = rest.find('>') else { break };
            let tag = &rest[..end];
            let attrs = parse_attrs(tag);
            let name_lc = tag.split_whitespace().next().unwrap_or("").to_ascii_lowercase();
            rest = &rest[end + 1..];

            let Some(key) = attrs.get("name").or_else(|| attrs.get("id")).cloned() else {
                continue;
            };

            match name_lc.as_str() {
                "input" => {
                    if let Some(spec) = spec_from_input(&attrs) {
                        entries.insert(key, spec);
                    }
                }
                "select" => {
                    let close = rest.to_ascii_lowercase().find("</select").unwrap_or(rest.len());
                    let (body, tail) = rest.split_at(close);
                    let choices = select_choices(body);
                    rest = tail;
                    if let Some(first) = choices.first().cloned() {
                        let default = selected_choice(body).unwrap_or(first);
                        entries.insert(
                            key,
                            OptionSpec {
                                kind: OptionKind::Choice { choices },
                                default: OptionValue::Text(default),
                            },
                        );
                    }
                }
                _ => {}
            }
        }

        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, name: &str) -> Option<&OptionSpec> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &OptionSpec)> {
        self.entries.iter()
    }

    pub fn defaults(&self) -> OptionMap {
        self.entries
            .iter()
            .map(|(k, spec)| (k.clone(), spec.default.clone()))
            .collect()
    }

    /// Fresh values for every randomisable option. Text options are left
    /// out so the caller's current value stays in place.
    pub fn randomize<R: Rng + ?Sized>(&self, rng: &mut R) -> OptionMap {
        let mut out = OptionMap::new();
        for (name, spec) in &self.entries {
            let value = match &spec.kind {
                OptionKind::Range { min, max, step } => OptionValue::Number(random_in_range(rng, *min, *max, *step)),
                OptionKind::Boolean => OptionValue::Bool(rng.gen_bool(0.5)),
                OptionKind::Choice { choices } if !choices.is_empty() => {
                    OptionValue::Text(choices[rng.gen_range(0..choices.len())].clone())
                }
                OptionKind::Choice { .. } => continue,
                OptionKind::Color => OptionValue::Text(format_color([rng.gen(), rng.gen(), rng.gen(), 255])),
                OptionKind::Text => continue,
            };
            out.insert(name.clone(), value);
        }
        out
    }
}

fn spec_from_def(name: &str, def: &OptionDef) -> Result<OptionSpec> {
    let invalid = |why: &str| EngineError::InvalidSchema(format!("option '{}': {}", name, why));
    let default_json = def.default.as_ref();

    let spec = match def.option_type.as_str() {
        "range" | "number" | "float" | "int" => {
            let min = def.min.ok_or_else(|| invalid("range needs min"))?;
            let max = def.max.ok_or_else(|| invalid("range needs max"))?;
            if !(min <= max) {
                return Err(invalid("min is greater than max"));
            }
            let step = match (def.step, def.option_type.as_str()) {
                (Some(s), _) if s > 0.0 => Some(s),
                (Some(_), _) => return Err(invalid("step must be positive")),
                (None, "int") => Some(1.0),
                (None, _) => None,
            };
            let default = default_json.and_then(|v| v.as_f64()).unwrap_or(min).clamp(min, max);
            OptionSpec {
                kind: OptionKind::Range { min, max, step },
                default: OptionValue::Number(default),
            }
        }
        "boolean" | "bool" => OptionSpec {
            kind: OptionKind::Boolean,
            default: OptionValue::Bool(default_json.and_then(|v| v.as_bool()).unwrap_or(false)),
        },
        "choice" | "select" => {
            if def.choices.is_empty() {
                return Err(invalid("choice needs at least one entry"));
            }
            let default = default_json
                .and_then(|v| v.as_str())
                .filter(|d| def.choices.iter().any(|c| c == d))
                .map(str::to_string)
                .unwrap_or_else(|| def.choices[0].clone());
            OptionSpec {
                kind: OptionKind::Choice { choices: def.choices.clone() },
                default: OptionValue::Text(default),
            }
        }
        "color" => OptionSpec {
            kind: OptionKind::Color,
            default: OptionValue::Text(
                default_json.and_then(|v| v.as_str()).unwrap_or("#ffffff").to_string(),
            ),
        },
        "text" | "string" => OptionSpec {
            kind: OptionKind::Text,
            default: OptionValue::Text(default_json.and_then(|v| v.as_str()).unwrap_or("").to_string()),
        },
        other => return Err(invalid(&format!("unknown type '{}'", other))),
    };
    Ok(spec)
}

fn random_in_range<R: Rng + ?Sized>(rng: &mut R, min: f64, max: f64, step: Option<f64>) -> f64 {
    if !min.is_finite() || !max.is_finite() || max <= min {
        return min;
    }
    let raw = rng.gen_range(min..=max);
    match step {
        Some(step) => {
            let snapped = min + ((raw - min) / step).round() * step;
            // snapping can overshoot when the range is not a whole number of steps
            if snapped > max {
                snapped - step
            } else {
                snapped
            }
        }
        None => raw,
    }
}

fn spec_from_input(attrs: &BTreeMap<String, String>) -> Option<OptionSpec> {
    let input_type = attrs.get("type").map(|t| t.to_ascii_lowercase()).unwrap_or_else(|| "text".into());
    // `parse` also accepts NaN and inf, which no range can hold
    let number = |key: &str| {
        attrs
            .get(key)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite())
    };

    match input_type.as_str() {
        "range" | "number" => {
            // browser defaults for a range input
            let min = number("min").unwrap_or(0.0);
            let max = number("max").unwrap_or(100.0).max(min);
            let step = number("step").filter(|s| *s > 0.0);
            let default = number("value").unwrap_or(min).clamp(min, max);
            Some(OptionSpec {
                kind: OptionKind::Range { min, max, step },
                default: OptionValue::Number(default),
            })
        }
        "checkbox" => Some(OptionSpec {
            kind: OptionKind::Boolean,
            default: OptionValue::Bool(attrs.contains_key("checked")),
        }),
        "color" => Some(OptionSpec {
            kind: OptionKind::Color,
            default: OptionValue::Text(attrs.get("value").cloned().unwrap_or_else(|| "#000000".into())),
        }),
        "file" | "button" | "submit" | "reset" | "hidden" => None,
        _ => Some(OptionSpec {
            kind: OptionKind::Text,
            default: OptionValue::Text(attrs.get("value").cloned().unwrap_or_default()),
        }),
    }
}

fn select_choices(body: &str) -> Vec<String> {
    let mut choices = Vec::new();
    let mut rest = body;
    while let Some(start) = rest.find('<') {
        rest = &rest[start + 1..];
        let Some(end) = rest.find('>') else { break };
        let tag = &rest[..end];
        rest = &rest[end + 1..];
        if !tag.trim_start().to_ascii_lowercase().starts_with("option") {
            continue;
        }
        let attrs = parse_attrs(tag);
        let value = match attrs.get("value") {
            Some(v) => v.clone(),
            None => rest.split('<').next().unwrap_or("").trim().to_string(),
        };
        choices.push(value);
    }
    choices
}

fn selected_choice(body: &str) -> Option<String> {
    let mut rest = body;
    while let Some(start) = rest.find('<') {
        rest = &rest[start + 1..];
        let end = rest.find('>')?;
        let attrs = parse_attrs(&rest[..end]);
        rest = &rest[end + 1..];
        if attrs.contains_key("selected") {
            return attrs
                .get("value")
                .cloned()
                .or_else(|| Some(rest.split('<').next().unwrap_or("").trim().to_string()));
        }
    }
    None
}

/// Attributes of a tag body such as `input type="range" min=0 checked`.
fn parse_attrs(tag: &str) -> BTreeMap<String, String> {
    let mut attrs = BTreeMap::new();
    let body = tag.trim().trim_end_matches('/');
    // skip the element name
    let mut chars = body.char_indices().peekable();
    while let Some(&(_, c)) = chars.peek() {
        if c.is_whitespace() {
            break;
        }
        chars.next();
    }

    loop {
        while matches!(chars.peek(), Some(&(_, c)) if c.is_whitespace()) {
            chars.next();
        }
        let Some(&(name_start, _)) = chars.peek() else { break };
        let mut name_end = body.len();
        while let Some(&(i, c)) = chars.peek() {
            if c == '=' || c.is_whitespace() {
                name_end = i;
                break;
            }
            chars.next();
        }
        let name = body[name_start..name_end].to_ascii_lowercase();

        while matches!(chars.peek(), Some(&(_, c)) if c.is_whitespace()) {
            chars.next();
        }
        let mut value = String::new();
        if matches!(chars.peek(), Some(&(_, '='))) {
            chars.next();
            while matches!(chars.peek(), Some(&(_, c)) if c.is_whitespace()) {
                chars.next();
            }
            match chars.peek() {
                Some(&(_, q)) if q == '"' || q == '\'' => {
                    chars.next();
                    for (_, c) in chars.by_ref() {
                        if c == q {
                            break;
                        }
                        value.push(c);
                    }
                }
                _ => {
                    while let Some(&(_, c)) = chars.peek() {
                        if c.is_whitespace() {
                            break;
                        }
                        value.push(c);
                        chars.next();
                    }
                }
            }
        }
        if !name.is_empty() {
            attrs.insert(name, value);
        }
    }
    attrs
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const FORM: &str = r##"
        <label>Speed <input type="range" name="speed" min="0" max="2" step="0.25" value="0.5"></label>
        <input type=checkbox id=colorRotate checked>
        <input type="color" name="color" value="#ff0080">
        <input type="file" name="font">
        <input type="text" name="caption" value="hello">
        <select name="mode">
          <option value="bar">Bars</option>
          <option value="mirror" selected>Mirror</option>
        </select>
        <input type="number" name="count" min="1" max="9">
    "##;

    #[test]
    fn infers_schema_from_form() {
        let schema = OptionSchema::infer_from_form(FORM);
        assert_eq!(schema.len(), 6);
        assert_eq!(
            schema.get("speed").unwrap().kind,
            OptionKind::Range { min: 0.0, max: 2.0, step: Some(0.25) }
        );
        assert_eq!(schema.get("speed").unwrap().default, OptionValue::Number(0.5));
        assert_eq!(schema.get("colorRotate").unwrap().default, OptionValue::Bool(true));
        assert_eq!(schema.get("color").unwrap().kind, OptionKind::Color);
        assert!(schema.get("font").is_none());
        assert_eq!(schema.get("caption").unwrap().kind, OptionKind::Text);
        assert_eq!(
            schema.get("mode").unwrap().kind,
            OptionKind::Choice { choices: vec!["bar".into(), "mirror".into()] }
        );
        assert_eq!(schema.get("mode").unwrap().default, OptionValue::Text("mirror".into()));
        assert_eq!(schema.get("count").unwrap().default, OptionValue::Number(1.0));
    }

    #[test]
    fn randomized_values_respect_schema() {
        let schema = OptionSchema::infer_from_form(FORM);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let values = schema.randomize(&mut rng);
            let speed = values["speed"].as_number().unwrap();
            assert!((0.0..=2.0).contains(&speed));
            assert!(((speed / 0.25) - (speed / 0.25).round()).abs() < 1e-9);
            assert!(matches!(values["mode"].as_text(), Some("bar") | Some("mirror")));
            assert!(values["colorRotate"].as_bool().is_some());
            let color = values["color"].as_text().unwrap();
            assert!(color.starts_with('#') && color.len() == 7);
            assert!(!values.contains_key("caption"));
        }
    }

    #[test]
    fn snapping_never_exceeds_max() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..500 {
            let v = random_in_range(&mut rng, 0.0, 1.0, Some(0.3));
            assert!(v <= 1.0 && v >= 0.0);
        }
    }

    #[test]
    fn non_finite_form_numbers_fall_back_to_defaults() {
        let form = r#"
            <input type="range" name="a" min="NaN" max="inf" step="-inf" value="nan">
            <input type="number" name="b" min="-infinity" max="4" value="2">
        "#;
        let schema = OptionSchema::infer_from_form(form);
        assert_eq!(
            schema.get("a").unwrap().kind,
            OptionKind::Range { min: 0.0, max: 100.0, step: None }
        );
        assert_eq!(schema.get("a").unwrap().default, OptionValue::Number(0.0));
        assert_eq!(
            schema.get("b").unwrap().kind,
            OptionKind::Range { min: 0.0, max: 4.0, step: None }
        );
        assert_eq!(schema.get("b").unwrap().default, OptionValue::Number(2.0));

        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            let values = schema.randomize(&mut rng);
            assert!((0.0..=100.0).contains(&values["a"].as_number().unwrap()));
            assert!((0.0..=4.0).contains(&values["b"].as_number().unwrap()));
        }
        assert!(random_in_range(&mut rng, f64::NAN, 1.0, None).is_nan());
        assert_eq!(random_in_range(&mut rng, 0.0, f64::INFINITY, None), 0.0);
    }

    #[test]
    fn builds_from_manifest_defs() {
        let json = r#"{
            "amount": { "type": "range", "min": 0, "max": 0.05, "step": 0.001, "default": 0.005 },
            "reactive": { "type": "boolean", "default": true },
            "mode": { "type": "choice", "choices": ["a", "b"], "default": "z" }
        }"#;
        let defs: BTreeMap<String, OptionDef> = serde_json::from_str(json).unwrap();
        let schema = OptionSchema::from_defs(&defs).unwrap();
        let defaults = schema.defaults();
        assert_eq!(defaults["amount"], OptionValue::Number(0.005));
        assert_eq!(defaults["reactive"], OptionValue::Bool(true));
        assert_eq!(defaults["mode"], OptionValue::Text("a".into()));
    }

    #[test]
    fn rejects_bad_defs() {
        let json = r#"{ "x": { "type": "range", "min": 2, "max": 1 } }"#;
        let defs: BTreeMap<String, OptionDef> = serde_json::from_str(json).unwrap();
        assert!(matches!(OptionSchema::from_defs(&defs), Err(EngineError::InvalidSchema(_))));

        let json = r#"{ "x": { "type": "gradient" } }"#;
        let defs: BTreeMap<String, OptionDef> = serde_json::from_str(json).unwrap();
        assert!(OptionSchema::from_defs(&defs).is_err());
    }
}
