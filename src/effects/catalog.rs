use super::manifest::EffectManifest;
use super::{bars, chromatic, mosaic, pulse, text, trail};
use super::{Effect, LoadedEffect};
use crate::error::{EngineError, Result};

type Constructor = fn() -> anyhow::Result<Box<dyn Effect>>;

pub struct BuiltinEffect {
    pub id: &'static str,
    pub manifest_json: &'static str,
    build: Constructor,
}

fn builtin(id: &'static str, manifest_json: &'static str, build: Constructor) -> BuiltinEffect {
    BuiltinEffect { id, manifest_json, build }
}

pub fn builtin_effects() -> Vec<BuiltinEffect> {
    let mut effects = vec![
        builtin("spectrum_bars", include_str!("manifests/spectrum_bars.json"), bars::build),
        builtin("kick_pulse", include_str!("manifests/kick_pulse.json"), pulse::build),
        builtin("text", include_str!("manifests/text.json"), text::build),
        builtin("trail", include_str!("manifests/trail.json"), trail::build),
        builtin("chromatic", include_str!("manifests/chromatic.json"), chromatic::build),
        builtin("mosaic", include_str!("manifests/mosaic.json"), mosaic::build),
    ];
    effects.extend(gpu_effects());
    effects
}

#[cfg(feature = "gpu")]
fn gpu_effects() -> Vec<BuiltinEffect> {
    vec![builtin("shader", include_str!("manifests/shader.json"), super::shader::build)]
}

#[cfg(not(feature = "gpu"))]
fn gpu_effects() -> Vec<BuiltinEffect> {
    Vec::new()
}

pub fn list_effects() -> Vec<&'static str> {
    builtin_effects().iter().map(|e| e.id).collect()
}

/// Resolves a manifest and a plugin into a `LoadedEffect`. The manifest id
/// is authoritative for everything downstream.
pub fn assemble(id: &str, manifest_json: &str, build: impl FnOnce() -> anyhow::Result<Box<dyn Effect>>) -> Result<LoadedEffect> {
    let load_err = |reason: String| EngineError::PluginLoad {
        id: id.to_string(),
        reason,
    };

    let (manifest, schema) = EffectManifest::parse(manifest_json).map_err(|e| load_err(e.to_string()))?;
    if manifest.id != id {
        return Err(load_err(format!("manifest declares id '{}'", manifest.id)));
    }
    let plugin = build().map_err(|e| load_err(format!("{:#}", e)))?;

    Ok(LoadedEffect {
        manifest,
        schema,
        plugin,
    })
}

pub fn load_effect(id: &str) -> Result<LoadedEffect> {
    let Some(builtin) = builtin_effects().into_iter().find(|e| e.id == id) else {
        return Err(EngineError::PluginLoad {
            id: id.to_string(),
            reason: format!("not found, available: {:?}", list_effects()),
        });
    };
    assemble(builtin.id, builtin.manifest_json, builtin.build)
}

/// Loads each id in order. Failures are logged and left out; they never
/// stop the remaining effects from loading.
pub fn load_effects<S: AsRef<str>>(ids: &[S]) -> Vec<LoadedEffect> {
    let mut loaded = Vec::with_capacity(ids.len());
    for id in ids {
        match load_effect(id.as_ref()) {
            Ok(effect) => {
                log::info!("Loaded effect '{}' ({})", effect.id(), effect.kind().label());
                loaded.push(effect);
            }
            Err(e) => log::warn!("{}", e),
        }
    }
    loaded
}

pub fn load_all() -> Vec<LoadedEffect> {
    load_effects(&list_effects())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::EffectKind;

    #[test]
    fn every_builtin_manifest_loads() {
        let loaded = load_all();
        assert_eq!(loaded.len(), builtin_effects().len());
        for effect in &loaded {
            assert!(!effect.name().is_empty());
        }
    }

    #[test]
    fn shader_is_listed_only_with_gpu() {
        let ids = list_effects();
        assert_eq!(ids.contains(&"shader"), cfg!(feature = "gpu"));
        assert_eq!(ids[..6], ["spectrum_bars", "kick_pulse", "text", "trail", "chromatic", "mosaic"]);
    }

    #[test]
    fn kinds_come_from_manifests() {
        assert_eq!(load_effect("spectrum_bars").unwrap().kind(), EffectKind::Standard);
        assert_eq!(load_effect("trail").unwrap().kind(), EffectKind::PostProcess);
        // schema inferred from the options form
        let mosaic = load_effect("mosaic").unwrap();
        assert!(mosaic.schema.get("tile").is_some());
        assert!(mosaic.schema.get("reactive").is_some());
    }

    #[test]
    fn failed_loads_are_excluded() {
        let loaded = load_effects(&["trail", "nope", "text"]);
        let ids: Vec<&str> = loaded.iter().map(|e| e.id()).collect();
        assert_eq!(ids, ["trail", "text"]);
    }

    #[test]
    fn plugin_construction_failure_is_reported() {
        let json = r#"{ "id": "broken", "name": "Broken" }"#;
        let err = assemble("broken", json, || anyhow::bail!("no device")).err().unwrap();
        assert!(matches!(err, EngineError::PluginLoad { ref id, .. } if id == "broken"));

        let err = assemble("other", json, trail::build).err().unwrap();
        assert!(matches!(err, EngineError::PluginLoad { .. }));
    }
}
