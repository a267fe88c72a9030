use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::time::Duration;

use super::registry::SlotRegistry;
use crate::audio::features::FeatureFrame;
use crate::effects::EffectKind;

#[derive(Clone, Debug, Deserialize)]
pub struct AutomixSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
    #[serde(default = "default_max_visualizers")]
    pub max_visualizers: usize,
    #[serde(default = "default_max_post")]
    pub max_post: usize,
    /// Eligible visualizer ids; every standard effect when unset
    #[serde(default)]
    pub visualizers: Option<Vec<String>>,
    /// Eligible post-process ids; every post-process effect when unset
    #[serde(default)]
    pub post_processors: Option<Vec<String>>,
    /// Chance that a trigger reshuffles the visualizers
    #[serde(default = "default_visualizer_chance")]
    pub visualizer_chance: f64,
    /// Chance that a trigger reshuffles the post-processors
    #[serde(default = "default_post_chance")]
    pub post_chance: f64,
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_cooldown_ms() -> u64 { 2500 }
fn default_max_visualizers() -> usize { 3 }
fn default_max_post() -> usize { 1 }
fn default_visualizer_chance() -> f64 { 0.75 }
fn default_post_chance() -> f64 { 0.5 }

impl Default for AutomixSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            cooldown_ms: default_cooldown_ms(),
            max_visualizers: default_max_visualizers(),
            max_post: default_max_post(),
            visualizers: None,
            post_processors: None,
            visualizer_chance: default_visualizer_chance(),
            post_chance: default_post_chance(),
            seed: None,
        }
    }
}

impl AutomixSettings {
    pub fn clamped(mut self) -> Self {
        self.max_visualizers = self.max_visualizers.max(1);
        self.visualizer_chance = self.visualizer_chance.clamp(0.0, 1.0);
        self.post_chance = self.post_chance.clamp(0.0, 1.0);
        self
    }
}

/// Slot changes made by one trigger.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AutomixReport {
    pub activated: Vec<usize>,
    pub deactivated: Vec<usize>,
    /// Every slot that got fresh option values, newly activated ones included
    pub randomized: Vec<usize>,
}

struct Pool {
    kind: EffectKind,
    slots: Vec<usize>,
    ceiling: usize,
    /// Fewest active slots left after a trigger
    floor: usize,
    chance: f64,
}

/// Kick-gated random switching of slots and their options.
pub struct Automix {
    settings: AutomixSettings,
    rng: StdRng,
    last_trigger: Option<Duration>,
}

impl Automix {
    pub fn new(settings: AutomixSettings) -> Self {
        let settings = settings.clamped();
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            settings,
            rng,
            last_trigger: None,
        }
    }

    pub fn settings(&self) -> &AutomixSettings {
        &self.settings
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.settings.enabled = enabled;
    }

    pub fn set_pools(&mut self, visualizers: Option<Vec<String>>, post_processors: Option<Vec<String>>) {
        self.settings.visualizers = visualizers;
        self.settings.post_processors = post_processors;
    }

    /// Called once per frame after rendering. Triggers on a kick when the
    /// cooldown since the last trigger has passed.
    pub fn observe(&mut self, features: &FeatureFrame, now: Duration, registry: &mut SlotRegistry) -> Option<AutomixReport> {
        if !self.settings.enabled || !features.kick {
            return None;
        }
        let cooldown = Duration::from_millis(self.settings.cooldown_ms);
        if let Some(last) = self.last_trigger {
            if now.saturating_sub(last) < cooldown {
                return None;
            }
        }
        self.last_trigger = Some(now);
        Some(self.trigger(registry))
    }

    pub fn trigger(&mut self, registry: &mut SlotRegistry) -> AutomixReport {
        let mut report = AutomixReport::default();
        let pools = [
            Pool {
                kind: EffectKind::Standard,
                slots: eligible(registry, EffectKind::Standard, self.settings.visualizers.as_deref()),
                ceiling: self.settings.max_visualizers,
                floor: 1,
                chance: self.settings.visualizer_chance,
            },
            Pool {
                kind: EffectKind::PostProcess,
                slots: eligible(registry, EffectKind::PostProcess, self.settings.post_processors.as_deref()),
                ceiling: self.settings.max_post,
                floor: 0,
                chance: self.settings.post_chance,
            },
        ];

        for pool in &pools {
            self.churn(pool, registry, &mut report);
        }
        for pool in &pools {
            for &index in &pool.slots {
                if report.activated.contains(&index) {
                    continue;
                }
                if registry.slot(index).is_ok_and(|s| s.is_active()) {
                    self.randomize(index, registry);
                    report.randomized.push(index);
                }
            }
        }

        log::debug!(
            "Automix: on {:?}, off {:?}, randomized {:?}",
            report.activated,
            report.deactivated,
            report.randomized
        );
        report
    }

    fn churn(&mut self, pool: &Pool, registry: &mut SlotRegistry, report: &mut AutomixReport) {
        if pool.slots.is_empty() {
            return;
        }
        let cap = pool.ceiling.min(pool.slots.len());
        let floor = pool.floor.min(cap);

        let (mut active, mut inactive): (Vec<usize>, Vec<usize>) = pool
            .slots
            .iter()
            .copied()
            .partition(|&i| registry.slot(i).is_ok_and(|s| s.is_active()));
        active.shuffle(&mut self.rng);
        inactive.shuffle(&mut self.rng);

        let mut switched_off = Vec::new();
        let mut target = active.len().clamp(floor, cap);
        if self.rng.gen_bool(pool.chance) {
            // squaring skews the count towards switching off only a few
            let u: f64 = self.rng.gen();
            let off = ((u * u * (active.len() + 1) as f64) as usize).min(active.len());
            target = self.rng.gen_range(floor..=cap);
            switched_off.extend(active.drain(active.len() - off..));
            log::debug!("Automix {:?} churn: {} off, target {}", pool.kind, off, target);
        }
        while active.len() > target {
            switched_off.extend(active.pop());
        }
        for &index in &switched_off {
            if registry.deactivate(index).unwrap_or(false) {
                report.deactivated.push(index);
            }
        }

        // slots switched off by this trigger are the last to come back
        let mut candidates = inactive.into_iter().chain(switched_off);
        while active.len() < target {
            let Some(index) = candidates.next() else {
                break;
            };
            if registry.activate(index).unwrap_or(false) {
                self.randomize(index, registry);
                report.activated.push(index);
                report.randomized.push(index);
            }
            active.push(index);
        }
    }

    fn randomize(&mut self, index: usize, registry: &mut SlotRegistry) {
        let Ok(slot) = registry.slot(index) else {
            return;
        };
        let values = slot.effect().schema.randomize(&mut self.rng);
        if !values.is_empty() {
            let _ = registry.set_options(index, values);
        }
    }
}

fn eligible(registry: &SlotRegistry, kind: EffectKind, ids: Option<&[String]>) -> Vec<usize> {
    registry
        .slots()
        .iter()
        .filter(|s| s.kind() == kind)
        .filter(|s| ids.map_or(true, |ids| ids.iter().any(|id| id == s.id())))
        .map(|s| s.index())
        .collect()
}
