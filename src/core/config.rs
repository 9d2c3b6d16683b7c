//! Tactical configuration with documented constants
//!
//! Every tunable number the simulation consumes lives here, grouped by the
//! phase that reads it. The whole struct deserializes from TOML, and each
//! section falls back to its defaults when omitted.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::{Result, TacticalError};
use crate::tactical::constants::TICK_MS;
use crate::tactical::units::{Posture, SpeedSetting};

/// Radio bus timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    /// Ticks between origination and delivery of every radio event
    ///
    /// At 100 ms per tick, the default of 5 gives a 500 ms radio delay.
    pub latency_ticks: u64,

    /// Rolling window for burst suppression
    ///
    /// Must not exceed `latency_ticks`, otherwise the event a burst would be
    /// folded into may already have been delivered.
    pub dedup_window_ticks: u64,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            latency_ticks: 5,
            dedup_window_ticks: 3,
        }
    }
}

/// Detection and contact tracking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Maximum distance (subcells) at which a hostile can be detected
    pub sight_range: f32,
    /// Inside this radius a hostile with clear LOS is always detected
    pub auto_detect_range: f32,
    /// Detection chance at point blank before concealment and stealth
    pub base_probability: f32,
    /// Ticks a contact survives without being re-detected
    pub contact_grace_ticks: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            sight_range: 150.0,
            auto_detect_range: 12.0,
            base_probability: 0.9,
            contact_grace_ticks: 10,
        }
    }
}

/// Range-band accuracy table and fire cycle for the standard rifle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaponProfile {
    pub near_range: f32,
    pub medium_range: f32,
    pub far_range: f32,
    pub near_accuracy: f32,
    pub medium_accuracy: f32,
    pub far_accuracy: f32,
    /// Ticks spent in Aiming before the first shot
    pub aim_ticks: u32,
    /// Ticks between shots while Firing
    pub ticks_per_shot: u32,
    /// Shots per magazine
    pub magazine: u32,
    pub reload_ticks: u32,
    /// Severity split: chance a hit on a healthy unit is fatal
    pub kia_chance: f32,
    /// Severity split: chance a hit on a wounded unit is fatal
    pub kia_chance_wounded: f32,
}

impl Default for WeaponProfile {
    fn default() -> Self {
        Self {
            near_range: 30.0,
            medium_range: 80.0,
            far_range: 140.0,
            near_accuracy: 0.35,
            medium_accuracy: 0.2,
            far_accuracy: 0.05,
            aim_ticks: 3,
            ticks_per_shot: 2,
            magazine: 10,
            reload_ticks: 25,
            kia_chance: 0.3,
            kia_chance_wounded: 0.6,
        }
    }
}

impl WeaponProfile {
    /// Accuracy for the range band containing `distance`, or None past the far band
    pub fn accuracy_at(&self, distance: f32) -> Option<f32> {
        if distance <= self.near_range {
            Some(self.near_accuracy)
        } else if distance <= self.medium_range {
            Some(self.medium_accuracy)
        } else if distance <= self.far_range {
            Some(self.far_accuracy)
        } else {
            None
        }
    }

    pub fn in_range(&self, distance: f32) -> bool {
        distance <= self.far_range
    }
}

/// Effects of one posture
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PostureProfile {
    pub speed: f32,
    pub concealment: f32,
    pub cover: f32,
    pub accuracy: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostureTable {
    pub stand: PostureProfile,
    pub crouch: PostureProfile,
    pub prone: PostureProfile,
}

impl Default for PostureTable {
    fn default() -> Self {
        Self {
            stand: PostureProfile {
                speed: 1.0,
                concealment: 0.0,
                cover: 0.0,
                accuracy: 1.0,
            },
            crouch: PostureProfile {
                speed: 0.6,
                concealment: 0.15,
                cover: 0.1,
                accuracy: 1.1,
            },
            prone: PostureProfile {
                speed: 0.25,
                concealment: 0.35,
                cover: 0.25,
                accuracy: 1.2,
            },
        }
    }
}

impl PostureTable {
    pub fn profile(&self, posture: Posture) -> &PostureProfile {
        match posture {
            Posture::Stand => &self.stand,
            Posture::Crouch => &self.crouch,
            Posture::Prone => &self.prone,
        }
    }
}

/// Effects of one speed setting
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedProfile {
    /// Movement multiplier
    pub movement: f32,
    /// Multiplier on the chance of being detected
    pub stealth: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedTable {
    pub slow: SpeedProfile,
    pub normal: SpeedProfile,
    pub fast: SpeedProfile,
}

impl Default for SpeedTable {
    fn default() -> Self {
        Self {
            slow: SpeedProfile {
                movement: 0.5,
                stealth: 0.6,
            },
            normal: SpeedProfile {
                movement: 1.0,
                stealth: 1.0,
            },
            fast: SpeedProfile {
                movement: 1.5,
                stealth: 1.3,
            },
        }
    }
}

impl SpeedTable {
    pub fn profile(&self, speed: SpeedSetting) -> &SpeedProfile {
        match speed {
            SpeedSetting::Slow => &self.slow,
            SpeedSetting::Normal => &self.normal,
            SpeedSetting::Fast => &self.fast,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    /// Subcells per tick for a standing unit on unit-cost terrain
    pub base_speed: f32,
    /// Movement multiplier while Suppressed
    pub suppressed_multiplier: f32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            base_speed: 1.4,
            suppressed_multiplier: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuppressionConfig {
    /// Accumulator level that pins a unit
    pub threshold: f32,
    pub per_suppressive_shot: f32,
    pub per_near_miss: f32,
    pub decay_per_tick: f32,
    /// Length of the Suppressed state
    pub pinned_ticks: u64,
    /// Accuracy lost per unit of residual suppression
    pub accuracy_penalty: f32,
}

impl Default for SuppressionConfig {
    fn default() -> Self {
        Self {
            threshold: 1.0,
            per_suppressive_shot: 0.5,
            per_near_miss: 0.2,
            decay_per_tick: 0.02,
            pinned_ticks: 30,
            accuracy_penalty: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CohesionConfig {
    /// Distance (subcells) members try to keep from their leader
    pub radius: f32,
    /// Speed multiplier for steps that widen an already excessive gap
    pub drag_multiplier: f32,
    /// Consecutive ticks outside the radius before a member regroups
    pub regroup_ticks: u32,
}

impl Default for CohesionConfig {
    fn default() -> Self {
        Self {
            radius: 12.0,
            drag_multiplier: 0.5,
            regroup_ticks: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngagementConfig {
    /// How long being shot at keeps ReturnFire units cleared to fire
    pub return_fire_memory_ticks: u64,
    /// Ticks an attack order may go without a valid target before failing
    pub attack_patience_ticks: u64,
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            return_fire_memory_ticks: 100,
            attack_patience_ticks: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathfindingConfig {
    pub diagonal: bool,
    /// Cost multiplier for preferred terrain (0 < bias <= 1)
    pub preference_bias: f32,
}

impl Default for PathfindingConfig {
    fn default() -> Self {
        Self {
            diagonal: true,
            preference_bias: 0.7,
        }
    }
}

/// Configuration for the tactical simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TacticalConfig {
    /// Milliseconds of game time per tick
    pub tick_ms: u32,
    pub radio: RadioConfig,
    pub detection: DetectionConfig,
    pub weapon: WeaponProfile,
    pub posture: PostureTable,
    pub speed: SpeedTable,
    pub movement: MovementConfig,
    pub suppression: SuppressionConfig,
    pub cohesion: CohesionConfig,
    pub engagement: EngagementConfig,
    pub pathfinding: PathfindingConfig,

    /// Minimum living-unit count before per-unit work goes to rayon
    ///
    /// Below this, thread overhead exceeds the benefit. Results are identical
    /// either way because writes are merged in unit-id order.
    pub parallel_threshold: usize,
}

impl Default for TacticalConfig {
    fn default() -> Self {
        Self {
            tick_ms: TICK_MS,
            radio: RadioConfig::default(),
            detection: DetectionConfig::default(),
            weapon: WeaponProfile::default(),
            posture: PostureTable::default(),
            speed: SpeedTable::default(),
            movement: MovementConfig::default(),
            suppression: SuppressionConfig::default(),
            cohesion: CohesionConfig::default(),
            engagement: EngagementConfig::default(),
            pathfinding: PathfindingConfig::default(),
            parallel_threshold: 64,
        }
    }
}

impl TacticalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TacticalConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Radio delay in milliseconds
    pub fn radio_latency_ms(&self) -> u64 {
        self.radio.latency_ticks * self.tick_ms as u64
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(TacticalError::InvalidConfig(msg));

        if self.tick_ms == 0 {
            return invalid("tick_ms must be positive".into());
        }
        if self.radio.latency_ticks == 0 {
            return invalid("radio.latency_ticks must be at least 1".into());
        }
        if self.radio.dedup_window_ticks > self.radio.latency_ticks {
            return invalid(format!(
                "radio.dedup_window_ticks ({}) must not exceed radio.latency_ticks ({})",
                self.radio.dedup_window_ticks, self.radio.latency_ticks
            ));
        }

        let w = &self.weapon;
        if !(w.near_range < w.medium_range && w.medium_range < w.far_range) {
            return invalid(format!(
                "weapon range bands must be increasing ({} < {} < {})",
                w.near_range, w.medium_range, w.far_range
            ));
        }
        let probabilities = [
            ("weapon.near_accuracy", w.near_accuracy),
            ("weapon.medium_accuracy", w.medium_accuracy),
            ("weapon.far_accuracy", w.far_accuracy),
            ("weapon.kia_chance", w.kia_chance),
            ("weapon.kia_chance_wounded", w.kia_chance_wounded),
            ("detection.base_probability", self.detection.base_probability),
        ];
        for (name, value) in probabilities {
            if !(0.0..=1.0).contains(&value) {
                return invalid(format!("{name} ({value}) must be within [0, 1]"));
            }
        }
        if w.magazine == 0 || w.ticks_per_shot == 0 {
            return invalid("weapon.magazine and weapon.ticks_per_shot must be positive".into());
        }

        if self.detection.auto_detect_range > self.detection.sight_range {
            return invalid("detection.auto_detect_range exceeds sight_range".into());
        }
        if self.movement.base_speed <= 0.0 {
            return invalid("movement.base_speed must be positive".into());
        }
        if self.suppression.threshold <= 0.0 {
            return invalid("suppression.threshold must be positive".into());
        }
        let bias = self.pathfinding.preference_bias;
        if !(bias > 0.0 && bias <= 1.0) {
            return invalid(format!(
                "pathfinding.preference_bias ({bias}) must be within (0, 1]"
            ));
        }
        if self.cohesion.regroup_ticks == 0 {
            return invalid("cohesion.regroup_ticks must be at least 1".into());
        }

        Ok(())
    }
}
