use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThrowKind {
    Single,
    Barrage,
}

/// An item the renderer may pick when spawning a throw. Opaque to the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrowItem {
    pub image: String,
    pub weight: f64,
    pub scale: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sound: Option<String>,
    pub volume: f64,
    #[serde(default)]
    pub pixel: bool,
}

impl ThrowItem {
    pub fn image(path: impl Into<String>) -> Self {
        Self {
            image: path.into(),
            weight: 1.0,
            scale: 1.0,
            sound: None,
            volume: 1.0,
            pixel: false,
        }
    }
}

/// The default item list shipped with the overlay assets.
pub fn default_items() -> Vec<ThrowItem> {
    vec![ThrowItem::image("img/test.png")]
}

/// Physics snapshot captured when a throw is published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhysicsParameters {
    pub barrage_count: u32,
    /// Seconds between items of a barrage.
    pub barrage_frequency: f64,
    /// Seconds.
    pub throw_duration: f64,
    pub return_speed: f64,
    pub throw_angle_min: f64,
    pub throw_angle_max: f64,
    pub spin_speed_min: f64,
    pub spin_speed_max: f64,
    pub physics_gravity: f64,
    pub physics_horizontal: f64,
    pub physics_vertical: f64,
    pub physics_reverse: bool,
}

impl Default for PhysicsParameters {
    fn default() -> Self {
        Self {
            barrage_count: 20,
            barrage_frequency: 0.1,
            throw_duration: 1.0,
            return_speed: 0.3,
            throw_angle_min: -45.0,
            throw_angle_max: 45.0,
            spin_speed_min: 5.0,
            spin_speed_max: 15.0,
            physics_gravity: 1.0,
            physics_horizontal: 1.0,
            physics_vertical: 1.0,
            physics_reverse: false,
        }
    }
}

impl PhysicsParameters {
    pub fn validate(&self) -> Result<(), AppError> {
        let fields = [
            ("barrageFrequency", self.barrage_frequency),
            ("throwDuration", self.throw_duration),
            ("returnSpeed", self.return_speed),
            ("throwAngleMin", self.throw_angle_min),
            ("throwAngleMax", self.throw_angle_max),
            ("spinSpeedMin", self.spin_speed_min),
            ("spinSpeedMax", self.spin_speed_max),
            ("physicsGravity", self.physics_gravity),
            ("physicsHorizontal", self.physics_horizontal),
            ("physicsVertical", self.physics_vertical),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(AppError::BadRequest(format!("{name} must be a finite number")));
        }
        if self.throw_duration <= 0.0 {
            return Err(AppError::BadRequest(
                "throwDuration must be greater than zero".to_string(),
            ));
        }
        if self.barrage_frequency < 0.0 {
            return Err(AppError::BadRequest(
                "barrageFrequency must not be negative".to_string(),
            ));
        }
        if self.throw_angle_min > self.throw_angle_max {
            return Err(AppError::BadRequest(
                "throwAngleMin must not exceed throwAngleMax".to_string(),
            ));
        }
        if self.spin_speed_min > self.spin_speed_max {
            return Err(AppError::BadRequest(
                "spinSpeedMin must not exceed spinSpeedMax".to_string(),
            ));
        }
        Ok(())
    }
}

/// A single "launch" instruction fanned out to every display surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThrowEvent {
    #[serde(rename = "type")]
    pub kind: ThrowKind,
    /// Barrage size override; renderers fall back to `config.barrageCount`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
    pub config: PhysicsParameters,
    pub items: Vec<ThrowItem>,
}

impl ThrowEvent {
    pub fn new(kind: ThrowKind, config: PhysicsParameters, items: Vec<ThrowItem>) -> Self {
        Self {
            kind,
            count: None,
            config,
            items,
        }
    }

    pub fn single(config: PhysicsParameters, items: Vec<ThrowItem>) -> Self {
        Self::new(ThrowKind::Single, config, items)
    }

    pub fn barrage(config: PhysicsParameters, items: Vec<ThrowItem>) -> Self {
        Self::new(ThrowKind::Barrage, config, items)
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    /// How many items a renderer spawns for this event.
    pub fn item_count(&self) -> u32 {
        match self.kind {
            ThrowKind::Single => 1,
            ThrowKind::Barrage => self.count.unwrap_or(self.config.barrage_count),
        }
    }
}
