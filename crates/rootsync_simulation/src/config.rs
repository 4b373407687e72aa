//! Конфигурация root motion подсистемы
//!
//! Значения по умолчанию совпадают с авторитетным сервером.
//! Клиент и сервер ОБЯЗАНЫ использовать одинаковый конфиг, иначе
//! catch-up и replay разойдутся.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// Настройки root motion (Resource)
///
/// Загружается из RON (`RootMotionConfig::from_ron_str`) или берётся Default.
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RootMotionConfig {
    /// Максимум источников в одном сетевом сообщении (active + pending)
    pub max_sources_per_message: u8,
    /// Сколько секунд replicated move пригоден для replay
    pub replay_validity_window: f32,
    /// Доля рассинхрона по времени, которую догоняем за одно обновление
    pub catchup_max_percent: f32,
    /// Абсолютный предел catch-up (секунды симуляции)
    pub catchup_max_seconds: f32,
    /// Время жизни server→local ID mapping (секунды)
    pub id_mapping_validity: f32,
    /// Частота FixedUpdate
    pub fixed_hz: f64,
}

impl Default for RootMotionConfig {
    fn default() -> Self {
        Self {
            max_sources_per_message: u8::MAX,
            replay_validity_window: 0.5,
            catchup_max_percent: 0.5,
            catchup_max_seconds: 0.5,
            id_mapping_validity: 3.0,
            fixed_hz: 60.0,
        }
    }
}

impl RootMotionConfig {
    pub fn from_ron_str(source: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(source)
    }

    pub fn to_ron_string(&self) -> Result<String, ron::Error> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
    }

    /// Catch-up параметры в виде, который ждёт `prepare_root_motion`
    pub fn catchup(&self) -> CatchupLimits {
        CatchupLimits {
            max_percent: self.catchup_max_percent,
            max_seconds: self.catchup_max_seconds,
        }
    }
}

/// Ограничения simulated catch-up
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CatchupLimits {
    pub max_percent: f32,
    pub max_seconds: f32,
}

impl Default for CatchupLimits {
    fn default() -> Self {
        RootMotionConfig::default().catchup()
    }
}
