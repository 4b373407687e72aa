//! Флаги и общие константы root motion источников

use bevy::prelude::*;
use bitflags::bitflags;

/// Мир Z-up (как у авторитетного сервера): "Z" в IGNORE_Z_ACCUMULATE,
/// no_z_force и clamp finish velocity: вертикаль.
pub const UP: Vec3 = Vec3::Z;

pub const SMALL_NUMBER: f32 = 1.0e-8;
pub const KINDA_SMALL_NUMBER: f32 = 1.0e-4;

/// LocalID = 0 зарезервирован под "невалидный"
pub const INVALID_ROOT_MOTION_SOURCE_ID: u16 = 0;

bitflags! {
    /// Статус источника (меняется во время симуляции, уходит в сеть)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StatusFlags: u8 {
        /// Вклад этого тика уже посчитан
        const PREPARED = 1 << 0;
        /// Время вышло (current_time >= duration)
        const FINISHED = 1 << 1;
        /// Запрошено удаление, снимается только при cleanup
        const MARKED_FOR_REMOVAL = 1 << 2;
    }
}

bitflags! {
    /// Настройки источника (задаются при создании)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SettingsFlags: u8 {
        /// Не обрезать последний тик по duration
        const DISABLE_PARTIAL_END_TICK = 1 << 0;
        /// Не трогать Z velocity при накоплении
        const IGNORE_Z_ACCUMULATE = 1 << 1;
    }
}

/// Как вклад источника смешивается с velocity персонажа
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AccumulateMode {
    /// Заменяет velocity (побеждает наивысший priority)
    #[default]
    Override,
    /// Прибавляется к velocity
    Additive,
}

impl AccumulateMode {
    pub fn to_wire(self) -> u8 {
        match self {
            AccumulateMode::Override => 0,
            AccumulateMode::Additive => 1,
        }
    }

    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(AccumulateMode::Override),
            1 => Some(AccumulateMode::Additive),
            _ => None,
        }
    }
}

/// Политика velocity в момент удаления источника
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum FinishVelocity {
    /// Velocity не трогаем
    #[default]
    MaintainLastRootMotionVelocity,
    /// Горизонталь ограничиваем по модулю, Z только сверху (падение не тормозим)
    ClampVelocity(f32),
    /// Жёстко выставляем velocity
    SetVelocity(Vec3),
}

impl FinishVelocity {
    pub fn apply(&self, velocity: &mut Vec3) {
        match *self {
            FinishVelocity::MaintainLastRootMotionVelocity => {}
            FinishVelocity::ClampVelocity(max) => {
                let horizontal = Vec2::new(velocity.x, velocity.y).clamp_length_max(max.max(0.0));
                velocity.x = horizontal.x;
                velocity.y = horizontal.y;
                velocity.z = velocity.z.min(max);
            }
            FinishVelocity::SetVelocity(value) => *velocity = value,
        }
    }
}

/// Генератор LocalID
///
/// Пре-инкремент, 0 пропускается, u16 переполняется по кругу.
/// Дубликат "в полёте" возможен только если один источник живёт,
/// пока выдаются следующие 65535 (принятый риск).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalIdGenerator {
    last: u16,
}

impl LocalIdGenerator {
    pub fn starting_after(last: u16) -> Self {
        Self { last }
    }

    pub fn next_id(&mut self) -> u16 {
        self.last = self.last.wrapping_add(1);
        if self.last == INVALID_ROOT_MOTION_SOURCE_ID {
            self.last = self.last.wrapping_add(1);
        }
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_generator_skips_invalid_on_wrap() {
        let mut ids = LocalIdGenerator::starting_after(u16::MAX - 1);
        assert_eq!(ids.next_id(), u16::MAX);
        assert_eq!(ids.next_id(), 1); // 0 пропущен
        assert_eq!(ids.next_id(), 2);
    }

    #[test]
    fn test_settings_union() {
        let mut accumulated = SettingsFlags::empty();
        accumulated |= SettingsFlags::IGNORE_Z_ACCUMULATE;
        accumulated |= SettingsFlags::DISABLE_PARTIAL_END_TICK;
        assert!(accumulated.contains(SettingsFlags::IGNORE_Z_ACCUMULATE));
        assert!(accumulated.intersects(SettingsFlags::DISABLE_PARTIAL_END_TICK));
    }

    #[test]
    fn test_clamp_finish_velocity_keeps_fall() {
        let mut velocity = Vec3::new(300.0, 400.0, -900.0);
        FinishVelocity::ClampVelocity(100.0).apply(&mut velocity);

        assert!((Vec2::new(velocity.x, velocity.y).length() - 100.0).abs() < 1e-3);
        assert_eq!(velocity.z, -900.0);

        let mut rising = Vec3::new(0.0, 0.0, 500.0);
        FinishVelocity::ClampVelocity(100.0).apply(&mut rising);
        assert_eq!(rising.z, 100.0);
    }

    #[test]
    fn test_set_finish_velocity() {
        let mut velocity = Vec3::splat(42.0);
        FinishVelocity::SetVelocity(Vec3::X).apply(&mut velocity);
        assert_eq!(velocity, Vec3::X);
    }
}
