//! Конкретные виды root motion источников
//!
//! Каждый вид отвечает только за свои поля: сравнение (matches),
//! вклад в velocity за тик и сериализацию. Общие поля (время, статус,
//! priority) живут в `RootMotionSource`.

mod constant;
mod jump;
mod move_to;
mod radial;

pub use constant::ConstantForce;
pub use jump::JumpForce;
pub use move_to::{MoveToDynamicForce, MoveToForce};
pub use radial::RadialForce;

use bevy::prelude::*;

/// Параметры одного prepare
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrepareStep {
    /// current_time источника ДО этого тика
    pub time: f32,
    pub duration: f32,
    /// Сколько времени источника симулируем (с учётом catch-up/обрезки)
    pub simulation_time: f32,
    /// Реальная длина тика movement
    pub movement_tick_time: f32,
}

impl PrepareStep {
    /// Аргумент strength-over-time кривой: нормированное время при duration > 0
    pub fn strength_time(&self) -> f32 {
        if self.duration > 0.0 {
            (self.time / self.duration).clamp(0.0, 1.0)
        } else {
            self.time
        }
    }
}

/// Покомпонентная близость точек (строгое неравенство)
pub(crate) fn points_are_near(a: Vec3, b: Vec3, tolerance: f32) -> bool {
    let diff = (a - b).abs();
    diff.x < tolerance && diff.y < tolerance && diff.z < tolerance
}

pub(crate) fn nearly_equal(a: f32, b: f32, tolerance: f32) -> bool {
    (a - b).abs() <= tolerance
}

/// Поворот "лицом по направлению" без pitch (только yaw вокруг Z)
pub(crate) fn facing_yaw(direction: Vec3) -> Quat {
    Quat::from_rotation_z(direction.y.atan2(direction.x))
}

/// Тот же поворот, но pitch обнулён (yaw и roll сохраняются)
pub(crate) fn without_pitch(rotation: Quat) -> Quat {
    let (yaw, _pitch, roll) = rotation.to_euler(EulerRot::ZYX);
    Quat::from_euler(EulerRot::ZYX, yaw, 0.0, roll)
}

/// Повороты совпадают с точностью до угла (градусы)
pub(crate) fn rotations_near(a: Quat, b: Quat, degrees: f32) -> bool {
    a.angle_between(b) <= degrees.to_radians()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strength_time_normalized_only_for_positive_duration() {
        let step = PrepareStep {
            time: 1.0,
            duration: 4.0,
            simulation_time: 0.1,
            movement_tick_time: 0.1,
        };
        assert_eq!(step.strength_time(), 0.25);

        let unbounded = PrepareStep {
            duration: -1.0,
            time: 3.0,
            ..step
        };
        assert_eq!(unbounded.strength_time(), 3.0);
    }

    #[test]
    fn test_facing_yaw_ignores_pitch() {
        let facing = facing_yaw(Vec3::new(0.0, 10.0, 50.0));
        let forward = facing * Vec3::X;
        assert!((forward - Vec3::Y).length() < 1e-5);
    }

    #[test]
    fn test_without_pitch_keeps_yaw() {
        let rotation = Quat::from_euler(EulerRot::ZYX, 0.7, 0.4, 0.0);
        let flattened = without_pitch(rotation);
        let forward = flattened * Vec3::X;
        assert!(forward.z.abs() < 1e-5);
        assert!((forward.y.atan2(forward.x) - 0.7).abs() < 1e-5);
    }
}
