use bevy::prelude::*;

use super::{nearly_equal, rotations_near, without_pitch, PrepareStep};
use crate::net::{Archive, NetSerialize};
use crate::root_motion::curves::{FloatCurve, VectorCurve};
use crate::root_motion::flags::SMALL_NUMBER;

/// Прыжок по дуге: distance вперёд по rotation, height вверх (Z)
#[derive(Debug, Clone, PartialEq)]
pub struct JumpForce {
    pub rotation: Quat,
    pub distance: f32,
    /// < 0: значения path offset используются как есть
    pub height: f32,
    /// Прыжок не заканчивается по времени (ждём приземления снаружи)
    pub disable_timeout: bool,
    pub path_offset_curve: Option<VectorCurve>,
    pub time_mapping_curve: Option<FloatCurve>,
}

impl Default for JumpForce {
    fn default() -> Self {
        Self {
            rotation: Quat::IDENTITY,
            distance: -1.0,
            height: -1.0,
            disable_timeout: false,
            path_offset_curve: None,
            time_mapping_curve: None,
        }
    }
}

impl JumpForce {
    pub fn new(rotation: Quat, distance: f32, height: f32) -> Self {
        Self {
            rotation,
            distance,
            height,
            ..default()
        }
    }

    pub fn matches(&self, other: &Self) -> bool {
        self.disable_timeout == other.disable_timeout
            && self.path_offset_curve == other.path_offset_curve
            && self.time_mapping_curve == other.time_mapping_curve
            && nearly_equal(self.distance, other.distance, SMALL_NUMBER)
            && nearly_equal(self.height, other.height, SMALL_NUMBER)
            && rotations_near(self.rotation, other.rotation, 1.0)
    }

    /// Смещение от прямой линии прыжка
    pub fn path_offset(&self, move_fraction: f32) -> Vec3 {
        let mut offset = match &self.path_offset_curve {
            Some(curve) => curve.evaluate_at_fraction(move_fraction),
            None => {
                // Перевёрнутая парабола: [0,1] → высота [0,1,0]
                let phi = 2.0 * move_fraction - 1.0;
                Vec3::new(0.0, 0.0, 1.0 - phi * phi)
            }
        };
        if self.height >= 0.0 {
            offset.z *= self.height;
        }
        offset
    }

    /// Где персонаж должен быть относительно старта прыжка
    pub fn relative_location(&self, move_fraction: f32) -> Vec3 {
        let facing = without_pitch(self.rotation);
        facing * (Vec3::new(move_fraction * self.distance, 0.0, 0.0) + self.path_offset(move_fraction))
    }

    pub fn velocity(&self, step: &PrepareStep) -> Vec3 {
        if !(step.duration > SMALL_NUMBER
            && step.movement_tick_time > SMALL_NUMBER
            && step.simulation_time > SMALL_NUMBER)
        {
            assert!(
                step.duration > SMALL_NUMBER,
                "JumpForce prepared with invalid duration {}",
                step.duration
            );
            return Vec3::ZERO;
        }

        let mut current_fraction = step.time / step.duration;
        let mut target_fraction = (step.time + step.simulation_time) / step.duration;

        // За концом прыжка сдвигаем окно назад, чтобы сохранить финальную скорость
        if target_fraction > 1.0 {
            let past = target_fraction - 1.0;
            target_fraction -= past;
            current_fraction -= past;
        }

        if let Some(curve) = &self.time_mapping_curve {
            current_fraction = curve.evaluate_at_fraction(current_fraction);
            target_fraction = curve.evaluate_at_fraction(target_fraction);
        }

        (self.relative_location(target_fraction) - self.relative_location(current_fraction))
            / step.movement_tick_time
    }
}

impl NetSerialize for JumpForce {
    fn net_serialize<A: Archive>(&mut self, ar: &mut A) {
        ar.serialize_quat(&mut self.rotation);
        ar.serialize_f32(&mut self.distance);
        ar.serialize_f32(&mut self.height);
        ar.serialize_bool(&mut self.disable_timeout);
        ar.serialize_option(&mut self.path_offset_curve);
        ar.serialize_option(&mut self.time_mapping_curve);
    }
}
