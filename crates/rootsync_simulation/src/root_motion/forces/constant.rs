use bevy::prelude::*;

use super::{points_are_near, PrepareStep};
use crate::net::{Archive, NetSerialize};
use crate::root_motion::curves::FloatCurve;
use crate::root_motion::flags::SMALL_NUMBER;

/// Постоянная сила (velocity), опционально масштабируется кривой по времени
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstantForce {
    pub force: Vec3,
    pub strength_over_time: Option<FloatCurve>,
}

impl ConstantForce {
    pub fn new(force: Vec3) -> Self {
        Self {
            force,
            strength_over_time: None,
        }
    }

    pub fn matches(&self, other: &Self) -> bool {
        points_are_near(self.force, other.force, 0.1)
            && self.strength_over_time == other.strength_over_time
    }

    pub fn velocity(&self, step: &PrepareStep) -> Vec3 {
        let mut force = self.force;
        if let Some(curve) = &self.strength_over_time {
            force *= curve.evaluate(step.strength_time());
        }

        // Catch-up: 3 секунды силы за 1 секунду тика → втрое больше за тик
        let multiplier = if step.movement_tick_time > SMALL_NUMBER {
            step.simulation_time / step.movement_tick_time
        } else {
            1.0
        };
        force * multiplier
    }
}

impl NetSerialize for ConstantForce {
    fn net_serialize<A: Archive>(&mut self, ar: &mut A) {
        ar.serialize_vec3(&mut self.force);
        ar.serialize_option(&mut self.strength_over_time);
    }
}
