use bevy::prelude::*;

use super::{facing_yaw, points_are_near, PrepareStep};
use crate::net::{Archive, NetSerialize};
use crate::root_motion::context::MovementContext;
use crate::root_motion::curves::{FloatCurve, VectorCurve};
use crate::root_motion::flags::{KINDA_SMALL_NUMBER, SMALL_NUMBER};

/// Допуск restrict_speed_to_expected (units/sec)
pub const RESTRICT_SPEED_ERROR_ALLOWANCE: f32 = 0.5;

/// Перемещение в фиксированную точку за duration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MoveToForce {
    pub start_location: Vec3,
    pub target_location: Vec3,
    pub restrict_speed_to_expected: bool,
    pub path_offset_curve: Option<VectorCurve>,
}

/// Перемещение к цели, которая может сдвигаться во время движения
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MoveToDynamicForce {
    pub start_location: Vec3,
    pub initial_target_location: Vec3,
    pub target_location: Vec3,
    pub restrict_speed_to_expected: bool,
    pub path_offset_curve: Option<VectorCurve>,
    pub time_mapping_curve: Option<FloatCurve>,
}

/// Общий путь move-to: куда персонаж должен попасть к (t + sim) / duration
struct MovePath<'a> {
    start: Vec3,
    target: Vec3,
    path_offset: Option<&'a VectorCurve>,
    time_mapping: Option<&'a FloatCurve>,
}

impl MovePath<'_> {
    fn move_fraction(&self, time_fraction: f32) -> f32 {
        match self.time_mapping {
            Some(curve) => curve.evaluate_at_fraction(time_fraction),
            None => time_fraction,
        }
    }

    fn path_offset_in_world_space(&self, move_fraction: f32) -> Vec3 {
        match self.path_offset {
            Some(curve) => {
                let facing = facing_yaw(self.target - self.start);
                facing * curve.evaluate_at_fraction(move_fraction)
            }
            None => Vec3::ZERO,
        }
    }

    fn location_at(&self, move_fraction: f32) -> Vec3 {
        self.start.lerp(self.target, move_fraction) + self.path_offset_in_world_space(move_fraction)
    }

    fn velocity(
        &self,
        step: &PrepareStep,
        ctx: &MovementContext,
        restrict_speed_to_expected: bool,
        label: &str,
    ) -> Vec3 {
        if !(step.duration > SMALL_NUMBER && step.movement_tick_time > SMALL_NUMBER) {
            assert!(
                step.duration > SMALL_NUMBER,
                "{} prepared with invalid duration {}",
                label,
                step.duration
            );
            return Vec3::ZERO;
        }

        let move_fraction = self.move_fraction((step.time + step.simulation_time) / step.duration);
        let current_target = self.location_at(move_fraction);
        let mut force = (current_target - ctx.location) / step.movement_tick_time;

        if restrict_speed_to_expected && force.length() > KINDA_SMALL_NUMBER {
            // Где персонаж был бы без коллизий, если бы шёл идеально
            let previous_fraction = self.move_fraction(step.time / step.duration);
            let expected_location = self.location_at(previous_fraction);
            let expected_speed =
                ((current_target - expected_location) / step.movement_tick_time).length();

            if force.length_squared() > (expected_speed + RESTRICT_SPEED_ERROR_ALLOWANCE).powi(2) {
                force = force.normalize_or_zero() * expected_speed;
            }
        }
        force
    }
}

impl MoveToForce {
    pub fn new(start_location: Vec3, target_location: Vec3) -> Self {
        Self {
            start_location,
            target_location,
            ..default()
        }
    }

    fn path(&self) -> MovePath<'_> {
        MovePath {
            start: self.start_location,
            target: self.target_location,
            path_offset: self.path_offset_curve.as_ref(),
            time_mapping: None,
        }
    }

    pub fn matches(&self, other: &Self) -> bool {
        self.restrict_speed_to_expected == other.restrict_speed_to_expected
            && self.path_offset_curve == other.path_offset_curve
            && points_are_near(self.target_location, other.target_location, 0.1)
    }

    /// Panics если duration <= SMALL_NUMBER
    pub fn velocity(&self, step: &PrepareStep, ctx: &MovementContext) -> Vec3 {
        self.path()
            .velocity(step, ctx, self.restrict_speed_to_expected, "MoveToForce")
    }
}

impl MoveToDynamicForce {
    pub fn new(start_location: Vec3, target_location: Vec3) -> Self {
        Self {
            start_location,
            initial_target_location: target_location,
            target_location,
            ..default()
        }
    }

    pub fn set_target_location(&mut self, target_location: Vec3) {
        self.target_location = target_location;
    }

    fn path(&self) -> MovePath<'_> {
        MovePath {
            start: self.start_location,
            target: self.target_location,
            path_offset: self.path_offset_curve.as_ref(),
            time_mapping: self.time_mapping_curve.as_ref(),
        }
    }

    /// Цель намеренно не сравнивается: она двигается
    pub fn matches(&self, other: &Self) -> bool {
        self.restrict_speed_to_expected == other.restrict_speed_to_expected
            && self.path_offset_curve == other.path_offset_curve
            && self.time_mapping_curve == other.time_mapping_curve
    }

    pub fn has_same_state(&self, other: &Self) -> bool {
        self.start_location.abs_diff_eq(other.start_location, KINDA_SMALL_NUMBER)
            && self.target_location.abs_diff_eq(other.target_location, KINDA_SMALL_NUMBER)
    }

    pub fn take_state_from(&mut self, other: &Self) {
        self.start_location = other.start_location;
        self.target_location = other.target_location;
    }

    pub fn velocity(&self, step: &PrepareStep, ctx: &MovementContext) -> Vec3 {
        self.path()
            .velocity(step, ctx, self.restrict_speed_to_expected, "MoveToDynamicForce")
    }
}

impl NetSerialize for MoveToForce {
    fn net_serialize<A: Archive>(&mut self, ar: &mut A) {
        ar.serialize_vec3(&mut self.start_location);
        ar.serialize_vec3(&mut self.target_location);
        ar.serialize_bool(&mut self.restrict_speed_to_expected);
        ar.serialize_option(&mut self.path_offset_curve);
    }
}

impl NetSerialize for MoveToDynamicForce {
    fn net_serialize<A: Archive>(&mut self, ar: &mut A) {
        ar.serialize_vec3(&mut self.start_location);
        ar.serialize_vec3(&mut self.initial_target_location);
        ar.serialize_vec3(&mut self.target_location);
        ar.serialize_bool(&mut self.restrict_speed_to_expected);
        ar.serialize_option(&mut self.path_offset_curve);
        ar.serialize_option(&mut self.time_mapping_curve);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(time: f32, duration: f32) -> PrepareStep {
        PrepareStep {
            time,
            duration,
            simulation_time: 0.1,
            movement_tick_time: 0.1,
        }
    }

    #[test]
    fn test_move_to_heads_for_lerped_target() {
        let force = MoveToForce::new(Vec3::ZERO, Vec3::new(100.0, 0.0, 0.0));
        let ctx = MovementContext::new(Vec3::ZERO, Quat::IDENTITY);
        // fraction 0.1 → точка (10,0,0), за 0.1 с → 100 units/s
        let velocity = force.velocity(&step(0.0, 1.0), &ctx);
        assert!((velocity - Vec3::new(100.0, 0.0, 0.0)).length() < 1e-3);
    }

    #[test]
    fn test_restrict_speed_clamps_after_collision_lag() {
        let mut force = MoveToForce::new(Vec3::ZERO, Vec3::new(100.0, 0.0, 0.0));
        force.restrict_speed_to_expected = true;
        // персонаж застрял в начале, а по времени уже половина пути
        let ctx = MovementContext::new(Vec3::ZERO, Quat::IDENTITY);
        let velocity = force.velocity(&step(0.5, 1.0), &ctx);
        assert!((velocity.length() - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_path_offset_rotated_by_facing() {
        let mut force = MoveToForce::new(Vec3::ZERO, Vec3::new(0.0, 100.0, 0.0));
        force.path_offset_curve = Some(VectorCurve::from_keys([
            (0.0, Vec3::new(0.0, 10.0, 0.0)),
            (1.0, Vec3::new(0.0, 10.0, 0.0)),
        ]));
        let ctx = MovementContext::new(Vec3::ZERO, Quat::IDENTITY);
        let velocity = force.velocity(&step(0.0, 1.0), &ctx);
        // local +Y при facing +Y превращается в мировой -X
        assert!((velocity - Vec3::new(-100.0, 100.0, 0.0)).length() < 1e-3);
    }

    #[test]
    #[should_panic(expected = "invalid duration")]
    fn test_zero_duration_panics() {
        let force = MoveToForce::new(Vec3::ZERO, Vec3::X);
        let ctx = MovementContext::default();
        force.velocity(&step(0.0, 0.0), &ctx);
    }

    #[test]
    fn test_dynamic_target_ignored_by_matches_but_not_by_state() {
        let a = MoveToDynamicForce::new(Vec3::ZERO, Vec3::new(100.0, 0.0, 0.0));
        let mut b = a.clone();
        b.set_target_location(Vec3::new(0.0, 500.0, 0.0));

        assert!(a.matches(&b));
        assert!(!a.has_same_state(&b));

        let mut c = a.clone();
        c.take_state_from(&b);
        assert!(c.has_same_state(&b));
        assert_eq!(c.initial_target_location, a.initial_target_location);
    }

    #[test]
    fn test_dynamic_time_mapping() {
        let mut force = MoveToDynamicForce::new(Vec3::ZERO, Vec3::new(100.0, 0.0, 0.0));
        // квадратичное ускорение: 0.5 времени → 0.25 пути
        force.time_mapping_curve = Some(FloatCurve::from_keys([(0.0, 0.0), (0.5, 0.25), (1.0, 1.0)]));
        let ctx = MovementContext::new(Vec3::ZERO, Quat::IDENTITY);
        let velocity = force.velocity(&step(0.4, 1.0), &ctx);
        assert!((velocity.x - 250.0).abs() < 1e-2);
    }
}
