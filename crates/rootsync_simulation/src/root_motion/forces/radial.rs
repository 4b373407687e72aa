use bevy::prelude::*;

use super::{nearly_equal, points_are_near, rotations_near, PrepareStep};
use crate::net::{Archive, NetSerialize};
use crate::root_motion::context::{MovementContext, NetActorId};
use crate::root_motion::curves::FloatCurve;
use crate::root_motion::flags::SMALL_NUMBER;

/// Радиальная сила: толкает от точки (или тянет к ней) внутри радиуса
#[derive(Debug, Clone, PartialEq)]
pub struct RadialForce {
    pub location: Vec3,
    /// Если актор известен контексту, берём его позицию вместо location
    pub location_actor: Option<NetActorId>,
    pub radius: f32,
    pub strength: f32,
    pub is_push: bool,
    pub no_z_force: bool,
    pub strength_distance_falloff: Option<FloatCurve>,
    pub strength_over_time: Option<FloatCurve>,
    /// Фиксированное мировое направление (forward = rotation * X)
    pub fixed_world_direction: Option<Quat>,
}

impl Default for RadialForce {
    fn default() -> Self {
        Self {
            location: Vec3::ZERO,
            location_actor: None,
            radius: 1.0,
            strength: 0.0,
            is_push: true,
            no_z_force: false,
            strength_distance_falloff: None,
            strength_over_time: None,
            fixed_world_direction: None,
        }
    }
}

impl RadialForce {
    pub fn matches(&self, other: &Self) -> bool {
        let same_direction = match (self.fixed_world_direction, other.fixed_world_direction) {
            (None, None) => true,
            (Some(a), Some(b)) => rotations_near(a, b, 3.0),
            _ => false,
        };
        // Два источника без актора тоже считаются "с одним актором"
        let same_location = self.location_actor == other.location_actor
            || points_are_near(self.location, other.location, 1.0);

        self.is_push == other.is_push
            && self.no_z_force == other.no_z_force
            && self.strength_distance_falloff == other.strength_distance_falloff
            && self.strength_over_time == other.strength_over_time
            && same_location
            && nearly_equal(self.radius, other.radius, SMALL_NUMBER)
            && nearly_equal(self.strength, other.strength, SMALL_NUMBER)
            && same_direction
    }

    pub fn force_location(&self, ctx: &MovementContext) -> Vec3 {
        self.location_actor
            .and_then(|actor| ctx.actor_location(actor))
            .unwrap_or(self.location)
    }

    pub fn velocity(&self, step: &PrepareStep, ctx: &MovementContext) -> Vec3 {
        let force_location = self.force_location(ctx);
        let distance = force_location.distance(ctx.location);
        let mut force = Vec3::ZERO;

        if distance < self.radius {
            // Потери силы от distance и от времени складываются
            let mut strength_factor = 1.0;
            if let Some(falloff) = &self.strength_distance_falloff {
                let distance_factor = falloff.evaluate((distance / self.radius).clamp(0.0, 1.0));
                strength_factor -= 1.0 - distance_factor;
            }
            if let Some(over_time) = &self.strength_over_time {
                let time_factor = over_time.evaluate(step.strength_time());
                strength_factor -= 1.0 - time_factor;
            }
            let strength = self.strength * strength_factor.clamp(0.0, 1.0);

            force = match self.fixed_world_direction {
                Some(direction) => (direction * Vec3::X) * strength,
                None => {
                    let pull = (force_location - ctx.location).normalize_or_zero() * strength;
                    if self.is_push {
                        -pull
                    } else {
                        pull
                    }
                }
            };
        }

        if self.no_z_force {
            force.z = 0.0;
        }

        if step.simulation_time != step.movement_tick_time && step.movement_tick_time > SMALL_NUMBER {
            force *= step.simulation_time / step.movement_tick_time;
        }
        force
    }
}

impl NetSerialize for RadialForce {
    fn net_serialize<A: Archive>(&mut self, ar: &mut A) {
        ar.serialize_vec3(&mut self.location);
        ar.serialize_option(&mut self.location_actor);
        ar.serialize_f32(&mut self.radius);
        ar.serialize_f32(&mut self.strength);
        ar.serialize_bool(&mut self.is_push);
        ar.serialize_bool(&mut self.no_z_force);
        ar.serialize_option(&mut self.strength_distance_falloff);
        ar.serialize_option(&mut self.strength_over_time);

        let mut use_fixed = self.fixed_world_direction.is_some();
        let mut direction = self.fixed_world_direction.unwrap_or(Quat::IDENTITY);
        ar.serialize_bool(&mut use_fixed);
        ar.serialize_quat(&mut direction);
        if ar.is_loading() {
            self.fixed_world_direction = use_fixed.then_some(direction);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step() -> PrepareStep {
        PrepareStep {
            time: 0.0,
            duration: 1.0,
            simulation_time: 0.1,
            movement_tick_time: 0.1,
        }
    }

    #[test]
    fn test_push_away_from_location() {
        let force = RadialForce {
            location: Vec3::ZERO,
            radius: 500.0,
            strength: 300.0,
            ..default()
        };
        let ctx = MovementContext::new(Vec3::new(100.0, 0.0, 0.0), Quat::IDENTITY);
        let velocity = force.velocity(&step(), &ctx);
        assert!((velocity - Vec3::new(300.0, 0.0, 0.0)).length() < 1e-3);
    }

    #[test]
    fn test_outside_radius_is_zero() {
        let force = RadialForce {
            radius: 50.0,
            strength: 300.0,
            ..default()
        };
        let ctx = MovementContext::new(Vec3::new(100.0, 0.0, 0.0), Quat::IDENTITY);
        assert_eq!(force.velocity(&step(), &ctx), Vec3::ZERO);
    }

    #[test]
    fn test_pull_toward_tracked_actor_without_z() {
        let actor = NetActorId(7);
        let force = RadialForce {
            location: Vec3::new(-1000.0, 0.0, 0.0),
            location_actor: Some(actor),
            radius: 1000.0,
            strength: 100.0,
            is_push: false,
            no_z_force: true,
            ..default()
        };
        let ctx = MovementContext::new(Vec3::ZERO, Quat::IDENTITY)
            .with_tracked_actor(actor, Vec3::new(0.0, 30.0, 40.0));
        let velocity = force.velocity(&step(), &ctx);
        assert!((velocity - Vec3::new(0.0, 60.0, 0.0)).length() < 1e-3);
    }

    #[test]
    fn test_falloff_and_time_losses_add_up() {
        let force = RadialForce {
            radius: 100.0,
            strength: 100.0,
            // на половине радиуса 0.75 → потеря 0.25
            strength_distance_falloff: Some(FloatCurve::from_keys([(0.0, 1.0), (1.0, 0.5)])),
            // в начале 0.5 → потеря 0.5
            strength_over_time: Some(FloatCurve::from_keys([(0.0, 0.5), (1.0, 1.0)])),
            ..default()
        };
        let ctx = MovementContext::new(Vec3::new(50.0, 0.0, 0.0), Quat::IDENTITY);
        let velocity = force.velocity(&step(), &ctx);
        assert!((velocity.x - 25.0).abs() < 1e-3);
    }

    #[test]
    fn test_fixed_direction_matches_within_three_degrees() {
        let a = RadialForce {
            fixed_world_direction: Some(Quat::from_rotation_z(0.0)),
            ..default()
        };
        let b = RadialForce {
            fixed_world_direction: Some(Quat::from_rotation_z(2.0_f32.to_radians())),
            ..default()
        };
        let c = RadialForce {
            fixed_world_direction: Some(Quat::from_rotation_z(10.0_f32.to_radians())),
            ..default()
        };
        assert!(a.matches(&b));
        assert!(!a.matches(&c));
        assert!(!a.matches(&RadialForce::default()));
    }
}
