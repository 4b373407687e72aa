//! Root motion в ECS
//!
//! Ядро (`root_motion`, `net`, `replay`) от Bevy не зависит, здесь только
//! компоненты персонажа и системы, которые гоняют группу по FixedUpdate.

pub mod components;
pub mod events;
pub mod systems;

pub use components::{
    CharacterMotion, NetRole, ReplicatedRootMotion, RootMotionIdMap, RootMotionSources, TrackedActor,
};
pub use events::RootMotionPacketReceived;
pub use systems::{
    apply_authority_root_motion, apply_root_motion_config, apply_root_motion_to_velocity, cleanup_root_motion,
    integrate_velocity, prepare_root_motion, receive_root_motion_packets, replicate_root_motion,
    restore_pre_additive_velocity, sync_velocity_to_rapier,
};

use bevy::prelude::*;

use crate::config::RootMotionConfig;

/// Plugin для root motion персонажей
///
/// Регистрирует все системы в FixedUpdate для детерминизма.
pub struct RootMotionPlugin;

impl Plugin for RootMotionPlugin {
    fn build(&self, app: &mut App) {
        use bevy_rapier3d::plugin::PhysicsSet;

        app.init_resource::<RootMotionConfig>()
            .add_event::<RootMotionPacketReceived>()
            .register_type::<CharacterMotion>()
            .add_systems(
                FixedUpdate,
                (
                    apply_root_motion_config,
                    restore_pre_additive_velocity,
                    receive_root_motion_packets,
                    prepare_root_motion,
                    apply_root_motion_to_velocity,
                    integrate_velocity,
                    cleanup_root_motion,
                    replicate_root_motion,
                    sync_velocity_to_rapier,
                )
                    .chain()
                    .before(PhysicsSet::SyncBackend),
            );
    }
}

/// Spawn helper: персонаж с пустой группой
pub fn spawn_root_motion_character(commands: &mut Commands, position: Vec3, role: NetRole) -> Entity {
    commands
        .spawn((
            Transform::from_translation(position),
            CharacterMotion::new(role),
            RootMotionSources::default(),
            ReplicatedRootMotion::default(),
            RootMotionIdMap::default(),
        ))
        .id()
}
