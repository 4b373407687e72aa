//! ECS компоненты персонажа с root motion

use bevy::prelude::*;

use crate::root_motion::{NetActorId, RootMotionSourceGroup, ServerIdMap};

/// Сетевая роль персонажа на этой машине
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Reflect)]
pub enum NetRole {
    /// Сервер: источник истины, шлёт группу
    #[default]
    Authority,
    /// Управляемый локально клиент (предсказывает сам)
    AutonomousProxy,
    /// Чужой персонаж, только принимает состояние
    SimulatedProxy,
}

/// Velocity и movement clock персонажа
///
/// velocity интегрируем сами, Rapier получает её через `sync_velocity_to_rapier`.
#[derive(Component, Debug, Clone, Copy, Default, Reflect)]
#[reflect(Component)]
pub struct CharacterMotion {
    pub velocity: Vec3,
    /// Часы movement (для start time источников)
    pub movement_time: f32,
    pub role: NetRole,
}

impl CharacterMotion {
    pub fn new(role: NetRole) -> Self {
        Self {
            role,
            ..default()
        }
    }
}

/// Группа root motion источников персонажа
#[derive(Component, Debug, Clone, Default)]
pub struct RootMotionSources(pub RootMotionSourceGroup);

/// Последняя сериализованная группа (authority → сеть)
#[derive(Component, Debug, Clone, Default)]
pub struct ReplicatedRootMotion {
    pub bytes: Vec<u8>,
    /// Сколько раз группа реально менялась и перекодировалась
    pub revision: u32,
    last_sent: Option<RootMotionSourceGroup>,
}

impl ReplicatedRootMotion {
    /// true если группа отличается от последней отправленной
    pub fn needs_update(&self, group: &RootMotionSourceGroup) -> bool {
        self.last_sent.as_ref() != Some(group)
    }

    pub fn store(&mut self, group: &RootMotionSourceGroup, bytes: Vec<u8>) {
        self.bytes = bytes;
        self.revision = self.revision.wrapping_add(1);
        self.last_sent = Some(group.clone());
    }
}

/// Server→local ID mapping (на клиенте)
#[derive(Component, Debug, Clone, Default)]
pub struct RootMotionIdMap(pub ServerIdMap);

/// Актор, к которому может тянуть radial force
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedActor(pub NetActorId);
