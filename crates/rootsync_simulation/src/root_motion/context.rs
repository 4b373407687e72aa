//! Снимок состояния персонажа, который видят источники при prepare

use bevy::prelude::*;
use std::collections::HashMap;

use crate::net::{Archive, NetSerialize};

/// Сетевой ID актора (radial force может тянуть к движущемуся актору)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct NetActorId(pub u32);

impl NetSerialize for NetActorId {
    fn net_serialize<A: Archive>(&mut self, ar: &mut A) {
        ar.serialize_u32(&mut self.0);
    }
}

/// Всё, что источнику нужно знать о персонаже на этом тике
///
/// Z-up: rotation переводит local-space вклад в мировой.
#[derive(Debug, Clone, Default)]
pub struct MovementContext {
    pub location: Vec3,
    pub rotation: Quat,
    /// Часы movement (сервер/клиент), None если неизвестны
    pub movement_time: Option<f32>,
    /// Позиции акторов, на которые могут ссылаться radial force
    pub tracked_actors: HashMap<NetActorId, Vec3>,
}

impl MovementContext {
    pub fn new(location: Vec3, rotation: Quat) -> Self {
        Self {
            location,
            rotation,
            movement_time: None,
            tracked_actors: HashMap::new(),
        }
    }

    pub fn with_movement_time(mut self, time: f32) -> Self {
        self.movement_time = Some(time);
        self
    }

    pub fn with_tracked_actor(mut self, id: NetActorId, location: Vec3) -> Self {
        self.tracked_actors.insert(id, location);
        self
    }

    pub fn actor_location(&self, id: NetActorId) -> Option<Vec3> {
        self.tracked_actors.get(&id).copied()
    }

    /// movement_time пригодно для start time логики (>= 0)
    pub fn valid_movement_time(&self) -> Option<f32> {
        self.movement_time.filter(|time| *time >= 0.0)
    }
}
