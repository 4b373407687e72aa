//! Root motion events

use bevy::prelude::*;

/// Event: пришёл пакет с авторитетной группой для персонажа
///
/// Генерируется транспортом (в демо: копированием `ReplicatedRootMotion.bytes`
/// из authority App). Обрабатывается `receive_root_motion_packets`.
#[derive(Event, Debug, Clone)]
pub struct RootMotionPacketReceived {
    pub target: Entity,
    pub bytes: Vec<u8>,
}
