//! Root motion системы FixedUpdate
//!
//! Порядок на тик (chain):
//! config для новых → restore_pre_additive → receive packets → prepare → apply to velocity →
//! integrate → cleanup → replicate

use bevy::prelude::*;
use bevy_rapier3d::prelude::Velocity;
use std::collections::HashMap;

use super::components::{
    CharacterMotion, NetRole, ReplicatedRootMotion, RootMotionIdMap, RootMotionSources, TrackedActor,
};
use super::events::RootMotionPacketReceived;
use crate::config::RootMotionConfig;
use crate::logger;
use crate::net::{decode_group, encode_group, WireResult};
use crate::root_motion::{MovementContext, NetActorId, ReconcileReport, RootMotionSourceGroup, ServerIdMap};

/// Позиции всех TrackedActor (для radial force с location actor)
fn tracked_locations(actors: &Query<(&TrackedActor, &Transform)>) -> HashMap<NetActorId, Vec3> {
    actors
        .iter()
        .map(|(tracked, transform)| (tracked.0, transform.translation))
        .collect()
}

fn movement_context(
    transform: &Transform,
    motion: &CharacterMotion,
    tracked: &HashMap<NetActorId, Vec3>,
) -> MovementContext {
    MovementContext {
        location: transform.translation,
        rotation: transform.rotation,
        movement_time: Some(motion.movement_time),
        tracked_actors: tracked.clone(),
    }
}

/// Новые персонажи получают catch-up и ID mapping параметры из конфига
pub fn apply_root_motion_config(
    mut query: Query<(&mut RootMotionSources, &mut RootMotionIdMap), Added<RootMotionIdMap>>,
    config: Res<RootMotionConfig>,
) {
    for (mut sources, mut ids) in query.iter_mut() {
        sources.0.catchup = config.catchup();
        ids.0 = ServerIdMap::new(config.id_mapping_validity);
    }
}

/// Начало тика: убрать additive вклад прошлого тика
pub fn restore_pre_additive_velocity(mut query: Query<(&mut CharacterMotion, &mut RootMotionSources)>) {
    for (mut motion, mut sources) in query.iter_mut() {
        sources.0.restore_pre_additive_velocity(&mut motion.velocity);
    }
}

/// Применяет авторитетную группу из пакета к локальной
///
/// Simulated proxy полностью синхронизируется (с добавлением/удалением
/// источников), autonomous proxy только переносит состояние своих.
pub fn apply_authority_root_motion(
    local: &mut RootMotionSourceGroup,
    ids: &mut ServerIdMap,
    role: NetRole,
    bytes: &[u8],
    now: f32,
    max_sources: u8,
) -> WireResult<ReconcileReport> {
    let mut server = decode_group(bytes, max_sources)?;

    let report = match role {
        NetRole::SimulatedProxy => local.sync_from_authority(server, ids, now),
        NetRole::AutonomousProxy => {
            ids.convert_server_ids_to_local_ids(local, &mut server, now);
            local.update_state_from(&server, false)
        }
        NetRole::Authority => {
            logger::log_warning("Authority received a root motion packet, ignoring");
            ReconcileReport::default()
        }
    };
    Ok(report)
}

pub fn receive_root_motion_packets(
    mut packets: EventReader<RootMotionPacketReceived>,
    mut query: Query<(&CharacterMotion, &mut RootMotionSources, &mut RootMotionIdMap)>,
    config: Res<RootMotionConfig>,
    time: Res<Time<Fixed>>,
) {
    let now = time.elapsed_secs();
    for packet in packets.read() {
        let Ok((motion, mut sources, mut ids)) = query.get_mut(packet.target) else {
            logger::log_warning(&format!("Root motion packet for unknown entity {:?}", packet.target));
            continue;
        };

        match apply_authority_root_motion(
            &mut sources.0,
            &mut ids.0,
            motion.role,
            &packet.bytes,
            now,
            config.max_sources_per_message,
        ) {
            Ok(report) => {
                logger::log_lazy(|| format!("Root motion packet applied: {:?}", report));
                if sources.0.needs_simulated_smoothing() {
                    logger::log_lazy(|| format!("{:?}: root motion time corrected, mesh needs smoothing", packet.target));
                }
            }
            Err(error) => {
                let origin = if error.is_protocol_violation() { "peer" } else { "stream" };
                logger::log_error(&format!(
                    "Root motion packet rejected ({}, {}): {}",
                    error.code(),
                    origin,
                    error
                ));
            }
        }
    }
}

/// Контекст prepare: simulated proxy не знает серверных часов movement,
/// start time для него не обрезает симуляцию
fn prepare_context(
    transform: &Transform,
    motion: &CharacterMotion,
    tracked: &HashMap<NetActorId, Vec3>,
) -> MovementContext {
    let mut ctx = movement_context(transform, motion, tracked);
    if motion.role == NetRole::SimulatedProxy {
        ctx.movement_time = None;
    }
    ctx
}

pub fn prepare_root_motion(
    mut query: Query<(&Transform, &CharacterMotion, &mut RootMotionSources)>,
    actors: Query<(&TrackedActor, &Transform)>,
    time: Res<Time<Fixed>>,
) {
    let delta = time.delta_secs();
    let tracked = tracked_locations(&actors);

    for (transform, motion, mut sources) in query.iter_mut() {
        if !sources.0.has_active_root_motion_sources() {
            continue;
        }
        let ctx = prepare_context(transform, motion, &tracked);
        sources.0.prepare_root_motion(delta, &ctx, false);
    }
}

/// Override/additive velocity + override rotation
pub fn apply_root_motion_to_velocity(
    mut query: Query<(&mut Transform, &mut CharacterMotion, &mut RootMotionSources)>,
) {
    let tracked = HashMap::new();
    for (mut transform, mut motion, mut sources) in query.iter_mut() {
        if !sources.0.has_root_motion_to_apply() {
            continue;
        }
        let ctx = movement_context(&transform, &motion, &tracked);
        sources.0.apply_to_velocity(&ctx, &mut motion.velocity);

        if let Some(rotation) = sources.0.override_rotation() {
            transform.rotation = (rotation * transform.rotation).normalize();
        }
    }
}

/// Прямая интеграция velocity → Transform (headless, без Rapier step)
pub fn integrate_velocity(mut query: Query<(&mut Transform, &mut CharacterMotion)>, time: Res<Time<Fixed>>) {
    let delta = time.delta_secs();
    for (mut transform, mut motion) in query.iter_mut() {
        transform.translation += motion.velocity * delta;
        motion.movement_time += delta;
    }
}

/// Удаление законченных источников + сброс PREPARED к следующему тику
pub fn cleanup_root_motion(mut query: Query<(&Transform, &mut CharacterMotion, &mut RootMotionSources)>) {
    let tracked = HashMap::new();
    for (transform, mut motion, mut sources) in query.iter_mut() {
        let ctx = movement_context(transform, &motion, &tracked);
        sources.0.cleanup_invalid_root_motion(&ctx, &mut motion.velocity);
        sources.0.clear_prepared_flags();
    }
}

/// Authority: перекодировать группу, если она поменялась
pub fn replicate_root_motion(
    mut query: Query<(&CharacterMotion, &RootMotionSources, &mut ReplicatedRootMotion)>,
    config: Res<RootMotionConfig>,
) {
    for (motion, sources, mut replicated) in query.iter_mut() {
        if motion.role != NetRole::Authority || !replicated.needs_update(&sources.0) {
            continue;
        }
        match encode_group(&sources.0, config.max_sources_per_message) {
            Ok(bytes) => replicated.store(&sources.0, bytes),
            Err(error) => logger::log_error(&format!("Root motion encode failed: {}", error)),
        }
    }
}

/// Итоговая velocity → Rapier (если у entity есть rapier Velocity)
pub fn sync_velocity_to_rapier(mut query: Query<(&CharacterMotion, &mut Velocity)>) {
    for (motion, mut rapier_velocity) in query.iter_mut() {
        rapier_velocity.linvel = motion.velocity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::WireError;
    use crate::root_motion::RootMotionSource;

    fn server_group() -> RootMotionSourceGroup {
        let mut server = RootMotionSourceGroup::new();
        server.apply_root_motion_source(
            RootMotionSource::constant_force(Vec3::new(0.0, 200.0, 0.0), 1.0).with_name("Knockback"),
        );
        server.prepare_root_motion(0.1, &MovementContext::default(), false);
        server
    }

    #[test]
    fn test_simulated_proxy_adopts_server_sources() {
        let bytes = encode_group(&server_group(), 255).unwrap();
        let mut local = RootMotionSourceGroup::new();
        let mut ids = ServerIdMap::default();

        let report =
            apply_authority_root_motion(&mut local, &mut ids, NetRole::SimulatedProxy, &bytes, 1.0, 255)
                .unwrap();
        assert_eq!(report.promoted, 1);
        assert!(local.get_by_name("Knockback").is_some());
    }

    #[test]
    fn test_autonomous_proxy_does_not_adopt_unknown_sources() {
        let bytes = encode_group(&server_group(), 255).unwrap();
        let mut local = RootMotionSourceGroup::new();
        let mut ids = ServerIdMap::default();

        let report =
            apply_authority_root_motion(&mut local, &mut ids, NetRole::AutonomousProxy, &bytes, 1.0, 255)
                .unwrap();
        assert_eq!(report, ReconcileReport::default());
        assert!(!local.has_active_root_motion_sources());
    }

    #[test]
    fn test_zero_duration_move_to_packet_is_an_error() {
        let mut server = RootMotionSourceGroup::new();
        server.active.push(RootMotionSource::move_to(Vec3::ZERO, Vec3::X * 100.0, 0.0));
        let bytes = encode_group(&server, 255).unwrap();

        let mut local = RootMotionSourceGroup::new();
        let mut ids = ServerIdMap::default();
        let result =
            apply_authority_root_motion(&mut local, &mut ids, NetRole::SimulatedProxy, &bytes, 1.0, 255);
        assert_eq!(result, Err(WireError::InvalidDuration("MoveToForce")));
        assert!(!local.has_active_root_motion_sources());
        // prepare после отказа не паникует
        local.prepare_root_motion(0.1, &MovementContext::default(), false);
    }

    #[test]
    fn test_simulated_proxy_prepares_without_movement_clock() {
        let transform = Transform::default();
        let tracked = HashMap::new();
        let mut motion = CharacterMotion::new(NetRole::SimulatedProxy);
        motion.movement_time = 2.0;
        assert_eq!(prepare_context(&transform, &motion, &tracked).movement_time, None);

        motion.role = NetRole::Authority;
        assert_eq!(prepare_context(&transform, &motion, &tracked).movement_time, Some(2.0));
    }

    #[test]
    fn test_garbage_packet_is_an_error() {
        let mut local = RootMotionSourceGroup::new();
        let mut ids = ServerIdMap::default();
        let result =
            apply_authority_root_motion(&mut local, &mut ids, NetRole::SimulatedProxy, &[0xFF], 1.0, 255);
        assert!(result.is_err());
    }
}
