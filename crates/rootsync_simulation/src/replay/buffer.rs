//! Буфер montage root motion снапшотов simulated proxy
//!
//! Proxy проигрывает montage сам и уезжает вперёд сервера. Когда приходит
//! снапшот, ставим персонажа туда, где он был на сервере, и досимулируем
//! root motion от серверной позиции трека до клиентской.

use bevy::prelude::*;

use super::montage::{MontageInstance, MovementBaseResolver};
use crate::logger;
use crate::net::RepRootMotionMontage;
use crate::root_motion::{
    MovementContext, NetActorId, RootMotionSource, RootMotionSourceGroup, KINDA_SMALL_NUMBER,
};

/// Снапшоты старше этого (секунды) не используются
pub const ROOT_MOTION_REPLAY_VALIDITY: f32 = 0.5;

/// Сколько снапшотов держим максимум, лишние старые выбрасываются
pub const MAX_REPLAY_MOVES: usize = 32;

#[derive(Debug, Clone)]
pub struct SimulatedRootMotionReplicatedMove {
    /// Время получения (локальные часы)
    pub time: f32,
    pub root_motion: RepRootMotionMontage,
}

/// Что replay знает о персонаже proxy
#[derive(Debug, Clone, Default)]
pub struct ProxyActor {
    pub location: Vec3,
    pub rotation: Quat,
    pub velocity: Vec3,
    pub movement_base: Option<NetActorId>,
    pub movement_base_bone_name: String,
    pub just_teleported: bool,
}

/// Было/стало для сглаживания визуала после коррекции
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothingCorrection {
    pub old_location: Vec3,
    pub old_rotation: Quat,
    pub new_location: Vec3,
    pub new_rotation: Quat,
}

#[derive(Debug, Clone)]
pub struct RootMotionReplayBuffer {
    moves: Vec<SimulatedRootMotionReplicatedMove>,
    validity_window: f32,
}

impl Default for RootMotionReplayBuffer {
    fn default() -> Self {
        Self::new(ROOT_MOTION_REPLAY_VALIDITY)
    }
}

impl RootMotionReplayBuffer {
    pub fn new(validity_window: f32) -> Self {
        Self {
            moves: Vec::new(),
            validity_window,
        }
    }

    pub fn moves(&self) -> &[SimulatedRootMotionReplicatedMove] {
        &self.moves
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// Новый снапшот с сервера: активный копим, неактивный чистит буфер
    ///
    /// Устаревшие (старше validity window) выбрасываются сразу, очередь не
    /// длиннее MAX_REPLAY_MOVES.
    pub fn on_rep_root_motion(&mut self, snapshot: RepRootMotionMontage, now: f32) {
        logger::log("on_rep_root_motion");
        if snapshot.is_active {
            let window = self.validity_window;
            self.moves.retain(|entry| now - entry.time <= window);
            if self.moves.len() >= MAX_REPLAY_MOVES {
                let excess = self.moves.len() + 1 - MAX_REPLAY_MOVES;
                self.moves.drain(..excess);
            }
            self.moves.push(SimulatedRootMotionReplicatedMove {
                time: now,
                root_motion: snapshot,
            });
        } else {
            self.moves.clear();
        }
    }

    /// Годится ли снапшот для replay к текущему состоянию montage
    pub fn can_use_move(
        &self,
        entry: &SimulatedRootMotionReplicatedMove,
        montage: &dyn MontageInstance,
        now: f32,
    ) -> bool {
        if now - entry.time > self.validity_window {
            return false;
        }
        if entry.root_motion.montage != Some(montage.montage()) {
            return false;
        }

        let server_position = entry.root_motion.position;
        let client_position = montage.position();
        let delta_position = client_position - server_position;

        let Some(current_section) = montage.section_index_from_position(client_position) else {
            return false;
        };
        let next_section = montage.next_section_id(current_section);

        // Через секции детерминированно не перепрыгнуть
        let same_sections = montage.section_index_from_position(server_position) == Some(current_section);
        // Цикл только что провернулся
        let has_looped = next_section == Some(current_section)
            && delta_position.abs() > montage.section_length(current_section) / 2.0;
        // Симулировать умеем только вперёд
        let server_ahead_of_client = delta_position * montage.play_rate() < 0.0;

        logger::log_lazy(|| format!(
            "can_use_move server: {:.3}, client: {:.3}, delta: {:.3}, same_sections: {}, has_looped: {}, server_ahead: {}",
            server_position, client_position, delta_position, same_sections, has_looped, server_ahead_of_client
        ));

        same_sections && !has_looped && !server_ahead_of_client
    }

    /// От новых к старым, первый годный
    pub fn find_usable_move(&self, montage: &dyn MontageInstance, now: f32) -> Option<usize> {
        let found = self
            .moves
            .iter()
            .enumerate()
            .rev()
            .find(|(_, entry)| self.can_use_move(entry, montage, now))
            .map(|(index, _)| index);
        logger::log_lazy(|| format!(
            "find_usable_move found: {:?}, saved moves: {}",
            found,
            self.moves.len()
        ));
        found
    }

    /// Коррекция позиции proxy по лучшему снапшоту
    ///
    /// Использованный снапшот и всё старше удаляются, даже если восстановить
    /// позицию не вышло. None, если позиция не менялась.
    pub fn simulated_root_motion_position_fixup(
        &mut self,
        actor: &mut ProxyActor,
        montage: &dyn MontageInstance,
        bases: &dyn MovementBaseResolver,
        now: f32,
    ) -> Option<SmoothingCorrection> {
        let index = self.find_usable_move(montage, now)?;

        let old_location = actor.location;
        let old_rotation = actor.rotation;
        let mut correction = None;

        let entry = &self.moves[index];
        if restore_replicated_move(entry, actor, bases) {
            let server_position = entry.root_motion.position;
            let client_position = montage.position();
            let delta_position = client_position - server_position;

            if delta_position.abs() > KINDA_SMALL_NUMBER {
                let local_root_motion = montage.extract_root_motion(server_position, client_position);
                let play_rate = montage.play_rate();
                if play_rate.abs() > KINDA_SMALL_NUMBER {
                    let delta_time = delta_position / play_rate;
                    assert!(delta_time > 0.0, "replay delta time must be positive, got {}", delta_time);
                    simulate_root_motion(actor, delta_time, &local_root_motion);
                }
            }

            correction = Some(SmoothingCorrection {
                old_location,
                old_rotation,
                new_location: actor.location,
                new_rotation: actor.rotation,
            });
            actor.just_teleported |= old_location != actor.location;
        }

        logger::log_lazy(|| format!("Clearing old moves ({})", index + 1));
        self.moves.drain(..=index);
        correction
    }
}

/// Ставит proxy в серверную позицию снапшота
///
/// Base-relative позиция без резолвящейся base неприменима → false.
pub fn restore_replicated_move(
    entry: &SimulatedRootMotionReplicatedMove,
    actor: &mut ProxyActor,
    bases: &dyn MovementBaseResolver,
) -> bool {
    let snapshot = &entry.root_motion;

    if snapshot.relative_position {
        let base_transform = snapshot
            .movement_base
            .and_then(|base| bases.base_transform(base, &snapshot.movement_base_bone_name));
        let Some(base_transform) = base_transform else {
            return false;
        };

        actor.location = base_transform.translation + base_transform.rotation * snapshot.location;
        actor.rotation = if snapshot.relative_rotation {
            base_transform.rotation * snapshot.rotation
        } else {
            snapshot.rotation
        };
    } else {
        actor.location = snapshot.location;
        actor.rotation = snapshot.rotation;
    }

    actor.just_teleported = true;
    actor.movement_base = snapshot.movement_base;
    actor.movement_base_bone_name = snapshot.movement_base_bone_name.clone();
    true
}

/// Досимулировать root motion montage за delta_time
///
/// Идёт через тот же prepare/accumulate путь, что и процедурные источники:
/// временный override constant force на один тик.
pub fn simulate_root_motion(actor: &mut ProxyActor, delta_time: f32, local_root_motion: &Transform) {
    let world_translation = actor.rotation * local_root_motion.translation;
    let world_rotation = actor.rotation * local_root_motion.rotation * actor.rotation.inverse();

    let ctx = MovementContext::new(actor.location, actor.rotation);
    let mut group = RootMotionSourceGroup::new();
    group.apply_root_motion_source(
        RootMotionSource::constant_force(world_translation / delta_time, delta_time).with_name("MontageReplay"),
    );
    group.prepare_root_motion(delta_time, &ctx, false);
    group.apply_to_velocity(&ctx, &mut actor.velocity);

    actor.location += actor.velocity * delta_time;
    actor.rotation = (world_rotation * actor.rotation).normalize();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::MontageId;
    use crate::replay::montage::{LinearMontage, MontageSection, NoMovementBases};

    const MONTAGE: MontageId = MontageId(3);

    struct OnePlatform(Transform);

    impl MovementBaseResolver for OnePlatform {
        fn base_transform(&self, base: NetActorId, _bone_name: &str) -> Option<Transform> {
            (base == NetActorId(1)).then_some(self.0)
        }
    }

    fn snapshot(position: f32, location: Vec3) -> RepRootMotionMontage {
        RepRootMotionMontage {
            is_active: true,
            montage: Some(MONTAGE),
            position,
            location,
            ..default()
        }
    }

    fn montage_at(position: f32) -> LinearMontage {
        LinearMontage {
            position,
            ..LinearMontage::single_section(MONTAGE, 2.0, Vec3::X * 100.0)
        }
    }

    #[test]
    fn test_inactive_snapshot_clears_buffer() {
        let mut buffer = RootMotionReplayBuffer::default();
        buffer.on_rep_root_motion(snapshot(0.1, Vec3::ZERO), 0.0);
        buffer.on_rep_root_motion(snapshot(0.2, Vec3::ZERO), 0.1);
        assert_eq!(buffer.len(), 2);
        buffer.on_rep_root_motion(RepRootMotionMontage::inactive(), 0.2);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_unusable_moves_expire_with_window() {
        let mut buffer = RootMotionReplayBuffer::default();
        let foreign = LinearMontage {
            position: 0.5,
            ..LinearMontage::single_section(MontageId(4), 2.0, Vec3::ZERO)
        };
        let mut actor = ProxyActor::default();

        for tick in 0..200 {
            let now = tick as f32 * 0.1;
            buffer.on_rep_root_motion(snapshot(0.1, Vec3::ZERO), now);
            let correction =
                buffer.simulated_root_motion_position_fixup(&mut actor, &foreign, &NoMovementBases, now);
            assert_eq!(correction, None);
        }
        // Окно 0.5 с при шаге 0.1 с
        assert!(buffer.len() <= 6, "len = {}", buffer.len());
    }

    #[test]
    fn test_queue_capped_inside_window() {
        let mut buffer = RootMotionReplayBuffer::default();
        for tick in 0..100 {
            buffer.on_rep_root_motion(snapshot(0.1, Vec3::ZERO), tick as f32 * 0.001);
        }
        assert_eq!(buffer.len(), MAX_REPLAY_MOVES);
        // Выброшены самые старые
        let newest = buffer.moves().last().unwrap().time;
        assert!((newest - 0.099).abs() < 1e-6);
        assert!(buffer.moves()[0].time > 0.05);
    }

    #[test]
    fn test_prefers_newest_usable_move() {
        let mut buffer = RootMotionReplayBuffer::default();
        buffer.on_rep_root_motion(snapshot(0.1, Vec3::ZERO), 0.0);
        buffer.on_rep_root_motion(snapshot(0.2, Vec3::ZERO), 0.1);
        // Сервер впереди клиента: не годится
        buffer.on_rep_root_motion(snapshot(0.9, Vec3::ZERO), 0.2);
        assert_eq!(buffer.find_usable_move(&montage_at(0.5), 0.3), Some(1));
    }

    #[test]
    fn test_stale_and_foreign_moves_rejected() {
        let mut buffer = RootMotionReplayBuffer::default();
        buffer.on_rep_root_motion(snapshot(0.1, Vec3::ZERO), 0.0);
        assert_eq!(buffer.find_usable_move(&montage_at(0.5), 0.6), None);

        let other = LinearMontage {
            position: 0.5,
            ..LinearMontage::single_section(MontageId(4), 2.0, Vec3::ZERO)
        };
        assert_eq!(buffer.find_usable_move(&other, 0.1), None);
    }

    #[test]
    fn test_section_and_loop_rules() {
        let mut buffer = RootMotionReplayBuffer::default();
        buffer.on_rep_root_motion(snapshot(0.1, Vec3::ZERO), 0.0);

        // Разные секции
        let split = LinearMontage {
            sections: vec![
                MontageSection { start: 0.0, length: 0.3, next: Some(1) },
                MontageSection { start: 0.3, length: 1.7, next: None },
            ],
            ..montage_at(0.5)
        };
        assert_eq!(buffer.find_usable_move(&split, 0.1), None);

        // Цикл: дельта больше половины секции
        let looping = montage_at(1.5).looping();
        assert_eq!(buffer.find_usable_move(&looping, 0.1), None);
        let looping = montage_at(0.8).looping();
        assert_eq!(buffer.find_usable_move(&looping, 0.1), Some(0));
    }

    #[test]
    fn test_negative_play_rate_direction() {
        let mut buffer = RootMotionReplayBuffer::default();
        buffer.on_rep_root_motion(snapshot(0.9, Vec3::ZERO), 0.0);
        let reversed = LinearMontage {
            play_rate: -1.0,
            ..montage_at(0.5)
        };
        assert_eq!(buffer.find_usable_move(&reversed, 0.1), Some(0));
    }

    #[test]
    fn test_fixup_restores_and_resimulates() {
        let mut buffer = RootMotionReplayBuffer::default();
        buffer.on_rep_root_motion(snapshot(0.1, Vec3::new(0.0, 10.0, 0.0)), 0.0);
        buffer.on_rep_root_motion(snapshot(0.2, Vec3::new(0.0, 20.0, 0.0)), 0.05);
        buffer.on_rep_root_motion(snapshot(0.9, Vec3::ZERO), 0.1);

        let mut actor = ProxyActor {
            location: Vec3::new(500.0, 0.0, 0.0),
            ..default()
        };
        let correction = buffer
            .simulated_root_motion_position_fixup(&mut actor, &montage_at(0.5), &NoMovementBases, 0.1)
            .unwrap();

        // С 0.2 до 0.5 трека: 0.3 с × 100 по X от серверной позиции
        assert!((actor.location - Vec3::new(30.0, 20.0, 0.0)).length() < 1e-3);
        assert_eq!(correction.old_location, Vec3::new(500.0, 0.0, 0.0));
        assert_eq!(correction.new_location, actor.location);
        assert!(actor.just_teleported);
        // Использованный и старше удалены, новый (сервер впереди) остался
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.moves()[0].root_motion.position, 0.9);
    }

    #[test]
    fn test_relative_move_needs_resolvable_base() {
        let mut relative = snapshot(0.2, Vec3::new(10.0, 0.0, 0.0));
        relative.relative_position = true;
        relative.relative_rotation = true;
        relative.movement_base = Some(NetActorId(1));
        let entry = SimulatedRootMotionReplicatedMove {
            time: 0.0,
            root_motion: relative,
        };

        let mut actor = ProxyActor::default();
        assert!(!restore_replicated_move(&entry, &mut actor, &NoMovementBases));

        let platform = OnePlatform(Transform {
            translation: Vec3::new(0.0, 0.0, 100.0),
            rotation: Quat::from_rotation_z(std::f32::consts::FRAC_PI_2),
            ..default()
        });
        assert!(restore_replicated_move(&entry, &mut actor, &platform));
        assert!((actor.location - Vec3::new(0.0, 10.0, 100.0)).length() < 1e-3);
        assert_eq!(actor.movement_base, Some(NetActorId(1)));
    }

    #[test]
    fn test_failed_restore_still_consumes_moves() {
        let mut relative = snapshot(0.2, Vec3::ZERO);
        relative.relative_position = true;
        let mut buffer = RootMotionReplayBuffer::default();
        buffer.on_rep_root_motion(relative, 0.0);

        let mut actor = ProxyActor::default();
        let correction =
            buffer.simulated_root_motion_position_fixup(&mut actor, &montage_at(0.5), &NoMovementBases, 0.1);
        assert_eq!(correction, None);
        assert!(buffer.is_empty());
    }
}
