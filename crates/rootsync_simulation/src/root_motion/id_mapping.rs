//! Server LocalID → наш LocalID
//!
//! ID выдаются каждой машиной независимо, поэтому один и тот же источник
//! на сервере и у нас может иметь разные ID. Связь устанавливается по
//! `matches()` и живёт, пока её подтверждают новые пакеты.

use super::flags::INVALID_ROOT_MOTION_SOURCE_ID;
use super::group::RootMotionSourceGroup;
use crate::logger;

/// Сколько секунд живёт неподтверждённая связь
pub const ID_MAPPING_VALIDITY: f32 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ServerToLocalIdMapping {
    pub server_id: u16,
    pub local_id: u16,
    /// Когда связь последний раз использовалась (локальные часы)
    pub time_stamp: f32,
}

impl ServerToLocalIdMapping {
    pub fn is_still_valid(&self, now: f32, validity: f32) -> bool {
        self.time_stamp >= now - validity
    }
}

#[derive(Debug, Clone)]
pub struct ServerIdMap {
    mappings: Vec<ServerToLocalIdMapping>,
    validity: f32,
}

impl Default for ServerIdMap {
    fn default() -> Self {
        Self::new(ID_MAPPING_VALIDITY)
    }
}

impl ServerIdMap {
    pub fn new(validity: f32) -> Self {
        Self {
            mappings: Vec::new(),
            validity,
        }
    }

    pub fn validity(&self) -> f32 {
        self.validity
    }

    pub fn mappings(&self) -> &[ServerToLocalIdMapping] {
        &self.mappings
    }

    pub fn local_id_for(&self, server_id: u16) -> Option<u16> {
        self.mappings
            .iter()
            .find(|mapping| mapping.server_id == server_id)
            .map(|mapping| mapping.local_id)
    }

    /// Новая связь (или обновление существующей для server_id)
    pub fn record(&mut self, server_id: u16, local_id: u16, now: f32) {
        if server_id == INVALID_ROOT_MOTION_SOURCE_ID || local_id == INVALID_ROOT_MOTION_SOURCE_ID {
            return;
        }
        match self.mappings.iter_mut().find(|mapping| mapping.server_id == server_id) {
            Some(mapping) => {
                mapping.local_id = local_id;
                mapping.time_stamp = now;
            }
            None => self.mappings.push(ServerToLocalIdMapping {
                server_id,
                local_id,
                time_stamp: now,
            }),
        }
    }

    /// Выбрасывает связи старше validity
    pub fn prune(&mut self, now: f32) {
        let validity = self.validity;
        self.mappings.retain(|mapping| mapping.is_still_valid(now, validity));
    }

    /// Переписывает ID в `server` на наши
    ///
    /// Порядок: существующая связь → совпадение по `matches()` с ещё не
    /// связанным нашим источником (active, потом pending) → ID 0.
    pub fn convert_server_ids_to_local_ids(
        &mut self,
        local: &RootMotionSourceGroup,
        server: &mut RootMotionSourceGroup,
        now: f32,
    ) {
        self.prune(now);

        for source in server.active.iter_mut().chain(server.pending.iter_mut()) {
            let server_id = source.local_id;
            if server_id == INVALID_ROOT_MOTION_SOURCE_ID {
                continue;
            }

            if let Some(mapping) = self
                .mappings
                .iter_mut()
                .find(|mapping| mapping.server_id == server_id)
            {
                source.local_id = mapping.local_id;
                mapping.time_stamp = now;
                continue;
            }

            let candidate = local
                .active
                .iter()
                .chain(local.pending.iter())
                .filter(|mine| mine.local_id != INVALID_ROOT_MOTION_SOURCE_ID)
                .filter(|mine| !self.mappings.iter().any(|mapping| mapping.local_id == mine.local_id))
                .find(|mine| mine.matches(source))
                .map(|mine| mine.local_id);

            match candidate {
                Some(local_id) => {
                    logger::log_lazy(|| format!(
                        "Mapped server RootMotionSource ID {} to local {}",
                        server_id, local_id
                    ));
                    self.mappings.push(ServerToLocalIdMapping {
                        server_id,
                        local_id,
                        time_stamp: now,
                    });
                    source.local_id = local_id;
                }
                None => {
                    logger::log_with_level(
                        logger::LogLevel::Debug,
                        &format!("No local match for server RootMotionSource {}", source),
                    );
                    source.local_id = INVALID_ROOT_MOTION_SOURCE_ID;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::root_motion::source::RootMotionSource;
    use bevy::prelude::*;

    fn dash() -> RootMotionSource {
        RootMotionSource::constant_force(Vec3::new(100.0, 0.0, 0.0), 1.0).with_name("Dash")
    }

    /// Сервер успел выдать больше ID, чем мы
    fn offset_server() -> RootMotionSourceGroup {
        let mut server = RootMotionSourceGroup::new();
        for _ in 0..4 {
            let id = server.apply_root_motion_source(dash().with_name("Warmup"));
            server.remove_by_id(id);
        }
        let mut velocity = Vec3::ZERO;
        server.cleanup_invalid_root_motion(&Default::default(), &mut velocity);
        server.apply_root_motion_source(dash());
        server
    }

    #[test]
    fn test_match_creates_mapping_and_reuses_it() {
        let mut local = RootMotionSourceGroup::new();
        let local_id = local.apply_root_motion_source(dash());
        let mut ids = ServerIdMap::default();

        let mut server = offset_server();
        let server_id = server.pending[0].local_id;
        assert_ne!(server_id, local_id);

        ids.convert_server_ids_to_local_ids(&local, &mut server, 1.0);
        assert_eq!(server.pending[0].local_id, local_id);
        assert_eq!(ids.local_id_for(server_id), Some(local_id));

        // Второй пакет: связь уже есть, timestamp обновлён
        let mut again = offset_server();
        ids.convert_server_ids_to_local_ids(&local, &mut again, 2.5);
        assert_eq!(again.pending[0].local_id, local_id);
        assert_eq!(ids.mappings()[0].time_stamp, 2.5);
    }

    #[test]
    fn test_unmatched_server_source_gets_invalid_id() {
        let local = RootMotionSourceGroup::new();
        let mut server = offset_server();
        let mut ids = ServerIdMap::default();
        ids.convert_server_ids_to_local_ids(&local, &mut server, 0.0);
        assert_eq!(server.pending[0].local_id, INVALID_ROOT_MOTION_SOURCE_ID);
        assert!(ids.mappings().is_empty());
    }

    #[test]
    fn test_local_source_is_mapped_only_once() {
        let mut local = RootMotionSourceGroup::new();
        local.apply_root_motion_source(dash());

        let mut server = RootMotionSourceGroup::new();
        server.apply_root_motion_source(dash());
        server.apply_root_motion_source(dash());

        let mut ids = ServerIdMap::default();
        ids.convert_server_ids_to_local_ids(&local, &mut server, 0.0);
        assert_ne!(server.pending[0].local_id, INVALID_ROOT_MOTION_SOURCE_ID);
        assert_eq!(server.pending[1].local_id, INVALID_ROOT_MOTION_SOURCE_ID);
    }

    #[test]
    fn test_stale_mappings_pruned() {
        let mut ids = ServerIdMap::new(3.0);
        ids.record(9, 2, 0.0);
        ids.record(10, 3, 2.0);
        ids.prune(3.0);
        assert_eq!(ids.mappings().len(), 2);
        ids.prune(4.5);
        assert_eq!(ids.local_id_for(9), None);
        assert_eq!(ids.local_id_for(10), Some(3));
    }
}
