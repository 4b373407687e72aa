//! Перенос авторитетного состояния группы на локальную
//!
//! Источники сопоставляются по LocalID (ID уже должны быть переведены
//! в локальные, см. `ServerIdMap`). Совпадение ID без совпадения по
//! `matches()` значит рассинхрон, громко логируем и пропускаем.

use super::flags::{StatusFlags, INVALID_ROOT_MOTION_SOURCE_ID};
use super::group::RootMotionSourceGroup;
use super::id_mapping::ServerIdMap;
use super::source::RootMotionSource;
use crate::logger;

/// Что произошло за один `update_state_from`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Pending источники, которые сервер уже считает активными
    pub promoted: usize,
    /// Локальные источники, получившие авторитетное состояние
    pub updated: usize,
    /// Совпал ID, но не совпал источник
    pub mismatched: usize,
    /// Перенос не удался, источник помечен на удаление
    pub failed: usize,
}

impl RootMotionSourceGroup {
    /// Применяет авторитетное состояние `incoming` к этой группе
    ///
    /// Идемпотентно: повторный вызов с тем же `incoming` даёт то же состояние.
    pub fn update_state_from(
        &mut self,
        incoming: &RootMotionSourceGroup,
        mark_for_simulated_catchup: bool,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        self.is_additive_velocity_applied = incoming.is_additive_velocity_applied;
        self.last_pre_additive_velocity = incoming.last_pre_additive_velocity;

        // Pending, который на сервере уже активен, переводим в active
        let (promoted, still_pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|source| {
                source.local_id != INVALID_ROOT_MOTION_SOURCE_ID
                    && incoming.active.iter().any(|theirs| theirs.local_id == source.local_id)
            });
        self.pending = still_pending;
        for source in promoted {
            logger::log_lazy(|| format!("update_state_from: moving pending to active: {}", source));
            self.active.push(source);
            report.promoted += 1;
        }

        for theirs in incoming.active.iter() {
            if theirs.local_id == INVALID_ROOT_MOTION_SOURCE_ID {
                continue;
            }

            let same_id: Vec<usize> = self
                .active
                .iter()
                .enumerate()
                .filter(|(_, mine)| mine.local_id == theirs.local_id)
                .map(|(index, _)| index)
                .collect();

            for index in same_id {
                if !self.active[index].matches(theirs) {
                    self.log_mismatch(index, theirs);
                    report.mismatched += 1;
                    continue;
                }

                let mine = &mut self.active[index];
                if mine.update_state_from(theirs, mark_for_simulated_catchup) {
                    // Новое время: вклад надо пересчитать
                    mine.status.remove(StatusFlags::PREPARED);
                    logger::log_lazy(|| format!("RootMotionSource updated state: {}", mine));
                    report.updated += 1;
                } else {
                    mine.status.insert(StatusFlags::MARKED_FOR_REMOVAL);
                    logger::log_warning(&format!(
                        "RootMotionSource {} failed to be updated from matching source, marking for removal",
                        mine
                    ));
                    report.failed += 1;
                }
            }
        }

        report
    }

    /// Полная синхронизация simulated proxy с пакетом сервера
    ///
    /// Proxy сам источники не применяет: всё, чего у нас нет, клонируется из
    /// пакета, всё, чего нет у сервера, помечается на удаление.
    pub fn sync_from_authority(
        &mut self,
        mut server: RootMotionSourceGroup,
        ids: &mut ServerIdMap,
        now: f32,
    ) -> ReconcileReport {
        let server_ids: Vec<u16> = server.active.iter().map(|source| source.local_id).collect();
        ids.convert_server_ids_to_local_ids(self, &mut server, now);

        for (source, server_id) in server.active.iter_mut().zip(server_ids) {
            if source.local_id != INVALID_ROOT_MOTION_SOURCE_ID
                || server_id == INVALID_ROOT_MOTION_SOURCE_ID
            {
                continue;
            }
            let local_id = self.apply_root_motion_source(source.clone());
            ids.record(server_id, local_id, now);
            source.local_id = local_id;
        }

        for mine in self.active.iter_mut() {
            let still_on_server = server
                .active
                .iter()
                .any(|theirs| theirs.local_id == mine.local_id);
            if !still_on_server && !mine.is_marked_for_removal() {
                logger::log_lazy(|| format!("RootMotionSource gone on server, removing: {}", mine));
                mine.status.insert(StatusFlags::MARKED_FOR_REMOVAL);
            }
        }

        self.update_state_from(&server, true)
    }

    /// Диагностика: кто из локальных подходит по правилам и кто по ID
    fn log_mismatch(&self, index: usize, theirs: &RootMotionSource) {
        let mine = &self.active[index];
        logger::log_warning(&format!(
            "update_state_from: RootMotionSource {} has the same LocalID({}) as non-matching {}",
            mine, mine.local_id, theirs
        ));

        let total = self.active.len();
        logger::log_warning(&format!("Finding matches by rules for {}", theirs));
        for (i, candidate) in self.active.iter().enumerate() {
            logger::log_warning(&format!(
                "[{}/{}] matches({}) ? ({})",
                i + 1,
                total,
                candidate,
                candidate.matches(theirs)
            ));
        }

        logger::log_warning(&format!("Finding matches by ID for {}", theirs));
        for (i, candidate) in self.active.iter().enumerate() {
            logger::log_warning(&format!(
                "[{}/{}] matches({}) ? ({})",
                i + 1,
                total,
                candidate,
                candidate.local_id == theirs.local_id
            ));
        }
    }
}
