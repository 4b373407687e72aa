//! RootMotionSourceGroup: все источники одного персонажа
//!
//! Порядок на тик: prepare → accumulate (override, затем additive) → cleanup.
//! Активные источники отсортированы по priority (по убыванию, стабильно),
//! поэтому из Override применяется ровно один, самый приоритетный.

use bevy::prelude::*;

use super::context::MovementContext;
use super::flags::{
    AccumulateMode, LocalIdGenerator, SettingsFlags, StatusFlags, INVALID_ROOT_MOTION_SOURCE_ID,
    KINDA_SMALL_NUMBER, SMALL_NUMBER,
};
use super::source::RootMotionSource;
use crate::config::CatchupLimits;
use crate::logger;

/// Допуск сравнения last_pre_additive_velocity (units/sec)
pub const PRE_ADDITIVE_VELOCITY_TOLERANCE: f32 = 1.0;

#[derive(Debug, Clone, Default)]
pub struct RootMotionSourceGroup {
    /// Активные, priority по убыванию
    pub active: Vec<RootMotionSource>,
    /// Добавлены, но ещё не прошли prepare
    pub pending: Vec<RootMotionSource>,
    pub has_additive_sources: bool,
    pub has_override_sources: bool,
    pub has_override_sources_with_ignore_z_accumulate: bool,
    /// Velocity до применения additive (восстанавливается в начале тика)
    pub last_pre_additive_velocity: Vec3,
    pub is_additive_velocity_applied: bool,
    /// Объединение settings всех подготовленных на этом тике
    pub last_accumulated_settings: SettingsFlags,
    pub catchup: CatchupLimits,
    ids: LocalIdGenerator,
}

impl RootMotionSourceGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catchup_limits(mut self, catchup: CatchupLimits) -> Self {
        self.catchup = catchup;
        self
    }

    /// Кладёт источник в pending, возвращает новый LocalID
    pub fn apply_root_motion_source(&mut self, mut source: RootMotionSource) -> u16 {
        let local_id = self.ids.next_id();
        source.local_id = local_id;
        logger::log_lazy(|| format!("RootMotionSource added to pending: {}", source));
        self.pending.push(source);
        local_id
    }

    pub fn has_active_root_motion_sources(&self) -> bool {
        !self.active.is_empty() || !self.pending.is_empty()
    }

    pub fn has_root_motion_to_apply(&self) -> bool {
        self.has_active_root_motion_sources()
    }

    pub fn has_override_velocity(&self) -> bool {
        self.has_override_sources
    }

    /// Override источник не трогает вертикаль (IGNORE_Z_ACCUMULATE)
    pub fn has_override_velocity_with_ignore_z_accumulate(&self) -> bool {
        self.has_override_sources_with_ignore_z_accumulate
    }

    pub fn has_additive_velocity(&self) -> bool {
        self.has_additive_sources
    }

    pub fn has_velocity(&self) -> bool {
        self.has_override_velocity() || self.has_additive_velocity()
    }

    /// Сколько времени источник реально симулирует на этом тике
    fn simulation_time_for(
        source: &RootMotionSource,
        delta_time: f32,
        ctx: &MovementContext,
        catchup: CatchupLimits,
    ) -> f32 {
        let mut simulation_time = delta_time;

        // Получили авторитетное время: догоняем половину разницы, не больше лимита
        if source.needs_simulated_catchup {
            let correction = source.previous_time() - source.time();
            if correction > 0.0 {
                let correction = (correction * catchup.max_percent).min(catchup.max_seconds);
                logger::log_lazy(|| format!(
                    "Catch-up for {}: simulation time {} → {}",
                    source,
                    simulation_time,
                    simulation_time + correction
                ));
                simulation_time += correction;
            }
        }

        // Старт посреди тика
        if source.time() == 0.0 && source.is_start_time_valid() {
            if let (Some(start_time), Some(movement_time)) =
                (source.start_time, ctx.valid_movement_time())
            {
                if start_time > movement_time {
                    let end_time = movement_time + simulation_time;
                    simulation_time = if end_time <= start_time {
                        0.0
                    } else {
                        end_time - start_time
                    };
                    logger::log_lazy(|| format!(
                        "Start time {} not reached for {}: simulation time {}",
                        start_time, source, simulation_time
                    ));
                }
            }
        }

        // Конец посреди тика: не уходим дальше duration (чуть-чуть за, чтобы FINISHED встал)
        if source.is_time_out_enabled()
            && !source.settings.contains(SettingsFlags::DISABLE_PARTIAL_END_TICK)
            && source.time() + simulation_time >= source.duration
        {
            simulation_time = source.duration - source.time() + KINDA_SMALL_NUMBER;
        }

        simulation_time.max(0.0)
    }

    /// Переводит pending в active, сортирует и готовит вклад каждого источника
    ///
    /// Уже PREPARED источники пропускаются, если не `force_prepare_all`.
    pub fn prepare_root_motion(&mut self, delta_time: f32, ctx: &MovementContext, force_prepare_all: bool) {
        self.active.append(&mut self.pending);
        if self.active.len() > 1 {
            // sort_by стабильный
            self.active.sort_by(|a, b| b.priority.cmp(&a.priority));
        }

        self.has_override_sources = false;
        self.has_override_sources_with_ignore_z_accumulate = false;
        self.has_additive_sources = false;
        self.last_accumulated_settings = SettingsFlags::empty();

        let catchup = self.catchup;
        for source in self.active.iter_mut() {
            if !source.status.contains(StatusFlags::PREPARED) || force_prepare_all {
                let simulation_time = Self::simulation_time_for(source, delta_time, ctx, catchup);

                source.simulated_needs_smoothing = false;
                source.prepare(simulation_time, delta_time, ctx);
                self.last_accumulated_settings |= source.settings;
                source.status.insert(StatusFlags::PREPARED);
                source.needs_simulated_catchup = false;
            }

            match source.accumulate_mode {
                AccumulateMode::Additive => self.has_additive_sources = true,
                AccumulateMode::Override => {
                    self.has_override_sources = true;
                    if source.settings.contains(SettingsFlags::IGNORE_Z_ACCUMULATE) {
                        self.has_override_sources_with_ignore_z_accumulate = true;
                    }
                }
            }
        }
    }

    pub fn accumulate_override_velocity(&self, ctx: &MovementContext, velocity: &mut Vec3) {
        self.accumulate_velocity(AccumulateMode::Override, ctx, velocity);
    }

    pub fn accumulate_additive_velocity(&self, ctx: &MovementContext, velocity: &mut Vec3) {
        self.accumulate_velocity(AccumulateMode::Additive, ctx, velocity);
    }

    fn accumulate_velocity(&self, mode: AccumulateMode, ctx: &MovementContext, velocity: &mut Vec3) {
        for source in self.active.iter().filter(|source| source.accumulate_mode == mode) {
            Self::accumulate_from_source(source, ctx, velocity);
            // Override: только самый приоритетный
            if mode == AccumulateMode::Override {
                break;
            }
        }
    }

    fn accumulate_from_source(source: &RootMotionSource, ctx: &MovementContext, velocity: &mut Vec3) {
        let mut contribution = source.root_motion.translation;
        if source.in_local_space {
            contribution = ctx.rotation * contribution;
        }

        let input = *velocity;
        match source.accumulate_mode {
            AccumulateMode::Override => *velocity = contribution,
            AccumulateMode::Additive => *velocity += contribution,
        }

        if source.settings.contains(SettingsFlags::IGNORE_Z_ACCUMULATE) {
            velocity.z = input.z;
        }
    }

    /// Поворот самого приоритетного Override источника (если не identity)
    pub fn override_rotation(&self) -> Option<Quat> {
        let source = self
            .active
            .iter()
            .find(|source| source.accumulate_mode == AccumulateMode::Override)?;
        let rotation = source.root_motion.rotation;
        (!rotation.abs_diff_eq(Quat::IDENTITY, SMALL_NUMBER)).then_some(rotation)
    }

    pub fn needs_simulated_smoothing(&self) -> bool {
        self.active.iter().any(|source| source.simulated_needs_smoothing)
    }

    /// Убирает FINISHED / MARKED_FOR_REMOVAL источники
    ///
    /// Вклад снятого additive источника переносится в last_pre_additive_velocity,
    /// чтобы набранный импульс не обрывался. Потом применяется finish velocity.
    pub fn cleanup_invalid_root_motion(&mut self, ctx: &MovementContext, velocity: &mut Vec3) {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.active)
            .into_iter()
            .partition(|source| source.is_finished() || source.is_marked_for_removal());
        self.active = kept;

        for source in removed {
            if source.accumulate_mode == AccumulateMode::Additive && self.is_additive_velocity_applied {
                Self::accumulate_from_source(&source, ctx, &mut self.last_pre_additive_velocity);
            }

            source.finish_velocity.apply(velocity);
            // additive restore затрёт velocity значением last_pre, его тоже правим
            if self.is_additive_velocity_applied {
                source.finish_velocity.apply(&mut self.last_pre_additive_velocity);
            }

            logger::log_lazy(|| format!("RootMotionSource being removed: {}", source));
        }

        self.pending.retain(|source| {
            let keep = !source.is_finished() && !source.is_marked_for_removal();
            if !keep {
                logger::log_lazy(|| format!("Pending RootMotionSource being removed: {}", source));
            }
            keep
        });
    }

    /// Конец тика movement: следующий prepare снова посчитает вклад
    pub fn clear_prepared_flags(&mut self) {
        for source in self.active.iter_mut() {
            source.status.remove(StatusFlags::PREPARED);
        }
    }

    /// Начало тика: убираем additive вклад прошлого тика
    pub fn restore_pre_additive_velocity(&mut self, velocity: &mut Vec3) {
        if self.is_additive_velocity_applied {
            *velocity = self.last_pre_additive_velocity;
            self.is_additive_velocity_applied = false;
        }
    }

    /// Override, затем additive (с запоминанием velocity до additive)
    ///
    /// true если velocity поменялась.
    pub fn apply_to_velocity(&mut self, ctx: &MovementContext, velocity: &mut Vec3) -> bool {
        let mut applied = false;
        if self.has_override_velocity() {
            self.accumulate_override_velocity(ctx, velocity);
            applied = true;
        }
        if self.has_additive_velocity() {
            self.last_pre_additive_velocity = *velocity;
            self.accumulate_additive_velocity(ctx, velocity);
            self.is_additive_velocity_applied = true;
            applied = true;
        }
        applied
    }

    pub fn get_by_name(&self, name: &str) -> Option<&RootMotionSource> {
        self.active
            .iter()
            .chain(self.pending.iter())
            .find(|source| source.instance_name == name)
    }

    pub fn get_by_id(&self, local_id: u16) -> Option<&RootMotionSource> {
        self.active
            .iter()
            .chain(self.pending.iter())
            .find(|source| source.local_id == local_id)
    }

    pub fn get_by_id_mut(&mut self, local_id: u16) -> Option<&mut RootMotionSource> {
        self.active
            .iter_mut()
            .chain(self.pending.iter_mut())
            .find(|source| source.local_id == local_id)
    }

    /// Помечает на удаление (реально удаляется в cleanup). Пустое имя игнорируется
    pub fn remove_by_name(&mut self, name: &str) {
        if name.is_empty() {
            return;
        }
        for source in self.active.iter_mut().chain(self.pending.iter_mut()) {
            if source.instance_name == name {
                source.status.insert(StatusFlags::MARKED_FOR_REMOVAL);
            }
        }
    }

    pub fn remove_by_id(&mut self, local_id: u16) {
        if local_id == INVALID_ROOT_MOTION_SOURCE_ID {
            return;
        }
        for source in self.active.iter_mut().chain(self.pending.iter_mut()) {
            if source.local_id == local_id {
                source.status.insert(StatusFlags::MARKED_FOR_REMOVAL);
            }
        }
    }

    /// Pending источники не стартуют раньше `min_start_time`
    pub fn set_pending_min_start_times(&mut self, min_start_time: f32) {
        for source in self.pending.iter_mut() {
            let previous = source.start_time;
            let new_start = previous.map_or(min_start_time, |time| time.max(min_start_time));
            source.start_time = Some(new_start);
            if previous != source.start_time {
                logger::log_lazy(|| format!(
                    "Pending {} start time: {:?} → {}",
                    source, previous, new_start
                ));
            }
        }
    }

    /// Movement clock сброшен на `delta_time` назад: сдвигаем start times
    pub fn apply_time_stamp_reset(&mut self, delta_time: f32) {
        for source in self.active.iter_mut().chain(self.pending.iter_mut()) {
            if !source.is_start_time_valid() {
                continue;
            }
            if let Some(start_time) = source.start_time.as_mut() {
                *start_time -= delta_time;
            }
        }
    }

    /// Выбрасывает активные источники без валидного ID (не сопоставились с локальными)
    pub fn cull_invalid_sources(&mut self) {
        self.active.retain(|source| {
            let valid = source.local_id != INVALID_ROOT_MOTION_SOURCE_ID;
            if !valid {
                logger::log_lazy(|| format!("RootMotionSource culled as invalid: {}", source));
            }
            valid
        });
    }

    /// Всё, кроме last_pre_additive_velocity и генератора ID
    pub fn clear(&mut self) {
        self.active.clear();
        self.pending.clear();
        self.is_additive_velocity_applied = false;
        self.has_additive_sources = false;
        self.has_override_sources = false;
        self.has_override_sources_with_ignore_z_accumulate = false;
        self.last_accumulated_settings = SettingsFlags::empty();
    }
}

/// Равенство для delta-репликации: settings и ID-генератор не сравниваются
impl PartialEq for RootMotionSourceGroup {
    fn eq(&self, other: &Self) -> bool {
        if self.has_additive_sources != other.has_additive_sources
            || self.has_override_sources != other.has_override_sources
            || self.has_override_sources_with_ignore_z_accumulate
                != other.has_override_sources_with_ignore_z_accumulate
            || self.is_additive_velocity_applied != other.is_additive_velocity_applied
            || !self
                .last_pre_additive_velocity
                .abs_diff_eq(other.last_pre_additive_velocity, PRE_ADDITIVE_VELOCITY_TOLERANCE)
        {
            return false;
        }

        let same_list = |a: &[RootMotionSource], b: &[RootMotionSource]| {
            a.len() == b.len()
                && a.iter()
                    .zip(b.iter())
                    .all(|(mine, theirs)| mine.matches_and_has_same_state(theirs))
        };
        same_list(&self.active, &other.active) && same_list(&self.pending, &other.pending)
    }
}
