//! RootMotionSource: один ограниченный по времени источник движения
//!
//! Общие поля (priority, ID, время, статус) + `ForceKind` с полями
//! конкретного вида. Закрытый enum вместо иерархии: все виды известны,
//! клонирование и сравнение derive'ятся.

use bevy::prelude::*;
use std::fmt;

use super::context::MovementContext;
use super::flags::{
    AccumulateMode, FinishVelocity, SettingsFlags, StatusFlags, INVALID_ROOT_MOTION_SOURCE_ID,
    SMALL_NUMBER,
};
use super::forces::{
    nearly_equal, ConstantForce, JumpForce, MoveToDynamicForce, MoveToForce, PrepareStep,
    RadialForce,
};
use crate::logger;
use crate::net::{Archive, NetSerialize, WireError};

/// Вид источника (без данных), используется в type tag и логах
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    ConstantForce,
    RadialForce,
    MoveTo,
    MoveToDynamic,
    Jump,
}

impl SourceKind {
    pub const ALL: [SourceKind; 5] = [
        SourceKind::ConstantForce,
        SourceKind::RadialForce,
        SourceKind::MoveTo,
        SourceKind::MoveToDynamic,
        SourceKind::Jump,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SourceKind::ConstantForce => "ConstantForce",
            SourceKind::RadialForce => "RadialForce",
            SourceKind::MoveTo => "MoveToForce",
            SourceKind::MoveToDynamic => "MoveToDynamicForce",
            SourceKind::Jump => "JumpForce",
        }
    }
}

/// Данные конкретного вида
#[derive(Debug, Clone, PartialEq)]
pub enum ForceKind {
    ConstantForce(ConstantForce),
    RadialForce(RadialForce),
    MoveTo(MoveToForce),
    MoveToDynamic(MoveToDynamicForce),
    Jump(JumpForce),
}

impl ForceKind {
    pub fn kind(&self) -> SourceKind {
        match self {
            ForceKind::ConstantForce(_) => SourceKind::ConstantForce,
            ForceKind::RadialForce(_) => SourceKind::RadialForce,
            ForceKind::MoveTo(_) => SourceKind::MoveTo,
            ForceKind::MoveToDynamic(_) => SourceKind::MoveToDynamic,
            ForceKind::Jump(_) => SourceKind::Jump,
        }
    }

    /// Пустые данные вида (для чтения из сети)
    pub fn default_of(kind: SourceKind) -> Self {
        match kind {
            SourceKind::ConstantForce => ForceKind::ConstantForce(ConstantForce::default()),
            SourceKind::RadialForce => ForceKind::RadialForce(RadialForce::default()),
            SourceKind::MoveTo => ForceKind::MoveTo(MoveToForce::default()),
            SourceKind::MoveToDynamic => ForceKind::MoveToDynamic(MoveToDynamicForce::default()),
            SourceKind::Jump => ForceKind::Jump(JumpForce::default()),
        }
    }

    fn matches(&self, other: &ForceKind) -> bool {
        match (self, other) {
            (ForceKind::ConstantForce(a), ForceKind::ConstantForce(b)) => a.matches(b),
            (ForceKind::RadialForce(a), ForceKind::RadialForce(b)) => a.matches(b),
            (ForceKind::MoveTo(a), ForceKind::MoveTo(b)) => a.matches(b),
            (ForceKind::MoveToDynamic(a), ForceKind::MoveToDynamic(b)) => a.matches(b),
            (ForceKind::Jump(a), ForceKind::Jump(b)) => a.matches(b),
            _ => false,
        }
    }
}

impl NetSerialize for ForceKind {
    fn net_serialize<A: Archive>(&mut self, ar: &mut A) {
        match self {
            ForceKind::ConstantForce(force) => force.net_serialize(ar),
            ForceKind::RadialForce(force) => force.net_serialize(ar),
            ForceKind::MoveTo(force) => force.net_serialize(ar),
            ForceKind::MoveToDynamic(force) => force.net_serialize(ar),
            ForceKind::Jump(force) => force.net_serialize(ar),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RootMotionSource {
    /// Больше = важнее (среди Override побеждает один)
    pub priority: i32,
    /// Выдаётся группой при apply, 0 = невалидный
    pub local_id: u16,
    /// Пустое имя = "None", по нему ничего не удаляется
    pub instance_name: String,
    pub accumulate_mode: AccumulateMode,
    /// Момент movement clock, с которого источник начинает действовать
    pub start_time: Option<f32>,
    current_time: f32,
    previous_time: f32,
    /// < 0: без таймаута
    pub duration: f32,
    pub status: StatusFlags,
    pub settings: SettingsFlags,
    /// Вклад в пространстве персонажа (поворачивается rotation)
    pub in_local_space: bool,
    pub finish_velocity: FinishVelocity,
    /// Выставляется reconciliation: следующий prepare догоняет время
    pub needs_simulated_catchup: bool,
    pub simulated_needs_smoothing: bool,
    /// translation = velocity за тик, rotation = override поворота
    pub root_motion: Transform,
    pub force: ForceKind,
}

impl RootMotionSource {
    pub fn new(force: ForceKind) -> Self {
        // Constant/Jump держат скорость до последнего тика: без partial end tick
        let settings = match force.kind() {
            SourceKind::ConstantForce | SourceKind::Jump => SettingsFlags::DISABLE_PARTIAL_END_TICK,
            _ => SettingsFlags::empty(),
        };

        Self {
            priority: 0,
            local_id: INVALID_ROOT_MOTION_SOURCE_ID,
            instance_name: String::new(),
            accumulate_mode: AccumulateMode::Override,
            start_time: None,
            current_time: 0.0,
            previous_time: 0.0,
            duration: -1.0,
            status: StatusFlags::empty(),
            settings,
            in_local_space: false,
            finish_velocity: FinishVelocity::default(),
            needs_simulated_catchup: false,
            simulated_needs_smoothing: false,
            root_motion: Transform::IDENTITY,
            force,
        }
    }

    /// Источник указанного вида с пустыми данными
    pub fn default_of(kind: SourceKind) -> Self {
        Self::new(ForceKind::default_of(kind))
    }

    pub fn constant_force(force: Vec3, duration: f32) -> Self {
        Self::new(ForceKind::ConstantForce(ConstantForce::new(force))).with_duration(duration)
    }

    pub fn radial_force(force: RadialForce, duration: f32) -> Self {
        Self::new(ForceKind::RadialForce(force)).with_duration(duration)
    }

    pub fn move_to(start: Vec3, target: Vec3, duration: f32) -> Self {
        Self::new(ForceKind::MoveTo(MoveToForce::new(start, target))).with_duration(duration)
    }

    pub fn move_to_dynamic(start: Vec3, target: Vec3, duration: f32) -> Self {
        Self::new(ForceKind::MoveToDynamic(MoveToDynamicForce::new(start, target)))
            .with_duration(duration)
    }

    pub fn jump(rotation: Quat, distance: f32, height: f32, duration: f32) -> Self {
        Self::new(ForceKind::Jump(JumpForce::new(rotation, distance, height))).with_duration(duration)
    }

    pub fn with_duration(mut self, duration: f32) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.instance_name = name.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_accumulate_mode(mut self, mode: AccumulateMode) -> Self {
        self.accumulate_mode = mode;
        self
    }

    pub fn additive(self) -> Self {
        self.with_accumulate_mode(AccumulateMode::Additive)
    }

    pub fn in_local_space(mut self) -> Self {
        self.in_local_space = true;
        self
    }

    pub fn with_start_time(mut self, start_time: f32) -> Self {
        self.start_time = Some(start_time);
        self
    }

    pub fn with_finish_velocity(mut self, finish_velocity: FinishVelocity) -> Self {
        self.finish_velocity = finish_velocity;
        self
    }

    pub fn with_settings(mut self, settings: SettingsFlags) -> Self {
        self.settings |= settings;
        self
    }

    pub fn kind(&self) -> SourceKind {
        self.force.kind()
    }

    pub fn time(&self) -> f32 {
        self.current_time
    }

    pub fn previous_time(&self) -> f32 {
        self.previous_time
    }

    /// Ещё даёт вклад: не закончился и не помечен на удаление
    pub fn is_active(&self) -> bool {
        !self.is_finished() && !self.is_marked_for_removal()
    }

    /// Move-to и jump делят время на duration
    pub fn requires_positive_duration(&self) -> bool {
        matches!(
            self.kind(),
            SourceKind::MoveTo | SourceKind::MoveToDynamic | SourceKind::Jump
        )
    }

    pub fn is_time_out_enabled(&self) -> bool {
        if let ForceKind::Jump(jump) = &self.force {
            if jump.disable_timeout {
                return false;
            }
        }
        self.duration >= 0.0
    }

    pub fn is_start_time_valid(&self) -> bool {
        self.start_time.is_some_and(|time| time >= 0.0)
    }

    pub fn is_finished(&self) -> bool {
        self.status.contains(StatusFlags::FINISHED)
    }

    pub fn is_marked_for_removal(&self) -> bool {
        self.status.contains(StatusFlags::MARKED_FOR_REMOVAL)
    }

    /// Сдвигает часы, previous_time = старое значение, FINISHED пересчитывается
    pub fn set_time(&mut self, new_time: f32) {
        self.previous_time = self.current_time;
        self.current_time = new_time;
        self.check_time_out();
    }

    pub fn check_time_out(&mut self) {
        if self.is_time_out_enabled() {
            self.status
                .set(StatusFlags::FINISHED, self.current_time >= self.duration);
        }
    }

    /// Считает вклад тика в `root_motion` и двигает часы на simulation_time
    ///
    /// Panics для move-to/jump с duration <= SMALL_NUMBER (из сети такие
    /// не принимаются, см. `net_serialize`).
    pub fn prepare(&mut self, simulation_time: f32, movement_tick_time: f32, ctx: &MovementContext) {
        let step = PrepareStep {
            time: self.current_time,
            duration: self.duration,
            simulation_time,
            movement_tick_time,
        };

        let velocity = match &self.force {
            ForceKind::ConstantForce(force) => force.velocity(&step),
            ForceKind::RadialForce(force) => force.velocity(&step, ctx),
            ForceKind::MoveTo(force) => force.velocity(&step, ctx),
            ForceKind::MoveToDynamic(force) => force.velocity(&step, ctx),
            ForceKind::Jump(force) => force.velocity(&step),
        };

        self.root_motion = Transform::from_translation(velocity);
        self.set_time(self.current_time + simulation_time);
    }

    /// Структурное совпадение (тот же источник на другой машине)
    pub fn matches(&self, other: &RootMotionSource) -> bool {
        self.kind() == other.kind()
            && self.priority == other.priority
            && self.accumulate_mode == other.accumulate_mode
            && self.in_local_space == other.in_local_space
            && self.instance_name == other.instance_name
            && nearly_equal(self.duration, other.duration, SMALL_NUMBER)
            && self.force.matches(&other.force)
    }

    pub fn matches_and_has_same_state(&self, other: &RootMotionSource) -> bool {
        if !self.matches(other) {
            return false;
        }
        if self.status != other.status || self.current_time != other.current_time {
            return false;
        }
        match (&self.force, &other.force) {
            (ForceKind::MoveToDynamic(mine), ForceKind::MoveToDynamic(theirs)) => {
                mine.has_same_state(theirs)
            }
            _ => true,
        }
    }

    /// Перенос состояния с авторитетной копии
    ///
    /// MARKED_FOR_REMOVAL не снимается никогда. Разные виды = ошибка в
    /// сопоставлении ID, логируем и возвращаем false.
    pub fn update_state_from(&mut self, other: &RootMotionSource, mark_for_simulated_catchup: bool) -> bool {
        if self.kind() != other.kind() {
            logger::log_error(&format!(
                "RootMotionSource::update_state_from: {} updated from non-matching {}",
                self, other
            ));
            return false;
        }

        self.needs_simulated_catchup = mark_for_simulated_catchup;

        let was_marked_for_removal = self.is_marked_for_removal();
        self.status = other.status;
        if was_marked_for_removal {
            self.status.insert(StatusFlags::MARKED_FOR_REMOVAL);
        }

        // Proxy сдвинули по времени: визуалу нужно сгладить скачок
        self.simulated_needs_smoothing =
            mark_for_simulated_catchup && self.current_time != other.current_time;
        self.set_time(other.current_time);

        if let (ForceKind::MoveToDynamic(mine), ForceKind::MoveToDynamic(theirs)) =
            (&mut self.force, &other.force)
        {
            mine.take_state_from(theirs);
        }
        true
    }

    /// Общие поля + поля вида. false если архив в ошибке
    ///
    /// settings, start_time, finish_velocity по сети не ходят. При чтении
    /// отбрасываются нечисловые время/duration и move-to/jump без duration.
    pub fn net_serialize<A: Archive>(&mut self, ar: &mut A) -> bool {
        ar.serialize_i32(&mut self.priority);
        ar.serialize_u16(&mut self.local_id);

        let mut mode = self.accumulate_mode.to_wire();
        ar.serialize_u8(&mut mode);
        if ar.is_loading() && !ar.is_error() {
            match AccumulateMode::from_wire(mode) {
                Some(mode) => self.accumulate_mode = mode,
                None => ar.set_error(WireError::InvalidAccumulateMode(mode)),
            }
        }

        ar.serialize_string(&mut self.instance_name);
        ar.serialize_f32(&mut self.current_time);
        ar.serialize_f32(&mut self.duration);
        if ar.is_loading() && !ar.is_error() {
            if !self.current_time.is_finite() {
                ar.set_error(WireError::NonFinite("current time"));
            } else if !self.duration.is_finite() {
                ar.set_error(WireError::NonFinite("duration"));
            }
        }

        let mut status = self.status.bits();
        ar.serialize_u8(&mut status);
        if ar.is_loading() {
            self.status = StatusFlags::from_bits_truncate(status);
        }

        ar.serialize_bool(&mut self.in_local_space);
        self.force.net_serialize(ar);

        if ar.is_loading()
            && !ar.is_error()
            && self.requires_positive_duration()
            && self.duration <= SMALL_NUMBER
        {
            ar.set_error(WireError::InvalidDuration(self.kind().name()));
        }

        !ar.is_error()
    }
}

impl fmt::Display for RootMotionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = if self.instance_name.is_empty() {
            "None"
        } else {
            self.instance_name.as_str()
        };
        write!(f, "[ID:{}] {} {}", self.local_id, self.kind().name(), name)
    }
}
