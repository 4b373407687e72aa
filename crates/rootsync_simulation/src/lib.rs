//! ROOTSYNC Simulation Core
//!
//! Root motion источники персонажа и их сетевая синхронизация:
//! - root_motion: источники, группа, reconciliation, ID mapping
//! - net: битовый архив и wire формат группы / montage снапшота
//! - replay: коррекция montage-driven simulated proxy
//! - movement: ECS слой (Bevy 0.16, FixedUpdate)
//!
//! Ядро детерминировано: одинаковые входы и seed дают одинаковые байты.

use bevy::prelude::*;
use bevy::time::TimeUpdateStrategy;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::time::Duration;

// Публичные модули
pub mod config;
pub mod logger;
pub mod movement;
pub mod net;
pub mod replay;
pub mod root_motion;

// Re-export базовых типов для удобства
pub use config::{CatchupLimits, RootMotionConfig};
pub use movement::{
    spawn_root_motion_character, CharacterMotion, NetRole, ReplicatedRootMotion, RootMotionPacketReceived,
    RootMotionPlugin, RootMotionSources, TrackedActor,
};
pub use net::{decode_group, encode_group, WireError, WireResult};
pub use root_motion::{
    AccumulateMode, FinishVelocity, ForceKind, MovementContext, ReconcileReport, RootMotionSource,
    RootMotionSourceGroup, SettingsFlags, SourceKind, StatusFlags,
};

/// Главный plugin симуляции
pub struct SimulationPlugin;

impl Plugin for SimulationPlugin {
    fn build(&self, app: &mut App) {
        let config = app
            .world()
            .get_resource::<RootMotionConfig>()
            .cloned()
            .unwrap_or_default();

        app
            // Fixed timestep для simulation tick
            .insert_resource(Time::<Fixed>::from_hz(config.fixed_hz))
            // Детерминистичный RNG (seed по умолчанию)
            .insert_resource(DeterministicRng::new(42))
            .insert_resource(config)
            .add_plugins(RootMotionPlugin);
    }
}

/// Детерминистичный RNG resource (seeded)
#[derive(Resource)]
pub struct DeterministicRng {
    pub rng: ChaCha8Rng,
    pub seed: u64,
}

impl DeterministicRng {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }
}

/// Создаёт minimal Bevy App для headless симуляции
///
/// Время двигается вручную ровно на один fixed тик за `app.update()`,
/// поэтому результат не зависит от скорости машины. Первый update только
/// инициализирует часы: N апдейтов = N-1 fixed тиков.
pub fn create_headless_app(seed: u64) -> App {
    create_headless_app_with_config(seed, RootMotionConfig::default())
}

pub fn create_headless_app_with_config(seed: u64, config: RootMotionConfig) -> App {
    let mut app = App::new();
    logger::init_logger();

    let tick = Duration::from_secs_f64(1.0 / config.fixed_hz);
    app.add_plugins(MinimalPlugins)
        .insert_resource(TimeUpdateStrategy::ManualDuration(tick))
        .insert_resource(config)
        .add_plugins(SimulationPlugin)
        .insert_resource(DeterministicRng::new(seed));

    app
}

/// Snapshot root motion состояния мира для сравнения детерминизма
///
/// Entity по индексу, для каждой: Transform (биты f32), velocity, movement
/// clock и закодированная группа.
pub fn root_motion_snapshot(world: &mut World) -> Vec<u8> {
    let mut snapshot = Vec::new();

    let mut query = world.query::<(Entity, &Transform, &CharacterMotion, &RootMotionSources)>();
    let mut entities: Vec<_> = query.iter(world).collect();

    // Сортируем по Entity ID для детерминизма
    entities.sort_by_key(|(entity, ..)| entity.index());

    for (entity, transform, motion, sources) in entities {
        snapshot.extend_from_slice(&entity.index().to_le_bytes());
        let floats = transform
            .translation
            .to_array()
            .into_iter()
            .chain(transform.rotation.to_array())
            .chain(motion.velocity.to_array())
            .chain([motion.movement_time]);
        for value in floats {
            snapshot.extend_from_slice(&value.to_bits().to_le_bytes());
        }
        match encode_group(&sources.0, u8::MAX) {
            Ok(bytes) => snapshot.extend_from_slice(&bytes),
            Err(error) => logger::log_error(&format!("Snapshot encode failed: {}", error)),
        }
    }

    snapshot
}
