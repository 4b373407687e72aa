//! Authority → simulated proxy через wire кодек
//!
//! Два App в одном процессе, пакет = `ReplicatedRootMotion.bytes`.

use bevy::prelude::*;
use rootsync_simulation::logger::{self, LogLevel, MemoryLogger};
use rootsync_simulation::movement::RootMotionIdMap;
use rootsync_simulation::*;

struct Pair {
    authority: App,
    proxy: App,
    server_character: Entity,
    proxy_character: Entity,
    last_revision: u32,
}

impl Pair {
    fn new() -> Self {
        let mut authority = create_headless_app(7);
        let mut proxy = create_headless_app(7);
        let server_character =
            spawn_root_motion_character(&mut authority.world_mut().commands(), Vec3::ZERO, NetRole::Authority);
        let proxy_character =
            spawn_root_motion_character(&mut proxy.world_mut().commands(), Vec3::ZERO, NetRole::SimulatedProxy);
        authority.world_mut().flush();
        proxy.world_mut().flush();

        let mut pair = Self {
            authority,
            proxy,
            server_character,
            proxy_character,
            last_revision: 0,
        };
        // Первый update только запускает часы
        pair.tick();
        pair
    }

    fn apply(&mut self, source: RootMotionSource) -> u16 {
        let mut sources = self
            .authority
            .world_mut()
            .get_mut::<RootMotionSources>(self.server_character)
            .unwrap();
        sources.0.apply_root_motion_source(source)
    }

    fn send_to_proxy(&mut self, bytes: Vec<u8>) {
        self.proxy.world_mut().send_event(RootMotionPacketReceived {
            target: self.proxy_character,
            bytes,
        });
    }

    fn tick(&mut self) {
        self.authority.update();
        let replicated = self
            .authority
            .world()
            .get::<ReplicatedRootMotion>(self.server_character)
            .unwrap()
            .clone();
        if replicated.revision != self.last_revision {
            self.last_revision = replicated.revision;
            self.send_to_proxy(replicated.bytes);
        }
        self.proxy.update();
    }

    fn server_group(&self) -> &RootMotionSourceGroup {
        &self.authority.world().get::<RootMotionSources>(self.server_character).unwrap().0
    }

    fn proxy_group(&self) -> &RootMotionSourceGroup {
        &self.proxy.world().get::<RootMotionSources>(self.proxy_character).unwrap().0
    }

    fn divergence(&self) -> f32 {
        let server = self.authority.world().get::<Transform>(self.server_character).unwrap();
        let proxy = self.proxy.world().get::<Transform>(self.proxy_character).unwrap();
        server.translation.distance(proxy.translation)
    }
}

#[test]
fn test_proxy_follows_server_sources() {
    let mut pair = Pair::new();
    // finish velocity по сети не ходит, обе стороны сохраняют последнюю
    pair.apply(RootMotionSource::constant_force(Vec3::new(0.0, 120.0, 0.0), 0.5).with_name("Knockback"));

    for _ in 0..10 {
        pair.tick();
    }

    let server = pair.server_group().get_by_name("Knockback").unwrap();
    let proxy = pair.proxy_group().get_by_name("Knockback").unwrap();
    assert!(proxy.matches(server));
    // Proxy отстаёт от сервера не больше чем на тик
    assert!((proxy.time() - server.time()).abs() < 1.5 / 60.0);

    for _ in 0..50 {
        pair.tick();
    }

    assert!(!pair.server_group().has_active_root_motion_sources());
    assert!(!pair.proxy_group().has_active_root_motion_sources());
    // Расхождение не больше пары тиков движения
    assert!(pair.divergence() < 120.0 * 3.0 / 60.0, "divergence = {}", pair.divergence());
}

#[test]
fn test_server_removal_reaches_proxy() {
    let mut pair = Pair::new();
    let id = pair.apply(RootMotionSource::constant_force(Vec3::X * 50.0, -1.0).with_name("Conveyor"));

    for _ in 0..5 {
        pair.tick();
    }
    assert!(pair.proxy_group().get_by_name("Conveyor").is_some());

    pair.authority
        .world_mut()
        .get_mut::<RootMotionSources>(pair.server_character)
        .unwrap()
        .0
        .remove_by_id(id);

    for _ in 0..3 {
        pair.tick();
    }
    assert!(pair.server_group().get_by_name("Conveyor").is_none());
    assert!(pair.proxy_group().get_by_name("Conveyor").is_none());
}

#[test]
fn test_garbage_packet_logged_and_group_untouched() {
    let memory = MemoryLogger::new();
    logger::set_logger(Box::new(memory.clone()));

    let mut pair = Pair::new();
    pair.apply(RootMotionSource::constant_force(Vec3::X * 50.0, -1.0).with_name("Conveyor"));
    for _ in 0..3 {
        pair.tick();
    }
    let before = pair.proxy_group().clone();

    pair.send_to_proxy(vec![0b0000_0111, 0xFF]);
    pair.proxy.update();

    assert!(memory.contains(LogLevel::Error, "Root motion packet rejected"));
    // Proxy продолжил тикать, но состав группы не поменялся
    assert_eq!(pair.proxy_group().active.len(), before.active.len());
    assert!(pair.proxy_group().get_by_name("Conveyor").is_some());
}

#[test]
fn test_config_reaches_new_characters() {
    let config = RootMotionConfig {
        catchup_max_percent: 0.25,
        id_mapping_validity: 1.0,
        ..default()
    };
    let mut app = create_headless_app_with_config(3, config);
    let entity = spawn_root_motion_character(&mut app.world_mut().commands(), Vec3::ZERO, NetRole::SimulatedProxy);
    app.world_mut().flush();
    app.update();
    app.update();

    let sources = app.world().get::<RootMotionSources>(entity).unwrap();
    assert_eq!(sources.0.catchup.max_percent, 0.25);
    let ids = app.world().get::<RootMotionIdMap>(entity).unwrap();
    assert_eq!(ids.0.validity(), 1.0);
}
