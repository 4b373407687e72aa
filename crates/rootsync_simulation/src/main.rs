//! Headless демо ROOTSYNC
//!
//! Два App: authority и simulated proxy. Authority применяет root motion
//! источники, каждый тик шлёт изменившуюся группу proxy через wire кодек,
//! печатаем расхождение позиций. Потом montage replay без ECS.

use bevy::prelude::*;
use rand::Rng;
use rootsync_simulation::net::{
    decode_rep_root_motion, encode_rep_root_motion, MontageId, RepRootMotionMontage,
    DEFAULT_MAX_SOURCES_PER_MESSAGE,
};
use rootsync_simulation::replay::{
    simulate_root_motion, LinearMontage, MontageInstance, NoMovementBases, ProxyActor, RootMotionReplayBuffer,
};
use rootsync_simulation::root_motion::RadialForce;
use rootsync_simulation::{
    create_headless_app, spawn_root_motion_character, DeterministicRng, NetRole, ReplicatedRootMotion,
    RootMotionConfig, RootMotionPacketReceived, RootMotionSource, RootMotionSources,
};
use std::collections::VecDeque;

const TICKS: u32 = 300;
const MONTAGE_TICKS: u32 = 200;
/// Каждый N-й тик сервер шлёт montage снапшот
const SNAPSHOT_INTERVAL: u32 = 10;
/// Задержка доставки снапшота (тики)
const LATENCY_TICKS: u32 = 4;

fn spawn_character(app: &mut App, role: NetRole) -> Entity {
    let mut commands = app.world_mut().commands();
    let entity = spawn_root_motion_character(&mut commands, Vec3::ZERO, role);
    app.world_mut().flush();
    entity
}

fn apply_source(app: &mut App, entity: Entity, source: RootMotionSource) {
    if let Some(mut sources) = app.world_mut().get_mut::<RootMotionSources>(entity) {
        let id = sources.0.apply_root_motion_source(source);
        println!("Applied root motion source {}", id);
    }
}

fn main() {
    let seed = 42;
    println!("Starting ROOTSYNC headless simulation (seed: {})", seed);

    let mut authority = create_headless_app(seed);
    let mut proxy = create_headless_app(seed);
    let server_character = spawn_character(&mut authority, NetRole::Authority);
    let proxy_character = spawn_character(&mut proxy, NetRole::SimulatedProxy);

    let mut last_revision = 0;
    for tick in 0..TICKS {
        match tick {
            10 => apply_source(
                &mut authority,
                server_character,
                RootMotionSource::jump(Quat::IDENTITY, 400.0, 150.0, 1.0).with_name("Jump"),
            ),
            90 => {
                let direction = {
                    let mut rng = authority.world_mut().resource_mut::<DeterministicRng>();
                    let yaw: f32 = rng.rng.gen_range(0.0..std::f32::consts::TAU);
                    Quat::from_rotation_z(yaw) * Vec3::X
                };
                apply_source(
                    &mut authority,
                    server_character,
                    RootMotionSource::constant_force(direction * 250.0, 0.5)
                        .with_name("Dash")
                        .additive(),
                );
            }
            150 => apply_source(
                &mut authority,
                server_character,
                RootMotionSource::radial_force(
                    RadialForce {
                        location: Vec3::new(600.0, 0.0, 0.0),
                        radius: 2000.0,
                        strength: 300.0,
                        is_push: false,
                        ..default()
                    },
                    1.5,
                )
                .with_name("Vortex"),
            ),
            _ => {}
        }

        authority.update();

        let replicated = authority
            .world()
            .get::<ReplicatedRootMotion>(server_character)
            .cloned()
            .unwrap_or_default();
        if replicated.revision != last_revision {
            last_revision = replicated.revision;
            proxy.world_mut().send_event(RootMotionPacketReceived {
                target: proxy_character,
                bytes: replicated.bytes,
            });
        }

        proxy.update();

        if tick % 30 == 0 {
            let server_location = authority
                .world()
                .get::<Transform>(server_character)
                .map_or(Vec3::ZERO, |transform| transform.translation);
            let proxy_location = proxy
                .world()
                .get::<Transform>(proxy_character)
                .map_or(Vec3::ZERO, |transform| transform.translation);
            println!(
                "Tick {}: server {:?}, proxy {:?}, divergence {:.3}",
                tick,
                server_location,
                proxy_location,
                server_location.distance(proxy_location)
            );
        }
    }

    run_montage_replay();

    println!("Simulation complete!");
}

/// Montage-driven proxy: клиент проигрывает montage сам, снапшоты сервера
/// приходят с задержкой и корректируются через replay буфер
fn run_montage_replay() {
    let dt = 1.0 / 60.0;
    let montage = LinearMontage::single_section(MontageId(1), 3.0, Vec3::new(200.0, 0.0, 0.0));
    let mut server_montage = montage.clone();
    let mut client_montage = montage;
    client_montage.yaw_rate = 0.05;

    let mut server_location = Vec3::ZERO;
    // Proxy стартует со сдвигом, коррекция его уберёт
    let mut proxy = ProxyActor {
        location: Vec3::new(0.0, 25.0, 0.0),
        rotation: Quat::IDENTITY,
        ..default()
    };
    let mut buffer = RootMotionReplayBuffer::new(RootMotionConfig::default().replay_validity_window);
    let mut in_flight: VecDeque<(u32, Vec<u8>)> = VecDeque::new();

    for tick in 0..MONTAGE_TICKS {
        let now = tick as f32 * dt;

        let before = server_montage.position();
        server_montage.advance(dt);
        server_location += server_montage
            .extract_root_motion(before, server_montage.position())
            .translation;

        if tick % SNAPSHOT_INTERVAL == 0 {
            let finished = server_montage.position() >= server_montage.length();
            let snapshot = if finished {
                RepRootMotionMontage::inactive()
            } else {
                RepRootMotionMontage {
                    is_active: true,
                    montage: Some(server_montage.montage()),
                    position: server_montage.position(),
                    location: server_location,
                    rotation: Quat::IDENTITY,
                    ..default()
                }
            };
            match encode_rep_root_motion(&snapshot, DEFAULT_MAX_SOURCES_PER_MESSAGE) {
                Ok(bytes) => in_flight.push_back((tick + LATENCY_TICKS, bytes)),
                Err(error) => println!("Montage snapshot encode failed: {}", error),
            }
        }

        let before = client_montage.position();
        client_montage.advance(dt);
        let local_root_motion = client_montage.extract_root_motion(before, client_montage.position());
        simulate_root_motion(&mut proxy, dt, &local_root_motion);

        while in_flight.front().is_some_and(|(deliver_at, _)| *deliver_at <= tick) {
            let Some((_, bytes)) = in_flight.pop_front() else {
                break;
            };
            match decode_rep_root_motion(&bytes, DEFAULT_MAX_SOURCES_PER_MESSAGE) {
                Ok(snapshot) => buffer.on_rep_root_motion(snapshot, now),
                Err(error) => println!("Montage snapshot rejected: {}", error),
            }
        }

        if let Some(correction) =
            buffer.simulated_root_motion_position_fixup(&mut proxy, &client_montage, &NoMovementBases, now)
        {
            println!(
                "Montage tick {}: proxy corrected {:.3} units (server at {:?})",
                tick,
                correction.old_location.distance(correction.new_location),
                server_location
            );
        }
    }
}
