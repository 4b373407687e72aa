//! Root motion replay для montage-driven simulated proxy
//!
//! - buffer: очередь снапшотов + коррекция позиции
//! - montage: коллабораторы (montage, movement base) и `LinearMontage`

pub mod buffer;
pub mod montage;

pub use buffer::{
    restore_replicated_move, simulate_root_motion, ProxyActor, RootMotionReplayBuffer,
    SimulatedRootMotionReplicatedMove, SmoothingCorrection, MAX_REPLAY_MOVES, ROOT_MOTION_REPLAY_VALIDITY,
};
pub use montage::{LinearMontage, MontageInstance, MontageSection, MovementBaseResolver, NoMovementBases};
