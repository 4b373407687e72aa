//! Root motion sources
//!
//! Ограниченные по времени источники движения (constant/radial force,
//! move-to, jump), которые подмешиваются в velocity персонажа поверх
//! обычного movement.
//!
//! Организация:
//! - source: `RootMotionSource` + закрытый `ForceKind`
//! - forces: математика каждого вида
//! - group: `RootMotionSourceGroup` (prepare → accumulate → cleanup)
//! - reconcile: перенос авторитетного состояния на локальную группу
//! - id_mapping: server LocalID → наш LocalID

pub mod context;
pub mod curves;
pub mod flags;
pub mod forces;
pub mod group;
pub mod id_mapping;
pub mod reconcile;
pub mod source;

// Re-exports
pub use context::{MovementContext, NetActorId};
pub use curves::{FloatCurve, VectorCurve};
pub use flags::{
    AccumulateMode, FinishVelocity, LocalIdGenerator, SettingsFlags, StatusFlags,
    INVALID_ROOT_MOTION_SOURCE_ID, KINDA_SMALL_NUMBER, SMALL_NUMBER, UP,
};
pub use forces::{ConstantForce, JumpForce, MoveToDynamicForce, MoveToForce, RadialForce};
pub use group::{RootMotionSourceGroup, PRE_ADDITIVE_VELOCITY_TOLERANCE};
pub use id_mapping::{ServerIdMap, ServerToLocalIdMapping, ID_MAPPING_VALIDITY};
pub use reconcile::ReconcileReport;
pub use source::{ForceKind, RootMotionSource, SourceKind};
