//! Type tag ↔ вид источника
//!
//! Тег 0 зарезервирован за абстрактной базой: пир, приславший его,
//! пытается сериализовать "не источник". Остальные неизвестные теги
//! тоже отвергаются, полиморфной фабрики по имени типа нет.

use super::error::{WireError, WireResult};
use crate::root_motion::SourceKind;

pub const BASE_TYPE_TAG: u8 = 0;

pub fn type_tag(kind: SourceKind) -> u8 {
    match kind {
        SourceKind::ConstantForce => 1,
        SourceKind::RadialForce => 2,
        SourceKind::MoveTo => 3,
        SourceKind::MoveToDynamic => 4,
        SourceKind::Jump => 5,
    }
}

pub fn kind_from_tag(tag: u8) -> WireResult<SourceKind> {
    match tag {
        BASE_TYPE_TAG => Err(WireError::NotARootMotionSource(tag)),
        1 => Ok(SourceKind::ConstantForce),
        2 => Ok(SourceKind::RadialForce),
        3 => Ok(SourceKind::MoveTo),
        4 => Ok(SourceKind::MoveToDynamic),
        5 => Ok(SourceKind::Jump),
        other => Err(WireError::UnknownTypeTag(other)),
    }
}
