//! Снапшот montage root motion, который сервер шлёт simulated proxy

use bevy::prelude::*;

use super::archive::{Archive, BitReader, BitWriter, NetSerialize};
use super::error::{WireError, WireResult};
use crate::root_motion::{NetActorId, RootMotionSourceGroup};

/// Сетевая ссылка на montage (ассеты живут снаружи ядра)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct MontageId(pub u32);

impl NetSerialize for MontageId {
    fn net_serialize<A: Archive>(&mut self, ar: &mut A) {
        ar.serialize_u32(&mut self.0);
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RepRootMotionMontage {
    /// false = root motion кончился, proxy чистит буфер
    pub is_active: bool,
    pub montage: Option<MontageId>,
    /// Позиция на треке montage (секунды)
    pub position: f32,
    pub location: Vec3,
    pub rotation: Quat,
    pub movement_base: Option<NetActorId>,
    pub movement_base_bone_name: String,
    /// location задан относительно movement base
    pub relative_position: bool,
    /// rotation задан относительно movement base
    pub relative_rotation: bool,
    pub authoritative_root_motion: RootMotionSourceGroup,
    pub acceleration: Vec3,
    pub linear_velocity: Vec3,
}

impl RepRootMotionMontage {
    /// Пустой снапшот "root motion кончился"
    pub fn inactive() -> Self {
        Self::default()
    }

    pub fn net_serialize<A: Archive>(&mut self, ar: &mut A, max_sources: u8) -> bool {
        ar.serialize_bool(&mut self.is_active);
        ar.serialize_option(&mut self.montage);
        ar.serialize_f32(&mut self.position);
        if ar.is_loading() && !ar.is_error() && !self.position.is_finite() {
            ar.set_error(WireError::NonFinite("montage position"));
        }
        ar.serialize_vec3(&mut self.location);
        ar.serialize_quat(&mut self.rotation);
        ar.serialize_option(&mut self.movement_base);
        ar.serialize_string(&mut self.movement_base_bone_name);
        ar.serialize_bool(&mut self.relative_position);
        ar.serialize_bool(&mut self.relative_rotation);
        if ar.is_error() {
            return false;
        }
        self.authoritative_root_motion.net_serialize(ar, max_sources);
        ar.serialize_vec3(&mut self.acceleration);
        ar.serialize_vec3(&mut self.linear_velocity);
        !ar.is_error()
    }
}

pub fn encode_rep_root_motion(snapshot: &RepRootMotionMontage, max_sources: u8) -> WireResult<Vec<u8>> {
    let mut writer = BitWriter::new();
    let mut outgoing = snapshot.clone();
    outgoing.net_serialize(&mut writer, max_sources);
    writer.finish()
}

pub fn decode_rep_root_motion(bytes: &[u8], max_sources: u8) -> WireResult<RepRootMotionMontage> {
    let mut snapshot = RepRootMotionMontage::default();
    let mut reader = BitReader::new(bytes);
    snapshot.net_serialize(&mut reader, max_sources);
    reader.into_result()?;
    Ok(snapshot)
}
