//! Кодек группы root motion источников
//!
//! Формат группы:
//! ```text
//! [has_additive:1][has_override:1][has_override_ignore_z:1]
//! [last_pre_additive_velocity:vec3][is_additive_velocity_applied:1]
//! [last_accumulated_settings:u8]
//! [active: count:u8 + (tag:u8 + поля) × count]
//! [pending: count:u8 + (tag:u8 + поля) × count]
//! ```
//! active и pending делят один лимит на сообщение: сначала active,
//! остаток достаётся pending. Лишнее отбрасывается с warning, это не ошибка.

use super::archive::{Archive, BitReader, BitWriter};
use super::error::WireResult;
use super::registry;
use crate::logger;
use crate::root_motion::{RootMotionSource, RootMotionSourceGroup, SettingsFlags};

/// Лимит источников в одном сообщении по умолчанию
pub const DEFAULT_MAX_SOURCES_PER_MESSAGE: u8 = 255;

/// Массив источников: count + (tag + поля) на каждый
///
/// При чтении существующий источник того же вида переиспользуется, иначе
/// создаётся пустой по тегу. На ошибке список обрезается до успешно
/// прочитанных, возвращается false.
pub fn net_serialize_sources<A: Archive>(
    ar: &mut A,
    sources: &mut Vec<RootMotionSource>,
    max_sources: u8,
) -> bool {
    let mut count = 0u8;

    if ar.is_saving() {
        if sources.len() > max_sources as usize {
            logger::log_warning(&format!(
                "Too many root motion sources ({}!) to net serialize. Clamping to {}",
                sources.len(),
                max_sources
            ));
        }
        count = sources.len().min(max_sources as usize) as u8;
    }

    ar.serialize_u8(&mut count);
    if ar.is_error() {
        if ar.is_loading() {
            sources.clear();
        }
        return false;
    }

    if ar.is_saving() {
        for source in sources.iter_mut().take(count as usize) {
            let mut tag = registry::type_tag(source.kind());
            ar.serialize_u8(&mut tag);
            if !source.net_serialize(ar) {
                return false;
            }
        }
        return true;
    }

    for index in 0..count as usize {
        let mut tag = registry::BASE_TYPE_TAG;
        ar.serialize_u8(&mut tag);
        if ar.is_error() {
            sources.truncate(index);
            return false;
        }

        let kind = match registry::kind_from_tag(tag) {
            Ok(kind) => kind,
            Err(error) => {
                logger::log_error(&format!("Root motion source array: {}", error));
                ar.set_error(error);
                sources.truncate(index);
                return false;
            }
        };

        let reusable = sources.get(index).is_some_and(|existing| existing.kind() == kind);
        if !reusable {
            let fresh = RootMotionSource::default_of(kind);
            if index < sources.len() {
                sources[index] = fresh;
            } else {
                sources.push(fresh);
            }
        }

        if !sources[index].net_serialize(ar) {
            logger::log_warning(&format!(
                "Root motion source {} failed to net serialize, dropping the rest",
                index
            ));
            sources.truncate(index);
            return false;
        }
    }

    sources.truncate(count as usize);
    true
}

impl RootMotionSourceGroup {
    /// Симметричная запись/чтение группы (ID-генератор и catch-up лимиты не передаются)
    pub fn net_serialize<A: Archive>(&mut self, ar: &mut A, max_sources: u8) -> bool {
        ar.serialize_bool(&mut self.has_additive_sources);
        ar.serialize_bool(&mut self.has_override_sources);
        ar.serialize_bool(&mut self.has_override_sources_with_ignore_z_accumulate);
        ar.serialize_vec3(&mut self.last_pre_additive_velocity);
        ar.serialize_bool(&mut self.is_additive_velocity_applied);

        let mut settings = self.last_accumulated_settings.bits();
        ar.serialize_u8(&mut settings);
        if ar.is_loading() {
            self.last_accumulated_settings = SettingsFlags::from_bits_truncate(settings);
        }
        if ar.is_error() {
            return false;
        }

        if !net_serialize_sources(ar, &mut self.active, max_sources) {
            if ar.is_loading() {
                self.pending.clear();
            }
            return false;
        }

        let active_written = self.active.len().min(max_sources as usize);
        let pending_budget = (max_sources as usize).saturating_sub(active_written) as u8;
        net_serialize_sources(ar, &mut self.pending, pending_budget)
    }
}

/// Группа → байты
pub fn encode_group(group: &RootMotionSourceGroup, max_sources: u8) -> WireResult<Vec<u8>> {
    let mut writer = BitWriter::new();
    let mut outgoing = group.clone();
    outgoing.net_serialize(&mut writer, max_sources);
    writer.finish()
}

/// Читает поверх существующей группы (источники того же вида переиспользуются)
pub fn decode_group_into(
    bytes: &[u8],
    group: &mut RootMotionSourceGroup,
    max_sources: u8,
) -> WireResult<()> {
    let mut reader = BitReader::new(bytes);
    group.net_serialize(&mut reader, max_sources);
    reader.into_result()
}

pub fn decode_group(bytes: &[u8], max_sources: u8) -> WireResult<RootMotionSourceGroup> {
    let mut group = RootMotionSourceGroup::new();
    decode_group_into(bytes, &mut group, max_sources)?;
    Ok(group)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::WireError;
    use crate::root_motion::{FloatCurve, MovementContext, RadialForce, SourceKind};
    use bevy::prelude::*;

    const DT: f32 = 1.0 / 60.0;

    fn mixed_group() -> RootMotionSourceGroup {
        let mut group = RootMotionSourceGroup::new();
        group.apply_root_motion_source(
            RootMotionSource::constant_force(Vec3::new(0.0, 0.0, 300.0), 0.5)
                .with_name("Launch")
                .additive(),
        );
        group.apply_root_motion_source(
            RootMotionSource::jump(Quat::from_rotation_z(0.3), 400.0, 150.0, 1.0).with_priority(2),
        );
        group.prepare_root_motion(DT, &MovementContext::default(), false);
        group.apply_root_motion_source(RootMotionSource::radial_force(
            RadialForce {
                radius: 500.0,
                strength: 120.0,
                ..default()
            },
            2.0,
        ));
        group.last_pre_additive_velocity = Vec3::new(10.0, 0.0, -5.0);
        group.is_additive_velocity_applied = true;
        group
    }

    #[test]
    fn test_group_survives_the_wire() {
        let group = mixed_group();
        let bytes = encode_group(&group, DEFAULT_MAX_SOURCES_PER_MESSAGE).unwrap();
        let decoded = decode_group(&bytes, DEFAULT_MAX_SOURCES_PER_MESSAGE).unwrap();

        assert_eq!(decoded, group);
        assert_eq!(decoded.active.len(), 2);
        assert_eq!(decoded.pending.len(), 1);
        assert_eq!(decoded.pending[0].kind(), SourceKind::RadialForce);
        assert_eq!(decoded.last_accumulated_settings, group.last_accumulated_settings);
    }

    #[test]
    fn test_cap_shared_between_active_and_pending() {
        let group = mixed_group();

        // 2 активных занимают весь лимит, pending не пишется
        let bytes = encode_group(&group, 2).unwrap();
        let decoded = decode_group(&bytes, 2).unwrap();
        assert_eq!(decoded.active.len(), 2);
        assert!(decoded.pending.is_empty());

        // Лимит 1: только самый приоритетный активный
        let bytes = encode_group(&group, 1).unwrap();
        let decoded = decode_group(&bytes, 1).unwrap();
        assert_eq!(decoded.active.len(), 1);
        assert_eq!(decoded.active[0].priority, 2);
    }

    #[test]
    fn test_existing_entry_of_same_kind_is_reused() {
        let group = mixed_group();
        let bytes = encode_group(&group, DEFAULT_MAX_SOURCES_PER_MESSAGE).unwrap();

        let mut target = RootMotionSourceGroup::new();
        target.active.push(RootMotionSource::jump(Quat::IDENTITY, 1.0, 1.0, 9.0));
        target.active.push(RootMotionSource::move_to(Vec3::ZERO, Vec3::X, 1.0));
        target.active.push(RootMotionSource::move_to(Vec3::ZERO, Vec3::X, 1.0));
        decode_group_into(&bytes, &mut target, DEFAULT_MAX_SOURCES_PER_MESSAGE).unwrap();

        assert_eq!(target, group);
        assert_eq!(target.active.len(), 2);
    }

    /// Пустой заголовок группы + active count = 1 + указанный тег
    fn envelope_with_tag(tag: u8) -> Vec<u8> {
        let mut writer = BitWriter::new();
        let mut flag = false;
        for _ in 0..3 {
            writer.serialize_bool(&mut flag);
        }
        let mut velocity = Vec3::ZERO;
        writer.serialize_vec3(&mut velocity);
        writer.serialize_bool(&mut flag);
        let mut settings = 0u8;
        writer.serialize_u8(&mut settings);
        let mut count = 1u8;
        writer.serialize_u8(&mut count);
        let mut tag = tag;
        writer.serialize_u8(&mut tag);
        writer.finish().unwrap()
    }

    #[test]
    fn test_base_and_unknown_tags_rejected() {
        let result = decode_group(&envelope_with_tag(registry::BASE_TYPE_TAG), 255);
        assert_eq!(result.unwrap_err(), WireError::NotARootMotionSource(0));

        let mut target = mixed_group();
        let result = decode_group_into(&envelope_with_tag(42), &mut target, 255);
        assert_eq!(result, Err(WireError::UnknownTypeTag(42)));
        assert!(target.active.is_empty());
        assert!(target.pending.is_empty());
    }

    #[test]
    fn test_non_finite_values_rejected() {
        let mut group = RootMotionSourceGroup::new();
        let mut knockback = RootMotionSource::constant_force(Vec3::X * 100.0, 1.0);
        knockback.set_time(f32::NAN);
        group.active.push(knockback);
        let bytes = encode_group(&group, DEFAULT_MAX_SOURCES_PER_MESSAGE).unwrap();
        let result = decode_group(&bytes, DEFAULT_MAX_SOURCES_PER_MESSAGE);
        assert_eq!(result.unwrap_err(), WireError::NonFinite("current time"));

        let mut group = RootMotionSourceGroup::new();
        group.active.push(RootMotionSource::radial_force(
            RadialForce {
                radius: 100.0,
                strength: 50.0,
                strength_over_time: Some(FloatCurve::from_keys([(-f32::NAN, 1.0), (1.0, 0.0)])),
                ..default()
            },
            1.0,
        ));
        let bytes = encode_group(&group, DEFAULT_MAX_SOURCES_PER_MESSAGE).unwrap();
        let mut target = RootMotionSourceGroup::new();
        let result = decode_group_into(&bytes, &mut target, DEFAULT_MAX_SOURCES_PER_MESSAGE);
        assert_eq!(result, Err(WireError::NonFinite("curve key")));
        assert!(target.active.is_empty());
    }

    #[test]
    fn test_zero_duration_move_to_rejected() {
        let mut group = RootMotionSourceGroup::new();
        group.active.push(RootMotionSource::move_to(Vec3::ZERO, Vec3::X * 100.0, 0.0));
        let bytes = encode_group(&group, DEFAULT_MAX_SOURCES_PER_MESSAGE).unwrap();
        let result = decode_group(&bytes, DEFAULT_MAX_SOURCES_PER_MESSAGE);
        assert_eq!(result.unwrap_err(), WireError::InvalidDuration("MoveToForce"));
    }

    #[test]
    fn test_truncated_input_keeps_decoded_prefix() {
        let group = mixed_group();
        let bytes = encode_group(&group, DEFAULT_MAX_SOURCES_PER_MESSAGE).unwrap();

        let mut target = RootMotionSourceGroup::new();
        let cut = &bytes[..bytes.len() - 4];
        let result = decode_group_into(cut, &mut target, DEFAULT_MAX_SOURCES_PER_MESSAGE);

        assert_eq!(result, Err(WireError::UnexpectedEof));
        assert_eq!(target.active.len(), 2);
        assert!(target.pending.is_empty());
    }
}
