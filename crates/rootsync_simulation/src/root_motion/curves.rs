//! Кривые для источников root motion
//!
//! Ключи отсортированы по времени, между ключами линейная интерполяция,
//! за пределами диапазона значение крайнего ключа. Пустая кривая = 0.

use bevy::prelude::*;

use crate::net::{Archive, NetSerialize, WireError};

/// Предел количества ключей при чтении из сети
pub const MAX_CURVE_KEYS: u16 = 1024;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloatKey {
    pub time: f32,
    pub value: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorKey {
    pub time: f32,
    pub value: Vec3,
}

/// Скалярная кривая (strength over time, falloff, time mapping)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FloatCurve {
    keys: Vec<FloatKey>,
}

/// Векторная кривая (path offset)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorCurve {
    keys: Vec<VectorKey>,
}

impl FloatCurve {
    pub fn from_keys(keys: impl IntoIterator<Item = (f32, f32)>) -> Self {
        let mut keys: Vec<FloatKey> = keys
            .into_iter()
            .map(|(time, value)| FloatKey { time, value })
            .collect();
        keys.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self { keys }
    }

    /// Прямая 0→1 на [0, 1]
    pub fn linear() -> Self {
        Self::from_keys([(0.0, 0.0), (1.0, 1.0)])
    }

    pub fn keys(&self) -> &[FloatKey] {
        &self.keys
    }

    pub fn time_range(&self) -> (f32, f32) {
        match (self.keys.first(), self.keys.last()) {
            (Some(first), Some(last)) => (first.time, last.time),
            _ => (0.0, 0.0),
        }
    }

    pub fn evaluate(&self, time: f32) -> f32 {
        let (Some(first), Some(last)) = (self.keys.first(), self.keys.last()) else {
            return 0.0;
        };
        if !time.is_finite() || time <= first.time {
            return first.value;
        }
        if time >= last.time {
            return last.value;
        }

        let Some((a, b)) = key_pair(&self.keys, time, |key| key.time) else {
            return first.value;
        };
        let span = b.time - a.time;
        if span <= f32::EPSILON {
            return b.value;
        }
        a.value + (b.value - a.value) * ((time - a.time) / span)
    }

    /// Fraction [0, 1] растягивается на диапазон ключей
    pub fn evaluate_at_fraction(&self, fraction: f32) -> f32 {
        let (min, max) = self.time_range();
        self.evaluate(min + (max - min) * fraction)
    }
}

impl VectorCurve {
    pub fn from_keys(keys: impl IntoIterator<Item = (f32, Vec3)>) -> Self {
        let mut keys: Vec<VectorKey> = keys
            .into_iter()
            .map(|(time, value)| VectorKey { time, value })
            .collect();
        keys.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self { keys }
    }

    pub fn keys(&self) -> &[VectorKey] {
        &self.keys
    }

    pub fn time_range(&self) -> (f32, f32) {
        match (self.keys.first(), self.keys.last()) {
            (Some(first), Some(last)) => (first.time, last.time),
            _ => (0.0, 0.0),
        }
    }

    pub fn evaluate(&self, time: f32) -> Vec3 {
        let (Some(first), Some(last)) = (self.keys.first(), self.keys.last()) else {
            return Vec3::ZERO;
        };
        if !time.is_finite() || time <= first.time {
            return first.value;
        }
        if time >= last.time {
            return last.value;
        }

        let Some((a, b)) = key_pair(&self.keys, time, |key| key.time) else {
            return first.value;
        };
        let span = b.time - a.time;
        if span <= f32::EPSILON {
            return b.value;
        }
        a.value.lerp(b.value, (time - a.time) / span)
    }

    pub fn evaluate_at_fraction(&self, fraction: f32) -> Vec3 {
        let (min, max) = self.time_range();
        self.evaluate(min + (max - min) * fraction)
    }
}

/// Соседние ключи вокруг time (None, если time вне отрезка ключей)
fn key_pair<K: Copy>(keys: &[K], time: f32, key_time: impl Fn(&K) -> f32) -> Option<(K, K)> {
    let next = keys.partition_point(|key| key_time(key) <= time);
    let a = keys.get(next.checked_sub(1)?)?;
    let b = keys.get(next)?;
    Some((*a, *b))
}

/// Ключи с провода: только конечные числа
fn check_keys_finite<A: Archive>(ar: &mut A, all_finite: bool) {
    if ar.is_loading() && !ar.is_error() && !all_finite {
        ar.set_error(WireError::NonFinite("curve key"));
    }
}

/// Количество ключей: u16, при чтении ограничено MAX_CURVE_KEYS
fn serialize_key_count<A: Archive>(ar: &mut A, len: usize) -> Option<usize> {
    let mut count = len.min(MAX_CURVE_KEYS as usize) as u16;
    ar.serialize_u16(&mut count);
    if ar.is_error() {
        return None;
    }
    if count > MAX_CURVE_KEYS {
        ar.set_error(WireError::Archive(format!(
            "curve has {} keys, limit is {}",
            count, MAX_CURVE_KEYS
        )));
        return None;
    }
    Some(count as usize)
}

impl NetSerialize for FloatCurve {
    fn net_serialize<A: Archive>(&mut self, ar: &mut A) {
        let Some(count) = serialize_key_count(ar, self.keys.len()) else {
            return;
        };
        if ar.is_loading() {
            self.keys = vec![FloatKey { time: 0.0, value: 0.0 }; count];
        }
        for key in self.keys.iter_mut().take(count) {
            ar.serialize_f32(&mut key.time);
            ar.serialize_f32(&mut key.value);
        }
        let all_finite = self.keys.iter().all(|key| key.time.is_finite() && key.value.is_finite());
        check_keys_finite(ar, all_finite);
        if ar.is_loading() {
            self.keys.sort_by(|a, b| a.time.total_cmp(&b.time));
        }
    }
}

impl NetSerialize for VectorCurve {
    fn net_serialize<A: Archive>(&mut self, ar: &mut A) {
        let Some(count) = serialize_key_count(ar, self.keys.len()) else {
            return;
        };
        if ar.is_loading() {
            self.keys = vec![
                VectorKey {
                    time: 0.0,
                    value: Vec3::ZERO,
                };
                count
            ];
        }
        for key in self.keys.iter_mut().take(count) {
            ar.serialize_f32(&mut key.time);
            ar.serialize_vec3(&mut key.value);
        }
        let all_finite = self.keys.iter().all(|key| key.time.is_finite() && key.value.is_finite());
        check_keys_finite(ar, all_finite);
        if ar.is_loading() {
            self.keys.sort_by(|a, b| a.time.total_cmp(&b.time));
        }
    }
}
