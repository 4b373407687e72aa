//! Битовый архив для root motion репликации
//!
//! Одна и та же функция `net_serialize` и пишет, и читает (направление
//! задаёт архив). Формат:
//! - bool = 1 бит
//! - целые и f32 = little-endian, бит в бит
//! - строка = u16 длина + UTF-8 байты
//! - Vec3 = 3×f32, Quat = 4×f32 (x, y, z, w)
//!
//! Ошибка "залипает": после первой ошибки чтение возвращает нули,
//! запись игнорируется, вызывающий проверяет `is_error()` в конце.

use bevy::prelude::*;

use super::error::{WireError, WireResult};

/// Предел длины строки (instance name, имя кости)
pub const MAX_STRING_BYTES: usize = 1024;

pub trait Archive {
    fn is_loading(&self) -> bool;
    fn is_error(&self) -> bool;
    /// Запоминается только первая ошибка
    fn set_error(&mut self, error: WireError);

    /// Базовая операция: младшие `bits` бит значения
    fn serialize_bits(&mut self, value: &mut u64, bits: u32);

    fn is_saving(&self) -> bool {
        !self.is_loading()
    }

    fn serialize_bool(&mut self, value: &mut bool) {
        let mut raw = *value as u64;
        self.serialize_bits(&mut raw, 1);
        *value = raw != 0;
    }

    fn serialize_u8(&mut self, value: &mut u8) {
        let mut raw = *value as u64;
        self.serialize_bits(&mut raw, 8);
        *value = raw as u8;
    }

    fn serialize_u16(&mut self, value: &mut u16) {
        let mut raw = *value as u64;
        self.serialize_bits(&mut raw, 16);
        *value = raw as u16;
    }

    fn serialize_u32(&mut self, value: &mut u32) {
        let mut raw = *value as u64;
        self.serialize_bits(&mut raw, 32);
        *value = raw as u32;
    }

    fn serialize_i32(&mut self, value: &mut i32) {
        let mut raw = *value as u32 as u64;
        self.serialize_bits(&mut raw, 32);
        *value = raw as u32 as i32;
    }

    fn serialize_f32(&mut self, value: &mut f32) {
        let mut raw = value.to_bits() as u64;
        self.serialize_bits(&mut raw, 32);
        *value = f32::from_bits(raw as u32);
    }

    fn serialize_vec3(&mut self, value: &mut Vec3) {
        self.serialize_f32(&mut value.x);
        self.serialize_f32(&mut value.y);
        self.serialize_f32(&mut value.z);
    }

    fn serialize_quat(&mut self, value: &mut Quat) {
        let mut raw = value.to_array();
        for component in raw.iter_mut() {
            self.serialize_f32(component);
        }
        *value = Quat::from_array(raw);
    }

    fn serialize_string(&mut self, value: &mut String) {
        if self.is_saving() {
            if value.len() > MAX_STRING_BYTES {
                self.set_error(WireError::StringTooLong {
                    len: value.len(),
                    max: MAX_STRING_BYTES,
                });
                return;
            }
            let mut len = value.len() as u16;
            self.serialize_u16(&mut len);
            for byte in value.bytes() {
                let mut byte = byte;
                self.serialize_u8(&mut byte);
            }
            return;
        }

        let mut len = 0u16;
        self.serialize_u16(&mut len);
        if self.is_error() {
            return;
        }
        if len as usize > MAX_STRING_BYTES {
            self.set_error(WireError::StringTooLong {
                len: len as usize,
                max: MAX_STRING_BYTES,
            });
            return;
        }
        let mut bytes = vec![0u8; len as usize];
        for byte in bytes.iter_mut() {
            self.serialize_u8(byte);
        }
        if self.is_error() {
            return;
        }
        match String::from_utf8(bytes) {
            Ok(text) => *value = text,
            Err(_) => self.set_error(WireError::InvalidUtf8),
        }
    }

    /// Опциональное значение: бит присутствия + значение
    fn serialize_option<T: NetSerialize + Default>(&mut self, value: &mut Option<T>)
    where
        Self: Sized,
    {
        let mut present = value.is_some();
        self.serialize_bool(&mut present);
        if self.is_loading() {
            if !present {
                *value = None;
                return;
            }
            if value.is_none() {
                *value = Some(T::default());
            }
        }
        if let Some(inner) = value.as_mut() {
            inner.net_serialize(self);
        }
    }
}

/// Тип, который умеет симметрично писать/читать себя через Archive
pub trait NetSerialize {
    fn net_serialize<A: Archive>(&mut self, ar: &mut A);
}

/// Запись в байтовый буфер, младший бит первым
#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    bytes: Vec<u8>,
    num_bits: usize,
    error: Option<WireError>,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    pub fn error(&self) -> Option<&WireError> {
        self.error.as_ref()
    }

    /// Готовые байты (хвост последнего байта добит нулями)
    pub fn finish(self) -> WireResult<Vec<u8>> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.bytes),
        }
    }

    fn write_bit(&mut self, bit: bool) {
        let byte = self.num_bits / 8;
        if byte == self.bytes.len() {
            self.bytes.push(0);
        }
        if bit {
            self.bytes[byte] |= 1u8 << (self.num_bits % 8);
        }
        self.num_bits += 1;
    }
}

impl Archive for BitWriter {
    fn is_loading(&self) -> bool {
        false
    }

    fn is_error(&self) -> bool {
        self.error.is_some()
    }

    fn set_error(&mut self, error: WireError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn serialize_bits(&mut self, value: &mut u64, bits: u32) {
        if self.is_error() {
            return;
        }
        for i in 0..bits {
            self.write_bit((*value >> i) & 1 == 1);
        }
    }
}

/// Чтение из байтового среза
#[derive(Debug)]
pub struct BitReader<'a> {
    bytes: &'a [u8],
    position: usize,
    error: Option<WireError>,
}

impl<'a> BitReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            position: 0,
            error: None,
        }
    }

    pub fn bits_left(&self) -> usize {
        (self.bytes.len() * 8).saturating_sub(self.position)
    }

    pub fn error(&self) -> Option<&WireError> {
        self.error.as_ref()
    }

    pub fn into_result(self) -> WireResult<()> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl Archive for BitReader<'_> {
    fn is_loading(&self) -> bool {
        true
    }

    fn is_error(&self) -> bool {
        self.error.is_some()
    }

    fn set_error(&mut self, error: WireError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn serialize_bits(&mut self, value: &mut u64, bits: u32) {
        *value = 0;
        if self.is_error() {
            return;
        }
        if self.bits_left() < bits as usize {
            self.set_error(WireError::UnexpectedEof);
            return;
        }
        for i in 0..bits {
            let byte = self.bytes[self.position / 8];
            if (byte >> (self.position % 8)) & 1 == 1 {
                *value |= 1u64 << i;
            }
            self.position += 1;
        }
    }
}
