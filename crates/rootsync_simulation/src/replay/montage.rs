//! Коллабораторы replay: montage и movement base
//!
//! Проигрывание анимации живёт снаружи ядра, replay нужны только
//! позиция на треке, секции и извлечение root motion между позициями.

use bevy::prelude::*;

use crate::net::MontageId;
use crate::root_motion::NetActorId;

/// Проигрываемый сейчас montage на клиенте
pub trait MontageInstance {
    fn montage(&self) -> MontageId;
    fn position(&self) -> f32;
    fn play_rate(&self) -> f32;
    fn section_index_from_position(&self, position: f32) -> Option<usize>;
    /// Куда перейдёт секция по окончании (та же = цикл)
    fn next_section_id(&self, section: usize) -> Option<usize>;
    fn section_length(&self, section: usize) -> f32;
    /// Root motion в local space персонажа между двумя позициями трека
    fn extract_root_motion(&self, start: f32, end: f32) -> Transform;
}

/// Мировой transform movement base (платформа, кость)
pub trait MovementBaseResolver {
    /// None, если base не годится для relative location
    fn base_transform(&self, base: NetActorId, bone_name: &str) -> Option<Transform>;
}

/// Без movement base: любой relative move неприменим
pub struct NoMovementBases;

impl MovementBaseResolver for NoMovementBases {
    fn base_transform(&self, _base: NetActorId, _bone_name: &str) -> Option<Transform> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MontageSection {
    pub start: f32,
    pub length: f32,
    pub next: Option<usize>,
}

/// Montage с постоянным root motion: скорость и yaw-rate в local space
///
/// Используется headless демо и тестами вместо анимационного движка.
#[derive(Debug, Clone)]
pub struct LinearMontage {
    pub id: MontageId,
    pub sections: Vec<MontageSection>,
    pub position: f32,
    pub play_rate: f32,
    pub root_velocity: Vec3,
    pub yaw_rate: f32,
}

impl LinearMontage {
    /// Одна секция [0, length], без цикла
    pub fn single_section(id: MontageId, length: f32, root_velocity: Vec3) -> Self {
        Self {
            id,
            sections: vec![MontageSection {
                start: 0.0,
                length,
                next: None,
            }],
            position: 0.0,
            play_rate: 1.0,
            root_velocity,
            yaw_rate: 0.0,
        }
    }

    pub fn looping(mut self) -> Self {
        for (index, section) in self.sections.iter_mut().enumerate() {
            section.next = Some(index);
        }
        self
    }

    pub fn length(&self) -> f32 {
        self.sections
            .last()
            .map_or(0.0, |section| section.start + section.length)
    }

    /// Шаг проигрывания (клиентская анимация)
    pub fn advance(&mut self, delta_time: f32) {
        self.position = (self.position + delta_time * self.play_rate).clamp(0.0, self.length());
    }
}

impl MontageInstance for LinearMontage {
    fn montage(&self) -> MontageId {
        self.id
    }

    fn position(&self) -> f32 {
        self.position
    }

    fn play_rate(&self) -> f32 {
        self.play_rate
    }

    fn section_index_from_position(&self, position: f32) -> Option<usize> {
        let last = self.sections.len().checked_sub(1)?;
        self.sections.iter().enumerate().find_map(|(index, section)| {
            let end = section.start + section.length;
            let inside = position >= section.start
                && (position < end || (index == last && position <= end));
            inside.then_some(index)
        })
    }

    fn next_section_id(&self, section: usize) -> Option<usize> {
        self.sections.get(section)?.next
    }

    fn section_length(&self, section: usize) -> f32 {
        self.sections.get(section).map_or(0.0, |section| section.length)
    }

    fn extract_root_motion(&self, start: f32, end: f32) -> Transform {
        let span = end - start;
        Transform {
            translation: self.root_velocity * span,
            rotation: Quat::from_rotation_z(self.yaw_rate * span),
            ..default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_sections() -> LinearMontage {
        LinearMontage {
            sections: vec![
                MontageSection { start: 0.0, length: 1.0, next: Some(1) },
                MontageSection { start: 1.0, length: 2.0, next: None },
            ],
            ..LinearMontage::single_section(MontageId(1), 3.0, Vec3::X * 100.0)
        }
    }

    #[test]
    fn test_sections_by_position() {
        let montage = two_sections();
        assert_eq!(montage.section_index_from_position(0.5), Some(0));
        assert_eq!(montage.section_index_from_position(1.0), Some(1));
        assert_eq!(montage.section_index_from_position(3.0), Some(1));
        assert_eq!(montage.section_index_from_position(3.5), None);
        assert_eq!(montage.next_section_id(0), Some(1));
    }

    #[test]
    fn test_extract_scales_with_span() {
        let montage = two_sections();
        let motion = montage.extract_root_motion(0.25, 0.75);
        assert!((motion.translation - Vec3::X * 50.0).length() < 1e-4);
    }
}
