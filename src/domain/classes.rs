//! Class registry for segmentation labels.
//!
//! Class ids are small contiguous integers, so the registry is a vector
//! indexed by id rather than a map.

use crate::core::config::ConfigError;
use crate::core::constants::FALLBACK_CLASS_COLOR;
use serde::{Deserialize, Serialize};

/// Id of the background class. Background pixels are never blended in overlays.
pub const BACKGROUND_CLASS_ID: u8 = 0;

/// A single entry of the class table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassInfo {
    /// Class id, equal to its index in the registry.
    pub id: u8,
    /// Short label, e.g. "SR".
    pub name: String,
    /// Human readable label, e.g. "Superior Rectus".
    pub full_name: String,
    /// RGB color used for masks and legends.
    pub color: [u8; 3],
}

impl ClassInfo {
    /// Creates a new class entry.
    pub fn new(id: u8, name: &str, full_name: &str, color: [u8; 3]) -> Self {
        Self {
            id,
            name: name.to_string(),
            full_name: full_name.to_string(),
            color,
        }
    }

    /// Color formatted as `#rrggbb`.
    pub fn hex_color(&self) -> String {
        format!(
            "#{:02x}{:02x}{:02x}",
            self.color[0], self.color[1], self.color[2]
        )
    }
}

/// Orbital MRI structures: (short name, full name, color).
const ORBITAL_MRI_CLASSES: [(&str, &str, [u8; 3]); 10] = [
    ("Background", "Background", [0, 0, 0]),
    ("SR", "Superior Rectus", [255, 0, 0]),
    ("LR", "Lateral Rectus", [0, 255, 0]),
    ("MR", "Medial Rectus", [0, 0, 255]),
    ("IR", "Inferior Rectus", [255, 255, 0]),
    ("ON", "Optic Nerve", [255, 0, 255]),
    ("FAT", "Orbital Fat", [0, 255, 255]),
    ("LG", "Lacrimal Gland", [255, 128, 0]),
    ("SO", "Superior Oblique", [128, 0, 255]),
    ("EB", "Eyeball", [128, 128, 128]),
];

/// Lookup table from class id to name and color.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassRegistry {
    classes: Vec<ClassInfo>,
}

impl ClassRegistry {
    /// Creates a registry from an explicit table.
    ///
    /// # Errors
    ///
    /// Returns an error if the table is empty, has more than 256 entries, or
    /// if ids are not exactly `0..len` in order.
    pub fn new(classes: Vec<ClassInfo>) -> Result<Self, ConfigError> {
        if classes.is_empty() || classes.len() > usize::from(u8::MAX) + 1 {
            return Err(ConfigError::InvalidConfig {
                message: format!(
                    "class table must have between 1 and 256 entries, got {}",
                    classes.len()
                ),
            });
        }
        for (index, class) in classes.iter().enumerate() {
            if usize::from(class.id) != index {
                return Err(ConfigError::InvalidConfig {
                    message: format!(
                        "class ids must be contiguous from 0: entry {} has id {}",
                        index, class.id
                    ),
                });
            }
        }
        Ok(Self { classes })
    }

    /// The orbital MRI table used by the reference model.
    pub fn orbital_mri() -> Self {
        let classes = ORBITAL_MRI_CLASSES
            .iter()
            .enumerate()
            .map(|(id, (name, full_name, color))| ClassInfo::new(id as u8, name, full_name, *color))
            .collect();
        Self { classes }
    }

    /// Returns the entry for a class id, if registered.
    pub fn get(&self, id: u8) -> Option<&ClassInfo> {
        self.classes.get(usize::from(id))
    }

    /// Short name for a class id, or `Unknown(<id>)`.
    pub fn name(&self, id: u8) -> String {
        match self.get(id) {
            Some(class) => class.name.clone(),
            None => format!("Unknown({})", id),
        }
    }

    /// Color for a class id, or the neutral fallback gray.
    #[inline]
    pub fn color(&self, id: u8) -> [u8; 3] {
        self.get(id).map_or(FALLBACK_CLASS_COLOR, |class| class.color)
    }

    /// Dense color table covering every possible `u8` id.
    pub fn color_lut(&self) -> [[u8; 3]; 256] {
        let mut lut = [FALLBACK_CLASS_COLOR; 256];
        for class in &self.classes {
            lut[usize::from(class.id)] = class.color;
        }
        lut
    }

    /// All registered classes in id order.
    pub fn classes(&self) -> &[ClassInfo] {
        &self.classes
    }

    /// Number of registered classes.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns `true` if no classes are registered.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::orbital_mri()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orbital_table() {
        let registry = ClassRegistry::default();
        assert_eq!(registry.len(), 10);
        assert_eq!(registry.name(0), "Background");
        assert_eq!(registry.name(5), "ON");
        assert_eq!(registry.get(7).unwrap().full_name, "Lacrimal Gland");
        assert_eq!(registry.color(1), [255, 0, 0]);
    }

    #[test]
    fn test_unknown_class_fallback() {
        let registry = ClassRegistry::default();
        assert_eq!(registry.name(42), "Unknown(42)");
        assert_eq!(registry.color(42), FALLBACK_CLASS_COLOR);
        assert_eq!(registry.color_lut()[42], FALLBACK_CLASS_COLOR);
        assert_eq!(registry.color_lut()[3], [0, 0, 255]);
    }

    #[test]
    fn test_hex_color() {
        let registry = ClassRegistry::default();
        assert_eq!(registry.get(7).unwrap().hex_color(), "#ff8000");
    }

    #[test]
    fn test_non_contiguous_ids_rejected() {
        let classes = vec![
            ClassInfo::new(0, "BG", "Background", [0, 0, 0]),
            ClassInfo::new(2, "X", "Skipped", [1, 2, 3]),
        ];
        assert!(ClassRegistry::new(classes).is_err());
        assert!(ClassRegistry::new(Vec::new()).is_err());
    }
}
