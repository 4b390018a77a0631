//! Per-class pixel statistics.

use crate::domain::classes::ClassRegistry;
use ndarray::{ArrayBase, Data, Dimension};
use serde::{Deserialize, Serialize};

/// Pixel count and share of one class in a label array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassStatistic {
    pub class_id: u8,
    pub class_name: String,
    pub pixel_count: u64,
    /// Share of all elements in percent, rounded to two decimals.
    pub percentage: f64,
    pub color: [u8; 3],
}

/// Counts every class id present in `labels`.
///
/// Returns one entry per distinct id in ascending id order. Absent classes are
/// omitted. Ids without a registry entry are reported as `Unknown(<id>)` in the
/// fallback color.
pub fn class_statistics<S, D>(labels: &ArrayBase<S, D>, registry: &ClassRegistry) -> Vec<ClassStatistic>
where
    S: Data<Elem = u8>,
    D: Dimension,
{
    let total = labels.len();
    if total == 0 {
        return Vec::new();
    }

    let mut histogram = [0u64; 256];
    match labels.as_slice_memory_order() {
        Some(data) => data.iter().for_each(|&v| histogram[usize::from(v)] += 1),
        None => labels.iter().for_each(|&v| histogram[usize::from(v)] += 1),
    }

    histogram
        .iter()
        .enumerate()
        .filter(|(_, count)| **count > 0)
        .map(|(id, &count)| {
            let id = id as u8;
            ClassStatistic {
                class_id: id,
                class_name: registry.name(id),
                pixel_count: count,
                percentage: round2(count as f64 * 100.0 / total as f64),
                color: registry.color(id),
            }
        })
        .collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::FALLBACK_CLASS_COLOR;
    use ndarray::{Array2, Array3, array};

    #[test]
    fn test_all_background() {
        let labels = Array2::<u8>::zeros((256, 256));
        let stats = class_statistics(&labels, &ClassRegistry::default());
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].class_id, 0);
        assert_eq!(stats[0].class_name, "Background");
        assert_eq!(stats[0].pixel_count, 256 * 256);
        assert_eq!(stats[0].percentage, 100.0);
    }

    #[test]
    fn test_sorted_and_rounded() {
        let labels = array![[3u8, 1, 1], [0, 0, 0]];
        let stats = class_statistics(&labels, &ClassRegistry::default());
        let ids: Vec<u8> = stats.iter().map(|s| s.class_id).collect();
        assert_eq!(ids, vec![0, 1, 3]);
        assert_eq!(stats[1].percentage, 33.33);
        assert_eq!(stats[2].percentage, 16.67);
        assert_eq!(stats[2].color, [0, 0, 255]);
    }

    #[test]
    fn test_unknown_class() {
        let labels = array![[200u8]];
        let stats = class_statistics(&labels, &ClassRegistry::default());
        assert_eq!(stats[0].class_name, "Unknown(200)");
        assert_eq!(stats[0].color, FALLBACK_CLASS_COLOR);
    }

    #[test]
    fn test_volume_counts_sum_to_total() {
        let volume = Array3::from_shape_fn((4, 4, 4), |(_, _, k)| (k + 1) as u8);
        let stats = class_statistics(&volume, &ClassRegistry::default());
        assert_eq!(stats.len(), 4);
        let total: u64 = stats.iter().map(|s| s.pixel_count).sum();
        assert_eq!(total, 64);
        assert!(stats.iter().all(|s| s.class_id != 0));
    }

    #[test]
    fn test_strided_view() {
        let volume = Array3::from_shape_fn((2, 2, 3), |(_, _, k)| k as u8);
        let slice = volume.index_axis(ndarray::Axis(2), 2);
        let stats = class_statistics(&slice, &ClassRegistry::default());
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].class_id, 2);
        assert_eq!(stats[0].pixel_count, 4);
    }
}
