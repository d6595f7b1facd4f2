//! 标签区域内的强度统计，以及基于该统计的z-score标准化。

use super::{LabelVolume, ScalarVolume};
use crate::error::{PrepError, Result};

/// 某一标签值覆盖区域内的强度统计量。
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LabelStatistics {
    pub count: usize,
    pub mean: f64,
    /// 样本标准差（分母为`count - 1`）。
    pub sigma: f64,
    pub min: f64,
    pub max: f64,
}

/// 计算`labels == label`区域内`image`的统计量。两者必须位于同一网格上。
pub fn label_statistics(
    image: &ScalarVolume,
    labels: &LabelVolume,
    label: u8,
) -> Result<LabelStatistics> {
    if !image.same_grid(labels) {
        return Err(PrepError::library(
            "label statistics",
            format!(
                "image shape {:?} differs from label shape {:?}",
                image.shape(),
                labels.shape()
            ),
        ));
    }

    let mut count = 0usize;
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for (&v, _) in image
        .data
        .iter()
        .zip(labels.data.iter())
        .filter(|(_, &l)| l == label)
    {
        let v = v as f64;
        count += 1;
        sum += v;
        sum_sq += v * v;
        min = min.min(v);
        max = max.max(v);
    }

    if count < 2 {
        return Err(PrepError::library(
            "label statistics",
            format!("label {label} covers {count} voxel(s), at least 2 required"),
        ));
    }
    let mean = sum / count as f64;
    let variance = ((sum_sq - sum * sum / count as f64) / (count - 1) as f64).max(0.0);
    Ok(LabelStatistics {
        count,
        mean,
        sigma: variance.sqrt(),
        min,
        max,
    })
}

/// `(voxel - mean) / sigma`，作用于每一个体素（包括掩膜之外的背景）。
pub fn standardize(image: &mut ScalarVolume, stats: &LabelStatistics) -> Result<()> {
    if !(stats.sigma.is_finite() && stats.sigma > 0.0) {
        return Err(PrepError::library(
            "standardize",
            format!("standard deviation {} is not usable", stats.sigma),
        ));
    }
    let (mean, sigma) = (stats.mean, stats.sigma);
    image
        .data
        .mapv_inplace(|v| ((v as f64 - mean) / sigma) as f32);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::Volume;
    use ndarray::Array3;
    use nifti::NiftiHeader;

    fn fixture() -> (ScalarVolume, LabelVolume) {
        let image = Array3::from_shape_vec((1, 2, 3), vec![2.0_f32, 4.0, 6.0, 100.0, 0.0, 8.0])
            .unwrap();
        let labels = Array3::from_shape_vec((1, 2, 3), vec![1_u8, 1, 1, 0, 2, 1]).unwrap();
        (
            Volume::new(image, NiftiHeader::default()),
            Volume::new(labels, NiftiHeader::default()),
        )
    }

    #[test]
    fn test_statistics_restricted_to_label() {
        let (image, labels) = fixture();
        let s = label_statistics(&image, &labels, 1).unwrap();
        assert_eq!(s.count, 4);
        assert!((s.mean - 5.0).abs() < 1e-12);
        // 样本方差: (9 + 1 + 1 + 9) / 3
        assert!((s.sigma - (20.0_f64 / 3.0).sqrt()).abs() < 1e-12);
        assert_eq!(s.min, 2.0);
        assert_eq!(s.max, 8.0);
    }

    #[test]
    fn test_standardize_touches_background() {
        let (mut image, labels) = fixture();
        let s = label_statistics(&image, &labels, 1).unwrap();
        standardize(&mut image, &s).unwrap();
        let expected = ((100.0 - 5.0) / s.sigma) as f32;
        assert!((image.data[[0, 1, 0]] - expected).abs() < 1e-4);
        let masked: Vec<f32> = image
            .data
            .iter()
            .zip(labels.data.iter())
            .filter(|(_, &l)| l == 1)
            .map(|(&v, _)| v)
            .collect();
        let mean: f32 = masked.iter().sum::<f32>() / masked.len() as f32;
        assert!(mean.abs() < 1e-5);
    }

    #[test]
    fn test_degenerate_label() {
        let (image, labels) = fixture();
        assert!(label_statistics(&image, &labels, 2).is_err());
        assert!(label_statistics(&image, &labels, 7).is_err());
        let flat = LabelStatistics {
            count: 3,
            mean: 1.0,
            sigma: 0.0,
            min: 1.0,
            max: 1.0,
        };
        let (mut image, _) = fixture();
        assert!(standardize(&mut image, &flat).is_err());
    }
}
