//! 三维体数据：体素网格加上NIfTI头（间距、方位）。

pub mod io;
pub mod stats;

use crate::error::{PrepError, Result};
use ndarray::Array3;
use nifti::NiftiHeader;

/// 头中记录的体素间距（毫米）。缺失或非法的间距按1mm处理。
pub fn spacing_of(header: &NiftiHeader) -> [f64; 3] {
    let mut spacing = [1.0; 3];
    for (axis, s) in spacing.iter_mut().enumerate() {
        let v = header.pixdim[axis + 1].abs() as f64;
        if v.is_finite() && v > 0.0 {
            *s = v;
        }
    }
    spacing
}

/// 一个病例某时间点的三维体数据。
#[derive(Clone, Debug)]
pub struct Volume<T> {
    pub data: Array3<T>,
    pub header: NiftiHeader,
}

/// 强度图像（MRI）。
pub type ScalarVolume = Volume<f32>;

/// 标签图像（掩膜）。
pub type LabelVolume = Volume<u8>;

impl<T> Volume<T> {
    #[inline]
    pub fn new(data: Array3<T>, header: NiftiHeader) -> Self {
        Self { data, header }
    }

    #[inline]
    pub fn shape(&self) -> [usize; 3] {
        let s = self.data.shape();
        [s[0], s[1], s[2]]
    }

    /// 体素间距（毫米）。
    #[inline]
    pub fn spacing(&self) -> [f64; 3] {
        spacing_of(&self.header)
    }

    /// 判断两个体数据是否位于同一体素网格上。
    #[inline]
    pub fn same_grid<U>(&self, other: &Volume<U>) -> bool {
        self.shape() == other.shape()
    }

    /// 以本体数据的几何信息包装一个新的体素数组。
    pub fn with_data<U>(&self, data: Array3<U>) -> Result<Volume<U>> {
        if data.shape() != self.data.shape() {
            return Err(PrepError::library(
                "volume",
                format!(
                    "shape {:?} does not match reference shape {:?}",
                    data.shape(),
                    self.data.shape()
                ),
            ));
        }
        Ok(Volume::new(data, self.header.clone()))
    }
}

impl LabelVolume {
    /// 前景掩膜。`label`为`None`时任何非零值都视为前景。
    pub fn foreground(&self, label: Option<u8>) -> Array3<bool> {
        match label {
            Some(l) => self.data.mapv(|v| v == l),
            None => self.data.mapv(|v| v != 0),
        }
    }

    /// 非零标签值（升序、去重）。
    pub fn label_values(&self) -> Vec<u8> {
        let mut seen = [false; 256];
        self.data.iter().for_each(|&v| seen[v as usize] = true);
        (1..=255u8).filter(|&v| seen[v as usize]).collect()
    }

    /// 本掩膜的前景体素中，落在`region`前景之外的个数。
    pub fn count_outside(&self, region: &LabelVolume) -> Result<usize> {
        if !self.same_grid(region) {
            return Err(PrepError::library(
                "containment",
                format!(
                    "mask shape {:?} differs from region shape {:?}",
                    self.shape(),
                    region.shape()
                ),
            ));
        }
        Ok(self
            .data
            .iter()
            .zip(region.data.iter())
            .filter(|(&m, &r)| m != 0 && r == 0)
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_with_spacing(sx: f32, sy: f32, sz: f32) -> NiftiHeader {
        let mut header = NiftiHeader::default();
        header.pixdim[1] = sx;
        header.pixdim[2] = sy;
        header.pixdim[3] = sz;
        header
    }

    #[test]
    fn test_spacing_falls_back_to_unit() {
        let v = Volume::new(Array3::<u8>::zeros((2, 2, 2)), header_with_spacing(0.98, -0.98, 0.0));
        let s = v.spacing();
        assert!((s[0] - 0.98).abs() < 1e-6);
        assert!((s[1] - 0.98).abs() < 1e-6);
        assert_eq!(s[2], 1.0);
    }

    #[test]
    fn test_with_data_checks_shape() {
        let v = Volume::new(Array3::<f32>::zeros((2, 3, 4)), NiftiHeader::default());
        assert!(v.with_data(Array3::<u8>::zeros((2, 3, 4))).is_ok());
        assert!(v.with_data(Array3::<u8>::zeros((4, 3, 2))).is_err());
    }

    #[test]
    fn test_label_values() {
        let mut data = Array3::<u8>::zeros((2, 2, 2));
        data[[0, 0, 0]] = 3;
        data[[1, 1, 1]] = 1;
        data[[1, 0, 1]] = 3;
        let v = Volume::new(data, NiftiHeader::default());
        assert_eq!(v.label_values(), vec![1, 3]);
        assert_eq!(v.foreground(Some(3)).iter().filter(|&&b| b).count(), 2);
        assert_eq!(v.foreground(None).iter().filter(|&&b| b).count(), 3);
    }

    #[test]
    fn test_count_outside() {
        let mut region = Array3::<u8>::zeros((2, 2, 2));
        region[[0, 0, 0]] = 1;
        let mut mask = region.clone();
        let region = Volume::new(region, NiftiHeader::default());
        assert_eq!(Volume::new(mask.clone(), NiftiHeader::default()).count_outside(&region).unwrap(), 0);
        mask[[1, 1, 1]] = 2;
        let mask = Volume::new(mask, NiftiHeader::default());
        assert_eq!(mask.count_outside(&region).unwrap(), 1);
        let other = Volume::new(Array3::<u8>::zeros((1, 2, 2)), NiftiHeader::default());
        assert!(mask.count_outside(&other).is_err());
    }
}
