//! 分割段编辑效果：逻辑运算与外扩（Margin）。

use super::voxel::{ball_offsets, VoxelIter};
use super::Segmentation;
use crate::error::{PrepError, Result};
use ndarray::Array3;
use tracing::trace;

/// 以`modifier`分割段修改`target`分割段的逻辑运算。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogicalOperation {
    /// target = modifier
    Copy,
    /// target = target ∪ modifier
    Union,
    /// target = target ∩ modifier
    Intersect,
    /// target = target \ modifier
    Subtract,
}

impl Segmentation {
    /// 对`target`原地施加逻辑运算。
    pub fn apply_logical(
        &mut self,
        target: &str,
        op: LogicalOperation,
        modifier: &str,
    ) -> Result<()> {
        let modifier_mask = self.segment(modifier)?.mask.clone();
        let seg = self.segment_mut(target)?;
        match op {
            LogicalOperation::Copy => seg.mask.assign(&modifier_mask),
            LogicalOperation::Union => seg.mask.zip_mut_with(&modifier_mask, |t, &m| *t |= m),
            LogicalOperation::Intersect => {
                seg.mask.zip_mut_with(&modifier_mask, |t, &m| *t &= m)
            }
            LogicalOperation::Subtract => {
                seg.mask.zip_mut_with(&modifier_mask, |t, &m| *t &= !m)
            }
        }
        trace!(segment = target, modifier, ?op, voxels = seg.voxel_count(), "逻辑运算完成");
        Ok(())
    }

    /// 对`target`原地外扩`margin_mm`毫米：正值膨胀，负值腐蚀，零不做改变。
    ///
    /// 结构元素为按体素间距换算的椭球；腐蚀时图像范围之外视为背景。
    pub fn apply_margin(&mut self, target: &str, margin_mm: f64) -> Result<()> {
        if !margin_mm.is_finite() {
            return Err(PrepError::library(
                "margin",
                format!("margin `{margin_mm}` is not a finite distance"),
            ));
        }
        if margin_mm == 0.0 {
            self.segment(target)?;
            return Ok(());
        }
        let spacing = self.spacing();
        let shape = self.shape();
        let seg = self.segment_mut(target)?;
        seg.mask = if margin_mm > 0.0 {
            dilate(&seg.mask, shape, margin_mm, spacing)
        } else {
            erode(&seg.mask, shape, margin_mm, spacing)
        };
        trace!(segment = target, margin_mm, voxels = seg.voxel_count(), "外扩完成");
        Ok(())
    }
}

fn dilate(mask: &Array3<bool>, shape: [usize; 3], radius_mm: f64, spacing: [f64; 3]) -> Array3<bool> {
    let offsets = ball_offsets(radius_mm, spacing);
    let mut out = mask.clone();
    for voxel in VoxelIter::new(shape).filter(|v| mask[v.to_index()]) {
        for &o in offsets.iter() {
            if let Some(n) = voxel.shifted(o, shape) {
                out[n.to_index()] = true;
            }
        }
    }
    out
}

fn erode(mask: &Array3<bool>, shape: [usize; 3], radius_mm: f64, spacing: [f64; 3]) -> Array3<bool> {
    let offsets = ball_offsets(radius_mm, spacing);
    let mut out = Array3::from_elem(shape, false);
    for voxel in VoxelIter::new(shape).filter(|v| mask[v.to_index()]) {
        let kept = offsets
            .iter()
            .all(|&o| matches!(voxel.shifted(o, shape), Some(n) if mask[n.to_index()]));
        out[voxel.to_index()] = kept;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::Volume;
    use nifti::NiftiHeader;

    /// 7x7x7的网格，中心为3x3x3的肿瘤块；脑区为x < 4的半空间。
    fn fixture() -> Segmentation {
        let mut gtv = Array3::<u8>::zeros((7, 7, 7));
        for i in 2..5 {
            for j in 2..5 {
                for k in 2..5 {
                    gtv[[i, j, k]] = 1;
                }
            }
        }
        let mut brain = Array3::<u8>::zeros((7, 7, 7));
        brain.slice_mut(ndarray::s![..4, .., ..]).fill(1);

        let mut seg =
            Segmentation::from_labelmap(&Volume::new(gtv, NiftiHeader::default()), "gtv").unwrap();
        let brain_seg =
            Segmentation::from_labelmap(&Volume::new(brain, NiftiHeader::default()), "brain")
                .unwrap();
        seg.copy_segment_from(&brain_seg, "brain").unwrap();
        seg
    }

    #[test]
    fn test_zero_margin_is_pass_through() {
        let mut seg = fixture();
        let id = seg.add_empty_segment("gtv_0mm");
        seg.apply_logical(&id, LogicalOperation::Copy, "gtv").unwrap();
        seg.apply_margin(&id, 0.0).unwrap();
        assert_eq!(seg.segment(&id).unwrap().voxel_count(), 27);
        assert!(seg.apply_margin("nope", 0.0).is_err());
    }

    #[test]
    fn test_dilate_and_erode() {
        let mut seg = fixture();
        let grown = seg.add_empty_segment("gtv_1mm");
        seg.apply_logical(&grown, LogicalOperation::Copy, "gtv").unwrap();
        seg.apply_margin(&grown, 1.0).unwrap();
        // 3x3x3立方体 + 六个面各9个体素
        assert_eq!(seg.segment(&grown).unwrap().voxel_count(), 27 + 6 * 9);

        let shrunk = seg.add_empty_segment("gtv_-1mm");
        seg.apply_logical(&shrunk, LogicalOperation::Copy, "gtv").unwrap();
        seg.apply_margin(&shrunk, -1.0).unwrap();
        assert_eq!(seg.segment(&shrunk).unwrap().voxel_count(), 1);
        assert!(seg.segment(&shrunk).unwrap().mask[[3, 3, 3]]);

        assert!(seg.apply_margin(&shrunk, f64::NAN).is_err());
    }

    #[test]
    fn test_intersect_keeps_expansion_inside_brain() {
        let mut seg = fixture();
        let id = seg.add_empty_segment("gtv_2mm");
        seg.apply_logical(&id, LogicalOperation::Copy, "gtv").unwrap();
        seg.apply_margin(&id, 2.0).unwrap();
        seg.apply_logical(&id, LogicalOperation::Intersect, "brain").unwrap();

        let expanded = &seg.segment(&id).unwrap().mask;
        let brain = &seg.segment("brain").unwrap().mask;
        assert!(expanded.iter().any(|&b| b));
        assert!(expanded.iter().zip(brain.iter()).all(|(&e, &b)| !e || b));
    }

    #[test]
    fn test_union_and_subtract() {
        let mut seg = fixture();
        let id = seg.add_empty_segment("work");
        seg.apply_logical(&id, LogicalOperation::Union, "gtv").unwrap();
        assert_eq!(seg.segment(&id).unwrap().voxel_count(), 27);
        seg.apply_logical(&id, LogicalOperation::Subtract, "brain").unwrap();
        // x = 4 这一层留在脑区之外
        assert_eq!(seg.segment(&id).unwrap().voxel_count(), 9);
    }
}
