//! 分割表示：同一参考几何上的若干个命名分割段。
//!
//! 分割只能从一个源标签图构造，从而保证“导入前必须先确定源几何”这一前提。
//! 每个分割对象由调用方独占持有，离开作用域即释放。

pub mod effects;
pub mod voxel;

pub use effects::LogicalOperation;

use crate::error::{PrepError, Result};
use crate::volume::{spacing_of, LabelVolume, Volume};
use ndarray::Array3;
use nifti::NiftiHeader;

/// 一个分割段：一组前景体素。
#[derive(Clone, Debug)]
pub struct Segment {
    pub id: String,
    pub name: String,
    pub mask: Array3<bool>,
}

impl Segment {
    #[inline]
    pub fn voxel_count(&self) -> usize {
        self.mask.iter().filter(|&&b| b).count()
    }
}

#[derive(Clone, Debug)]
pub struct Segmentation {
    header: NiftiHeader,
    shape: [usize; 3],
    segments: Vec<Segment>,
}

impl Segmentation {
    /// 以`source`为参考几何，将其中每个非零标签值导入为一个分割段（按标签值升序）。
    ///
    /// 只有一个标签值时分割段ID为`segment_id`，否则为`{segment_id}_{label}`。
    pub fn from_labelmap(source: &LabelVolume, segment_id: &str) -> Result<Self> {
        let mut seg = Self {
            header: source.header.clone(),
            shape: source.shape(),
            segments: Vec::new(),
        };
        let labels = source.label_values();
        for &label in labels.iter() {
            let id = if labels.len() == 1 {
                segment_id.to_string()
            } else {
                format!("{segment_id}_{label}")
            };
            seg.segments.push(Segment {
                name: id.clone(),
                id,
                mask: source.foreground(Some(label)),
            });
        }
        if seg.segments.is_empty() {
            return Err(PrepError::library(
                "import labelmap",
                format!("labelmap for `{segment_id}` has no foreground voxels"),
            ));
        }
        Ok(seg)
    }

    #[inline]
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    /// 参考几何的体素间距（毫米）。
    #[inline]
    pub fn spacing(&self) -> [f64; 3] {
        spacing_of(&self.header)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segment_ids(&self) -> Vec<&str> {
        self.segments.iter().map(|s| s.id.as_str()).collect()
    }

    #[inline]
    pub fn nth_segment_id(&self, n: usize) -> Option<&str> {
        self.segments.get(n).map(|s| s.id.as_str())
    }

    pub fn segment(&self, id: &str) -> Result<&Segment> {
        self.segments
            .iter()
            .find(|s| s.id == id)
            .ok_or_else(|| PrepError::library("segmentation", format!("no segment `{id}`")))
    }

    pub(crate) fn segment_mut(&mut self, id: &str) -> Result<&mut Segment> {
        self.segments
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| PrepError::library("segmentation", format!("no segment `{id}`")))
    }

    pub fn set_segment_name(&mut self, id: &str, name: &str) -> Result<()> {
        self.segment_mut(id)?.name = name.to_string();
        Ok(())
    }

    /// 生成一个未被占用的ID：`id`, `id_1`, `id_2`, ...
    fn unique_id(&self, id: &str) -> String {
        let taken = |c: &str| self.segments.iter().any(|s| s.id == c);
        if !taken(id) {
            return id.to_string();
        }
        (1..)
            .map(|n| format!("{id}_{n}"))
            .find(|c| !taken(c))
            .unwrap_or_else(|| id.to_string())
    }

    /// 添加一个空分割段，返回实际使用的ID。
    pub fn add_empty_segment(&mut self, id: &str) -> String {
        let id = self.unique_id(id);
        self.segments.push(Segment {
            id: id.clone(),
            name: id.clone(),
            mask: Array3::from_elem(self.shape, false),
        });
        id
    }

    /// 从另一个分割中复制分割段。ID冲突时会被重命名，返回复制后的ID。
    pub fn copy_segment_from(&mut self, other: &Segmentation, id: &str) -> Result<String> {
        if other.shape != self.shape {
            return Err(PrepError::library(
                "copy segment",
                format!(
                    "segment `{id}` lives on grid {:?}, target grid is {:?}",
                    other.shape, self.shape
                ),
            ));
        }
        let src = other.segment(id)?;
        let new_id = self.unique_id(id);
        self.segments.push(Segment {
            id: new_id.clone(),
            name: src.name.clone(),
            mask: src.mask.clone(),
        });
        Ok(new_id)
    }

    /// 将指定分割段导出为标签图：第n个分割段写为标签值n+1，后者覆盖前者。
    pub fn export_labelmap(&self, ids: &[&str]) -> Result<LabelVolume> {
        if ids.len() > u8::MAX as usize {
            return Err(PrepError::library(
                "export labelmap",
                format!("{} segments do not fit into an 8-bit labelmap", ids.len()),
            ));
        }
        let mut data = Array3::<u8>::zeros(self.shape);
        for (n, id) in ids.iter().enumerate() {
            let seg = self.segment(id)?;
            let label = n as u8 + 1;
            data.zip_mut_with(&seg.mask, |v, &m| {
                if m {
                    *v = label;
                }
            });
        }
        Ok(Volume::new(data, self.header.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labelmap(shape: (usize, usize, usize), fg: &[([usize; 3], u8)]) -> LabelVolume {
        let mut data = Array3::<u8>::zeros(shape);
        for &(idx, v) in fg {
            data[idx] = v;
        }
        Volume::new(data, NiftiHeader::default())
    }

    #[test]
    fn test_import_single_and_multi_label() {
        let single = labelmap((2, 2, 2), &[([0, 0, 0], 1), ([1, 1, 1], 1)]);
        let seg = Segmentation::from_labelmap(&single, "3month_GTV").unwrap();
        assert_eq!(seg.segment_ids(), vec!["3month_GTV"]);
        assert_eq!(seg.segment("3month_GTV").unwrap().voxel_count(), 2);

        let multi = labelmap((2, 2, 2), &[([0, 0, 0], 2), ([1, 1, 1], 5)]);
        let seg = Segmentation::from_labelmap(&multi, "lesion").unwrap();
        assert_eq!(seg.segment_ids(), vec!["lesion_2", "lesion_5"]);

        let empty = labelmap((2, 2, 2), &[]);
        assert!(Segmentation::from_labelmap(&empty, "x").is_err());
    }

    #[test]
    fn test_copy_renames_on_collision() {
        let a = labelmap((2, 2, 2), &[([0, 0, 0], 1)]);
        let mut target = Segmentation::from_labelmap(&a, "brain").unwrap();
        let source = Segmentation::from_labelmap(&a, "brain").unwrap();
        let id = target.copy_segment_from(&source, "brain").unwrap();
        assert_eq!(id, "brain_1");
        assert_eq!(target.nth_segment_id(1), Some("brain_1"));
        assert_eq!(target.add_empty_segment("brain"), "brain_2");

        let other_grid = labelmap((3, 2, 2), &[([0, 0, 0], 1)]);
        let other = Segmentation::from_labelmap(&other_grid, "brain").unwrap();
        assert!(target.copy_segment_from(&other, "brain").is_err());
    }

    #[test]
    fn test_export_single_segment() {
        let a = labelmap((2, 2, 2), &[([0, 0, 0], 1), ([0, 1, 0], 1)]);
        let mut seg = Segmentation::from_labelmap(&a, "gtv").unwrap();
        let empty = seg.add_empty_segment("gtv_0mm");
        let out = seg.export_labelmap(&[empty.as_str()]).unwrap();
        assert!(out.data.iter().all(|&v| v == 0));
        let out = seg.export_labelmap(&["gtv"]).unwrap();
        assert_eq!(out.data[[0, 1, 0]], 1);
        assert_eq!(out.data.iter().filter(|&&v| v == 1).count(), 2);
        assert!(seg.export_labelmap(&["missing"]).is_err());
    }
}
