//! NIfTI体数据的读写。

use super::{LabelVolume, ScalarVolume, Volume};
use crate::error::{PrepError, Result};
use crate::output::persist_atomically;
use ndarray::{Array3, ArrayD, Axis, Ix3};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use std::path::Path;

fn check_exists(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(PrepError::missing(path))
    }
}

fn open(path: &Path) -> Result<(NiftiHeader, nifti::InMemNiftiVolume)> {
    check_exists(path)?;
    let obj = ReaderOptions::new()
        .read_file(path)
        .map_err(|e| PrepError::library("read volume", format!("`{}`: {e}", path.display())))?;
    let mut header = obj.header().clone();
    // 体素值在转换为ndarray时已经应用过缩放。
    header.scl_slope = 1.0;
    header.scl_inter = 0.0;
    Ok((header, obj.into_volume()))
}

/// 去掉长度为1的第四维（部分工具会输出`[x, y, z, 1]`）。
fn into_3d<T>(array: ArrayD<T>, path: &Path) -> Result<Array3<T>> {
    let array = if array.ndim() == 4 && array.shape()[3] == 1 {
        array.index_axis_move(Axis(3), 0)
    } else {
        array
    };
    array.into_dimensionality::<Ix3>().map_err(|e| {
        PrepError::library("read volume", format!("`{}` is not 3D: {e}", path.display()))
    })
}

/// 读取强度图像为`f32`。
pub fn read_scalar(path: &Path) -> Result<ScalarVolume> {
    let (header, volume) = open(path)?;
    let data = volume.into_ndarray::<f32>()?;
    Ok(Volume::new(into_3d(data, path)?, header))
}

/// 读取标签图像为`u8`。
pub fn read_label(path: &Path) -> Result<LabelVolume> {
    let (header, volume) = open(path)?;
    let data = volume.into_ndarray::<u8>()?;
    Ok(Volume::new(into_3d(data, path)?, header))
}

/// 写出强度图像。写入是原子的。
pub fn write_scalar(volume: &ScalarVolume, path: &Path) -> Result<()> {
    persist_atomically(path, |tmp| {
        WriterOptions::new(tmp)
            .reference_header(&volume.header)
            .write_nifti(&volume.data)
            .map_err(|e| PrepError::library("write volume", format!("`{}`: {e}", path.display())))
    })
}

/// 写出标签图像。写入是原子的。
pub fn write_label(volume: &LabelVolume, path: &Path) -> Result<()> {
    persist_atomically(path, |tmp| {
        WriterOptions::new(tmp)
            .reference_header(&volume.header)
            .write_nifti(&volume.data)
            .map_err(|e| PrepError::library("write volume", format!("`{}`: {e}", path.display())))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_missing_input() {
        let tmp = TempDir::new().unwrap();
        let err = read_label(&tmp.path().join("3month_Brain_label.nii.gz")).unwrap_err();
        assert!(matches!(err, PrepError::MissingInput { .. }));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_label_write_then_read() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("3month_GTV_label.nii.gz");
        let mut data = Array3::<u8>::zeros((4, 5, 6));
        data[[1, 2, 3]] = 1;
        let mut header = NiftiHeader::default();
        header.pixdim[1] = 0.5;
        header.pixdim[2] = 0.5;
        header.pixdim[3] = 2.0;
        write_label(&Volume::new(data, header), &path).unwrap();

        let back = read_label(&path).unwrap();
        assert_eq!(back.shape(), [4, 5, 6]);
        assert_eq!(back.data[[1, 2, 3]], 1);
        assert_eq!(back.data.iter().filter(|&&v| v != 0).count(), 1);
        assert_eq!(back.spacing(), [0.5, 0.5, 2.0]);
    }
}
