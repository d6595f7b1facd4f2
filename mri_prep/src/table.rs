//! 特征矩阵及与之逐行对齐的标签、路径列表。

use crate::error::{PrepError, Result};
use crate::output::{ensure_dir, write_json, write_npy};
use ndarray::{Array1, Array2};
use ndarray_npy::read_npy;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    if !path.is_file() {
        return Err(PrepError::missing(path));
    }
    let text = fs::read_to_string(path)
        .map_err(|e| PrepError::library("read json", format!("`{}`: {e}", path.display())))?;
    serde_json::from_str(&text)
        .map_err(|e| PrepError::library("read json", format!("`{}`: {e}", path.display())))
}

fn read_array<A: ndarray_npy::ReadableElement, D: ndarray::Dimension>(
    path: &Path,
) -> Result<ndarray::Array<A, D>> {
    if !path.is_file() {
        return Err(PrepError::missing(path));
    }
    read_npy(path).map_err(|e| PrepError::library("read npy", format!("`{}`: {e}", path.display())))
}

/// 一次特征提取运行的全部结果。
///
/// 第i行特征、第i个标签、第i个MRI路径与第i个轮廓路径描述同一个（MRI，轮廓）对。
#[derive(Clone, Debug, Default)]
pub struct FeatureTable {
    rows: Vec<Vec<f64>>,
    labels: Vec<bool>,
    mri_paths: Vec<String>,
    contour_paths: Vec<String>,
    feature_names: Vec<String>,
}

/// `persist`写出的文件。
#[derive(Clone, Debug)]
pub struct TableFiles {
    pub matrix: PathBuf,
    pub labels: PathBuf,
    pub mri_paths: PathBuf,
    pub contour_paths: PathBuf,
    pub feature_names: PathBuf,
}

impl TableFiles {
    pub fn new(dir: &Path, timepoint: &str) -> Self {
        Self {
            matrix: dir.join(format!("{timepoint}_contour_extractions_mat.npy")),
            labels: dir.join(format!("{timepoint}_labels.npy")),
            mri_paths: dir.join(format!("{timepoint}_mri_path_list.json")),
            contour_paths: dir.join(format!("{timepoint}_contour_path_list.json")),
            feature_names: dir.join(format!("{timepoint}_feature_names.json")),
        }
    }
}

impl FeatureTable {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// 行数。
    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[inline]
    pub fn labels(&self) -> &[bool] {
        &self.labels
    }

    #[inline]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// 追加一行。每一行的特征名序列必须与第一行完全相同。
    pub fn push(
        &mut self,
        names: Vec<String>,
        values: Vec<f64>,
        label: bool,
        mri: &Path,
        contour: &Path,
    ) -> Result<()> {
        if names.len() != values.len() {
            return Err(PrepError::Alignment(format!(
                "{} feature names for {} values",
                names.len(),
                values.len()
            )));
        }
        if self.rows.is_empty() {
            self.feature_names = names;
        } else if self.feature_names != names {
            let at = self
                .feature_names
                .iter()
                .zip(names.iter())
                .position(|(a, b)| a != b)
                .unwrap_or_else(|| self.feature_names.len().min(names.len()));
            return Err(PrepError::Alignment(format!(
                "feature names of `{}` differ from earlier rows at position {at}",
                contour.display()
            )));
        }
        self.rows.push(values);
        self.labels.push(label);
        self.mri_paths.push(mri.to_string_lossy().into_owned());
        self.contour_paths.push(contour.to_string_lossy().into_owned());
        Ok(())
    }

    /// 检查四个并行数组等长，且矩阵宽度等于特征名个数。
    pub fn check_alignment(&self) -> Result<()> {
        let n = self.rows.len();
        if self.labels.len() != n || self.mri_paths.len() != n || self.contour_paths.len() != n {
            return Err(PrepError::Alignment(format!(
                "{n} rows, {} labels, {} mri paths, {} contour paths",
                self.labels.len(),
                self.mri_paths.len(),
                self.contour_paths.len()
            )));
        }
        let width = self.feature_names.len();
        if let Some(i) = self.rows.iter().position(|r| r.len() != width) {
            return Err(PrepError::Alignment(format!(
                "row {i} has {} values for {width} feature names",
                self.rows[i].len()
            )));
        }
        Ok(())
    }

    /// 行 x 特征的矩阵。
    pub fn to_matrix(&self) -> Result<Array2<f64>> {
        self.check_alignment()?;
        let flat: Vec<f64> = self.rows.iter().flatten().copied().collect();
        Array2::from_shape_vec((self.rows.len(), self.feature_names.len()), flat)
            .map_err(|e| PrepError::Alignment(e.to_string()))
    }

    /// 读回`persist`写出的文件。不做对齐检查，由调用方调用`check_alignment`。
    pub fn load(dir: &Path, timepoint: &str) -> Result<Self> {
        let files = TableFiles::new(dir, timepoint);
        let matrix: Array2<f64> = read_array(&files.matrix)?;
        let labels: Array1<bool> = read_array(&files.labels)?;
        Ok(Self {
            rows: matrix.outer_iter().map(|r| r.to_vec()).collect(),
            labels: labels.to_vec(),
            mri_paths: read_json(&files.mri_paths)?,
            contour_paths: read_json(&files.contour_paths)?,
            feature_names: read_json(&files.feature_names)?,
        })
    }

    /// 将矩阵、标签、路径列表与特征名写入`dir`，文件名以`timepoint`为前缀。
    ///
    /// 写入任何文件之前先检查对齐。
    pub fn persist(&self, dir: &Path, timepoint: &str) -> Result<TableFiles> {
        let matrix = self.to_matrix()?;
        let files = TableFiles::new(dir, timepoint);
        ensure_dir(dir)?;
        write_npy(&files.matrix, &matrix)?;
        write_npy(&files.labels, &Array1::from(self.labels.clone()))?;
        write_json(&files.mri_paths, &self.mri_paths)?;
        write_json(&files.contour_paths, &self.contour_paths)?;
        write_json(&files.feature_names, &self.feature_names)?;
        Ok(files)
    }
}
