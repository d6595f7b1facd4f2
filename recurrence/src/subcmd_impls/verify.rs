use crate::subcmd_impls::utils::{file_name, files_under, patient_of};
use clap::Args;
use mri_prep::naming::{brain_label_name, expansion_margin, is_brain_mask, timepoint_of};
use mri_prep::prelude::{FeatureTable, PipelineConfig, PrepError, Result};
use mri_prep::volume::io::read_label;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const MATRIX_SUFFIX: &str = "_contour_extractions_mat.npy";

#[derive(Args, Debug)]
pub struct Verify {
    /// 配准后的数据根目录，提供脑掩膜。与`--contour-dir`一同使用。
    #[arg(long = "input-dir", short = 'I', requires = "contour_dir")]
    input_dir: Option<PathBuf>,
    /// 外扩轮廓根目录：检查每个外扩结果都位于同一时间点的脑掩膜之内。
    #[arg(long = "contour-dir", short = 'C', requires = "input_dir")]
    contour_dir: Option<PathBuf>,
    /// 一次特征提取的输出目录：检查特征矩阵、标签与路径列表逐行对齐。
    #[arg(long = "feature-dir", short = 'F')]
    feature_dir: Option<PathBuf>,
}

impl Verify {
    pub fn run(&self, config: &PipelineConfig) -> Result<()> {
        if self.contour_dir.is_none() && self.feature_dir.is_none() {
            return Err(PrepError::Config(
                "verify needs `--contour-dir` with `--input-dir`, or `--feature-dir`".into(),
            ));
        }
        let mut prog = Program::new(config.layout.ext.clone());
        if let (Some(input), Some(contours)) = (&self.input_dir, &self.contour_dir) {
            prog.check_containment(input, contours)?;
        }
        if let Some(dir) = &self.feature_dir {
            prog.check_tables(dir)?;
        }
        prog.finish()
    }
}

struct Program {
    ext: String,
    checked: usize,
    violations: Vec<String>,
}

impl Program {
    #[inline]
    pub fn new(ext: String) -> Self {
        Self {
            ext,
            checked: 0,
            violations: Vec::new(),
        }
    }

    #[inline]
    fn print_failed_info(&mut self, fn_name: &str, detail: String) {
        warn!("`{fn_name}` failed: {detail}");
        self.violations.push(detail);
    }

    /// 外扩结果的前景体素都属于同一病例、同一时间点的脑掩膜。
    fn check_containment(&mut self, input_dir: &Path, contour_dir: &Path) -> Result<()> {
        for path in files_under(contour_dir, 2, 2)? {
            let name = file_name(&path);
            if is_brain_mask(name) || expansion_margin(name, &self.ext).is_none() {
                continue;
            }
            let brain_path = input_dir
                .join(patient_of(&path))
                .join(brain_label_name(timepoint_of(name), &self.ext));
            let brain = read_label(&brain_path)?;
            let mask = read_label(&path)?;
            self.checked += 1;
            match mask.count_outside(&brain) {
                Ok(0) => {}
                Ok(n) => self.print_failed_info(
                    "check_containment",
                    format!("{n} voxel(s) of `{}` lie outside the brain", path.display()),
                ),
                Err(e) => self.print_failed_info("check_containment", e.to_string()),
            }
        }
        Ok(())
    }

    /// 目录中每个特征表的并行数组逐行对齐。
    fn check_tables(&mut self, dir: &Path) -> Result<()> {
        let mut found = 0usize;
        for path in files_under(dir, 1, 1)? {
            let Some(timepoint) = file_name(&path).strip_suffix(MATRIX_SUFFIX) else {
                continue;
            };
            found += 1;
            self.checked += 1;
            let table = FeatureTable::load(dir, timepoint)?;
            if let Err(e) = table.check_alignment() {
                self.print_failed_info("check_tables", format!("`{timepoint}`: {e}"));
            }
        }
        if found == 0 {
            return Err(PrepError::missing(dir.join(format!("*{MATRIX_SUFFIX}"))));
        }
        Ok(())
    }

    fn finish(self) -> Result<()> {
        info!(checked = self.checked, violations = self.violations.len(), "验证完成");
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(PrepError::Alignment(format!(
                "{} of {} checks failed; first: {}",
                self.violations.len(),
                self.checked,
                self.violations[0]
            )))
        }
    }
}
