//! 数据集文件命名约定。
//!
//! 每个病例目录下的文件遵循：
//!
//! - 增强MRI：`{timepoint}_contrastMRI.{ext}`
//! - 脑掩膜：`{timepoint}_Brain_label.{ext}`
//! - 肿瘤掩膜：`{timepoint}_{structure}_label.{ext}`
//! - 外扩结果：`{base}_{margin}mm_label.{ext}`，其中`{base}`为肿瘤掩膜文件名去掉`_label`之后的部分。
//!
//! 扩展名按第一个`.`切分，因此`nii.gz`这类双重扩展名会被完整保留。

use crate::error::{PrepError, Result};

pub const CONTRAST_MRI_SUFFIX: &str = "contrastMRI";
pub const BRAIN_LABEL_SUFFIX: &str = "_Brain_label";
pub const LABEL_SUFFIX: &str = "_label";

/// 将文件名切分为（主干，扩展名），按第一个`.`切分。
#[inline]
pub fn split_ext(file_name: &str) -> (&str, Option<&str>) {
    match file_name.split_once('.') {
        Some((stem, ext)) => (stem, Some(ext)),
        None => (file_name, None),
    }
}

/// 文件名中第一个`_`之前的部分，即时间点。
#[inline]
pub fn timepoint_of(file_name: &str) -> &str {
    file_name.split('_').next().unwrap_or(file_name)
}

/// 判断文件名是否为增强MRI（`*contrastMRI.{ext}`）。
pub fn is_contrast_mri(file_name: &str, ext: &str) -> bool {
    matches!(split_ext(file_name), (stem, Some(e)) if e == ext && stem.ends_with(CONTRAST_MRI_SUFFIX))
}

/// 某时间点的增强MRI文件名。
#[inline]
pub fn contrast_mri_name(timepoint: &str, ext: &str) -> String {
    format!("{timepoint}_{CONTRAST_MRI_SUFFIX}.{ext}")
}

/// 某时间点的脑掩膜文件名。
#[inline]
pub fn brain_label_name(timepoint: &str, ext: &str) -> String {
    format!("{timepoint}{BRAIN_LABEL_SUFFIX}.{ext}")
}

/// 由MRI文件名推导同一时间点的脑掩膜文件名。
///
/// `3month_contrastMRI.nrrd` -> `3month_Brain_label.nrrd`
pub fn brain_label_for_mri(mri_name: &str) -> Result<String> {
    match split_ext(mri_name) {
        (stem, Some(ext)) if stem.contains('_') => Ok(brain_label_name(timepoint_of(stem), ext)),
        _ => Err(PrepError::Config(format!(
            "`{mri_name}` does not follow `{{timepoint}}_{CONTRAST_MRI_SUFFIX}.{{ext}}`"
        ))),
    }
}

/// 名称中含有`brain`（不区分大小写）的掩膜视为脑掩膜。
#[inline]
pub fn is_brain_mask(file_name: &str) -> bool {
    file_name.to_lowercase().contains("brain")
}

/// 名称中含有`gtv`（不区分大小写）的掩膜视为肿瘤掩膜。
#[inline]
pub fn is_gtv_mask(file_name: &str) -> bool {
    file_name.to_lowercase().contains("gtv")
}

/// 判断是否为某时间点下的掩膜文件（`{timepoint}_*_label.{ext}`）。
pub fn is_label_at(file_name: &str, timepoint: &str, ext: &str) -> bool {
    match split_ext(file_name) {
        (stem, Some(e)) => {
            e == ext
                && stem.ends_with(LABEL_SUFFIX)
                && stem.contains('_')
                && timepoint_of(stem) == timepoint
        }
        _ => false,
    }
}

/// 掩膜文件名去掉`_label`及其之后的部分。
///
/// `3month_GTV_label.nrrd` -> `3month_GTV`
#[inline]
pub fn label_base(file_name: &str) -> &str {
    file_name
        .split_once(LABEL_SUFFIX)
        .map(|(base, _)| base)
        .unwrap_or(split_ext(file_name).0)
}

/// 外扩距离的文本形式，整数距离不带小数点：`0` -> `0mm`，`2.5` -> `2.5mm`。
#[inline]
pub fn margin_tag(margin_mm: f64) -> String {
    format!("{margin_mm}mm")
}

/// 外扩结果的文件名。
///
/// `3month_GTV_label.nrrd`, 0 -> `3month_GTV_0mm_label.nrrd`
pub fn expansion_file_name(tumor_name: &str, margin_mm: f64) -> Result<String> {
    match split_ext(tumor_name) {
        (_, Some(ext)) => Ok(format!(
            "{}_{}{LABEL_SUFFIX}.{ext}",
            label_base(tumor_name),
            margin_tag(margin_mm)
        )),
        (_, None) => Err(PrepError::Config(format!(
            "label file `{tumor_name}` has no extension"
        ))),
    }
}

/// 外扩结果文件名中的外扩距离；不是外扩结果时为`None`。
///
/// `3month_GTV_-1mm_label.nrrd` -> `Some(-1.0)`
pub fn expansion_margin(file_name: &str, ext: &str) -> Option<f64> {
    match split_ext(file_name) {
        (stem, Some(e)) if e == ext => stem
            .strip_suffix(LABEL_SUFFIX)?
            .rsplit_once('_')?
            .1
            .strip_suffix("mm")?
            .parse()
            .ok(),
        _ => None,
    }
}

/// 判断是否为特征提取的候选外扩掩膜：`{timepoint}*_{expansion}_label.{ext}`，且不是脑掩膜。
pub fn is_expansion_candidate(file_name: &str, timepoint: &str, expansion: &str, ext: &str) -> bool {
    let suffix = if expansion.is_empty() {
        format!("{LABEL_SUFFIX}.{ext}")
    } else {
        format!("_{expansion}{LABEL_SUFFIX}.{ext}")
    };
    file_name.starts_with(timepoint) && file_name.ends_with(&suffix) && !is_brain_mask(file_name)
}

/// 把浮点数中的`.`替换为`p`，用于目录名：`0.015` -> `0p015`。
#[inline]
pub fn dotless(value: f64) -> String {
    value.to_string().replace('.', "p")
}

/// 一次特征提取运行的输出目录名。
pub fn feature_run_dir_name(bin_width: f64, expansion: &str, timepoint: &str) -> String {
    format!(
        "binWidth{}N4viaOtsuNoResample{expansion}Expansion{timepoint}",
        dotless(bin_width)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brain_label_for_mri() {
        assert_eq!(
            brain_label_for_mri("3month_contrastMRI.nrrd").unwrap(),
            "3month_Brain_label.nrrd"
        );
        assert_eq!(
            brain_label_for_mri("6month_contrastMRI.nii.gz").unwrap(),
            "6month_Brain_label.nii.gz"
        );
        assert!(brain_label_for_mri("contrastMRI.nrrd").is_err());
        assert!(brain_label_for_mri("3month_contrastMRI").is_err());
    }

    #[test]
    fn test_is_contrast_mri() {
        assert!(is_contrast_mri("3month_contrastMRI.nii.gz", "nii.gz"));
        assert!(!is_contrast_mri("3month_contrastMRI.nii", "nii.gz"));
        assert!(!is_contrast_mri("3month_Brain_label.nii.gz", "nii.gz"));
    }

    #[test]
    fn test_expansion_file_name() {
        assert_eq!(
            expansion_file_name("3month_GTV_label.nrrd", 0.0).unwrap(),
            "3month_GTV_0mm_label.nrrd"
        );
        assert_eq!(
            expansion_file_name("6month_GTV2_label.nii.gz", 2.5).unwrap(),
            "6month_GTV2_2.5mm_label.nii.gz"
        );
        assert_eq!(
            expansion_file_name("6month_GTV_label.nii.gz", -1.0).unwrap(),
            "6month_GTV_-1mm_label.nii.gz"
        );
    }

    #[test]
    fn test_is_label_at() {
        assert!(is_label_at("3month_GTV_label.nii.gz", "3month", "nii.gz"));
        assert!(is_label_at("3month_Brain_label.nii.gz", "3month", "nii.gz"));
        assert!(!is_label_at("3monthly_GTV_label.nii.gz", "3month", "nii.gz"));
        assert!(!is_label_at("3month_contrastMRI.nii.gz", "3month", "nii.gz"));
        assert!(!is_label_at("6month_GTV_label.nii.gz", "3month", "nii.gz"));
    }

    #[test]
    fn test_expansion_candidates() {
        let ext = "nrrd";
        assert!(is_expansion_candidate("3month_GTV_0mm_label.nrrd", "3month", "0mm", ext));
        assert!(is_gtv_mask("3month_GTV_0mm_label.nrrd"));
        // 脑掩膜直接被排除在候选集之外，而非标记为false。
        assert!(!is_expansion_candidate("3month_Brain_0mm_label.nrrd", "3month", "0mm", ext));
        assert!(!is_expansion_candidate("3month_GTV_2mm_label.nrrd", "3month", "0mm", ext));
        assert!(!is_expansion_candidate("6month_GTV_0mm_label.nrrd", "3month", "0mm", ext));
        assert!(is_expansion_candidate("3month_GTV_label.nrrd", "3month", "", ext));
    }

    #[test]
    fn test_expansion_margin() {
        assert_eq!(expansion_margin("3month_GTV_0mm_label.nii.gz", "nii.gz"), Some(0.0));
        assert_eq!(expansion_margin("3month_GTV_-1mm_label.nii.gz", "nii.gz"), Some(-1.0));
        assert_eq!(expansion_margin("3month_GTV_label.nii.gz", "nii.gz"), None);
        assert_eq!(expansion_margin("3month_GTV_0mm_label.nrrd", "nii.gz"), None);
    }

    #[test]
    fn test_feature_run_dir_name() {
        assert_eq!(
            feature_run_dir_name(0.015, "0mm", "3month"),
            "binWidth0p015N4viaOtsuNoResample0mmExpansion3month"
        );
        assert_eq!(margin_tag(0.0), "0mm");
        assert_eq!(label_base("3month_edema_label.nii.gz"), "3month_edema");
    }
}
