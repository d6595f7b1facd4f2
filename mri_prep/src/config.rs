//! 批处理配置（TOML）。
//!
//! 每个字段都有默认值，缺省的段落或字段沿用默认值；不提供配置文件时等同于全部默认。

use crate::error::{PrepError, Result};
use crate::external::{ExtractionSettings, ToolCommand};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 特征引擎允许启用的特征类别。形状类特征始终关闭。
pub const FEATURE_CLASSES: [&str; 6] = ["firstorder", "glcm", "gldm", "glrlm", "glszm", "ngtdm"];

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub layout: LayoutConfig,
    pub normalizer: NormalizerConfig,
    pub expander: ExpanderConfig,
    pub extractor: ExtractorConfig,
    pub tools: ToolsConfig,
}

/// 数据集文件布局。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutConfig {
    /// 体数据文件扩展名，不带开头的`.`。
    pub ext: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            ext: "nii.gz".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NormalizerConfig {
    /// 自动阈值使用的直方图分箱数。
    pub histogram_bins: u32,
    /// 脑掩膜中表示脑组织的标签值。
    pub brain_label: u8,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            histogram_bins: 200,
            brain_label: 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExpanderConfig {
    /// 按此顺序处理的时间点。
    pub timepoints: Vec<String>,
    /// 外扩距离（毫米）。负值为腐蚀，零为原样输出。
    pub margins_mm: Vec<f64>,
}

impl Default for ExpanderConfig {
    fn default() -> Self {
        Self {
            timepoints: vec!["6month".to_string(), "3month".to_string()],
            margins_mm: vec![0.0],
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractorConfig {
    /// 提取特征所用MRI的时间点。
    pub timepoint: String,
    /// 候选轮廓的时间点。
    pub contour_timepoint: String,
    /// 候选轮廓文件名中的外扩后缀，如`0mm`；为空时匹配所有`_label`文件。
    pub expansion: String,
    pub bin_width: f64,
    /// 保留的第一个特征名，之后的特征全部保留。
    pub anchor_feature: String,
    pub feature_classes: Vec<String>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            timepoint: "3month".to_string(),
            contour_timepoint: "3month".to_string(),
            expansion: "0mm".to_string(),
            bin_width: 0.015,
            anchor_feature: "original_firstorder_10Percentile".to_string(),
            feature_classes: FEATURE_CLASSES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ExtractorConfig {
    pub fn settings(&self) -> ExtractionSettings {
        ExtractionSettings {
            bin_width: self.bin_width,
            feature_classes: self.feature_classes.clone(),
        }
    }
}

/// 外部程序的命令模板。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolsConfig {
    /// 占位符：`{input}`、`{output}`、`{bins}`。
    pub threshold: ToolCommand,
    /// 占位符：`{input}`、`{mask}`、`{output}`。
    pub bias_correction: ToolCommand,
    /// 占位符：`{image}`、`{mask}`、`{params}`、`{output}`。
    pub radiomics: ToolCommand,
}

const SITK_OTSU: &str = "import sys, SimpleITK as sitk; \
img = sitk.ReadImage(sys.argv[1], sitk.sitkFloat32); \
sitk.WriteImage(sitk.OtsuThreshold(img, 0, 1, int(sys.argv[3])), sys.argv[2])";

const SITK_N4: &str = "import sys, SimpleITK as sitk; \
img = sitk.ReadImage(sys.argv[1], sitk.sitkFloat32); \
mask = sitk.ReadImage(sys.argv[2], sitk.sitkUInt8); \
sitk.WriteImage(sitk.N4BiasFieldCorrectionImageFilter().Execute(img, mask), sys.argv[3])";

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            threshold: ToolCommand::new("python3", &["-c", SITK_OTSU, "{input}", "{output}", "{bins}"]),
            bias_correction: ToolCommand::new(
                "python3",
                &["-c", SITK_N4, "{input}", "{mask}", "{output}"],
            ),
            radiomics: ToolCommand::new(
                "pyradiomics",
                &[
                    "{image}", "{mask}", "--param", "{params}", "--format", "json", "--out",
                    "{output}",
                ],
            ),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| PrepError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(PrepError::missing(path));
        }
        let text = fs::read_to_string(path).map_err(|e| {
            PrepError::Config(format!("cannot read `{}`: {e}", path.display()))
        })?;
        Self::from_toml(&text)
    }

    /// 有路径时读取配置文件，否则使用默认配置。
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| PrepError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        let bad = |msg: String| Err(PrepError::Config(msg));
        let ext = &self.layout.ext;
        if ext.is_empty() || ext.starts_with('.') {
            return bad(format!("layout.ext `{ext}` must be non-empty without a leading `.`"));
        }
        if self.normalizer.histogram_bins < 2 {
            return bad("normalizer.histogram_bins must be at least 2".into());
        }
        if self.normalizer.brain_label == 0 {
            return bad("normalizer.brain_label must not be the background value 0".into());
        }
        if self.expander.timepoints.is_empty() {
            return bad("expander.timepoints is empty".into());
        }
        for tp in self.expander.timepoints.iter().chain([
            &self.extractor.timepoint,
            &self.extractor.contour_timepoint,
        ]) {
            if tp.is_empty() || tp.contains('_') {
                return bad(format!("timepoint `{tp}` must be non-empty and contain no `_`"));
            }
        }
        if self.expander.margins_mm.is_empty() {
            return bad("expander.margins_mm is empty".into());
        }
        if let Some(m) = self.expander.margins_mm.iter().find(|m| !m.is_finite()) {
            return bad(format!("expander.margins_mm contains `{m}`"));
        }
        let ex = &self.extractor;
        if !(ex.bin_width.is_finite() && ex.bin_width > 0.0) {
            return bad(format!("extractor.bin_width `{}` must be positive", ex.bin_width));
        }
        if ex.anchor_feature.is_empty() {
            return bad("extractor.anchor_feature is empty".into());
        }
        if ex.feature_classes.is_empty() {
            return bad("extractor.feature_classes is empty".into());
        }
        if let Some(c) = ex
            .feature_classes
            .iter()
            .find(|c| !FEATURE_CLASSES.contains(&c.as_str()))
        {
            return bad(format!(
                "feature class `{c}` is not one of {}",
                FEATURE_CLASSES.join(", ")
            ));
        }
        self.tools.threshold.require("threshold", &["input", "output"])?;
        self.tools
            .bias_correction
            .require("bias_correction", &["input", "mask", "output"])?;
        self.tools
            .radiomics
            .require("radiomics", &["image", "mask", "output"])?;
        Ok(())
    }
}
