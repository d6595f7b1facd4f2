//! 影像组学特征引擎的调用与输出解析。

use super::{path_arg, FeatureEngine, ToolCommand};
use crate::error::{PrepError, Result};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// 特征计算的固定配置。
#[derive(Clone, Debug, PartialEq)]
pub struct ExtractionSettings {
    /// 强度离散化的分箱宽度。
    pub bin_width: f64,
    /// 启用的特征类别；形状类特征不在其中。
    pub feature_classes: Vec<String>,
}

impl ExtractionSettings {
    /// 引擎参数文件的内容（JSON，亦是合法的YAML）。
    pub fn to_params(&self) -> Value {
        let classes: Map<String, Value> = self
            .feature_classes
            .iter()
            .map(|c| (c.clone(), Value::Null))
            .collect();
        json!({
            "imageType": { "Original": {} },
            "featureClass": classes,
            "setting": { "binWidth": self.bin_width },
        })
    }
}

/// 引擎返回的有序“特征名 -> 值”。
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeatureMap {
    entries: Vec<(String, Value)>,
}

impl FeatureMap {
    pub fn new(entries: Vec<(String, Value)>) -> Self {
        Self { entries }
    }

    /// 解析引擎输出。接受单个JSON对象、对象数组（取第一个）或每行一个对象。
    pub fn from_json(text: &str) -> Result<Self> {
        const OP: &str = "parse feature output";
        let value = match serde_json::from_str::<Value>(text) {
            Ok(v) => v,
            Err(_) => {
                let line = text
                    .lines()
                    .find(|l| !l.trim().is_empty())
                    .ok_or_else(|| PrepError::library(OP, "empty output"))?;
                serde_json::from_str(line).map_err(|e| PrepError::library(OP, e))?
            }
        };
        let object = match value {
            Value::Object(map) => map,
            Value::Array(mut items) if !items.is_empty() => match items.swap_remove(0) {
                Value::Object(map) => map,
                _ => return Err(PrepError::library(OP, "array element is not an object")),
            },
            _ => return Err(PrepError::library(OP, "expected a JSON object")),
        };
        Ok(Self {
            entries: object.into_iter().collect(),
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    /// 从名为`anchor`的特征开始（含）保留之后的全部条目，返回（特征名，数值）。
    ///
    /// 锚点按名称查找，而不是按位置，因为不同版本的库在其之前输出的诊断条目数目不同。
    pub fn retain_from(&self, anchor: &str) -> Result<(Vec<String>, Vec<f64>)> {
        const OP: &str = "select features";
        let start = self
            .entries
            .iter()
            .position(|(k, _)| k == anchor)
            .ok_or_else(|| PrepError::library(OP, format!("anchor feature `{anchor}` not found")))?;
        let mut names = Vec::with_capacity(self.entries.len() - start);
        let mut values = Vec::with_capacity(self.entries.len() - start);
        for (name, value) in self.entries[start..].iter() {
            let v = match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            }
            .ok_or_else(|| {
                PrepError::library(OP, format!("feature `{name}` is not numeric: {value}"))
            })?;
            names.push(name.clone());
            values.push(v);
        }
        Ok((names, values))
    }
}

/// 以外部命令行程序计算特征。模板占位符：`{image}`、`{mask}`、`{params}`、`{output}`。
///
/// 参数文件在构造时写入引擎自己的临时目录，引擎释放时一并删除。
#[derive(Debug)]
pub struct CommandFeatureEngine {
    command: ToolCommand,
    scratch: TempDir,
    params: PathBuf,
}

impl CommandFeatureEngine {
    pub fn new(command: ToolCommand, settings: &ExtractionSettings) -> Result<Self> {
        command.require("radiomics", &["image", "mask", "output"])?;
        let scratch = tempfile::Builder::new()
            .prefix("mri-prep-radiomics-")
            .tempdir()
            .map_err(|e| PrepError::write(std::env::temp_dir(), e))?;
        let params = scratch.path().join("params.json");
        let text = serde_json::to_string_pretty(&settings.to_params())
            .map_err(|e| PrepError::library("serde_json", e))?;
        fs::write(&params, text).map_err(|e| PrepError::write(&params, e))?;
        Ok(Self {
            command,
            scratch,
            params,
        })
    }
}

impl FeatureEngine for CommandFeatureEngine {
    fn execute(&self, image: &Path, mask: &Path) -> Result<FeatureMap> {
        const OP: &str = "feature extraction";
        for p in [image, mask] {
            if !p.is_file() {
                return Err(PrepError::missing(p));
            }
        }
        let output = self.scratch.path().join("features.json");
        // 上一次调用的输出不能被误读。
        if output.exists() {
            fs::remove_file(&output).map_err(|e| PrepError::write(&output, e))?;
        }
        self.command.run(
            OP,
            &[
                ("image", path_arg(image)),
                ("mask", path_arg(mask)),
                ("params", path_arg(&self.params)),
                ("output", path_arg(&output)),
            ],
        )?;
        let text = fs::read_to_string(&output).map_err(|e| {
            PrepError::library(OP, format!("cannot read `{}`: {e}", output.display()))
        })?;
        FeatureMap::from_json(&text)
    }
}
