//! 外部成像与特征库。
//!
//! 偏置场校正、自动阈值与影像组学特征计算均不在本仓库实现，而是作为不透明的服务调用。
//! 这里定义它们的输入输出约定，以及以外部命令行程序实现这些约定的适配器。

pub mod command;
pub mod radiomics;

pub use command::{CommandBiasCorrector, CommandThreshold};
pub use radiomics::{CommandFeatureEngine, ExtractionSettings, FeatureMap};

use crate::error::{PrepError, Result};
use crate::volume::{LabelVolume, ScalarVolume};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// 基于直方图的自动前景/背景阈值。
pub trait ForegroundThreshold {
    /// 返回与`image`同网格的掩膜，前景为非零。
    fn foreground_mask(&self, image: &ScalarVolume, bins: u32) -> Result<LabelVolume>;
}

/// 偏置场校正。
pub trait BiasFieldCorrector {
    /// 仅以`mask`前景估计偏置场，返回与`image`同网格的校正结果。
    fn correct(&self, image: &ScalarVolume, mask: &LabelVolume) -> Result<ScalarVolume>;
}

/// 影像组学特征计算。分箱宽度、启用的特征类别等在构造时确定。
pub trait FeatureEngine {
    /// 以库的固定输出顺序返回“特征名 -> 值”。
    fn execute(&self, image: &Path, mask: &Path) -> Result<FeatureMap>;
}

/// 外部命令模板。参数中的`{name}`占位符在调用时被替换。
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// 检查模板至少引用了`placeholders`中的每一个占位符。
    pub fn require(&self, tool: &str, placeholders: &[&str]) -> Result<()> {
        if self.program.trim().is_empty() {
            return Err(PrepError::Config(format!("tool `{tool}` has an empty program")));
        }
        for p in placeholders {
            let token = format!("{{{p}}}");
            if !self.args.iter().any(|a| a.contains(&token)) {
                return Err(PrepError::Config(format!(
                    "tool `{tool}` never references `{token}` in its arguments"
                )));
            }
        }
        Ok(())
    }

    /// 用`vars`替换参数中的占位符。
    pub fn render(&self, vars: &[(&str, String)]) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                vars.iter().fold(arg.clone(), |acc, (name, value)| {
                    acc.replace(&format!("{{{name}}}"), value)
                })
            })
            .collect()
    }

    /// 运行命令。非零退出或无法启动都视为`op`失败。
    pub fn run(&self, op: &'static str, vars: &[(&str, String)]) -> Result<()> {
        let args = self.render(vars);
        debug!(op, program = %self.program, ?args, "调用外部程序");
        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .map_err(|e| PrepError::library(op, format!("cannot start `{}`: {e}", self.program)))?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: Vec<&str> = stderr.lines().rev().take(5).collect();
        let tail: Vec<&str> = tail.into_iter().rev().collect();
        Err(PrepError::library(
            op,
            format!(
                "`{}` exited with {}: {}",
                self.program,
                output.status,
                tail.join(" | ")
            ),
        ))
    }
}

/// 路径转为传给外部程序的字符串。
#[inline]
pub(crate) fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
