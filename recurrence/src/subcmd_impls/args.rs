use clap::{Parser, Subcommand};
use mri_prep::prelude::{PipelineConfig, Result};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "recurrence")]
#[command(about = "脑转移瘤复发研究的MRI预处理批处理工具集.")]
#[command(version, long_about = None)]
pub struct Cli {
    /// TOML配置文件。缺省时全部使用默认配置。
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,
    /// 子命令。
    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    pub fn run_program(&self) -> Result<()> {
        let config = PipelineConfig::load(self.config.as_deref())?;
        match self.command {
            Commands::Normalize(ref v) => v.run(&config),
            Commands::Expand(ref v) => v.run(&config),
            Commands::Extract(ref v) => v.run(&config),
            Commands::Verify(ref v) => v.run(&config),
            Commands::Config(ref v) => v.run(&config),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 偏置场校正后以脑区统计量对增强MRI做z-score标准化。已存在的输出不会重新计算。
    Normalize(crate::subcmd_impls::normalize::Normalize),
    /// 按给定距离外扩肿瘤轮廓并限制在脑区之内，逐个保存为标签图。
    Expand(crate::subcmd_impls::expand::Expand),
    /// 对每个（MRI，外扩轮廓）对计算影像组学特征，保存特征矩阵与对齐的标签、路径列表。
    Extract(crate::subcmd_impls::extract::Extract),
    /// 自动验证外扩结果位于脑区之内，以及特征表各数组逐行对齐。
    Verify(crate::subcmd_impls::verify::Verify),
    /// 打印生效的配置（TOML）。
    Config(crate::subcmd_impls::config::ShowConfig),
}
