use crate::subcmd_impls::utils::{file_name, files_under, patient_of, Failures};
use clap::Args;
use mri_prep::naming::{brain_label_for_mri, is_contrast_mri, timepoint_of, CONTRAST_MRI_SUFFIX};
use mri_prep::output::ensure_dir;
use mri_prep::prelude::{
    BiasFieldCorrector, CommandBiasCorrector, CommandThreshold, ForegroundThreshold,
    PipelineConfig, PrepError, Result, StageTimer,
};
use mri_prep::volume::io::{read_label, read_scalar, write_scalar};
use mri_prep::volume::stats::{label_statistics, standardize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Args, Debug)]
pub struct Normalize {
    /// 配准后的数据根目录，每个病例一个子目录。
    #[arg(long = "input-dir", short = 'I')]
    input_dir: PathBuf,
    /// 标准化结果根目录，目录结构与输入相同。
    #[arg(long = "output-dir", short = 'O')]
    output_dir: PathBuf,
    /// 某个病例失败时记录错误并继续处理其余病例（退出码仍非零）。
    #[arg(long)]
    keep_going: bool,
}

impl Normalize {
    pub fn run(&self, config: &PipelineConfig) -> Result<()> {
        let threshold = CommandThreshold::new(config.tools.threshold.clone())?;
        let corrector = CommandBiasCorrector::new(config.tools.bias_correction.clone())?;
        Program::new(
            self.input_dir.clone(),
            self.output_dir.clone(),
            config,
            threshold,
            corrector,
        )
        .run(self.keep_going)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Written,
    Skipped,
}

struct Program<T, B> {
    input_dir: PathBuf,
    output_dir: PathBuf,
    ext: String,
    bins: u32,
    brain_label: u8,
    threshold: T,
    corrector: B,
    timer: StageTimer,
}

impl<T: ForegroundThreshold, B: BiasFieldCorrector> Program<T, B> {
    #[inline]
    pub fn new(
        input_dir: PathBuf,
        output_dir: PathBuf,
        config: &PipelineConfig,
        threshold: T,
        corrector: B,
    ) -> Self {
        Self {
            input_dir,
            output_dir,
            ext: config.layout.ext.clone(),
            bins: config.normalizer.histogram_bins,
            brain_label: config.normalizer.brain_label,
            threshold,
            corrector,
            timer: StageTimer::new(),
        }
    }

    pub fn run(&mut self, keep_going: bool) -> Result<()> {
        let mris: Vec<PathBuf> = files_under(&self.input_dir, 2, 2)?
            .into_iter()
            .filter(|p| is_contrast_mri(file_name(p), &self.ext))
            .collect();
        info!(count = mris.len(), input = %self.input_dir.display(), "发现增强MRI");
        if mris.is_empty() {
            let pattern = format!("*/*{CONTRAST_MRI_SUFFIX}.{}", self.ext);
            return Err(PrepError::missing(self.input_dir.join(pattern)));
        }

        let mut failures = Failures::new(keep_going);
        let (mut written, mut skipped) = (0usize, 0usize);
        for mri in mris.iter() {
            let patient = patient_of(mri);
            match self.run_seq(mri) {
                Ok(Outcome::Written) => written += 1,
                Ok(Outcome::Skipped) => skipped += 1,
                Err(e) => {
                    let tp = timepoint_of(file_name(mri));
                    failures.record(e.in_case(patient, Some(tp)))?
                }
            }
        }
        self.timer.summary();
        info!(written, skipped, failed = failures.count(), "标准化完成");
        failures.finish()
    }

    fn run_seq(&mut self, mri: &Path) -> Result<Outcome> {
        let name = file_name(mri);
        let out_dir = self.output_dir.join(patient_of(mri));
        ensure_dir(&out_dir)?;
        let out_path = out_dir.join(name);
        if out_path.exists() {
            debug!(path = %out_path.display(), "已存在，跳过");
            return Ok(Outcome::Skipped);
        }
        // 在耗时的偏置场校正之前确认脑掩膜存在。
        let brain_path = mri.with_file_name(brain_label_for_mri(name)?);
        if !brain_path.is_file() {
            return Err(PrepError::missing(&brain_path));
        }
        info!(path = %mri.display(), "正在标准化");

        let (threshold, corrector, bins) = (&self.threshold, &self.corrector, self.bins);
        let image = self.timer.time("load", || read_scalar(mri))?;
        let mask = self
            .timer
            .time("threshold", || threshold.foreground_mask(&image, bins))?;
        let mut corrected = self
            .timer
            .time("bias_correction", || corrector.correct(&image, &mask))?;
        drop((image, mask));

        let brain = read_label(&brain_path)?;
        let stats = label_statistics(&corrected, &brain, self.brain_label)?;
        debug!(mean = stats.mean, sigma = stats.sigma, voxels = stats.count, "脑区统计");
        standardize(&mut corrected, &stats)?;
        self.timer.time("write", || write_scalar(&corrected, &out_path))?;
        Ok(Outcome::Written)
    }
}
