use crate::subcmd_impls::utils::{file_name, files_under, sub_dirs, Failures};
use clap::Args;
use mri_prep::naming::{
    brain_label_name, expansion_file_name, is_brain_mask, is_label_at, label_base, margin_tag,
};
use mri_prep::output::ensure_dir;
use mri_prep::prelude::{
    LabelVolume, LogicalOperation, PipelineConfig, PrepError, Result, Segmentation, StageTimer,
};
use mri_prep::volume::io::{read_label, write_label};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const BRAIN_SEGMENT: &str = "brain";

#[derive(Args, Debug)]
pub struct Expand {
    /// 配准后的数据根目录，每个病例一个子目录。
    #[arg(long = "input-dir", short = 'I')]
    input_dir: PathBuf,
    /// 外扩结果根目录。
    #[arg(long = "output-dir", short = 'O')]
    output_dir: PathBuf,
    /// 某个病例失败时记录错误并继续处理其余病例（退出码仍非零）。
    #[arg(long)]
    keep_going: bool,
}

impl Expand {
    pub fn run(&self, config: &PipelineConfig) -> Result<()> {
        Program::new(self.input_dir.clone(), self.output_dir.clone(), config).run(self.keep_going)
    }
}

/// 一个肿瘤掩膜尚未生成的外扩结果。
struct Pending {
    tumor: PathBuf,
    margins: Vec<(f64, PathBuf)>,
}

struct Program {
    input_dir: PathBuf,
    output_dir: PathBuf,
    ext: String,
    timepoints: Vec<String>,
    margins: Vec<f64>,
    timer: StageTimer,
    written: usize,
    skipped: usize,
}

impl Program {
    #[inline]
    pub fn new(input_dir: PathBuf, output_dir: PathBuf, config: &PipelineConfig) -> Self {
        Self {
            input_dir,
            output_dir,
            ext: config.layout.ext.clone(),
            timepoints: config.expander.timepoints.clone(),
            margins: config.expander.margins_mm.clone(),
            timer: StageTimer::new(),
            written: 0,
            skipped: 0,
        }
    }

    pub fn run(&mut self, keep_going: bool) -> Result<()> {
        let patients = sub_dirs(&self.input_dir)?;
        info!(count = patients.len(), input = %self.input_dir.display(), "发现病例");

        let mut failures = Failures::new(keep_going);
        for patient_dir in patients.iter() {
            let patient = file_name(patient_dir);
            let out_dir = self.output_dir.join(patient);
            if let Err(e) = ensure_dir(&out_dir) {
                failures.record(e.in_case(patient, None))?;
                continue;
            }
            for tp in self.timepoints.clone().iter() {
                if let Err(e) = self.run_seq(patient_dir, &out_dir, tp) {
                    failures.record(e.in_case(patient, Some(tp.as_str())))?;
                }
            }
        }
        self.timer.summary();
        info!(
            written = self.written,
            skipped = self.skipped,
            failed = failures.count(),
            "轮廓外扩完成"
        );
        failures.finish()
    }

    /// 处理一个病例的一个时间点。
    fn run_seq(&mut self, patient_dir: &Path, out_dir: &Path, timepoint: &str) -> Result<()> {
        let brain_path = patient_dir.join(brain_label_name(timepoint, &self.ext));
        let brain = self.timer.time("load", || read_label(&brain_path))?;
        let mut brain_seg = Segmentation::from_labelmap(&brain, BRAIN_SEGMENT)?;
        // 多标签的脑掩膜只取第一个分割段。
        if let Some(id) = brain_seg.nth_segment_id(0).map(str::to_string) {
            brain_seg.set_segment_name(&id, BRAIN_SEGMENT)?;
        }

        for pending in self.pending(patient_dir, out_dir, timepoint)? {
            if pending.margins.is_empty() {
                continue;
            }
            info!(path = %pending.tumor.display(), "正在外扩");
            let tumor = self.timer.time("load", || read_label(&pending.tumor))?;
            let timer = &mut self.timer;
            let expansions = timer.time("expand", || {
                expand_tumor(&tumor, label_base(file_name(&pending.tumor)), &brain_seg, &pending.margins)
            })?;
            for (volume, path) in expansions.iter() {
                timer.time("write", || write_label(volume, path))?;
                debug!(path = %path.display(), "已保存");
            }
            self.written += expansions.len();
        }
        Ok(())
    }

    /// 该时间点的肿瘤掩膜（按文件名排序）及各自尚未生成的外扩结果。
    fn pending(&mut self, patient_dir: &Path, out_dir: &Path, timepoint: &str) -> Result<Vec<Pending>> {
        let mut list = Vec::new();
        for tumor in files_under(patient_dir, 1, 1)? {
            let name = file_name(&tumor);
            if !is_label_at(name, timepoint, &self.ext) || is_brain_mask(name) {
                continue;
            }
            let mut margins = Vec::with_capacity(self.margins.len());
            for &m in self.margins.iter() {
                let out = out_dir.join(expansion_file_name(name, m)?);
                if out.exists() {
                    debug!(path = %out.display(), "已存在，跳过");
                    self.skipped += 1;
                } else {
                    margins.push((m, out));
                }
            }
            list.push(Pending { tumor, margins });
        }
        Ok(list)
    }
}

/// 对一个肿瘤掩膜生成各个外扩距离的结果，每个结果都位于肿瘤掩膜的几何上。
///
/// 所有分割对象都在本函数内创建和释放。
fn expand_tumor(
    tumor: &LabelVolume,
    tumor_id: &str,
    brain_seg: &Segmentation,
    margins: &[(f64, PathBuf)],
) -> Result<Vec<(LabelVolume, PathBuf)>> {
    let mut seg = Segmentation::from_labelmap(tumor, tumor_id)?;
    let gtv_id = seg
        .nth_segment_id(0)
        .map(str::to_string)
        .ok_or_else(|| PrepError::library("import labelmap", "no tumor segment"))?;
    let brain_id = brain_seg
        .nth_segment_id(0)
        .ok_or_else(|| PrepError::library("import labelmap", "no brain segment"))?;
    // 复制后的ID可能因重名而被改写。
    let brain_id = seg.copy_segment_from(brain_seg, brain_id)?;

    let mut out = Vec::with_capacity(margins.len());
    for (margin, path) in margins.iter() {
        let id = seg.add_empty_segment(&format!("{gtv_id}_{}", margin_tag(*margin)));
        seg.apply_logical(&id, LogicalOperation::Copy, &gtv_id)?;
        seg.apply_margin(&id, *margin)?;
        seg.apply_logical(&id, LogicalOperation::Intersect, &brain_id)?;
        out.push((seg.export_labelmap(&[id.as_str()])?, path.clone()));
    }
    Ok(out)
}
