use crate::subcmd_impls::utils::{file_name, files_under, patient_of, require_dir};
use clap::Args;
use mri_prep::naming::{
    contrast_mri_name, feature_run_dir_name, is_expansion_candidate, is_gtv_mask, LABEL_SUFFIX,
};
use mri_prep::output::write_json;
use mri_prep::prelude::{
    CommandFeatureEngine, ExtractionSettings, FeatureEngine, FeatureTable, PipelineConfig,
    PrepError, Result, StageTimer,
};
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Args, Debug)]
pub struct Extract {
    /// 标准化后的MRI根目录（递归查找）。
    #[arg(long = "input-dir", short = 'I')]
    input_dir: PathBuf,
    /// 外扩轮廓根目录，每个病例一个子目录。
    #[arg(long = "contour-dir", short = 'C')]
    contour_dir: PathBuf,
    /// 特征输出根目录；本次运行的结果写入按参数命名的子目录。
    #[arg(long = "output-dir", short = 'O')]
    output_dir: PathBuf,
}

impl Extract {
    pub fn run(&self, config: &PipelineConfig) -> Result<()> {
        let settings = config.extractor.settings();
        let engine = CommandFeatureEngine::new(config.tools.radiomics.clone(), &settings)?;
        let run_dir = self.output_dir.join(feature_run_dir_name(
            settings.bin_width,
            &config.extractor.expansion,
            &config.extractor.timepoint,
        ));
        Program::new(
            self.input_dir.clone(),
            self.contour_dir.clone(),
            run_dir,
            config,
            settings,
            engine,
        )
        .run()
    }
}

struct Program<E> {
    mri_dir: PathBuf,
    contour_dir: PathBuf,
    run_dir: PathBuf,
    ext: String,
    timepoint: String,
    contour_timepoint: String,
    expansion: String,
    anchor: String,
    settings: ExtractionSettings,
    engine: E,
    timer: StageTimer,
}

impl<E: FeatureEngine> Program<E> {
    #[inline]
    pub fn new(
        mri_dir: PathBuf,
        contour_dir: PathBuf,
        run_dir: PathBuf,
        config: &PipelineConfig,
        settings: ExtractionSettings,
        engine: E,
    ) -> Self {
        let ex = &config.extractor;
        Self {
            mri_dir,
            contour_dir,
            run_dir,
            ext: config.layout.ext.clone(),
            timepoint: ex.timepoint.clone(),
            contour_timepoint: ex.contour_timepoint.clone(),
            expansion: ex.expansion.clone(),
            anchor: ex.anchor_feature.clone(),
            settings,
            engine,
            timer: StageTimer::new(),
        }
    }

    pub fn run(&mut self) -> Result<()> {
        require_dir(&self.contour_dir)?;
        let target = contrast_mri_name(&self.timepoint, &self.ext);
        let mris: Vec<PathBuf> = files_under(&self.mri_dir, 1, usize::MAX)?
            .into_iter()
            .filter(|p| file_name(p) == target)
            .collect();
        info!(count = mris.len(), input = %self.mri_dir.display(), "发现标准化MRI");
        if mris.is_empty() {
            return Err(PrepError::missing(self.mri_dir.join("**").join(target)));
        }

        let mut table = FeatureTable::new();
        for mri in mris.iter() {
            let patient = patient_of(mri);
            self.run_seq(mri, &mut table)
                .map_err(|e| e.in_case(patient, Some(self.timepoint.as_str())))?;
        }

        let files = table.persist(&self.run_dir, &self.timepoint)?;
        write_json(&self.run_dir.join("params.json"), &self.settings.to_params())?;
        self.timer.summary();
        info!(
            rows = table.len(),
            features = table.feature_names().len(),
            gtv = table.labels().iter().filter(|&&l| l).count(),
            matrix = %files.matrix.display(),
            "特征提取完成"
        );
        Ok(())
    }

    fn run_seq(&mut self, mri: &Path, table: &mut FeatureTable) -> Result<()> {
        let contours = self.candidates(patient_of(mri))?;
        for contour in contours.iter() {
            info!(mri = %mri.display(), contour = %contour.display(), "正在提取特征");
            let engine = &self.engine;
            let features = self.timer.time("features", || engine.execute(mri, contour))?;
            let (names, values) = features.retain_from(&self.anchor)?;
            table.push(names, values, is_gtv_mask(file_name(contour)), mri, contour)?;
        }
        Ok(())
    }

    /// 病例轮廓目录下的候选外扩掩膜，按文件名排序。没有候选时报错。
    fn candidates(&self, patient: &str) -> Result<Vec<PathBuf>> {
        let dir = self.contour_dir.join(patient);
        let found: Vec<PathBuf> = files_under(&dir, 1, 1)?
            .into_iter()
            .filter(|p| {
                is_expansion_candidate(file_name(p), &self.contour_timepoint, &self.expansion, &self.ext)
            })
            .collect();
        if found.is_empty() {
            let pattern = if self.expansion.is_empty() {
                format!("{}*{LABEL_SUFFIX}.{}", self.contour_timepoint, self.ext)
            } else {
                format!("{}*_{}{LABEL_SUFFIX}.{}", self.contour_timepoint, self.expansion, self.ext)
            };
            return Err(PrepError::missing(dir.join(pattern)));
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mri_prep::prelude::FeatureMap;
    use ndarray::Array2;
    use serde_json::{json, Value};
    use std::fs;
    use tempfile::TempDir;

    const ANCHOR: &str = "original_firstorder_10Percentile";

    /// 特征值取轮廓文件名长度，便于核对行与路径的对应关系。
    struct FakeEngine {
        anchor: bool,
    }

    impl FeatureEngine for FakeEngine {
        fn execute(&self, _image: &Path, mask: &Path) -> Result<FeatureMap> {
            let mut entries = vec![("diagnostics_Versions_PyRadiomics".to_string(), json!("v3"))];
            if self.anchor {
                entries.push((ANCHOR.to_string(), json!(file_name(mask).len())));
            }
            entries.push(("original_glcm_Contrast".to_string(), json!("0.5")));
            Ok(FeatureMap::new(entries))
        }
    }

    fn tree(root: &Path) {
        for p in ["p1", "p2"] {
            fs::create_dir_all(root.join("mri").join(p)).unwrap();
            fs::write(root.join("mri").join(p).join("3month_contrastMRI.nii.gz"), "").unwrap();
            fs::write(root.join("mri").join(p).join("6month_contrastMRI.nii.gz"), "").unwrap();
            let c = root.join("contours").join(p);
            fs::create_dir_all(&c).unwrap();
            for name in [
                "3month_GTV_0mm_label.nii.gz",
                "3month_Necrosis_0mm_label.nii.gz",
                "3month_Brain_0mm_label.nii.gz",
                "3month_GTV_2mm_label.nii.gz",
                "6month_GTV_0mm_label.nii.gz",
            ] {
                fs::write(c.join(name), "").unwrap();
            }
        }
    }

    fn program(root: &Path, anchor: bool) -> Program<FakeEngine> {
        let config = PipelineConfig::default();
        Program::new(
            root.join("mri"),
            root.join("contours"),
            root.join("out"),
            &config,
            config.extractor.settings(),
            FakeEngine { anchor },
        )
    }

    #[test]
    fn test_rows_aligned_with_paths() {
        let tmp = TempDir::new().unwrap();
        tree(tmp.path());
        program(tmp.path(), true).run().unwrap();

        let table = FeatureTable::load(&tmp.path().join("out"), "3month").unwrap();
        table.check_alignment().unwrap();
        assert_eq!(table.labels(), &[true, false, true, false]);
        assert_eq!(table.feature_names(), &[ANCHOR, "original_glcm_Contrast"]);

        let mat: Array2<f64> =
            ndarray_npy::read_npy(tmp.path().join("out/3month_contour_extractions_mat.npy")).unwrap();
        assert_eq!(mat.shape(), &[4, 2]);
        assert_eq!(mat[[0, 0]], "3month_GTV_0mm_label.nii.gz".len() as f64);
        assert_eq!(mat[[1, 0]], "3month_Necrosis_0mm_label.nii.gz".len() as f64);
        assert_eq!(mat[[1, 1]], 0.5);

        let contours: Vec<String> = serde_json::from_str(
            &fs::read_to_string(tmp.path().join("out/3month_contour_path_list.json")).unwrap(),
        )
        .unwrap();
        assert!(contours[0].ends_with("p1/3month_GTV_0mm_label.nii.gz"));
        assert!(contours[3].ends_with("p2/3month_Necrosis_0mm_label.nii.gz"));

        let params: Value = serde_json::from_str(
            &fs::read_to_string(tmp.path().join("out/params.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(params["setting"]["binWidth"], 0.015);
    }

    #[test]
    fn test_missing_anchor_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        tree(tmp.path());
        let err = program(tmp.path(), false).run().unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert!(err.to_string().contains(ANCHOR));
        assert!(!tmp.path().join("out").exists());
    }

    #[test]
    fn test_patient_without_candidates() {
        let tmp = TempDir::new().unwrap();
        tree(tmp.path());
        for entry in fs::read_dir(tmp.path().join("contours/p2")).unwrap() {
            fs::remove_file(entry.unwrap().path()).unwrap();
        }
        let err = program(tmp.path(), true).run().unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("p2"));
        assert!(err.to_string().contains("3month*_0mm_label.nii.gz"));
    }

    #[test]
    fn test_no_mri_found_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        tree(tmp.path());
        let mut config = PipelineConfig::default();
        config.layout.ext = "nrrd".into();
        let mut prog = Program::new(
            tmp.path().join("mri"),
            tmp.path().join("contours"),
            tmp.path().join("out"),
            &config,
            config.extractor.settings(),
            FakeEngine { anchor: true },
        );
        let err = prog.run().unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("3month_contrastMRI.nrrd"));
        assert!(!tmp.path().join("out").exists());
    }
}
