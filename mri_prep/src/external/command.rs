//! 以外部命令行程序实现的阈值与偏置场校正。
//!
//! 体数据通过一个临时目录交换；临时目录在调用结束（包括出错）时删除。

use super::{path_arg, BiasFieldCorrector, ForegroundThreshold, ToolCommand};
use crate::error::{PrepError, Result};
use crate::volume::io::{read_label, read_scalar, write_label, write_scalar};
use crate::volume::{LabelVolume, ScalarVolume, Volume};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// 交换文件统一使用压缩NIfTI。
const SCRATCH_EXT: &str = "nii.gz";

fn scratch_dir() -> Result<TempDir> {
    tempfile::Builder::new()
        .prefix("mri-prep-")
        .tempdir()
        .map_err(|e| PrepError::write(std::env::temp_dir(), e))
}

fn scratch_file(dir: &Path, stem: &str) -> PathBuf {
    dir.join(format!("{stem}.{SCRATCH_EXT}"))
}

fn ensure_output(path: &Path, op: &'static str) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(PrepError::library(
            op,
            format!("tool finished without writing `{}`", path.display()),
        ))
    }
}

fn check_grid<T, U>(
    op: &'static str,
    input: &Volume<T>,
    output: &Volume<U>,
) -> Result<()> {
    if input.same_grid(output) {
        Ok(())
    } else {
        Err(PrepError::library(
            op,
            format!(
                "tool output shape {:?} differs from input shape {:?}",
                output.shape(),
                input.shape()
            ),
        ))
    }
}

/// 调用外部程序计算自动阈值掩膜。模板占位符：`{input}`、`{output}`、`{bins}`。
#[derive(Clone, Debug)]
pub struct CommandThreshold {
    command: ToolCommand,
}

impl CommandThreshold {
    pub fn new(command: ToolCommand) -> Result<Self> {
        command.require("threshold", &["input", "output"])?;
        Ok(Self { command })
    }
}

impl ForegroundThreshold for CommandThreshold {
    fn foreground_mask(&self, image: &ScalarVolume, bins: u32) -> Result<LabelVolume> {
        const OP: &str = "automatic threshold";
        let dir = scratch_dir()?;
        let input = scratch_file(dir.path(), "image");
        let output = scratch_file(dir.path(), "mask");
        write_scalar(image, &input)?;
        self.command.run(
            OP,
            &[
                ("input", path_arg(&input)),
                ("output", path_arg(&output)),
                ("bins", bins.to_string()),
            ],
        )?;
        ensure_output(&output, OP)?;
        let mut mask = read_label(&output)?;
        check_grid(OP, image, &mask)?;
        mask.data.mapv_inplace(|v| u8::from(v != 0));
        Ok(mask)
    }
}

/// 调用外部程序做偏置场校正。模板占位符：`{input}`、`{mask}`、`{output}`。
#[derive(Clone, Debug)]
pub struct CommandBiasCorrector {
    command: ToolCommand,
}

impl CommandBiasCorrector {
    pub fn new(command: ToolCommand) -> Result<Self> {
        command.require("bias_correction", &["input", "mask", "output"])?;
        Ok(Self { command })
    }
}

impl BiasFieldCorrector for CommandBiasCorrector {
    fn correct(&self, image: &ScalarVolume, mask: &LabelVolume) -> Result<ScalarVolume> {
        const OP: &str = "bias field correction";
        check_grid(OP, image, mask)?;
        let dir = scratch_dir()?;
        let input = scratch_file(dir.path(), "image");
        let mask_path = scratch_file(dir.path(), "mask");
        let output = scratch_file(dir.path(), "corrected");
        write_scalar(image, &input)?;
        write_label(mask, &mask_path)?;
        self.command.run(
            OP,
            &[
                ("input", path_arg(&input)),
                ("mask", path_arg(&mask_path)),
                ("output", path_arg(&output)),
            ],
        )?;
        ensure_output(&output, OP)?;
        let corrected = read_scalar(&output)?;
        check_grid(OP, image, &corrected)?;
        // 保留原始头信息（方位、间距），外部工具可能改写其中的描述字段。
        image.with_data(corrected.data)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use ndarray::Array3;
    use nifti::NiftiHeader;

    fn image() -> ScalarVolume {
        let data = Array3::from_shape_fn((3, 3, 3), |(i, j, k)| (i + j + k) as f32);
        Volume::new(data, NiftiHeader::default())
    }

    #[test]
    fn test_copy_tool_round_trip() {
        // 只复制输入：校正结果等于输入。
        let cmd = ToolCommand::new(
            "sh",
            &["-c", "cp \"$1\" \"$3\"", "sh", "{input}", "{mask}", "{output}"],
        );
        let corrector = CommandBiasCorrector::new(cmd).unwrap();
        let img = image();
        let mask = img.with_data(Array3::<u8>::ones((3, 3, 3))).unwrap();
        let out = corrector.correct(&img, &mask).unwrap();
        assert_eq!(out.data, img.data);

        let missing_mask = ToolCommand::new("cp", &["{input}", "{output}"]);
        assert!(CommandBiasCorrector::new(missing_mask).is_err());
    }

    #[test]
    fn test_threshold_binarizes_tool_output() {
        // 以输入图像本身作为“掩膜”：非零体素均为前景。
        let cmd = ToolCommand::new("cp", &["{input}", "{output}"]);
        let threshold = CommandThreshold::new(cmd).unwrap();
        let mask = threshold.foreground_mask(&image(), 200).unwrap();
        assert_eq!(mask.data[[0, 0, 0]], 0);
        assert!(mask.data.iter().all(|&v| v <= 1));
        assert_eq!(mask.data.iter().filter(|&&v| v == 1).count(), 26);
    }

    #[test]
    fn test_tool_without_output_fails() {
        let threshold = CommandThreshold::new(ToolCommand::new(
            "sh",
            &["-c", "true", "{input}", "{output}"],
        ))
        .unwrap();
        let err = threshold.foreground_mask(&image(), 200).unwrap_err();
        assert!(err.to_string().contains("without writing"));
    }
}
