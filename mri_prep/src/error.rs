//! 批处理错误分类与退出码。

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PrepError>;

#[derive(Error, Debug)]
pub enum PrepError {
    /// 必需的输入文件（例如同一时间点的脑掩膜）不存在。
    #[error("missing input file `{}`", .path.display())]
    MissingInput { path: PathBuf },
    /// 外部成像/特征库（或进程内等价实现）调用失败。
    #[error("{op} failed: {detail}")]
    Library { op: &'static str, detail: String },
    /// 输出目录或文件无法写入。
    #[error("cannot write `{}`: {source}", .path.display())]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// 并行数组（特征矩阵、标签、路径列表）行数不一致。
    #[error("data alignment violated: {0}")]
    Alignment(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    /// 附带病例与时间点信息，便于人工修复后续跑。
    #[error("patient `{patient}`{}: {source}", timepoint_suffix(.timepoint))]
    Case {
        patient: String,
        timepoint: Option<String>,
        #[source]
        source: Box<PrepError>,
    },
}

fn timepoint_suffix(timepoint: &Option<String>) -> String {
    match timepoint {
        Some(t) => format!(", timepoint `{t}`"),
        None => String::new(),
    }
}

impl PrepError {
    #[inline]
    pub fn library(op: &'static str, detail: impl ToString) -> Self {
        PrepError::Library {
            op,
            detail: detail.to_string(),
        }
    }

    #[inline]
    pub fn missing(path: impl AsRef<Path>) -> Self {
        PrepError::MissingInput {
            path: path.as_ref().to_path_buf(),
        }
    }

    #[inline]
    pub fn write(path: impl AsRef<Path>, source: io::Error) -> Self {
        PrepError::OutputWrite {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// 为错误附加病例上下文。已经带有上下文的错误保持不变。
    pub fn in_case(self, patient: &str, timepoint: Option<&str>) -> Self {
        match self {
            e @ PrepError::Case { .. } => e,
            e => PrepError::Case {
                patient: patient.to_string(),
                timepoint: timepoint.map(str::to_string),
                source: Box::new(e),
            },
        }
    }

    /// 按错误类别给出进程退出码。
    pub fn exit_code(&self) -> i32 {
        match self {
            PrepError::MissingInput { .. } => 2,
            PrepError::Library { .. } => 3,
            PrepError::OutputWrite { .. } => 4,
            PrepError::Alignment(_) => 5,
            PrepError::Config(_) => 6,
            PrepError::Case { source, .. } => source.exit_code(),
        }
    }
}

impl From<nifti::NiftiError> for PrepError {
    fn from(e: nifti::NiftiError) -> Self {
        PrepError::library("nifti", e)
    }
}
