//! 输出文件的落盘：先写同目录临时文件，再原子地重命名。
//!
//! 中途被杀掉的批处理不会留下半截文件，因此“已存在即跳过”的续跑判断是可靠的。

use crate::error::{PrepError, Result};
use ndarray::{ArrayBase, Data, Dimension};
use ndarray_npy::WritableElement;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// 创建目录（含父目录）。
pub fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| PrepError::write(dir, e))
}

/// 通过`write`写入一个临时路径，成功后将其重命名为`path`。失败时临时文件被删除。
///
/// 临时文件名保留目标文件名作为后缀，以便依赖扩展名（如`.nii.gz`）的写入器正常工作。
pub fn persist_atomically<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = tempfile::Builder::new()
        .prefix(".partial-")
        .suffix(&format!("-{name}"))
        .tempfile_in(dir)
        .map_err(|e| PrepError::write(dir, e))?;
    write(tmp.path())?;
    tmp.persist(path).map_err(|e| PrepError::write(path, e.error))?;
    Ok(())
}

pub fn write_npy<A, S, D>(path: &Path, array: &ArrayBase<S, D>) -> Result<()>
where
    A: WritableElement,
    S: Data<Elem = A>,
    D: Dimension,
{
    persist_atomically(path, |tmp| {
        ndarray_npy::write_npy(tmp, array).map_err(|e| {
            PrepError::write(tmp, std::io::Error::new(std::io::ErrorKind::Other, e))
        })
    })
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| PrepError::library("serde_json", e))?;
    persist_atomically(path, |tmp| fs::write(tmp, text).map_err(|e| PrepError::write(tmp, e)))
}
