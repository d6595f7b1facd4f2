use mri_prep::prelude::{PrepError, Result};
use std::path::{Path, PathBuf};
use tracing::error;
use walkdir::WalkDir;

pub fn require_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        Ok(())
    } else {
        Err(PrepError::missing(dir))
    }
}

fn walk(root: &Path, min_depth: usize, max_depth: usize, dirs: bool) -> Result<Vec<PathBuf>> {
    require_dir(root)?;
    let mut found = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(min_depth)
        .max_depth(max_depth)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| PrepError::library("walk directory", e))?;
        let ty = entry.file_type();
        if (dirs && ty.is_dir()) || (!dirs && ty.is_file()) {
            found.push(entry.into_path());
        }
    }
    Ok(found)
}

/// `root`下深度在`[min_depth, max_depth]`之间的文件，按路径排序。
#[inline]
pub fn files_under(root: &Path, min_depth: usize, max_depth: usize) -> Result<Vec<PathBuf>> {
    walk(root, min_depth, max_depth, false)
}

/// `root`的直接子目录，按名称排序。
#[inline]
pub fn sub_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    walk(root, 1, 1, true)
}

#[inline]
pub fn file_name(path: &Path) -> &str {
    path.file_name().and_then(|n| n.to_str()).unwrap_or_default()
}

/// 文件所在的病例目录名。
#[inline]
pub fn patient_of(path: &Path) -> &str {
    path.parent().map(file_name).unwrap_or_default()
}

/// 逐病例执行时的失败记录。
///
/// 不继续执行时，第一个错误直接返回；否则记录下来，在批处理结束时返回第一个错误。
#[derive(Debug)]
pub struct Failures {
    keep_going: bool,
    count: usize,
    first: Option<PrepError>,
}

impl Failures {
    #[inline]
    pub fn new(keep_going: bool) -> Self {
        Self {
            keep_going,
            count: 0,
            first: None,
        }
    }

    /// 返回`Err`表示批处理应当中止。
    pub fn record(&mut self, err: PrepError) -> Result<()> {
        if !self.keep_going {
            return Err(err);
        }
        error!("{err}");
        self.count += 1;
        if self.first.is_none() {
            self.first = Some(err);
        }
        Ok(())
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn finish(self) -> Result<()> {
        match self.first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
