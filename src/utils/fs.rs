//! 文件操作辅助函数
//!
//! 统一把 io 错误转换为带路径的 `AppError`

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tempfile::NamedTempFile;

use crate::error::{AppError, AppResult};

/// 创建目录（含父目录）
pub fn create_dir_all(path: &Path) -> AppResult<()> {
    fs::create_dir_all(path).map_err(|e| AppError::write_failed(path, e))
}

/// 以缩进格式写 JSON，末尾带换行
///
/// `serde_json::Value` 的对象按键排序，输出稳定。通过 [`write_atomic`] 写入。
pub fn write_json_pretty<T: Serialize + ?Sized>(path: &Path, value: &T) -> AppResult<()> {
    let content = serde_json::to_string_pretty(value).map_err(|e| AppError::json_failed(path, e))?;
    write_atomic(path, (content + "\n").as_bytes())
}

/// 原子写入：先写同目录下的临时文件，再重命名到目标路径
///
/// 进程在写入中途被终止时，目标路径要么不存在，要么是旧的完整内容
pub fn write_atomic(path: &Path, contents: &[u8]) -> AppResult<()> {
    let mut partial = partial_file(path)?;
    partial
        .write_all(contents)
        .map_err(|e| AppError::write_failed(path, e))?;
    persist(partial, path)
}

/// 原子复制，语义同 [`write_atomic`]
pub fn copy_file_atomic(src: &Path, dst: &Path) -> AppResult<()> {
    let mut source = fs::File::open(src).map_err(|e| AppError::read_failed(src, e))?;
    let mut partial = partial_file(dst)?;
    std::io::copy(&mut source, partial.as_file_mut()).map_err(|e| AppError::write_failed(dst, e))?;
    persist(partial, dst)
}

fn partial_file(target: &Path) -> AppResult<NamedTempFile> {
    let dir = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    tempfile::Builder::new()
        .prefix(".partial-")
        .tempfile_in(dir)
        .map_err(|e| AppError::write_failed(dir, e))
}

fn persist(partial: NamedTempFile, target: &Path) -> AppResult<()> {
    partial
        .as_file()
        .sync_all()
        .map_err(|e| AppError::write_failed(target, e))?;
    partial
        .persist(target)
        .map_err(|e| AppError::write_failed(target, e.error))?;
    Ok(())
}

/// 复制单个文件
pub fn copy_file(src: &Path, dst: &Path) -> AppResult<()> {
    fs::copy(src, dst).map_err(|e| AppError::write_failed(dst, e))?;
    Ok(())
}

/// 硬链接，跨文件系统时退回复制
pub fn link_or_copy(src: &Path, dst: &Path) -> AppResult<()> {
    if fs::hard_link(src, dst).is_ok() {
        return Ok(());
    }
    copy_file(src, dst)
}

/// 移动文件，跨文件系统时复制后删除源文件
pub fn move_file(src: &Path, dst: &Path) -> AppResult<()> {
    if fs::rename(src, dst).is_ok() {
        return Ok(());
    }
    copy_file(src, dst)?;
    fs::remove_file(src).map_err(|e| AppError::write_failed(src, e))
}

/// 删除文件，不存在时忽略
pub fn remove_file_if_exists(path: &Path) -> AppResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AppError::write_failed(path, e)),
    }
}

/// 删除目录树，不存在时忽略
pub fn remove_dir_if_exists(path: &Path) -> AppResult<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AppError::write_failed(path, e)),
    }
}

/// 递归复制目录，目标已存在时先删除
pub fn copy_dir_all(src: &Path, dst: &Path) -> AppResult<()> {
    remove_dir_if_exists(dst)?;
    copy_dir_recursive(src, dst)
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> AppResult<()> {
    create_dir_all(dst)?;
    for entry in fs::read_dir(src).map_err(|e| AppError::read_failed(src, e))? {
        let entry = entry.map_err(|e| AppError::read_failed(src, e))?;
        let target = dst.join(entry.file_name());
        let file_type = entry.file_type().map_err(|e| AppError::read_failed(entry.path(), e))?;
        if file_type.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            copy_file(&entry.path(), &target)?;
        }
    }
    Ok(())
}
