//! 安装包读写
//!
//! 安装包是 zip 文件，根下恰好一个目录，即模块目录。
//! 解压前先检查结构，不合格的包不会写出任何文件。

use std::collections::BTreeSet;
use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::utils::{CoreError, Result};

/// 检查安装包结构，返回唯一的顶层目录名
///
/// # Errors
///
/// - 条目路径逃出包根目录时返回 `MalformedPackage`
/// - 顶层不是恰好一个目录时返回 `MalformedPackage`
pub fn inspect<R: io::Read + io::Seek>(archive: &mut ZipArchive<R>) -> Result<String> {
    let mut top_dirs = BTreeSet::new();
    let mut top_files = BTreeSet::new();

    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        let path = entry
            .enclosed_name()
            .ok_or_else(|| CoreError::MalformedPackage(format!("非法条目路径 '{}'", entry.name())))?;

        let mut components = path.components().filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        });
        let Some(first) = components.next() else {
            continue;
        };

        if components.next().is_some() || entry.is_dir() {
            top_dirs.insert(first);
        } else {
            top_files.insert(first);
        }
    }

    if !top_files.is_empty() {
        return Err(CoreError::MalformedPackage(format!(
            "包根目录下有文件: {}",
            top_files.into_iter().collect::<Vec<_>>().join(", ")
        )));
    }

    let mut dirs = top_dirs.into_iter();
    match (dirs.next(), dirs.next()) {
        (Some(top), None) => Ok(top),
        (None, _) => Err(CoreError::MalformedPackage("安装包为空".to_string())),
        (Some(first), Some(second)) => Err(CoreError::MalformedPackage(format!(
            "包根目录下应只有一个目录，发现 '{}'、'{}' 等",
            first, second
        ))),
    }
}

/// 解压安装包到 `dest`
///
/// # Returns
///
/// 顶层目录名
pub fn extract(zip_path: &Path, dest: &Path) -> Result<String> {
    let mut archive = ZipArchive::new(File::open(zip_path)?)
        .map_err(|e| CoreError::MalformedPackage(format!("无法读取 zip: {}", e)))?;
    let top = inspect(&mut archive)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            continue;
        };
        let out = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out)?;
            continue;
        }

        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = File::create(&out)?;
        io::copy(&mut entry, &mut file)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                std::fs::set_permissions(&out, std::fs::Permissions::from_mode(mode))?;
            }
        }
    }

    Ok(top)
}

/// 在阻塞线程池中解压
pub async fn extract_async(zip_path: PathBuf, dest: PathBuf) -> Result<String> {
    tokio::task::spawn_blocking(move || extract(&zip_path, &dest))
        .await
        .map_err(|e| CoreError::Internal(format!("解压任务失败: {}", e)))?
}

/// 打包模块目录
///
/// 包内所有条目位于 `top_name/` 之下；以 `.` 开头的文件和目录以及 `__pycache__` 被跳过。
pub fn pack_dir(src: &Path, zip_path: &Path, top_name: &str) -> Result<()> {
    let mut writer = ZipWriter::new(File::create(zip_path)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    writer.add_directory(format!("{}/", top_name), options)?;
    pack_recursive(&mut writer, src, top_name, options)?;
    writer.finish()?;
    Ok(())
}

fn pack_recursive(
    writer: &mut ZipWriter<File>,
    dir: &Path,
    prefix: &str,
    options: SimpleFileOptions,
) -> Result<()> {
    let mut entries: Vec<_> = std::fs::read_dir(dir)?.collect::<io::Result<_>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || name == "__pycache__" {
            continue;
        }

        let zip_name = format!("{}/{}", prefix, name);
        if entry.file_type()?.is_dir() {
            writer.add_directory(format!("{}/", zip_name), options)?;
            pack_recursive(writer, &entry.path(), &zip_name, options)?;
        } else {
            writer.start_file(zip_name, options)?;
            let mut file = File::open(entry.path())?;
            io::copy(&mut file, writer)?;
        }
    }

    Ok(())
}

/// 在阻塞线程池中打包
pub async fn pack_dir_async(src: PathBuf, zip_path: PathBuf, top_name: String) -> Result<()> {
    tokio::task::spawn_blocking(move || pack_dir(&src, &zip_path, &top_name))
        .await
        .map_err(|e| CoreError::Internal(format!("打包任务失败: {}", e)))?
}
