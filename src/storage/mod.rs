/// 每日图片存档
///
/// 目录结构: `root/<YYYYMMDD>/image_<YYYYMMDD_HHMMSS>_<role>.jpg`
/// 图片写入后不可变，也不会被自动删除

use chrono::{NaiveDate, NaiveDateTime};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{AppError, AppResult};

/// 存档图片扩展名
pub const IMAGE_EXTENSION: &str = "jpg";

const IMAGE_PREFIX: &str = "image_";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const DAY_FORMAT: &str = "%Y%m%d";

/// 图片角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageRole {
    Primary,
    Secondary,
    Stacked,
}

impl ImageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageRole::Primary => "primary",
            ImageRole::Secondary => "secondary",
            ImageRole::Stacked => "stacked",
        }
    }
}

impl fmt::Display for ImageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImageRole {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(ImageRole::Primary),
            "secondary" => Ok(ImageRole::Secondary),
            "stacked" => Ok(ImageRole::Stacked),
            other => Err(AppError::storage(10, format!("未知的图片角色: {}", other))),
        }
    }
}

/// 图片标识（时间戳 + 角色），按时间先后排序
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImageId {
    pub timestamp: NaiveDateTime,
    pub role: ImageRole,
}

impl ImageId {
    pub fn new(timestamp: NaiveDateTime, role: ImageRole) -> Self {
        Self { timestamp, role }
    }

    /// 所属日期（决定存档目录）
    pub fn date(&self) -> NaiveDate {
        self.timestamp.date()
    }

    /// 规范文件名
    pub fn file_name(&self) -> String {
        format!(
            "{}{}_{}.{}",
            IMAGE_PREFIX,
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.role,
            IMAGE_EXTENSION
        )
    }

    /// 从规范文件名恢复标识；不符合命名规则时返回 None
    pub fn parse_file_name(name: &str) -> Option<Self> {
        let stem = name
            .strip_prefix(IMAGE_PREFIX)?
            .strip_suffix(IMAGE_EXTENSION)?
            .strip_suffix('.')?;
        let (timestamp, role) = stem.rsplit_once('_')?;
        if timestamp.len() != 15 {
            return None;
        }

        let timestamp = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT).ok()?;
        let role = role.parse().ok()?;
        Some(Self { timestamp, role })
    }
}

/// 已写入存档的图片
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedImage {
    pub id: ImageId,
    pub path: PathBuf,
}

impl CapturedImage {
    pub fn timestamp(&self) -> NaiveDateTime {
        self.id.timestamp
    }

    pub fn role(&self) -> ImageRole {
        self.id.role
    }

    pub fn file_name(&self) -> String {
        self.id.file_name()
    }
}

/// 日期目录名 YYYYMMDD
pub fn day_key(date: NaiveDate) -> String {
    date.format(DAY_FORMAT).to_string()
}

/// 解析 YYYYMMDD 日期
pub fn parse_day_key(value: &str) -> AppResult<NaiveDate> {
    let value = value.trim();
    if value.len() != 8 || !value.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::validation(20, format!("日期必须是 YYYYMMDD 格式: {}", value)));
    }
    NaiveDate::parse_from_str(value, DAY_FORMAT)
        .map_err(|e| AppError::validation(21, format!("无效的日期 {}: {}", value, e)))
}

/// 原子写文件：同目录临时文件写入并 fsync 后 rename 覆盖
pub fn write_atomic(path: &Path, bytes: &[u8]) -> AppResult<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| {
        AppError::storage(2, format!("替换文件失败 {}: {}", path.display(), e.error))
    })?;
    Ok(())
}

/// 存档管理器
#[derive(Debug, Clone)]
pub struct ArchiveStore {
    root: PathBuf,
}

impl ArchiveStore {
    /// 创建存档管理器并确保根目录存在
    pub fn new(root: PathBuf) -> AppResult<Self> {
        fs::create_dir_all(&root).map_err(|e| {
            AppError::storage(1, format!("创建存档根目录失败 {}: {}", root.display(), e))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 某天的存档目录
    pub fn day_dir(&self, date: NaiveDate) -> PathBuf {
        self.root.join(day_key(date))
    }

    /// 启动拍摄目录（不计入每日报告）
    pub fn startup_dir(&self) -> PathBuf {
        self.root.join("startup")
    }

    /// 某天的动图摘要路径
    pub fn summary_path(&self, date: NaiveDate) -> PathBuf {
        self.day_dir(date).join(format!("summary_{}.gif", day_key(date)))
    }

    /// 写入一张存档图片
    pub fn write_image(&self, id: ImageId, bytes: &[u8]) -> AppResult<CapturedImage> {
        let path = self.day_dir(id.date()).join(id.file_name());
        write_atomic(&path, bytes)?;
        debug!("Archived {}", path.display());
        Ok(CapturedImage { id, path })
    }

    /// 写入启动拍摄图片
    pub fn write_startup_image(&self, timestamp: NaiveDateTime, bytes: &[u8]) -> AppResult<PathBuf> {
        let name = format!("startup_{}.{}", timestamp.format(TIMESTAMP_FORMAT), IMAGE_EXTENSION);
        let path = self.startup_dir().join(name);
        write_atomic(&path, bytes)?;
        Ok(path)
    }

    /// 列出某天的图片，可按角色过滤，按时间升序
    ///
    /// 只读取该日期目录；文件名不符合规则或日期不符的条目被跳过
    pub fn list_day(&self, date: NaiveDate, role: Option<ImageRole>) -> AppResult<Vec<CapturedImage>> {
        let dir = self.day_dir(date);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut images = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }

            let name = entry.file_name();
            let Some(id) = name.to_str().and_then(ImageId::parse_file_name) else {
                debug!("Skipping unrecognised archive entry {:?}", name);
                continue;
            };

            if id.date() != date || role.is_some_and(|r| r != id.role) {
                continue;
            }

            images.push(CapturedImage { id, path: entry.path() });
        }

        images.sort_by_key(|image| image.id);
        Ok(images)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ts(day: u32, h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, day).unwrap().and_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn test_file_name_format() {
        let id = ImageId::new(ts(19, 7, 0, 5), ImageRole::Stacked);
        assert_eq!(id.file_name(), "image_20261019_070005_stacked.jpg");
    }

    #[test]
    fn test_parse_file_name() {
        let id = ImageId::new(ts(19, 23, 59, 59), ImageRole::Secondary);
        assert_eq!(ImageId::parse_file_name(&id.file_name()), Some(id));

        assert_eq!(ImageId::parse_file_name("image_20261019_070005_other.jpg"), None);
        assert_eq!(ImageId::parse_file_name("image_2026109_070005_primary.jpg"), None);
        assert_eq!(ImageId::parse_file_name("summary_20261019.gif"), None);
        assert_eq!(ImageId::parse_file_name("image_20261019_070005_primary.png"), None);
        assert_eq!(ImageId::parse_file_name("inventory_20261019_070005_EST.jpg"), None);
    }

    #[test]
    fn test_parse_day_key() {
        assert_eq!(parse_day_key("20261019").unwrap(), NaiveDate::from_ymd_opt(2026, 10, 19).unwrap());
        assert!(parse_day_key("2026-10-19").is_err());
        assert!(parse_day_key("20261341").is_err());
        assert!(parse_day_key("").is_err());
    }

    #[test]
    fn test_write_and_list_day() {
        let temp_dir = TempDir::new().unwrap();
        let archive = ArchiveStore::new(temp_dir.path().to_path_buf()).unwrap();

        archive.write_image(ImageId::new(ts(19, 12, 0, 0), ImageRole::Primary), b"b").unwrap();
        archive.write_image(ImageId::new(ts(19, 7, 0, 0), ImageRole::Primary), b"a").unwrap();
        archive.write_image(ImageId::new(ts(19, 7, 0, 0), ImageRole::Secondary), b"s").unwrap();
        archive.write_image(ImageId::new(ts(20, 7, 0, 0), ImageRole::Primary), b"c").unwrap();
        fs::write(archive.day_dir(ts(19, 0, 0, 0).date()).join("notes.txt"), b"x").unwrap();

        let day = ts(19, 0, 0, 0).date();
        let all = archive.list_day(day, None).unwrap();
        assert_eq!(all.len(), 3);

        let primary = archive.list_day(day, Some(ImageRole::Primary)).unwrap();
        let times: Vec<_> = primary.iter().map(|i| i.timestamp()).collect();
        assert_eq!(times, vec![ts(19, 7, 0, 0), ts(19, 12, 0, 0)]);
        assert_eq!(fs::read(&primary[0].path).unwrap(), b"a");
    }

    #[test]
    fn test_list_ignores_misfiled_images() {
        let temp_dir = TempDir::new().unwrap();
        let archive = ArchiveStore::new(temp_dir.path().to_path_buf()).unwrap();
        let day = ts(19, 0, 0, 0).date();

        // 其他日期的图片被错误地放进了当天目录
        let stray = ImageId::new(ts(18, 9, 0, 0), ImageRole::Primary);
        write_atomic(&archive.day_dir(day).join(stray.file_name()), b"x").unwrap();

        assert!(archive.list_day(day, None).unwrap().is_empty());
    }

    #[test]
    fn test_list_missing_day_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let archive = ArchiveStore::new(temp_dir.path().to_path_buf()).unwrap();

        assert!(archive.list_day(ts(19, 0, 0, 0).date(), None).unwrap().is_empty());
    }

    #[test]
    fn test_write_atomic_overwrites() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("file.bin");

        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"two");
        assert_eq!(fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }

    #[test]
    fn test_summary_and_startup_paths() {
        let temp_dir = TempDir::new().unwrap();
        let archive = ArchiveStore::new(temp_dir.path().to_path_buf()).unwrap();
        let day = ts(19, 0, 0, 0).date();

        assert!(archive.summary_path(day).ends_with("20261019/summary_20261019.gif"));

        let startup = archive.write_startup_image(ts(19, 6, 30, 0), b"x").unwrap();
        assert!(startup.starts_with(archive.startup_dir()));
    }
}
