/// 持久化调度状态
///
/// 只记录最近一次成功拍摄时刻和最近一次发送日期，进程重启后恢复。
/// 状态文件损坏时按空状态处理，最多导致一次重复发送。

use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};
use crate::storage::write_atomic;

/// 状态文件名
pub const STATE_FILE_NAME: &str = "state.json";

/// 持久化状态
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistentState {
    /// 最近一次成功拍摄时刻
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_capture_timestamp: Option<NaiveDateTime>,

    /// 最近一次完成发送的日期
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sent_date: Option<NaiveDate>,
}

impl PersistentState {
    /// 是否已经完成了不早于 `threshold` 的拍摄
    pub fn captured_since(&self, threshold: NaiveDateTime) -> bool {
        self.last_capture_timestamp.is_some_and(|ts| ts >= threshold)
    }

    /// 指定日期的报告是否已经发送
    pub fn sent_on(&self, day: NaiveDate) -> bool {
        self.last_sent_date == Some(day)
    }
}

/// 状态存储
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// 使用存档根目录下的默认状态文件
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(STATE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取状态；文件不存在或损坏时返回空状态
    pub fn load(&self) -> PersistentState {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No state file at {}, starting fresh", self.path.display());
                return PersistentState::default();
            }
            Err(e) => {
                warn!("Failed to read state file {}: {}", self.path.display(), e);
                return PersistentState::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(state) => state,
            Err(e) => {
                warn!("Corrupt state file {} ignored: {}", self.path.display(), e);
                PersistentState::default()
            }
        }
    }

    /// 原子写入状态（临时文件 + rename）
    pub fn save(&self, state: &PersistentState) -> AppResult<()> {
        let json = serde_json::to_vec_pretty(state)
            .map_err(|e| AppError::state(1, format!("序列化状态失败: {}", e)))?;
        write_atomic(&self.path, &json).map_err(|e| {
            AppError::state(2, format!("写入状态文件失败 {}: {}", self.path.display(), e))
        })?;
        debug!("Saved state: {:?}", state);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_state() -> PersistentState {
        PersistentState {
            last_capture_timestamp: NaiveDate::from_ymd_opt(2026, 10, 19)
                .unwrap()
                .and_hms_opt(12, 0, 3),
            last_sent_date: NaiveDate::from_ymd_opt(2026, 10, 18),
        }
    }

    #[test]
    fn test_missing_file_is_empty_state() {
        let temp_dir = TempDir::new().unwrap();
        let store = StateStore::in_dir(temp_dir.path());

        assert_eq!(store.load(), PersistentState::default());
    }

    #[test]
    fn test_save_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = StateStore::in_dir(temp_dir.path());

        store.save(&sample_state()).unwrap();
        assert_eq!(store.load(), sample_state());
    }

    #[test]
    fn test_save_of_load_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let store = StateStore::in_dir(temp_dir.path());
        store.save(&sample_state()).unwrap();
        let before = fs::read(store.path()).unwrap();

        store.save(&store.load()).unwrap();
        assert_eq!(fs::read(store.path()).unwrap(), before);
    }

    #[test]
    fn test_corrupt_file_loads_default() {
        let temp_dir = TempDir::new().unwrap();
        let store = StateStore::in_dir(temp_dir.path());
        store.save(&sample_state()).unwrap();

        fs::write(store.path(), b"{\"last_sent_date\": \"not-a-da").unwrap();
        assert_eq!(store.load(), PersistentState::default());
    }

    #[test]
    fn test_save_failure_is_state_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = StateStore::in_dir(temp_dir.path());
        fs::create_dir_all(store.path()).unwrap();

        let err = store.save(&sample_state()).unwrap_err();
        assert!(matches!(err, AppError::State(2, _)));
    }

    #[test]
    fn test_wire_format() {
        let json = serde_json::to_value(sample_state()).unwrap();
        assert_eq!(json["last_sent_date"], "2026-10-18");
        assert_eq!(json["last_capture_timestamp"], "2026-10-19T12:00:03");

        let empty = serde_json::to_string(&PersistentState::default()).unwrap();
        assert_eq!(empty, "{}");
    }

    #[test]
    fn test_thresholds() {
        let state = sample_state();
        let at = |h, m, s| NaiveDate::from_ymd_opt(2026, 10, 19).unwrap().and_hms_opt(h, m, s).unwrap();

        assert!(state.captured_since(at(12, 0, 0)));
        assert!(!state.captured_since(at(12, 0, 4)));
        assert!(state.sent_on(NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()));
        assert!(!state.sent_on(NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()));
    }
}
