/// 单实例锁
///
/// 以文件路径为键的非阻塞排他锁。Unix 下使用 flock(2)，
/// 进程崩溃时由内核自动释放；其他平台使用独占创建的锁文件。

use log::debug;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// 锁文件名
pub const LOCK_FILE_NAME: &str = ".image-emailer.lock";

/// 持有中的实例锁，drop 时释放
#[derive(Debug)]
pub struct InstanceLock {
    path: PathBuf,
    file: File,
}

impl InstanceLock {
    /// 尝试获取锁；已被其他实例持有时返回 `Ok(None)`
    pub fn try_acquire(path: &Path) -> AppResult<Option<Self>> {
        let Some(mut file) = open_locked(path)? else {
            debug!("Lock {} is held by another instance", path.display());
            return Ok(None);
        };

        // 记录持有者 pid，便于排查
        write_owner_pid(&mut file)
            .map_err(|e| AppError::lock(2, format!("写入锁文件失败: {}", e)))?;

        Ok(Some(Self {
            path: path.to_path_buf(),
            file,
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 显式释放锁
    pub fn release(self) {
        drop(self);
    }
}

fn write_owner_pid(file: &mut File) -> std::io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    write!(file, "{}", std::process::id())?;
    file.flush()
}

#[cfg(unix)]
fn open_locked(path: &Path) -> AppResult<Option<File>> {
    use std::os::unix::io::AsRawFd;

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| AppError::lock(1, format!("打开锁文件失败 {}: {}", path.display(), e)))?;

    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(Some(file));
    }

    let err = std::io::Error::last_os_error();
    if err.kind() == ErrorKind::WouldBlock {
        Ok(None)
    } else {
        Err(AppError::lock(3, format!("获取锁失败 {}: {}", path.display(), err)))
    }
}

#[cfg(not(unix))]
fn open_locked(path: &Path) -> AppResult<Option<File>> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => Ok(Some(file)),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(None),
        Err(e) => Err(AppError::lock(1, format!("创建锁文件失败 {}: {}", path.display(), e))),
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            unsafe {
                libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
            }
        }
        #[cfg(not(unix))]
        {
            let _ = std::fs::remove_file(&self.path);
        }
        debug!("Released lock {}", self.path.display());
    }
}
