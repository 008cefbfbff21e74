//! Advisory lock on a work directory
use crate::error::{KilnError, KilnResult};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Lock file name inside the work dir
pub const LOCK_FILE: &str = ".kiln.lock";

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    /// RFC 3339 start time
    started: String,
}

/// Held for the duration of a run; removed on drop
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    /// Take the lock, replacing a stale one left by a dead process
    pub fn acquire(work_dir: &Path) -> KilnResult<Self> {
        fs::create_dir_all(work_dir).map_err(|e| KilnError::io(work_dir, e))?;
        let path = work_dir.join(LOCK_FILE);

        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let info = LockInfo {
                        pid: std::process::id(),
                        started: Utc::now().to_rfc3339(),
                    };
                    let json = serde_json::to_string(&info)
                        .map_err(|e| KilnError::io(&path, e.into()))?;
                    file.write_all(json.as_bytes())
                        .map_err(|e| KilnError::io(&path, e))?;
                    debug!("Acquired {}", path.display());
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    match read_info(&path) {
                        Some(info) if process_alive(info.pid) => {
                            return Err(KilnError::ConcurrentRun {
                                lock: path,
                                pid: info.pid,
                                started: info.started,
                            });
                        }
                        _ => {
                            warn!("Removing stale lock {}", path.display());
                            match fs::remove_file(&path) {
                                Ok(()) => {}
                                Err(e) if e.kind() == ErrorKind::NotFound => {}
                                Err(e) => return Err(KilnError::io(&path, e)),
                            }
                        }
                    }
                }
                Err(e) => return Err(KilnError::io(&path, e)),
            }
        }

        // Another process re-created the lock between our removal and retry
        let pid = read_info(&path).map(|i| i.pid).unwrap_or(0);
        Err(KilnError::ConcurrentRun {
            lock: path,
            pid,
            started: "unknown".to_string(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            debug!("Could not remove {}: {}", self.path.display(), e);
        }
    }
}

fn read_info(path: &Path) -> Option<LockInfo> {
    let content = fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    true
}
