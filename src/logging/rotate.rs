use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Local, TimeDelta};
use rayon::prelude::*;

use crate::logging;

/// 單檔上限 10 MB
const DEFAULT_MAX_SIZE: u64 = 10 * 1024 * 1024;
/// 日誌保留 7 天
const DEFAULT_MAX_AGE_DAYS: i64 = 7;

/// 依日期與檔案大小輪轉的日誌檔寫入器
///
/// 檔名由 chrono 格式字串產生，例如 `log/%Y-%m-%d-quote.log`。
/// 同一天內檔案超過 `max_size` 時會開新的世代：
///
/// - 第 0 代：`log/2025-04-23-quote.log`
/// - 第 1 代：`log/2025-04-23-quote.1.log`
///
/// 世代只增不減，舊檔不會被覆蓋；日期變更時世代歸零。
pub struct Rotate {
    pattern: String,
    base_fn: String,
    current_fn: String,
    writer: Option<BufWriter<File>>,
    generation: u32,
    max_size: u64,
    current_size: u64,
    max_age: TimeDelta,
}

impl Rotate {
    pub fn new(pattern: String) -> Self {
        Self::with_options(pattern, DEFAULT_MAX_SIZE, DEFAULT_MAX_AGE_DAYS)
    }

    pub fn with_options(pattern: String, max_size: u64, max_age_days: i64) -> Self {
        Rotate {
            pattern,
            base_fn: String::new(),
            current_fn: String::new(),
            writer: None,
            generation: 0,
            max_size,
            current_size: 0,
            max_age: TimeDelta::try_days(max_age_days).unwrap_or(TimeDelta::days(7)),
        }
    }

    /// 寫入一段訊息，必要時先依日期或大小輪轉
    pub fn write_msg(&mut self, now: DateTime<Local>, msg: &[u8]) -> Result<()> {
        let base_fn = now.format(&self.pattern).to_string();
        if base_fn != self.base_fn {
            self.base_fn = base_fn;
            self.generation = 0;
            self.open_file()?;
            self.remove_expired(now);
        }

        if self.current_size > 0 && self.current_size + msg.len() as u64 > self.max_size {
            self.flush();
            self.generation += 1;
            self.open_file()?;
        }

        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| anyhow!("log file {} is not open", self.current_fn))?;
        writer.write_all(msg)?;
        self.current_size += msg.len() as u64;

        Ok(())
    }

    pub fn flush(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
    }

    pub fn current_file(&self) -> &str {
        &self.current_fn
    }

    fn generation_fn(base_fn: &str, generation: u32) -> String {
        if generation == 0 {
            return base_fn.to_string();
        }

        let path = Path::new(base_fn);
        let parent = path.parent().unwrap_or(Path::new(""));
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("log");
        let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("log");

        parent
            .join(format!("{}.{}.{}", stem, generation, ext))
            .to_string_lossy()
            .to_string()
    }

    fn open_file(&mut self) -> Result<()> {
        self.flush();

        // 已存在且寫滿的世代直接跳過，避免同一天重啟後覆寫
        loop {
            let filename = Self::generation_fn(&self.base_fn, self.generation);
            let size = fs::metadata(&filename).map(|m| m.len()).unwrap_or(0);
            if size < self.max_size {
                break;
            }
            self.generation += 1;
        }

        let filename = Self::generation_fn(&self.base_fn, self.generation);
        if let Some(parent) = Path::new(&filename).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&filename)?;

        self.current_size = file.metadata().map(|m| m.len()).unwrap_or(0);
        self.writer = Some(BufWriter::with_capacity(4096, file));
        self.current_fn = filename;

        Ok(())
    }

    /// 刪除超過保留期限的日誌檔
    fn remove_expired(&self, now: DateTime<Local>) {
        let files = match Self::sibling_files(&self.current_fn) {
            Ok(files) => files,
            Err(why) => {
                logging::error_console(format!("Failed to list log directory because {:?}", why));
                return;
            }
        };

        let cut_off = (now - self.max_age).timestamp().max(0) as u64;
        let expired: Vec<PathBuf> = files
            .into_iter()
            .filter(|file| {
                fs::metadata(file)
                    .and_then(|m| m.modified())
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .is_some_and(|d| d.as_secs() <= cut_off)
            })
            .collect();

        expired
            .par_iter()
            .with_min_len(num_cpus::get())
            .for_each(|file| {
                if let Err(why) = fs::remove_file(file) {
                    logging::error_console(format!(
                        "couldn't remove the file({}). because {:?}",
                        file.display(),
                        why
                    ));
                }
            });
    }

    fn sibling_files(file: &str) -> io::Result<Vec<PathBuf>> {
        let parent = Path::new(file)
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));

        let mut files = Vec::new();
        for entry in fs::read_dir(parent)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "log") {
                files.push(path);
            }
        }

        Ok(files)
    }
}

impl Drop for Rotate {
    fn drop(&mut self) {
        self.flush();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn pattern_in(dir: &Path, name: &str) -> String {
        dir.join(format!("%Y-%m-%d-{}.log", name))
            .to_string_lossy()
            .to_string()
    }

    #[test]
    fn test_generation_filename() {
        let base = "log/2025-04-23-quote.log";
        assert_eq!(Rotate::generation_fn(base, 0), "log/2025-04-23-quote.log");
        assert_eq!(Rotate::generation_fn(base, 1), "log/2025-04-23-quote.1.log");
        assert_eq!(Rotate::generation_fn(base, 2), "log/2025-04-23-quote.2.log");
    }

    #[test]
    fn test_size_rotation_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let mut r = Rotate::with_options(pattern_in(dir.path(), "size"), 512, 7);
        let now = Local::now();

        for i in 0..50 {
            let msg = format!("Line {:03} - {}\r\n", i, "X".repeat(50));
            r.write_msg(now, msg.as_bytes()).unwrap();
        }
        r.flush();

        assert!(r.generation >= 3, "generation: {}", r.generation);

        let files: HashSet<String> = fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(files.len() as u32, r.generation + 1, "{:?}", files);

        let base = now.format("%Y-%m-%d-size").to_string();
        assert!(files.contains(&format!("{}.log", base)));
        assert!(files.contains(&format!("{}.{}.log", base, r.generation)));
    }

    #[test]
    fn test_date_rollover_resets_generation() {
        let dir = tempfile::tempdir().unwrap();
        let mut r = Rotate::with_options(pattern_in(dir.path(), "day"), 64, 7);
        let mut now = Local::now();

        for _ in 0..5 {
            r.write_msg(now, "X".repeat(40).as_bytes()).unwrap();
        }
        assert!(r.generation > 0);

        now += TimeDelta::try_days(1).unwrap();
        r.write_msg(now, b"next day").unwrap();
        assert_eq!(r.generation, 0);
        assert!(r
            .current_file()
            .ends_with(&now.format("%Y-%m-%d-day.log").to_string()));
    }
}
