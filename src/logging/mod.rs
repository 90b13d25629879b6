use std::{fmt::Write as _, sync::mpsc, thread, time::Duration};

use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use strum::Display;

pub mod rotate;

use rotate::Rotate;

static LOGGER: Lazy<Logger> = Lazy::new(|| Logger::new("finance"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Level {
    Info,
    Warn,
    Error,
    Debug,
}

pub struct LogMessage {
    pub level: Level,
    pub msg: String,
    pub created_at: DateTime<Local>,
}

impl LogMessage {
    pub fn new(level: Level, msg: String) -> Self {
        LogMessage {
            level,
            msg,
            created_at: Local::now(),
        }
    }
}

enum Command {
    Write(LogMessage),
    /// 寫完目前佇列後回覆，用於程式結束前
    Flush(mpsc::SyncSender<()>),
}

/// 非同步檔案日誌
///
/// 呼叫端只把訊息丟進 channel，實際寫檔由獨立線程負責，
/// 佇列清空或累積超過 4 KB 時才批次寫入並 flush。
pub struct Logger {
    writer: mpsc::Sender<Command>,
}

impl Logger {
    pub fn new(log_name: &str) -> Self {
        let (tx, rx) = mpsc::channel::<Command>();
        let pattern = format!("log/%Y-%m-%d-{}.log", log_name);

        // 寫入檔案的操作使用另一個線程處理
        thread::spawn(move || {
            let mut rotate = Rotate::new(pattern);
            let mut batch = String::with_capacity(4096);

            let mut pending_acks = Vec::new();

            while let Ok(first) = rx.recv() {
                let mut batch_at = Local::now();

                // 把目前已在佇列中的訊息一次帶走
                for command in std::iter::once(first).chain(rx.try_iter()) {
                    match command {
                        Command::Write(received) => {
                            batch_at = received.created_at;
                            Self::append(&mut batch, &received);
                            if batch.len() >= 4096 {
                                Self::write(&mut rotate, batch_at, &mut batch);
                            }
                        }
                        Command::Flush(ack) => pending_acks.push(ack),
                    }
                }

                Self::write(&mut rotate, batch_at, &mut batch);

                for ack in pending_acks.drain(..) {
                    let _ = ack.send(());
                }
            }
        });

        Logger { writer: tx }
    }

    fn append(batch: &mut String, msg: &LogMessage) {
        if writeln!(
            batch,
            "{} {} {}",
            msg.created_at.format("%F %X%.6f"),
            msg.level,
            msg.msg
        )
        .is_err()
        {
            error_console(format!("Failed to format log line: {}", msg.msg));
        }
    }

    fn write(rotate: &mut Rotate, now: DateTime<Local>, batch: &mut String) {
        if batch.is_empty() {
            return;
        }

        if let Err(why) = rotate.write_msg(now, batch.as_bytes()) {
            error_console(format!("Failed to write log file because {:?}", why));
            info_console(batch.clone());
        }

        rotate.flush();
        batch.clear();
    }

    pub fn info<S: Into<String>>(&self, log: S) {
        self.send(Level::Info, log.into());
    }

    pub fn warn<S: Into<String>>(&self, log: S) {
        self.send(Level::Warn, log.into());
    }

    pub fn error<S: Into<String>>(&self, log: S) {
        self.send(Level::Error, log.into());
    }

    pub fn debug<S: Into<String>>(&self, log: S) {
        self.send(Level::Debug, log.into());
    }

    fn send(&self, level: Level, msg: String) {
        if let Err(why) = self.writer.send(Command::Write(LogMessage::new(level, msg))) {
            error_console(why.to_string());
        }
    }

    /// 等待寫檔線程把已送出的訊息寫入檔案，最多等 `timeout`
    pub fn flush(&self, timeout: Duration) {
        let (ack_tx, ack_rx) = mpsc::sync_channel(1);
        if self.writer.send(Command::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.recv_timeout(timeout);
        }
    }
}

pub fn info_file_async<S: Into<String>>(log: S) {
    LOGGER.info(log);
}

pub fn warn_file_async<S: Into<String>>(log: S) {
    LOGGER.warn(log);
}

pub fn error_file_async<S: Into<String>>(log: S) {
    LOGGER.error(log);
}

pub fn debug_file_async<S: Into<String>>(log: S) {
    LOGGER.debug(log);
}

/// 程式結束前呼叫，確保日誌已落地
pub fn flush() {
    LOGGER.flush(Duration::from_secs(2));
}

pub fn info_console<S: AsRef<str>>(log: S) {
    println!(
        "{} Info {}",
        Local::now().format("%Y-%m-%d %H:%M:%S.%3f"),
        log.as_ref()
    );
}

pub fn error_console<S: AsRef<str>>(log: S) {
    eprintln!(
        "{} Error {}",
        Local::now().format("%Y-%m-%d %H:%M:%S.%3f"),
        log.as_ref()
    );
}
