use std::fmt;

use serde::Serialize;

use crate::index::file_index::ScanStop;

/// 一个打开文件的索引概况
#[derive(Clone, Debug, Serialize)]
pub struct IndexReport {
    /// 全局索引里的关键字数
    pub keywords: usize,
    /// 不同名字数
    pub distinct: usize,
    /// 已解码（payload 在内存）的关键字数
    pub loaded: usize,
    /// 已解码 payload 估算内存（字节）
    pub loaded_bytes: u64,
    /// 已替换但未写回的关键字数
    pub dirty: usize,
    /// 源文件大小
    pub file_bytes: u64,
    pub scan_stop: ScanStop,
    /// 索引来自 sidecar 缓存而不是扫描
    pub from_cache: bool,
}

pub(crate) fn human_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;
    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

fn stop_label(stop: &ScanStop) -> String {
    match stop {
        ScanStop::EndOfStream => "complete".to_string(),
        ScanStop::MalformedHeader { offset } => format!("bad header @{}", offset),
        ScanStop::TruncatedPayload { offset } => format!("truncated @{}", offset),
    }
}

impl fmt::Display for IndexReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "╔══════════════════════════════════════════════════╗")?;
        writeln!(f, "║           ecl-index Report                       ║")?;
        writeln!(f, "╠══════════════════════════════════════════════════╣")?;
        writeln!(f, "║ File size:   {:>35} ║", human_bytes(self.file_bytes))?;
        writeln!(
            f,
            "║ Source:      {:>35} ║",
            if self.from_cache { "index cache" } else { "full scan" }
        )?;
        writeln!(f, "║ Scan:        {:>35} ║", stop_label(&self.scan_stop))?;
        writeln!(f, "╠──────────────────────────────────────────────────╣")?;
        writeln!(f, "║   keywords:     {:>10}                       ║", self.keywords)?;
        writeln!(f, "║   distinct:     {:>10}                       ║", self.distinct)?;
        writeln!(
            f,
            "║   loaded:       {:>10}  ({:>10})          ║",
            self.loaded,
            human_bytes(self.loaded_bytes)
        )?;
        writeln!(f, "║   dirty:        {:>10}                       ║", self.dirty)?;
        writeln!(f, "╚══════════════════════════════════════════════════╝")?;
        Ok(())
    }
}
