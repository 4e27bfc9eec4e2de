use std::collections::HashMap;
use std::io;

use serde::{Deserialize, Serialize};

use crate::core::{Keyword, KeywordHandle, KeywordId, KwHeader};
use crate::error::{EclError, Result};
use crate::storage::record::{HeaderRead, RecordReader};

/// 扫描为什么停下
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ScanStop {
    EndOfStream,
    MalformedHeader { offset: u64 },
    TruncatedPayload { offset: u64 },
}

impl ScanStop {
    pub fn is_complete(&self) -> bool {
        matches!(self, ScanStop::EndOfStream)
    }
}

/// 全局索引：一次顺序扫描得到的全部关键字（位置 = 数组下标）。
///
/// 示例（统一 summary 文件）：
///
/// ```text
/// SEQHDR  MINISTEP  PARAMS  MINISTEP  PARAMS  MINISTEP  PARAMS
///   0        1        2        3        4        5        6
///
/// by_name    = {SEQHDR: [0], MINISTEP: [1, 3, 5], PARAMS: [2, 4, 6]}
/// occurrence = [0, 0, 0, 1, 1, 2, 2]
/// distinct   = [SEQHDR, MINISTEP, PARAMS]
/// ```
///
/// ## 不变量
/// - 位置按字节偏移严格递增（扫描顺序 = 文件顺序）。
/// - `by_name` / `occurrence` 与 `keywords` 一致；只有 `make_index` 重建它们。
#[derive(Debug)]
pub struct FileIndex {
    keywords: Vec<KeywordHandle>,
    by_name: HashMap<String, Vec<usize>>,
    occurrence: Vec<usize>,
    distinct: Vec<String>,
    stop: ScanStop,
}

impl Default for FileIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl FileIndex {
    pub fn new() -> Self {
        Self {
            keywords: Vec::new(),
            by_name: HashMap::new(),
            occurrence: Vec::new(),
            distinct: Vec::new(),
            stop: ScanStop::EndOfStream,
        }
    }

    /// 从偏移 0 开始顺序扫描，只读 header、跳过 payload。
    ///
    /// 中途遇到坏 header 或截断的 payload 时停止扫描，已索引的部分照常可用；
    /// 停止原因记在 `stop()`。只有底层 I/O 故障才返回错误。
    pub fn scan<R: RecordReader + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let mut index = Self::new();
        let mut offset = 0u64;
        loop {
            match reader.read_header_at(offset)? {
                HeaderRead::EndOfStream => {
                    index.stop = ScanStop::EndOfStream;
                    break;
                }
                HeaderRead::Malformed => {
                    tracing::warn!(
                        "Malformed keyword header at offset {}, keeping {} indexed keywords",
                        offset,
                        index.keywords.len()
                    );
                    index.stop = ScanStop::MalformedHeader { offset };
                    break;
                }
                HeaderRead::Header(header) => {
                    if !reader.skip_payload(&header)? {
                        tracing::warn!(
                            "Truncated payload for {} at offset {}, keeping {} indexed keywords",
                            header.name,
                            offset,
                            index.keywords.len()
                        );
                        index.stop = ScanStop::TruncatedPayload { offset };
                        break;
                    }
                    let next = reader.current_offset()?;
                    index.keywords.push(KeywordHandle::new(header, offset));
                    offset = next;
                }
            }
        }
        index.make_index();
        tracing::debug!(
            "Scanned {} keywords ({} distinct), stop={:?}",
            index.len(),
            index.distinct.len(),
            index.stop
        );
        Ok(index)
    }

    /// 由 (header, offset) 序列重建（index cache 反序列化用）。
    /// 偏移不严格递增时返回 `None`，调用方应退回全量扫描。
    pub fn from_entries<I>(entries: I, stop: ScanStop) -> Option<Self>
    where
        I: IntoIterator<Item = (KwHeader, u64)>,
    {
        let mut index = Self::new();
        for (header, offset) in entries {
            if let Some(last) = index.keywords.last() {
                if offset <= last.offset() {
                    return None;
                }
            }
            index.keywords.push(KeywordHandle::new(header, offset));
        }
        index.stop = stop;
        index.make_index();
        Some(index)
    }

    /// 重建名字 → 位置表、occurrence 反查表和 distinct 名单
    pub fn make_index(&mut self) {
        self.by_name.clear();
        self.distinct.clear();
        self.occurrence.clear();
        self.occurrence.reserve(self.keywords.len());
        for (pos, kw) in self.keywords.iter().enumerate() {
            if !self.by_name.contains_key(kw.name()) {
                self.distinct.push(kw.name().to_string());
            }
            let list = self.by_name.entry(kw.name().to_string()).or_default();
            self.occurrence.push(list.len());
            list.push(pos);
        }
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    pub fn stop(&self) -> &ScanStop {
        &self.stop
    }

    pub fn get(&self, pos: usize) -> Option<&KeywordHandle> {
        self.keywords.get(pos)
    }

    pub(crate) fn get_mut(&mut self, pos: usize) -> Option<&mut KeywordHandle> {
        self.keywords.get_mut(pos)
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeywordHandle> {
        self.keywords.iter()
    }

    pub fn num_named(&self, name: &str) -> usize {
        self.by_name.get(name).map_or(0, Vec::len)
    }

    pub fn positions_of(&self, name: &str) -> &[usize] {
        self.by_name.get(name).map_or(&[], Vec::as_slice)
    }

    /// 第 `i` 个（0 起）`name` 的全局位置
    pub fn position_of_occurrence(&self, name: &str, i: usize) -> Option<usize> {
        self.by_name.get(name)?.get(i).copied()
    }

    /// 反查：全局位置 `pos` 是它那个名字的第几次出现
    pub fn occurrence_of_position(&self, pos: usize) -> Option<usize> {
        self.occurrence.get(pos).copied()
    }

    pub fn has_keyword(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// 按首次出现顺序的不同名字
    pub fn distinct_names(&self) -> &[String] {
        &self.distinct
    }

    /// 按身份（偏移）找位置；偏移有序，二分即可
    pub fn position_of_id(&self, id: KeywordId) -> Option<usize> {
        self.keywords
            .binary_search_by_key(&id.offset(), KeywordHandle::offset)
            .ok()
    }

    /// 用 `new` 替换 `old` 所在槽位（只改内存，不写盘）。
    ///
    /// 名字、类型、元素个数都必须与原槽位一致，否则索引保持不变并返回错误。
    pub fn replace_keyword(&mut self, old: KeywordId, new: Keyword) -> Result<usize> {
        let pos = self
            .position_of_id(old)
            .ok_or(EclError::UnknownHandle { offset: old.offset() })?;
        let current = self.keywords[pos].header();
        if new.header() != current {
            return Err(EclError::ShapeMismatch {
                name: current.name.clone(),
                expected: format!("{} {}", current.name, current.shape()),
                found: format!("{} {}", new.header().name, new.header().shape()),
            });
        }
        let (header, data) = new.into_parts();
        self.keywords[pos] = KeywordHandle::replaced(header, old.offset(), data);
        Ok(pos)
    }

    /// (header, offset) 序列，供 index cache 持久化
    pub fn entries(&self) -> impl Iterator<Item = (&KwHeader, u64)> {
        self.keywords.iter().map(|k| (k.header(), k.offset()))
    }
}
