use std::collections::HashMap;
use std::sync::Arc;

use crate::core::{KeywordData, KeywordHandle};
use crate::error::Result;
use crate::index::file_index::FileIndex;
use crate::index::restart::RestartHeader;

/// view 是怎么来的（诊断用）
#[derive(Clone, Debug, PartialEq)]
pub enum ViewTag {
    Global,
    Block {
        start: Option<String>,
        end: Option<String>,
        occurrence: usize,
    },
    Restart(RestartHeader),
    Summary { report_step: usize },
}

/// `FileIndex` 的只读投影：一串全局位置 + view 内的名字索引。
///
/// view 里的 "位置 i" 是 view 内下标；`global_position(i)` 映射回全局索引。
/// 创建后不可变；收窄总是生成新 view，从不改动全局索引。
#[derive(Debug)]
pub struct IndexView {
    positions: Vec<usize>,
    by_name: HashMap<String, Vec<usize>>,
    distinct: Vec<String>,
    tag: ViewTag,
}

impl IndexView {
    pub fn global(index: &FileIndex) -> Self {
        Self::from_positions(index, (0..index.len()).collect(), ViewTag::Global)
    }

    fn from_positions(index: &FileIndex, positions: Vec<usize>, tag: ViewTag) -> Self {
        let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
        let mut distinct = Vec::new();
        for (local, &pos) in positions.iter().enumerate() {
            let Some(kw) = index.get(pos) else {
                continue;
            };
            if !by_name.contains_key(kw.name()) {
                distinct.push(kw.name().to_string());
            }
            by_name.entry(kw.name().to_string()).or_default().push(local);
        }
        Self {
            positions,
            by_name,
            distinct,
            tag,
        }
    }

    /// 以分隔关键字切出一个块。
    ///
    /// - 起点：本 view 里第 `occurrence` 个 `start`（`None` 时从本 view 开头）。
    /// - `start == end`：到下一个 `start` 为止（不含）。
    /// - `start != end`：到其后第一个 `end` 为止（含）。
    /// - 找不到终止关键字时一直到本 view 末尾。
    ///
    /// `occurrence` 超出范围时返回 `None`。
    pub fn block(
        &self,
        index: &FileIndex,
        start: Option<&str>,
        end: Option<&str>,
        occurrence: usize,
    ) -> Option<IndexView> {
        let first = match start {
            Some(s) => self.position_of_occurrence(s, occurrence)?,
            None if self.is_empty() => return None,
            None => 0,
        };
        let inclusive_end = start != end;

        let mut last = first + 1;
        while last < self.positions.len() {
            let name = index.get(self.positions[last]).map(KeywordHandle::name);
            if end.is_some() && name == end {
                if inclusive_end {
                    last += 1;
                }
                break;
            }
            last += 1;
        }

        let tag = ViewTag::Block {
            start: start.map(str::to_string),
            end: end.map(str::to_string),
            occurrence,
        };
        tracing::debug!(
            "Block view {:?}..{:?}#{}: {} keywords",
            start,
            end,
            occurrence,
            last - first
        );
        Some(Self::from_positions(
            index,
            self.positions[first..last].to_vec(),
            tag,
        ))
    }

    pub(crate) fn retag(mut self, tag: ViewTag) -> Self {
        self.tag = tag;
        self
    }

    pub fn tag(&self) -> &ViewTag {
        &self.tag
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    pub fn global_position(&self, i: usize) -> Option<usize> {
        self.positions.get(i).copied()
    }

    pub fn get<'a>(&self, index: &'a FileIndex, i: usize) -> Option<&'a KeywordHandle> {
        index.get(self.global_position(i)?)
    }

    pub fn get_named<'a>(
        &self,
        index: &'a FileIndex,
        name: &str,
        occurrence: usize,
    ) -> Option<&'a KeywordHandle> {
        self.get(index, self.position_of_occurrence(name, occurrence)?)
    }

    pub fn iter<'a>(&'a self, index: &'a FileIndex) -> impl Iterator<Item = &'a KeywordHandle> + 'a {
        self.positions.iter().filter_map(move |&p| index.get(p))
    }

    pub fn num_named(&self, name: &str) -> usize {
        self.by_name.get(name).map_or(0, Vec::len)
    }

    pub fn has_keyword(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn distinct_names(&self) -> &[String] {
        &self.distinct
    }

    /// view 内第 `occurrence` 个 `name` 的 view 内位置
    pub fn position_of_occurrence(&self, name: &str, occurrence: usize) -> Option<usize> {
        self.by_name.get(name)?.get(occurrence).copied()
    }

    /// view 内位置 `i` 是它那个名字在本 view 里的第几次出现
    pub fn occurrence_of_position(&self, index: &FileIndex, i: usize) -> Option<usize> {
        let kw = self.get(index, i)?;
        self.by_name.get(kw.name())?.binary_search(&i).ok()
    }

    /// 第一个数据满足 `pred` 的 `name`，返回它的 view 内位置。
    /// 需要解码数据，所以由调用方提供 `load`。
    pub fn find_value<L, P>(
        &self,
        index: &FileIndex,
        name: &str,
        mut load: L,
        mut pred: P,
    ) -> Result<Option<usize>>
    where
        L: FnMut(&KeywordHandle) -> Result<Arc<KeywordData>>,
        P: FnMut(&KeywordData) -> bool,
    {
        for &local in self.by_name.get(name).map_or(&[][..], Vec::as_slice) {
            let Some(kw) = self.get(index, local) else {
                continue;
            };
            let data = load(kw)?;
            if pred(&data) {
                return Ok(Some(local));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Keyword;
    use crate::storage::fortio::{Endian, FortioReader};
    use crate::testkit::{encode, summary_keywords};
    use std::io::Cursor;

    fn scan(kws: &[Keyword]) -> FileIndex {
        let mut r = FortioReader::new(Cursor::new(encode(kws)), Endian::Big).unwrap();
        FileIndex::scan(&mut r).unwrap()
    }

    fn names(view: &IndexView, idx: &FileIndex) -> Vec<String> {
        view.iter(idx).map(|k| k.name().to_string()).collect()
    }

    #[test]
    fn single_delimiter_block_runs_to_end() {
        let idx = scan(&summary_keywords(3));
        let global = IndexView::global(&idx);
        let block = global.block(&idx, Some("SEQHDR"), Some("SEQHDR"), 0).unwrap();
        assert_eq!(block.len(), 7);
        assert!(global.block(&idx, Some("SEQHDR"), Some("SEQHDR"), 1).is_none());
        assert!(global.block(&idx, Some("MISSING"), Some("MISSING"), 0).is_none());
    }

    #[test]
    fn seqnum_blocks_partition_the_file() {
        let mut kws = Vec::new();
        for step in 0..4 {
            kws.push(Keyword::int("SEQNUM", vec![step]));
            for j in 0..=step {
                kws.push(Keyword::float("PRESSURE", vec![j as f32]));
            }
        }
        let idx = scan(&kws);
        let global = IndexView::global(&idx);

        let mut covered = 0;
        for j in 0..4 {
            let block = global.block(&idx, Some("SEQNUM"), Some("SEQNUM"), j).unwrap();
            let start = idx.position_of_occurrence("SEQNUM", j).unwrap();
            let stop = idx.position_of_occurrence("SEQNUM", j + 1).unwrap_or(idx.len());
            assert_eq!(block.positions(), &(start..stop).collect::<Vec<_>>()[..]);
            assert_eq!(block.num_named("SEQNUM"), 1);
            assert_eq!(block.num_named("PRESSURE"), j + 1);
            covered += block.len();
        }
        assert_eq!(covered, idx.len());
        assert!(global.block(&idx, Some("SEQNUM"), Some("SEQNUM"), 4).is_none());
    }

    #[test]
    fn distinct_end_keyword_is_included() {
        let kws = vec![
            Keyword::message("STARTSOL"),
            Keyword::float("PRESSURE", vec![1.0]),
            Keyword::float("SWAT", vec![0.2]),
            Keyword::message("ENDSOL"),
            Keyword::float("RS", vec![0.0]),
        ];
        let idx = scan(&kws);
        let global = IndexView::global(&idx);
        let block = global.block(&idx, Some("STARTSOL"), Some("ENDSOL"), 0).unwrap();
        assert_eq!(names(&block, &idx), ["STARTSOL", "PRESSURE", "SWAT", "ENDSOL"]);

        let open_ended = global.block(&idx, Some("PRESSURE"), None, 0).unwrap();
        assert_eq!(open_ended.len(), 4);
    }

    #[test]
    fn block_without_start_begins_at_first_keyword() {
        let kws = vec![
            Keyword::message("STARTSOL"),
            Keyword::float("PRESSURE", vec![1.0]),
            Keyword::float("SWAT", vec![0.2]),
            Keyword::float("PRESSURE", vec![2.0]),
            Keyword::message("ENDSOL"),
        ];
        let idx = scan(&kws);
        let global = IndexView::global(&idx);

        let head = global.block(&idx, None, Some("PRESSURE"), 0).unwrap();
        assert_eq!(names(&head, &idx), ["STARTSOL", "PRESSURE"]);
        assert_eq!(head.global_position(0), Some(0));

        let whole = global.block(&idx, None, None, 0).unwrap();
        assert_eq!(whole.len(), 5);

        // 子 view 内再切，从子 view 的第一个关键字开始
        let tail = global.block(&idx, Some("SWAT"), None, 0).unwrap();
        let inner = tail.block(&idx, None, Some("ENDSOL"), 0).unwrap();
        assert_eq!(names(&inner, &idx), ["SWAT", "PRESSURE", "ENDSOL"]);
    }

    #[test]
    fn view_local_occurrences_restart_at_zero() {
        let idx = scan(&summary_keywords(5));
        let global = IndexView::global(&idx);
        let block = global.block(&idx, Some("MINISTEP"), Some("MINISTEP"), 3).unwrap();

        assert_eq!(names(&block, &idx), ["MINISTEP", "PARAMS"]);
        assert_eq!(block.global_position(0), idx.position_of_occurrence("MINISTEP", 3));
        assert_eq!(block.position_of_occurrence("PARAMS", 0), Some(1));
        assert_eq!(block.occurrence_of_position(&idx, 1), Some(0));
        assert_eq!(global.occurrence_of_position(&idx, block.global_position(1).unwrap()), Some(3));
        assert_eq!(block.get_named(&idx, "MINISTEP", 1).map(|k| k.id()), None);
    }

    #[test]
    fn nested_blocks_narrow_relative_to_parent() {
        let mut kws = summary_keywords(2);
        kws.extend(summary_keywords(3));
        let idx = scan(&kws);
        let global = IndexView::global(&idx);

        let second = global.block(&idx, Some("SEQHDR"), Some("SEQHDR"), 1).unwrap();
        assert_eq!(second.len(), 7);
        let inner = second.block(&idx, Some("MINISTEP"), Some("MINISTEP"), 0).unwrap();
        assert_eq!(inner.global_position(0), idx.position_of_occurrence("MINISTEP", 2));
        assert_eq!(idx.len(), 12);
        assert_eq!(global.len(), 12);
    }
}
