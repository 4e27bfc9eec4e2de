use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{Keyword, KeywordData, KeywordHandle, KeywordId};
use crate::error::{EclError, Result};
use crate::index::file_index::{FileIndex, ScanStop};
use crate::index::restart::{self, Phases, RestartCatalog, RestartQuery, Simulator};
use crate::index::view::{IndexView, ViewTag};
use crate::stats::IndexReport;
use crate::storage::fortio::{Endian, KeywordWriter};
use crate::storage::index_cache::IndexCache;
use crate::storage::record::{HeaderRead, RecordReader};
use crate::storage::source::KeywordSource;

/// 打开方式
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenFlags {
    /// 允许 `save_keyword` 就地写回
    pub writable: bool,
    /// 建完索引就释放 fd，每次按需加载时重新打开（批处理大量文件时用）
    pub close_stream: bool,
}

impl OpenFlags {
    pub fn read_only() -> Self {
        Self::default()
    }

    pub fn writable() -> Self {
        Self {
            writable: true,
            ..Self::default()
        }
    }
}

/// 一个打开的 ECLIPSE 结果文件。
///
/// 所有按位置/名字的查询都经过当前 active view 解析到全局索引；
/// 切换 view 只改变"位置 N"的含义，查询代码不变。
///
/// 单线程使用：select/push/pop/replace 都需要 `&mut self`。
pub struct FileHandle {
    index: FileIndex,
    source: KeywordSource,
    global: Arc<IndexView>,
    active: Arc<IndexView>,
    stack: Vec<Arc<IndexView>>,
    restarts: RestartCatalog,
    flags: OpenFlags,
    from_cache: bool,
}

impl FileHandle {
    /// 打开并全量扫描
    pub fn open(path: impl AsRef<Path>, flags: OpenFlags) -> Result<Self> {
        let path = path.as_ref();
        let source = KeywordSource::open(path, Endian::default(), flags.writable)?;
        let index = source.with_reader(|r| Ok(FileIndex::scan(r)?))?;
        if !index.stop().is_complete() {
            tracing::warn!(
                "Partial index for {:?}: {} keywords, stop={:?}",
                path,
                index.len(),
                index.stop()
            );
        }
        Ok(Self::assemble(index, source, flags, false))
    }

    /// 有效 sidecar 缓存时直接反序列化索引，否则退回全量扫描。
    /// `cache_path` 为 `None` 时用源文件旁边的 `<stem>.EIDX`。
    pub fn fast_open(
        path: impl AsRef<Path>,
        cache_path: Option<&Path>,
        flags: OpenFlags,
    ) -> Result<Self> {
        let path = path.as_ref();
        let cache = match cache_path {
            Some(p) => IndexCache::new(p.to_path_buf()),
            None => IndexCache::for_source(path, None),
        };
        let cached = match cache.load_if_valid(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Index cache {:?} unreadable: {}", cache.path(), e);
                None
            }
        };
        match cached {
            Some(index) => {
                let source = KeywordSource::open(path, Endian::default(), flags.writable)?;
                tracing::debug!("Opened {:?} from index cache", path);
                Ok(Self::assemble(index, source, flags, true))
            }
            None => Self::open(path, flags),
        }
    }

    fn assemble(index: FileIndex, mut source: KeywordSource, flags: OpenFlags, from_cache: bool) -> Self {
        if flags.close_stream {
            source.set_release_after_use(true);
            source.release();
        }
        let global = Arc::new(IndexView::global(&index));
        Self {
            index,
            source,
            active: global.clone(),
            global,
            stack: Vec::new(),
            restarts: RestartCatalog::new(),
            flags,
            from_cache,
        }
    }

    pub fn close(self) {
        tracing::debug!("Closing {:?}", self.source.path());
    }

    pub fn path(&self) -> &Path {
        self.source.path()
    }

    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    pub fn loaded_from_cache(&self) -> bool {
        self.from_cache
    }

    pub fn index(&self) -> &FileIndex {
        &self.index
    }

    pub fn scan_stop(&self) -> &ScanStop {
        self.index.stop()
    }

    // ── 经 active view 的查询 ──

    pub fn size(&self) -> usize {
        self.active.len()
    }

    pub fn has_keyword(&self, name: &str) -> bool {
        self.active.has_keyword(name)
    }

    pub fn num_named(&self, name: &str) -> usize {
        self.active.num_named(name)
    }

    pub fn get(&self, pos: usize) -> Option<&KeywordHandle> {
        self.active.get(&self.index, pos)
    }

    pub fn get_named(&self, name: &str, occurrence: usize) -> Option<&KeywordHandle> {
        self.active.get_named(&self.index, name, occurrence)
    }

    pub fn occurrence_of_position(&self, pos: usize) -> Option<usize> {
        self.active.occurrence_of_position(&self.index, pos)
    }

    pub fn distinct_names(&self) -> &[String] {
        self.active.distinct_names()
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeywordHandle> {
        self.active.iter(&self.index)
    }

    fn load_handle(&self, kw: &KeywordHandle) -> Result<Arc<KeywordData>> {
        kw.load_with(|h, off| self.source.load(h, off))
    }

    /// 解码 active view 里位置 `pos` 的数据
    pub fn load(&self, pos: usize) -> Result<Arc<KeywordData>> {
        let kw = self.get(pos).ok_or(EclError::PositionOutOfRange {
            pos,
            len: self.size(),
        })?;
        self.load_handle(kw)
    }

    pub fn load_named(&self, name: &str, occurrence: usize) -> Result<Option<Arc<KeywordData>>> {
        match self.get_named(name, occurrence) {
            Some(kw) => self.load_handle(kw).map(Some),
            None => Ok(None),
        }
    }

    /// 把整个文件的 payload 都读进内存（之后可以安全地 `close_stream`）
    pub fn load_all(&self) -> Result<()> {
        for kw in self.index.iter() {
            self.load_handle(kw)?;
        }
        Ok(())
    }

    // ── view 选择 ──

    pub fn active_view(&self) -> &Arc<IndexView> {
        &self.active
    }

    pub fn global_view(&self) -> &Arc<IndexView> {
        &self.global
    }

    /// 以 `name` 为分隔的第 `occurrence` 个块（相对全局 view）
    pub fn select_block(&mut self, name: &str, occurrence: usize) -> bool {
        match self.global.block(&self.index, Some(name), Some(name), occurrence) {
            Some(v) => {
                self.active = Arc::new(v);
                true
            }
            None => false,
        }
    }

    /// 同 `select_block`，但相对当前 active view
    pub fn subselect_block(&mut self, name: &str, occurrence: usize) -> bool {
        match self.active.block(&self.index, Some(name), Some(name), occurrence) {
            Some(v) => {
                self.active = Arc::new(v);
                true
            }
            None => false,
        }
    }

    pub fn select_global(&mut self) {
        self.active = self.global.clone();
    }

    pub fn push_block(&mut self) {
        self.stack.push(self.active.clone());
    }

    pub fn pop_block(&mut self) -> Result<()> {
        self.active = self.stack.pop().ok_or(EclError::PopWithoutPush)?;
        Ok(())
    }

    pub fn restart_view(&mut self, query: RestartQuery) -> Result<Option<Arc<IndexView>>> {
        let source = &self.source;
        let mut load = |kw: &KeywordHandle| kw.load_with(|h, off| source.load(h, off));
        self.restarts
            .add_restart_view(&self.index, &self.global, query, &mut load)
    }

    fn select_restart(&mut self, query: RestartQuery) -> Result<bool> {
        match self.restart_view(query)? {
            Some(v) => {
                self.active = v;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn select_restart_by_report_step(&mut self, step: i32) -> Result<bool> {
        self.select_restart(RestartQuery::ReportStep(step))
    }

    pub fn select_restart_by_sim_time(&mut self, t: DateTime<Utc>) -> Result<bool> {
        self.select_restart(RestartQuery::SimTime(t))
    }

    /// 第 `i` 个 SEQNUM 块
    pub fn iselect_restart(&mut self, i: usize) -> Result<bool> {
        self.select_restart(RestartQuery::SeqnumIndex(i))
    }

    /// 统一 summary 文件里第 `report_step` 个 SEQHDR 块
    pub fn summary_view(&self, report_step: usize) -> Option<Arc<IndexView>> {
        let block = self.global.block(
            &self.index,
            Some(restart::SEQHDR),
            Some(restart::SEQHDR),
            report_step,
        )?;
        Some(Arc::new(block.retag(ViewTag::Summary { report_step })))
    }

    pub fn select_summary_step(&mut self, report_step: usize) -> bool {
        match self.summary_view(report_step) {
            Some(v) => {
                self.active = v;
                true
            }
            None => false,
        }
    }

    // ── restart 探测：只解码 SEQNUM/INTEHEAD/DOUBHEAD ──

    pub fn has_sim_time(&self, t: DateTime<Utc>) -> Result<bool> {
        Ok(self.find_sim_time(t)?.is_some())
    }

    pub fn has_report_step(&self, step: i32) -> Result<bool> {
        let mut load = |kw: &KeywordHandle| self.load_handle(kw);
        Ok(restart::find_report_step(&self.active, &self.index, step, &mut load)?.is_some())
    }

    /// 日期等于 `t` 的 restart 在 active view 里的序号
    pub fn find_sim_time(&self, t: DateTime<Utc>) -> Result<Option<usize>> {
        let mut load = |kw: &KeywordHandle| self.load_handle(kw);
        restart::find_sim_time(&self.active, &self.index, t, &mut load)
    }

    pub fn restart_sim_time(&self, i: usize) -> Result<Option<DateTime<Utc>>> {
        let mut load = |kw: &KeywordHandle| self.load_handle(kw);
        restart::sim_time_at(&self.active, &self.index, i, &mut load)
    }

    pub fn restart_sim_days(&self, i: usize) -> Result<Option<f64>> {
        let mut load = |kw: &KeywordHandle| self.load_handle(kw);
        restart::sim_days_at(&self.active, &self.index, i, &mut load)
    }

    pub fn simulator(&self) -> Result<Simulator> {
        let mut load = |kw: &KeywordHandle| self.load_handle(kw);
        restart::simulator(&self.global, &self.index, &mut load)
    }

    pub fn phases(&self) -> Result<Phases> {
        let mut load = |kw: &KeywordHandle| self.load_handle(kw);
        restart::phases(&self.global, &self.index, &mut load)
    }

    // ── 修改与写回 ──

    pub fn has_keyword_id(&self, id: KeywordId) -> bool {
        self.index.position_of_id(id).is_some()
    }

    /// 内存中替换；不写盘。view 只持有位置，无需重建。
    ///
    /// 替换 SEQNUM/INTEHEAD/DOUBHEAD 时丢弃已构建的 restart view，active view
    /// 若是 restart view 则重新打标签。栈里保存的 view 保留旧标签，pop 后再
    /// `select_restart_*` 才会看到新值。
    pub fn replace_keyword(&mut self, old: KeywordId, new: Keyword) -> Result<()> {
        let name = new.header().name.clone();
        self.index.replace_keyword(old, new)?;
        if !matches!(
            name.as_str(),
            restart::SEQNUM | restart::INTEHEAD | restart::DOUBHEAD
        ) {
            return Ok(());
        }
        self.restarts.clear();
        let ViewTag::Restart(h) = self.active.tag() else {
            return Ok(());
        };
        let seqnum_index = h.seqnum_index;
        match self.restart_view(RestartQuery::SeqnumIndex(seqnum_index)) {
            Ok(Some(v)) => self.active = v,
            Ok(None) => {}
            Err(e) => tracing::warn!(
                "Restart block #{} keeps its old header after replacing {}: {}",
                seqnum_index,
                name,
                e
            ),
        }
        Ok(())
    }

    /// 把 `id` 当前的数据就地写回源文件；编码长度必须与磁盘上的记录完全相同。
    pub fn save_keyword(&mut self, id: KeywordId) -> Result<()> {
        if !self.flags.writable {
            return Err(EclError::ReadOnly);
        }
        let pos = self
            .index
            .position_of_id(id)
            .ok_or(EclError::UnknownHandle { offset: id.offset() })?;
        let kw = self
            .index
            .get(pos)
            .ok_or(EclError::UnknownHandle { offset: id.offset() })?;
        let header = kw.header().clone();
        let offset = kw.offset();

        let on_disk = self.source.with_reader(|r| match r.read_header_at(offset)? {
            HeaderRead::Header(h) if h.name == header.name => Ok(h),
            _ => Err(EclError::CorruptPayload {
                name: header.name.clone(),
                offset,
            }),
        })?;
        let expected = KeywordWriter::<Vec<u8>>::encoded_len(&on_disk);
        let found = KeywordWriter::<Vec<u8>>::encoded_len(&header);
        if expected != found {
            return Err(EclError::EncodedSizeMismatch {
                name: header.name,
                expected,
                found,
            });
        }

        let data = self.load_handle(kw)?;
        let record = Keyword::new(header, KeywordData::clone(&data))?;
        self.source.write_at(offset, &record)?;
        if let Some(kw) = self.index.get_mut(pos) {
            kw.mark_clean();
        }
        tracing::debug!("Saved {} at offset {}", record.header().name, offset);
        Ok(())
    }

    // ── 流与缓存 ──

    /// 永久断开源文件；之后未加载的 payload 一律 `StreamDetached`
    pub fn close_stream(&mut self) {
        self.source.detach();
    }

    pub fn is_detached(&self) -> bool {
        self.source.is_detached()
    }

    /// 把全局索引写成 sidecar
    pub fn write_index_cache(&self, path: &Path) -> anyhow::Result<()> {
        IndexCache::new(path.to_path_buf()).write_atomic(self.source.path(), &self.index)
    }

    pub fn report(&self) -> IndexReport {
        let mut loaded = 0;
        let mut loaded_bytes = 0;
        let mut dirty = 0;
        for kw in self.index.iter() {
            if let Some(d) = kw.cached() {
                loaded += 1;
                loaded_bytes += d.estimated_bytes();
            }
            if kw.is_dirty() {
                dirty += 1;
            }
        }
        IndexReport {
            keywords: self.index.len(),
            distinct: self.index.distinct_names().len(),
            loaded,
            loaded_bytes,
            dirty,
            file_bytes: std::fs::metadata(self.source.path())
                .map(|m| m.len())
                .unwrap_or(0),
            scan_stop: self.index.stop().clone(),
            from_cache: self.from_cache,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{
        restart_keywords, summary_keywords, three_restart_steps, unique_tmp_dir, write_file, Step,
    };
    use chrono::{NaiveDate, TimeZone};
    use std::fs;
    use std::time::{Duration, SystemTime};

    fn date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.from_utc_datetime(&NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(0, 0, 0).unwrap())
    }

    fn restart_file(tag: &str) -> std::path::PathBuf {
        let dir = unique_tmp_dir(tag);
        let path = dir.join("CASE.UNRST");
        write_file(&path, &three_restart_steps());
        path
    }

    fn names(f: &FileHandle) -> Vec<String> {
        f.iter().map(|k| k.name().to_string()).collect()
    }

    #[test]
    fn open_indexes_every_record() {
        let dir = unique_tmp_dir("handle-open");
        let path = dir.join("CASE.UNSMRY");
        let kws = summary_keywords(3);
        write_file(&path, &kws);

        let f = FileHandle::open(&path, OpenFlags::read_only()).unwrap();
        assert_eq!(f.size(), kws.len());
        for (i, kw) in kws.iter().enumerate() {
            assert_eq!(f.get(i).unwrap().name(), kw.header().name);
        }
        assert_eq!(f.num_named("MINISTEP"), 3);
        assert_eq!(f.index().position_of_occurrence("MINISTEP", 2), Some(5));
        assert!(!f.loaded_from_cache());
        assert_eq!(f.load_named("MINISTEP", 2).unwrap().unwrap().as_ints(), Some(&[2][..]));
        assert!(f.load_named("MINISTEP", 3).unwrap().is_none());
        assert!(matches!(
            f.load(99),
            Err(EclError::PositionOutOfRange { pos: 99, len: 7 })
        ));
    }

    #[test]
    fn truncated_file_opens_with_leading_records() {
        let dir = unique_tmp_dir("handle-trunc");
        let path = dir.join("CASE.UNRST");
        write_file(&path, &three_restart_steps());
        let full = fs::read(&path).unwrap();
        fs::write(&path, &full[..full.len() - 10]).unwrap();

        let f = FileHandle::open(&path, OpenFlags::read_only()).unwrap();
        assert_eq!(f.size(), 14);
        assert!(matches!(f.scan_stop(), ScanStop::TruncatedPayload { .. }));
    }

    #[test]
    fn push_pop_restores_active_view() {
        let path = restart_file("handle-stack");
        let mut f = FileHandle::open(&path, OpenFlags::read_only()).unwrap();

        f.push_block();
        assert!(f.select_block("SEQNUM", 1));
        assert_eq!(names(&f), ["SEQNUM", "INTEHEAD", "DOUBHEAD", "PRESSURE", "SWAT"]);
        assert_eq!(f.load_named("SEQNUM", 0).unwrap().unwrap().as_ints(), Some(&[5][..]));

        f.push_block();
        assert!(f.subselect_block("PRESSURE", 0));
        assert_eq!(f.size(), 2);
        assert!(!f.select_block("SEQNUM", 3));
        assert_eq!(f.size(), 2);

        f.pop_block().unwrap();
        assert_eq!(f.size(), 5);
        f.pop_block().unwrap();
        assert_eq!(f.size(), 15);

        let err = f.pop_block().unwrap_err();
        assert!(matches!(err, EclError::PopWithoutPush));
        assert!(err.is_contract_violation());
    }

    #[test]
    fn restart_selection_by_step_time_and_index() {
        let path = restart_file("handle-restart");
        let mut f = FileHandle::open(&path, OpenFlags::read_only()).unwrap();

        assert!(f.has_report_step(10).unwrap());
        assert!(!f.has_report_step(3).unwrap());
        assert!(f.has_sim_time(date(2000, 2, 1)).unwrap());
        assert_eq!(f.find_sim_time(date(2000, 3, 1)).unwrap(), Some(2));
        assert_eq!(f.restart_sim_days(1).unwrap(), Some(31.0));
        assert_eq!(f.restart_sim_time(0).unwrap(), Some(date(2000, 1, 1)));
        assert_eq!(f.simulator().unwrap(), Simulator::Eclipse100);

        assert!(f.select_restart_by_report_step(5).unwrap());
        let ViewTag::Restart(h) = f.active_view().tag() else {
            panic!("expected restart view");
        };
        assert_eq!(h.sim_time, date(2000, 2, 1));
        assert_eq!(f.load_named("PRESSURE", 0).unwrap().unwrap().as_floats(), Some(&[205.0; 6][..]));

        assert!(!f.select_restart_by_sim_time(date(1999, 12, 31)).unwrap());
        assert!(f.select_restart_by_sim_time(date(2000, 3, 1)).unwrap());
        assert_eq!(f.active_view().global_position(0), Some(10));

        assert!(f.iselect_restart(0).unwrap());
        assert!(!f.iselect_restart(3).unwrap());
        f.select_global();
        assert_eq!(f.size(), 15);
    }

    #[test]
    fn summary_step_views() {
        let dir = unique_tmp_dir("handle-summary");
        let path = dir.join("CASE.UNSMRY");
        let mut kws = summary_keywords(2);
        kws.extend(summary_keywords(1));
        write_file(&path, &kws);

        let mut f = FileHandle::open(&path, OpenFlags::read_only()).unwrap();
        let v = f.summary_view(1).unwrap();
        assert_eq!(v.tag(), &ViewTag::Summary { report_step: 1 });
        assert_eq!(v.len(), 3);
        assert!(f.select_summary_step(0));
        assert_eq!(f.size(), 5);
        assert!(!f.select_summary_step(2));
    }

    #[test]
    fn replace_checks_shape_and_keeps_other_slots() {
        let path = restart_file("handle-replace");
        let mut f = FileHandle::open(&path, OpenFlags::read_only()).unwrap();
        let target = f.get_named("PRESSURE", 1).unwrap().id();
        let pos = f.index().position_of_id(target).unwrap();
        let before: Vec<_> = f.index().iter().map(|k| (k.id(), k.header().clone())).collect();

        let err = f
            .replace_keyword(target, Keyword::float("PRESSURE", vec![1.0; 5]))
            .unwrap_err();
        assert!(matches!(err, EclError::ShapeMismatch { .. }));
        assert!(!f.index().get(pos).unwrap().is_dirty());

        f.replace_keyword(target, Keyword::float("PRESSURE", vec![1.0; 6]))
            .unwrap();
        let after: Vec<_> = f.index().iter().map(|k| (k.id(), k.header().clone())).collect();
        assert_eq!(before, after);
        let slot = f.index().get(pos).unwrap();
        assert!(slot.is_dirty());
        assert_eq!(slot.cached().unwrap().as_floats(), Some(&[1.0; 6][..]));
        assert!(f.index().iter().filter(|k| k.id() != target).all(|k| !k.is_dirty()));

        assert!(matches!(
            f.replace_keyword(KeywordId(3), Keyword::float("PRESSURE", vec![1.0; 6])),
            Err(EclError::UnknownHandle { offset: 3 })
        ));
    }

    #[test]
    fn save_patches_the_file_in_place() {
        let path = restart_file("handle-save");
        let original_len = fs::metadata(&path).unwrap().len();
        {
            let mut ro = FileHandle::open(&path, OpenFlags::read_only()).unwrap();
            let id = ro.get_named("SWAT", 0).unwrap().id();
            assert!(matches!(ro.save_keyword(id), Err(EclError::ReadOnly)));
        }

        let mut f = FileHandle::open(&path, OpenFlags::writable()).unwrap();
        let id = f.get_named("SWAT", 2).unwrap().id();
        f.replace_keyword(id, Keyword::float("SWAT", vec![0.75; 6])).unwrap();
        assert_eq!(f.report().dirty, 1);
        f.save_keyword(id).unwrap();
        assert_eq!(f.report().dirty, 0);
        f.close();

        assert_eq!(fs::metadata(&path).unwrap().len(), original_len);
        let reopened = FileHandle::open(&path, OpenFlags::read_only()).unwrap();
        assert_eq!(reopened.size(), 15);
        assert_eq!(
            reopened.load_named("SWAT", 2).unwrap().unwrap().as_floats(),
            Some(&[0.75; 6][..])
        );
        assert_eq!(
            reopened.load_named("SWAT", 1).unwrap().unwrap().as_floats(),
            Some(&[0.25; 6][..])
        );
    }

    #[test]
    fn detached_stream_serves_only_loaded_payloads() {
        let path = restart_file("handle-detach");
        let mut f = FileHandle::open(&path, OpenFlags::read_only()).unwrap();
        let seq = f.load_named("SEQNUM", 0).unwrap().unwrap();
        f.close_stream();
        assert!(f.is_detached());

        assert_eq!(f.load_named("SEQNUM", 0).unwrap().unwrap(), seq);
        let err = f.load_named("PRESSURE", 0).unwrap_err();
        assert!(matches!(err, EclError::StreamDetached));
        assert!(err.is_contract_violation());
        // 元数据查询不受影响
        assert_eq!(f.num_named("PRESSURE"), 3);
    }

    #[test]
    fn load_all_before_detach_keeps_everything() {
        let path = restart_file("handle-loadall");
        let mut f = FileHandle::open(&path, OpenFlags::read_only()).unwrap();
        f.load_all().unwrap();
        f.close_stream();
        assert!(f.load_named("PRESSURE", 2).unwrap().is_some());
        assert_eq!(f.report().loaded, 15);
    }

    #[test]
    fn close_stream_flag_reopens_per_load() {
        let path = restart_file("handle-release");
        let flags = OpenFlags {
            close_stream: true,
            ..OpenFlags::default()
        };
        let f = FileHandle::open(&path, flags).unwrap();
        assert!(!f.is_detached());
        assert_eq!(
            f.load_named("DOUBHEAD", 2).unwrap().unwrap().as_doubles(),
            Some(&[60.0, 0.0][..])
        );
        assert!(f.load_named("SWAT", 0).unwrap().is_some());
    }

    #[test]
    fn fast_open_uses_valid_cache_and_rejects_stale() {
        let path = restart_file("handle-fast");
        let sidecar = IndexCache::sidecar_path(&path, None);

        let scanned = FileHandle::open(&path, OpenFlags::read_only()).unwrap();
        scanned.write_index_cache(&sidecar).unwrap();
        let expected: Vec<_> = scanned.index().entries().map(|(h, o)| (h.clone(), o)).collect();

        let cached = FileHandle::fast_open(&path, None, OpenFlags::read_only()).unwrap();
        assert!(cached.loaded_from_cache());
        let got: Vec<_> = cached.index().entries().map(|(h, o)| (h.clone(), o)).collect();
        assert_eq!(got, expected);
        assert_eq!(
            cached.load_named("SEQNUM", 2).unwrap().unwrap().as_ints(),
            Some(&[10][..])
        );

        let file = fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() + Duration::from_secs(3600)).unwrap();
        drop(file);

        let rescanned = FileHandle::fast_open(&path, Some(&sidecar), OpenFlags::read_only()).unwrap();
        assert!(!rescanned.loaded_from_cache());
        let got: Vec<_> = rescanned.index().entries().map(|(h, o)| (h.clone(), o)).collect();
        assert_eq!(got, expected);
        assert!(sidecar.exists());
    }

    #[test]
    fn replacing_seqnum_redecodes_restart_headers() {
        let path = restart_file("handle-retag");
        let mut f = FileHandle::open(&path, OpenFlags::read_only()).unwrap();
        assert!(f.select_restart_by_report_step(5).unwrap());
        let id = f.get_named("SEQNUM", 0).unwrap().id();

        f.replace_keyword(id, Keyword::int("SEQNUM", vec![7])).unwrap();
        let ViewTag::Restart(h) = f.active_view().tag() else {
            panic!("expected restart view");
        };
        assert_eq!(h.report_step, 7);
        assert_eq!(h.seqnum_index, 1);
        assert_eq!(f.size(), 5);

        assert!(!f.select_restart_by_report_step(5).unwrap());
        assert!(f.select_restart_by_report_step(7).unwrap());
        assert_eq!(f.active_view().global_position(0), Some(5));
    }

    #[test]
    fn restart_selection_takes_first_matching_block() {
        let dir = unique_tmp_dir("handle-dup-step");
        let path = dir.join("CASE.UNRST");
        write_file(
            &path,
            &restart_keywords(&[
                Step { report_step: 0, ymd: (2000, 1, 1), days: 0.0 },
                Step { report_step: 5, ymd: (2000, 2, 1), days: 31.0 },
                Step { report_step: 5, ymd: (2000, 2, 1), days: 31.0 },
            ]),
        );
        let mut f = FileHandle::open(&path, OpenFlags::read_only()).unwrap();

        assert!(f.iselect_restart(2).unwrap());
        assert_eq!(f.active_view().global_position(0), Some(10));
        assert!(f.select_restart_by_report_step(5).unwrap());
        assert_eq!(f.active_view().global_position(0), Some(5));
        assert!(f.select_restart_by_sim_time(date(2000, 2, 1)).unwrap());
        assert_eq!(f.active_view().global_position(0), Some(5));
    }

    #[test]
    fn report_step_selection_matches_has_report_step_without_intehead() {
        let dir = unique_tmp_dir("handle-no-intehead");
        let path = dir.join("CASE.UNRST");
        let mut kws = vec![
            Keyword::int("SEQNUM", vec![0]),
            Keyword::float("PRESSURE", vec![1.0; 6]),
        ];
        kws.extend(restart_keywords(&[Step { report_step: 5, ymd: (2000, 2, 1), days: 31.0 }]));
        write_file(&path, &kws);
        let mut f = FileHandle::open(&path, OpenFlags::read_only()).unwrap();

        assert!(f.has_report_step(5).unwrap());
        assert!(f.select_restart_by_report_step(5).unwrap());
        assert_eq!(f.active_view().global_position(0), Some(2));
        assert!(f.select_restart_by_sim_time(date(2000, 2, 1)).unwrap());
        assert!(matches!(f.iselect_restart(0), Err(EclError::MissingKeyword(_))));
    }
}
