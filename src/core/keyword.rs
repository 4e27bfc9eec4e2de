use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::data::KeywordData;
use crate::core::types::{EclType, KeywordId, KwHeader};
use crate::error::Result;

/// 一个关键字实例的轻量描述：header + 源文件偏移 + 惰性解码的数据。
///
/// 由发现它的 `FileIndex` 持有；view 只持有位置，不持有 handle。
#[derive(Debug)]
pub struct KeywordHandle {
    header: KwHeader,
    id: KeywordId,
    payload: Mutex<Option<Arc<KeywordData>>>,
    dirty: bool,
}

impl KeywordHandle {
    pub fn new(header: KwHeader, offset: u64) -> Self {
        Self {
            header,
            id: KeywordId(offset),
            payload: Mutex::new(None),
            dirty: false,
        }
    }

    /// 替换产生的 handle：沿用旧槽位的偏移，数据已在内存，等待写回。
    pub(crate) fn replaced(header: KwHeader, offset: u64, data: KeywordData) -> Self {
        Self {
            header,
            id: KeywordId(offset),
            payload: Mutex::new(Some(Arc::new(data))),
            dirty: true,
        }
    }

    pub fn header(&self) -> &KwHeader {
        &self.header
    }

    pub fn name(&self) -> &str {
        &self.header.name
    }

    pub fn count(&self) -> usize {
        self.header.count
    }

    pub fn ty(&self) -> EclType {
        self.header.ty
    }

    pub fn id(&self) -> KeywordId {
        self.id
    }

    pub fn offset(&self) -> u64 {
        self.id.0
    }

    pub fn is_loaded(&self) -> bool {
        self.payload.lock().is_some()
    }

    pub fn cached(&self) -> Option<Arc<KeywordData>> {
        self.payload.lock().clone()
    }

    /// 已替换但尚未写回磁盘
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// 取数据；未缓存时调用 `load` 从源读取并缓存。
    pub fn load_with<F>(&self, load: F) -> Result<Arc<KeywordData>>
    where
        F: FnOnce(&KwHeader, u64) -> Result<KeywordData>,
    {
        let mut g = self.payload.lock();
        if let Some(d) = g.as_ref() {
            return Ok(d.clone());
        }
        let data = Arc::new(load(&self.header, self.id.0)?);
        *g = Some(data.clone());
        Ok(data)
    }
}
