use std::fs;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::Xxh3;

use crate::core::{EclType, KwHeader};
use crate::index::file_index::{FileIndex, ScanStop};

/// sidecar 文件 Header
const MAGIC: u32 = 0xEC1F_0001;
const VERSION_CURRENT: u32 = 1;
const STATE_COMMITTED: u32 = 0x0000_0001;
const STATE_INCOMPLETE: u32 = 0xFFFF_FFFF;
const HEADER_SIZE: usize = 4 + 4 + 4 + 4 + 8; // magic + version + state + data_len + xxh3

/// sidecar 默认扩展名
pub const SIDECAR_EXT: &str = "EIDX";

#[derive(Clone, Debug, Serialize, Deserialize)]
struct CachedKeyword {
    name: String,
    offset: u64,
    count: u64,
    ty: EclType,
}

/// 持久化的索引体。源文件名必须是第一个字段。
#[derive(Clone, Debug, Serialize, Deserialize)]
struct IndexCacheBody {
    source_name: String,
    source_len: u64,
    keywords: Vec<CachedKeyword>,
    stop: ScanStop,
}

/// 全局索引的 sidecar 缓存（原子替换写入 + 严格校验读取）
///
/// 落盘流程：
/// 1) 写 `<sidecar>.tmp` 的 INCOMPLETE header（len/checksum 先置 0）
/// 2) `bincode::serialize_into` 流式写 body，边写边算 xxh3 / data_len
/// 3) seek 回开头覆盖 COMMITTED header
/// 4) fsync(tmp) → rename(tmp, sidecar) → fsync(dir)
///
/// 读取时任何一项不符都当作"没有缓存"：调用方退回全量扫描，绝不部分信任。
/// 过期缓存不删除，下次显式写入时覆盖。
pub struct IndexCache {
    path: PathBuf,
}

struct ChecksumWriter<'a, W: Write> {
    inner: &'a mut W,
    hasher: Xxh3,
    bytes: u64,
}

impl<'a, W: Write> ChecksumWriter<'a, W> {
    fn new(inner: &'a mut W) -> Self {
        Self {
            inner,
            hasher: Xxh3::new(),
            bytes: 0,
        }
    }

    fn finish(self) -> (u64, u64) {
        (self.bytes, self.hasher.digest())
    }
}

impl<'a, W: Write> Write for ChecksumWriter<'a, W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.bytes += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

fn encode_header(state: u32, data_len: u32, checksum: u64) -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    header[0..4].copy_from_slice(&MAGIC.to_le_bytes());
    header[4..8].copy_from_slice(&VERSION_CURRENT.to_le_bytes());
    header[8..12].copy_from_slice(&state.to_le_bytes());
    header[12..16].copy_from_slice(&data_len.to_le_bytes());
    header[16..24].copy_from_slice(&checksum.to_le_bytes());
    header
}

fn base_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

impl IndexCache {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// `<dir>/<stem>.EIDX`；`dir` 缺省时与源文件同目录
    pub fn sidecar_path(source: &Path, dir: Option<&Path>) -> PathBuf {
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dir = dir
            .map(Path::to_path_buf)
            .or_else(|| source.parent().map(Path::to_path_buf))
            .unwrap_or_default();
        dir.join(format!("{stem}.{SIDECAR_EXT}"))
    }

    pub fn for_source(source: &Path, dir: Option<&Path>) -> Self {
        Self::new(Self::sidecar_path(source, dir))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 校验并加载；任何不一致返回 `Ok(None)`
    pub fn load_if_valid(&self, source: &Path) -> anyhow::Result<Option<FileIndex>> {
        let (Ok(src_meta), Ok(cache_meta)) = (fs::metadata(source), fs::metadata(&self.path)) else {
            return Ok(None);
        };
        if src_meta.modified()? > cache_meta.modified()? {
            tracing::warn!("Index cache {:?} is older than {:?}, ignoring", self.path, source);
            return Ok(None);
        }

        let data = fs::read(&self.path)?;
        if data.len() < HEADER_SIZE {
            tracing::warn!("Index cache too small, ignoring");
            return Ok(None);
        }

        let magic = u32::from_le_bytes(data[0..4].try_into()?);
        let version = u32::from_le_bytes(data[4..8].try_into()?);
        let state = u32::from_le_bytes(data[8..12].try_into()?);
        let data_len = u32::from_le_bytes(data[12..16].try_into()?) as usize;
        let stored_checksum = u64::from_le_bytes(data[16..24].try_into()?);

        if magic != MAGIC {
            tracing::warn!("Index cache magic mismatch: {:#x} != {:#x}", magic, MAGIC);
            return Ok(None);
        }
        if version != VERSION_CURRENT {
            tracing::warn!(
                "Index cache version mismatch: {} != {}",
                version,
                VERSION_CURRENT
            );
            return Ok(None);
        }
        if state != STATE_COMMITTED {
            tracing::warn!("Index cache state INCOMPLETE, ignoring");
            return Ok(None);
        }

        let body = &data[HEADER_SIZE..];
        if body.len() != data_len {
            tracing::warn!("Index cache data length mismatch");
            return Ok(None);
        }
        let computed = xxhash_rust::xxh3::xxh3_64(body);
        if computed != stored_checksum {
            tracing::warn!(
                "Index cache checksum mismatch: {:#x} != {:#x}",
                computed,
                stored_checksum
            );
            return Ok(None);
        }

        let body: IndexCacheBody = match bincode::deserialize(body) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!("Index cache deserialize failed: {}", e);
                return Ok(None);
            }
        };

        if Some(&body.source_name) != base_name(source).as_ref() {
            tracing::warn!(
                "Index cache was written for {:?}, not {:?}",
                body.source_name,
                source
            );
            return Ok(None);
        }
        if body.source_len != src_meta.len() {
            tracing::warn!(
                "Index cache source length {} != current {}",
                body.source_len,
                src_meta.len()
            );
            return Ok(None);
        }

        let entries = body.keywords.into_iter().map(|k| {
            let count = k.count as usize;
            (KwHeader::new(&k.name, count, k.ty), k.offset)
        });
        match FileIndex::from_entries(entries, body.stop) {
            Some(index) => {
                tracing::debug!("Index cache {:?} loaded: {} keywords", self.path, index.len());
                Ok(Some(index))
            }
            None => {
                tracing::warn!("Index cache offsets out of order, ignoring");
                Ok(None)
            }
        }
    }

    /// 原子写入
    pub fn write_atomic(&self, source: &Path, index: &FileIndex) -> anyhow::Result<()> {
        let source_name = base_name(source)
            .ok_or_else(|| anyhow::anyhow!("source path {:?} has no file name", source))?;
        let source_len = fs::metadata(source)?.len();
        let body = IndexCacheBody {
            source_name,
            source_len,
            keywords: index
                .entries()
                .map(|(h, offset)| CachedKeyword {
                    name: h.name.clone(),
                    offset,
                    count: h.count as u64,
                    ty: h.ty,
                })
                .collect(),
            stop: index.stop().clone(),
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut tmp_os = self.path.clone().into_os_string();
        tmp_os.push(".tmp");
        let tmp_path = PathBuf::from(tmp_os);

        // 1) INCOMPLETE header，然后流式写 body
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(&encode_header(STATE_INCOMPLETE, 0, 0))?;

        // 2) body + 长度/校验
        let (data_len_u64, checksum) = {
            let mut cw = ChecksumWriter::new(&mut file);
            bincode::serialize_into(&mut cw, &body)?;
            cw.finish()
        };
        let data_len: u32 = data_len_u64
            .try_into()
            .map_err(|_| anyhow::anyhow!("Index cache too large (>{} bytes)", u32::MAX))?;

        // 3) COMMITTED header
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&encode_header(STATE_COMMITTED, data_len, checksum))?;

        // 4) fsync → rename → fsync(dir)
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp_path, &self.path)?;
        if let Some(parent) = self.path.parent() {
            if let Ok(dir) = fs::File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        tracing::info!(
            "Index cache written: {} keywords, {} bytes -> {:?}",
            body.keywords.len(),
            HEADER_SIZE + data_len as usize,
            self.path
        );
        Ok(())
    }
}
