use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::core::{Keyword, KeywordData, KwHeader};
use crate::error::{EclError, Result};
use crate::storage::fortio::{Endian, FortioReader, KeywordWriter};
use crate::storage::record::{HeaderRead, RecordReader};

type FileReader = FortioReader<BufReader<File>>;

enum StreamState {
    Open(FileReader),
    /// fd 已释放，下次使用时按路径重新打开
    Released,
    /// 永久断开：按需加载一律失败
    Detached,
}

/// 源文件流的生命周期管理 + 按偏移的按需解码。
pub struct KeywordSource {
    path: PathBuf,
    endian: Endian,
    writable: bool,
    release_after_use: bool,
    state: Mutex<StreamState>,
}

impl KeywordSource {
    pub fn open(path: &Path, endian: Endian, writable: bool) -> io::Result<Self> {
        let reader = open_reader(path, endian, writable)?;
        Ok(Self {
            path: path.to_path_buf(),
            endian,
            writable,
            release_after_use: false,
            state: Mutex::new(StreamState::Open(reader)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn writable(&self) -> bool {
        self.writable
    }

    pub fn is_detached(&self) -> bool {
        matches!(*self.state.lock(), StreamState::Detached)
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.state.lock(), StreamState::Open(_))
    }

    /// 每次使用后都释放 fd（批处理时节省文件描述符）
    pub fn set_release_after_use(&mut self, on: bool) {
        self.release_after_use = on;
    }

    /// 释放 fd；之后的访问会重新打开文件
    pub fn release(&self) {
        let mut g = self.state.lock();
        if matches!(*g, StreamState::Open(_)) {
            *g = StreamState::Released;
        }
    }

    /// 永久断开；已加载的数据仍可用，未加载的再也取不到
    pub fn detach(&self) {
        *self.state.lock() = StreamState::Detached;
    }

    /// 在打开的 reader 上执行 `f`；必要时重新打开，`release_after_use` 时用完即释放。
    pub fn with_reader<T>(&self, f: impl FnOnce(&mut FileReader) -> Result<T>) -> Result<T> {
        let mut g = self.state.lock();
        match &*g {
            StreamState::Detached => return Err(EclError::StreamDetached),
            StreamState::Released => {
                tracing::debug!("Reopening {:?}", self.path);
                *g = StreamState::Open(open_reader(&self.path, self.endian, self.writable)?);
            }
            StreamState::Open(_) => {}
        }
        let StreamState::Open(reader) = &mut *g else {
            return Err(EclError::StreamDetached);
        };
        let out = f(reader);
        if self.release_after_use {
            *g = StreamState::Released;
        }
        out
    }

    /// 按偏移解码一个关键字；磁盘上的 header 必须与索引里记录的一致。
    pub fn load(&self, header: &KwHeader, offset: u64) -> Result<KeywordData> {
        self.with_reader(|r| {
            let corrupt = || EclError::CorruptPayload {
                name: header.name.clone(),
                offset,
            };
            match r.read_header_at(offset)? {
                HeaderRead::Header(h) if h == *header => {}
                _ => return Err(corrupt()),
            }
            let mut buf = Vec::new();
            r.read_payload_into(header, &mut buf).map_err(|e| {
                tracing::warn!("Failed to read {} at {}: {}", header.name, offset, e);
                corrupt()
            })?;
            KeywordData::from_ne_bytes(header.ty, header.count, &buf).ok_or_else(corrupt)
        })
    }

    /// 就地覆盖 `offset` 处的关键字。调用方负责保证编码长度不变。
    pub fn write_at(&self, offset: u64, kw: &Keyword) -> Result<()> {
        if !self.writable {
            return Err(EclError::ReadOnly);
        }
        let endian = self.endian;
        self.with_reader(|r| {
            let file = r.get_mut().get_mut();
            file.seek(SeekFrom::Start(offset))?;
            let mut w = KeywordWriter::new(&mut *file, endian);
            w.write_keyword(kw)?;
            file.flush()?;
            file.sync_data()?;
            // 丢弃 BufReader 里的旧字节
            r.get_mut().seek(SeekFrom::Start(offset))?;
            Ok(())
        })
    }
}

fn open_reader(path: &Path, endian: Endian, writable: bool) -> io::Result<FileReader> {
    let file = OpenOptions::new().read(true).write(writable).open(path)?;
    FortioReader::new(BufReader::new(file), endian)
}
