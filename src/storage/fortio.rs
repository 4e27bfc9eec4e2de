use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom, Write};

use crate::core::{EclType, Keyword, KeywordData, KwHeader, BOOL_TRUE, NAME_WIDTH};
use crate::storage::record::{HeaderRead, RecordReader};

/// header 记录体：name(8) + count(4) + type(4)
const HEADER_BODY: usize = NAME_WIDTH + 4 + 4;
const MARKER: usize = 4;

/// 源文件字节序（ECLIPSE 输出一般是大端）
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum Endian {
    #[default]
    Big,
    Little,
}

impl Endian {
    fn is_native(self) -> bool {
        match self {
            Endian::Big => cfg!(target_endian = "big"),
            Endian::Little => cfg!(target_endian = "little"),
        }
    }

    fn read_u32(self, b: [u8; 4]) -> u32 {
        match self {
            Endian::Big => u32::from_be_bytes(b),
            Endian::Little => u32::from_le_bytes(b),
        }
    }

    fn read_i32(self, b: [u8; 4]) -> i32 {
        match self {
            Endian::Big => i32::from_be_bytes(b),
            Endian::Little => i32::from_le_bytes(b),
        }
    }

    fn u32_bytes(self, v: u32) -> [u8; 4] {
        match self {
            Endian::Big => v.to_be_bytes(),
            Endian::Little => v.to_le_bytes(),
        }
    }

    fn i32_bytes(self, v: i32) -> [u8; 4] {
        match self {
            Endian::Big => v.to_be_bytes(),
            Endian::Little => v.to_le_bytes(),
        }
    }
}

/// 读满 `buf`，返回实际读到的字节数（EOF 时可能小于 `buf.len()`）
fn read_fully<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut n = 0;
    while n < buf.len() {
        match r.read(&mut buf[n..]) {
            Ok(0) => break,
            Ok(k) => n += k,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(n)
}

fn corrupt(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

/// 向前跳过 `n` 字节。`BufReader` 在缓冲区内移动，不丢弃已读入的数据。
pub trait ForwardSeek: Read + Seek {
    fn skip_bytes(&mut self, n: u64) -> io::Result<()>;
}

fn relative(n: u64) -> io::Result<i64> {
    i64::try_from(n).map_err(|_| corrupt(format!("skip of {} bytes overflows", n)))
}

impl<R: Read + Seek> ForwardSeek for BufReader<R> {
    fn skip_bytes(&mut self, n: u64) -> io::Result<()> {
        self.seek_relative(relative(n)?)
    }
}

impl<T: AsRef<[u8]>> ForwardSeek for Cursor<T> {
    fn skip_bytes(&mut self, n: u64) -> io::Result<()> {
        self.seek(SeekFrom::Current(relative(n)?)).map(|_| ())
    }
}

impl ForwardSeek for File {
    fn skip_bytes(&mut self, n: u64) -> io::Result<()> {
        self.seek(SeekFrom::Current(relative(n)?)).map(|_| ())
    }
}

/// 一个 Fortran 数据记录里的元素数
fn block_elements(header: &KwHeader, block: usize) -> usize {
    let bs = header.ty.block_size();
    (header.count - block * bs).min(bs)
}

/// ECLIPSE unformatted 二进制（Fortran 顺序记录）读取器。
///
/// 每个记录：`[len][len 字节][len]`，两端标记必须一致。
pub struct FortioReader<R> {
    inner: R,
    endian: Endian,
    len: u64,
}

impl<R: Read + Seek> FortioReader<R> {
    pub fn new(mut inner: R, endian: Endian) -> io::Result<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self { inner, endian, len })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn endian(&self) -> Endian {
        self.endian
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// 读一个记录标记；EOF 或不足 4 字节返回 `None`
    fn read_marker(&mut self) -> io::Result<Option<u32>> {
        let mut b = [0u8; MARKER];
        if read_fully(&mut self.inner, &mut b)? != MARKER {
            return Ok(None);
        }
        Ok(Some(self.endian.read_u32(b)))
    }

    fn flip_in_place(&self, ty: EclType, bytes: &mut [u8]) {
        if self.endian.is_native() || ty.is_char() {
            return;
        }
        let w = ty.element_size();
        if w > 1 {
            for elem in bytes.chunks_exact_mut(w) {
                elem.reverse();
            }
        }
    }
}

impl<R: ForwardSeek> RecordReader for FortioReader<R> {
    fn read_header_at(&mut self, offset: u64) -> io::Result<HeaderRead> {
        // 顺序扫描时已经停在 offset，不要 seek（会清空 BufReader 缓冲）
        if self.inner.stream_position()? != offset {
            self.inner.seek(SeekFrom::Start(offset))?;
        }

        let mut lead = [0u8; MARKER];
        match read_fully(&mut self.inner, &mut lead)? {
            0 => return Ok(HeaderRead::EndOfStream),
            MARKER => {}
            _ => return Ok(HeaderRead::Malformed),
        }
        if self.endian.read_u32(lead) as usize != HEADER_BODY {
            return Ok(HeaderRead::Malformed);
        }

        let mut body = [0u8; HEADER_BODY];
        if read_fully(&mut self.inner, &mut body)? != HEADER_BODY {
            return Ok(HeaderRead::Malformed);
        }
        match self.read_marker()? {
            Some(n) if n as usize == HEADER_BODY => {}
            _ => return Ok(HeaderRead::Malformed),
        }

        let Ok(name) = std::str::from_utf8(&body[..NAME_WIDTH]) else {
            return Ok(HeaderRead::Malformed);
        };
        let count = self.endian.read_i32([body[8], body[9], body[10], body[11]]);
        if count < 0 {
            return Ok(HeaderRead::Malformed);
        }
        let Some(ty) = EclType::parse(&body[12..16]) else {
            return Ok(HeaderRead::Malformed);
        };

        Ok(HeaderRead::Header(KwHeader::new(name, count as usize, ty)))
    }

    fn skip_payload(&mut self, header: &KwHeader) -> io::Result<bool> {
        let w = header.ty.element_size() as u64;
        for block in 0..header.num_blocks() {
            let expected = block_elements(header, block) as u64 * w;
            match self.read_marker()? {
                Some(n) if n as u64 == expected => {}
                _ => return Ok(false),
            }
            let pos = self.inner.stream_position()?;
            if pos + expected + MARKER as u64 > self.len {
                return Ok(false);
            }
            self.inner.skip_bytes(expected)?;
            match self.read_marker()? {
                Some(n) if n as u64 == expected => {}
                _ => return Ok(false),
            }
        }
        Ok(true)
    }

    fn read_payload_into(&mut self, header: &KwHeader, buf: &mut Vec<u8>) -> io::Result<()> {
        buf.clear();
        buf.reserve(header.payload_bytes());
        let w = header.ty.element_size();
        for block in 0..header.num_blocks() {
            let expected = block_elements(header, block) * w;
            match self.read_marker()? {
                Some(n) if n as usize == expected => {}
                _ => return Err(corrupt(format!("{}: bad block marker", header.name))),
            }
            let start = buf.len();
            buf.resize(start + expected, 0);
            if read_fully(&mut self.inner, &mut buf[start..])? != expected {
                return Err(corrupt(format!("{}: short data block", header.name)));
            }
            match self.read_marker()? {
                Some(n) if n as usize == expected => {}
                _ => return Err(corrupt(format!("{}: bad trailing marker", header.name))),
            }
        }
        self.flip_in_place(header.ty, buf);
        Ok(())
    }

    fn current_offset(&mut self) -> io::Result<u64> {
        self.inner.stream_position()
    }

    fn seek(&mut self, offset: u64) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(offset)).map(|_| ())
    }
}

/// 写出关键字（与 `FortioReader` 同一格式）。
pub struct KeywordWriter<W> {
    inner: W,
    endian: Endian,
}

impl<W: Write> KeywordWriter<W> {
    pub fn new(inner: W, endian: Endian) -> Self {
        Self { inner, endian }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    /// 关键字在磁盘上的完整字节数（header 记录 + 全部数据记录）
    pub fn encoded_len(header: &KwHeader) -> u64 {
        let w = header.ty.element_size() as u64;
        let mut n = (HEADER_BODY + 2 * MARKER) as u64;
        for block in 0..header.num_blocks() {
            n += 2 * MARKER as u64 + block_elements(header, block) as u64 * w;
        }
        n
    }

    fn write_record(&mut self, body: &[u8]) -> io::Result<()> {
        let n: u32 = body
            .len()
            .try_into()
            .map_err(|_| corrupt("record larger than 4GiB"))?;
        let m = self.endian.u32_bytes(n);
        self.inner.write_all(&m)?;
        self.inner.write_all(body)?;
        self.inner.write_all(&m)
    }

    pub fn write_header(&mut self, header: &KwHeader) -> io::Result<()> {
        let count: i32 = header
            .count
            .try_into()
            .map_err(|_| corrupt(format!("{}: element count overflows i32", header.name)))?;
        let mut body = [0u8; HEADER_BODY];
        body[..NAME_WIDTH].copy_from_slice(&header.padded_name());
        body[8..12].copy_from_slice(&self.endian.i32_bytes(count));
        body[12..16].copy_from_slice(&header.ty.tag());
        self.write_record(&body)
    }

    /// 返回写入的字节数
    pub fn write_keyword(&mut self, kw: &Keyword) -> io::Result<u64> {
        let header = kw.header();
        self.write_header(header)?;
        let bs = header.ty.block_size();
        for block in 0..header.num_blocks() {
            let range = block * bs..block * bs + block_elements(header, block);
            let body = self.encode_block(header.ty, kw.data(), range);
            self.write_record(&body)?;
        }
        Ok(Self::encoded_len(header))
    }

    fn encode_block(&self, ty: EclType, data: &KeywordData, range: std::ops::Range<usize>) -> Vec<u8> {
        let e = self.endian;
        let mut out = Vec::with_capacity(range.len() * ty.element_size());
        match data {
            KeywordData::Int(v) => v[range].iter().for_each(|x| out.extend_from_slice(&e.i32_bytes(*x))),
            KeywordData::Bool(v) => v[range].iter().for_each(|x| {
                out.extend_from_slice(&e.i32_bytes(if *x { BOOL_TRUE } else { 0 }))
            }),
            KeywordData::Float(v) => v[range]
                .iter()
                .for_each(|x| out.extend_from_slice(&e.u32_bytes(x.to_bits()))),
            KeywordData::Double(v) => v[range].iter().for_each(|x| {
                let b = x.to_bits();
                match e {
                    Endian::Big => out.extend_from_slice(&b.to_be_bytes()),
                    Endian::Little => out.extend_from_slice(&b.to_le_bytes()),
                }
            }),
            KeywordData::Char(v) => {
                let w = ty.element_size();
                for s in &v[range] {
                    let mut cell = vec![b' '; w];
                    let b = s.as_bytes();
                    let n = b.len().min(w);
                    cell[..n].copy_from_slice(&b[..n]);
                    out.extend_from_slice(&cell);
                }
            }
            KeywordData::Mess => {}
        }
        out
    }
}
