use std::io;

use crate::core::KwHeader;

/// 读一个 header 的结果
#[derive(Clone, Debug, PartialEq)]
pub enum HeaderRead {
    Header(KwHeader),
    /// 偏移处恰好没有任何字节
    EndOfStream,
    /// 有字节但不是合法 header（截断、记录标记不符、未知类型）
    Malformed,
}

/// 二进制记录层抽象：索引只通过它接触源文件。
///
/// ## 契约
/// - 字节序完全由实现内部处理，`read_payload_into` 输出本机字节序的元素字节。
/// - `read_header_at` 成功后流停在 payload 起点，`skip_payload` 从那里跳到下一个 header。
pub trait RecordReader {
    fn read_header_at(&mut self, offset: u64) -> io::Result<HeaderRead>;

    /// payload 截断/记录标记不符时返回 `Ok(false)`
    fn skip_payload(&mut self, header: &KwHeader) -> io::Result<bool>;

    /// 读取紧随 header 之后的 payload（调用前须先 `read_header_at`）
    fn read_payload_into(&mut self, header: &KwHeader, buf: &mut Vec<u8>) -> io::Result<()>;

    fn current_offset(&mut self) -> io::Result<u64>;

    fn seek(&mut self, offset: u64) -> io::Result<()>;
}

impl<R: RecordReader + ?Sized> RecordReader for Box<R> {
    fn read_header_at(&mut self, offset: u64) -> io::Result<HeaderRead> {
        (**self).read_header_at(offset)
    }

    fn skip_payload(&mut self, header: &KwHeader) -> io::Result<bool> {
        (**self).skip_payload(header)
    }

    fn read_payload_into(&mut self, header: &KwHeader, buf: &mut Vec<u8>) -> io::Result<()> {
        (**self).read_payload_into(header, buf)
    }

    fn current_offset(&mut self) -> io::Result<u64> {
        (**self).current_offset()
    }

    fn seek(&mut self, offset: u64) -> io::Result<()> {
        (**self).seek(offset)
    }
}
