use serde::{Deserialize, Serialize};
use std::fmt;

/// 关键字名最大宽度（磁盘上右侧空格填充到 8 字节）
pub const NAME_WIDTH: usize = 8;

const BLOCKSIZE_NUMERIC: usize = 1000;
const BLOCKSIZE_CHAR: usize = 105;

/// 元素类型：header 解析时一次性确定，之后所有尺寸计算都从这里来。
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum EclType {
    Char,
    /// `C0nn`：定长 nn 字节字符串
    Cnnn(u16),
    Int,
    Float,
    Double,
    Bool,
    Mess,
}

impl EclType {
    pub fn parse(tag: &[u8]) -> Option<Self> {
        match tag {
            b"CHAR" => Some(EclType::Char),
            b"INTE" => Some(EclType::Int),
            b"REAL" => Some(EclType::Float),
            b"DOUB" => Some(EclType::Double),
            b"LOGI" => Some(EclType::Bool),
            b"MESS" => Some(EclType::Mess),
            [b'C', d0, d1, d2] => {
                let digits = [*d0, *d1, *d2];
                let s = std::str::from_utf8(&digits).ok()?;
                let width: u16 = s.parse().ok()?;
                if width == 0 {
                    return None;
                }
                Some(EclType::Cnnn(width))
            }
            _ => None,
        }
    }

    pub fn tag(self) -> [u8; 4] {
        match self {
            EclType::Char => *b"CHAR",
            EclType::Int => *b"INTE",
            EclType::Float => *b"REAL",
            EclType::Double => *b"DOUB",
            EclType::Bool => *b"LOGI",
            EclType::Mess => *b"MESS",
            EclType::Cnnn(w) => {
                let s = format!("C{:03}", w.min(999));
                let b = s.as_bytes();
                [b[0], b[1], b[2], b[3]]
            }
        }
    }

    /// 单个元素在磁盘上的字节数
    pub fn element_size(self) -> usize {
        match self {
            EclType::Char => 8,
            EclType::Cnnn(w) => w as usize,
            EclType::Int | EclType::Float | EclType::Bool => 4,
            EclType::Double => 8,
            EclType::Mess => 0,
        }
    }

    /// 每个 Fortran 数据记录最多承载的元素数
    pub fn block_size(self) -> usize {
        if self.is_char() {
            BLOCKSIZE_CHAR
        } else {
            BLOCKSIZE_NUMERIC
        }
    }

    pub fn is_char(self) -> bool {
        matches!(self, EclType::Char | EclType::Cnnn(_))
    }

    pub fn name(self) -> &'static str {
        match self {
            EclType::Char => "CHAR",
            EclType::Cnnn(_) => "C0nn",
            EclType::Int => "INTE",
            EclType::Float => "REAL",
            EclType::Double => "DOUB",
            EclType::Bool => "LOGI",
            EclType::Mess => "MESS",
        }
    }
}

impl fmt::Display for EclType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.tag()))
    }
}

/// 一条关键字记录的 header：名字、元素个数、元素类型。
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct KwHeader {
    pub name: String,
    pub count: usize,
    pub ty: EclType,
}

impl KwHeader {
    /// 名字按磁盘惯例去掉右侧填充空格；超过 8 字节的名字会被截断。
    pub fn new(name: &str, count: usize, ty: EclType) -> Self {
        let trimmed = name.trim_end();
        let name = if trimmed.len() > NAME_WIDTH {
            trimmed.chars().take(NAME_WIDTH).collect()
        } else {
            trimmed.to_string()
        };
        Self { name, count, ty }
    }

    /// 解码后 payload 的字节数（不含 Fortran 记录标记）
    pub fn payload_bytes(&self) -> usize {
        self.count * self.ty.element_size()
    }

    /// 数据记录（block）个数
    pub fn num_blocks(&self) -> usize {
        if self.ty == EclType::Mess || self.count == 0 {
            return 0;
        }
        let bs = self.ty.block_size();
        self.count / bs + usize::from(self.count % bs != 0)
    }

    pub fn padded_name(&self) -> [u8; NAME_WIDTH] {
        let mut out = [b' '; NAME_WIDTH];
        let bytes = self.name.as_bytes();
        let n = bytes.len().min(NAME_WIDTH);
        out[..n].copy_from_slice(&bytes[..n]);
        out
    }

    pub fn shape(&self) -> String {
        format!("{}x{}", self.count, self.ty)
    }
}

impl fmt::Display for KwHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<8} {:>10} {}", self.name, self.count, self.ty)
    }
}

/// 关键字实例的身份：header 在源文件中的字节偏移。
///
/// 偏移在扫描时确定且不可变，index cache 也只认它。
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct KeywordId(pub u64);

impl KeywordId {
    pub fn offset(self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_tags_parse_back() {
        for ty in [
            EclType::Char,
            EclType::Int,
            EclType::Float,
            EclType::Double,
            EclType::Bool,
            EclType::Mess,
            EclType::Cnnn(56),
        ] {
            assert_eq!(EclType::parse(&ty.tag()), Some(ty));
        }
        assert_eq!(EclType::parse(b"XXXX"), None);
        assert_eq!(EclType::parse(b"C000"), None);
    }

    #[test]
    fn blocks_follow_type_block_size() {
        assert_eq!(KwHeader::new("PRESSURE", 0, EclType::Float).num_blocks(), 0);
        assert_eq!(KwHeader::new("PRESSURE", 1000, EclType::Float).num_blocks(), 1);
        assert_eq!(KwHeader::new("PRESSURE", 1001, EclType::Float).num_blocks(), 2);
        assert_eq!(KwHeader::new("KEYWORDS", 106, EclType::Char).num_blocks(), 2);
        assert_eq!(KwHeader::new("ENDSOL", 0, EclType::Mess).num_blocks(), 0);
    }

    #[test]
    fn names_are_trimmed_and_padded() {
        let h = KwHeader::new("SEQNUM  ", 1, EclType::Int);
        assert_eq!(h.name, "SEQNUM");
        assert_eq!(&h.padded_name(), b"SEQNUM  ");
    }
}
