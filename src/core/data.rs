use crate::core::types::{EclType, KwHeader};
use crate::error::{EclError, Result};

/// 磁盘上 LOGI 的 true（Fortran 惯例 -1）
pub const BOOL_TRUE: i32 = -1;

/// 解码后的关键字数据
#[derive(Clone, Debug, PartialEq)]
pub enum KeywordData {
    Char(Vec<String>),
    Int(Vec<i32>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Bool(Vec<bool>),
    Mess,
}

impl KeywordData {
    /// 从本机字节序的元素字节解码。`bytes` 必须正好是 `count * element_size`。
    pub fn from_ne_bytes(ty: EclType, count: usize, bytes: &[u8]) -> Option<Self> {
        if bytes.len() != count * ty.element_size() {
            return None;
        }
        let data = match ty {
            EclType::Mess => KeywordData::Mess,
            EclType::Char | EclType::Cnnn(_) => KeywordData::Char(
                bytes
                    .chunks_exact(ty.element_size())
                    .map(|c| String::from_utf8_lossy(c).trim_end().to_string())
                    .collect(),
            ),
            EclType::Int => KeywordData::Int(
                bytes
                    .chunks_exact(4)
                    .map(|c| i32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ),
            EclType::Float => KeywordData::Float(
                bytes
                    .chunks_exact(4)
                    .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
                    .collect(),
            ),
            EclType::Double => KeywordData::Double(
                bytes
                    .chunks_exact(8)
                    .map(|c| f64::from_ne_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
                    .collect(),
            ),
            EclType::Bool => KeywordData::Bool(
                bytes
                    .chunks_exact(4)
                    .map(|c| i32::from_ne_bytes([c[0], c[1], c[2], c[3]]) != 0)
                    .collect(),
            ),
        };
        Some(data)
    }

    pub fn len(&self) -> usize {
        match self {
            KeywordData::Char(v) => v.len(),
            KeywordData::Int(v) => v.len(),
            KeywordData::Float(v) => v.len(),
            KeywordData::Double(v) => v.len(),
            KeywordData::Bool(v) => v.len(),
            KeywordData::Mess => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            KeywordData::Char(_) => "CHAR",
            KeywordData::Int(_) => "INTE",
            KeywordData::Float(_) => "REAL",
            KeywordData::Double(_) => "DOUB",
            KeywordData::Bool(_) => "LOGI",
            KeywordData::Mess => "MESS",
        }
    }

    /// 与 header 类型是否兼容（C0nn 与 CHAR 都落在 `Char`）
    pub fn matches_type(&self, ty: EclType) -> bool {
        matches!(
            (self, ty),
            (KeywordData::Char(_), EclType::Char | EclType::Cnnn(_))
                | (KeywordData::Int(_), EclType::Int)
                | (KeywordData::Float(_), EclType::Float)
                | (KeywordData::Double(_), EclType::Double)
                | (KeywordData::Bool(_), EclType::Bool)
                | (KeywordData::Mess, EclType::Mess)
        )
    }

    pub fn as_ints(&self) -> Option<&[i32]> {
        match self {
            KeywordData::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_floats(&self) -> Option<&[f32]> {
        match self {
            KeywordData::Float(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_doubles(&self) -> Option<&[f64]> {
        match self {
            KeywordData::Double(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bools(&self) -> Option<&[bool]> {
        match self {
            KeywordData::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_strings(&self) -> Option<&[String]> {
        match self {
            KeywordData::Char(v) => Some(v),
            _ => None,
        }
    }

    /// 估算内存占用（字节）
    pub fn estimated_bytes(&self) -> u64 {
        let n = match self {
            KeywordData::Char(v) => v.iter().map(|s| s.capacity() + 24).sum(),
            KeywordData::Int(v) => v.len() * 4,
            KeywordData::Float(v) => v.len() * 4,
            KeywordData::Double(v) => v.len() * 8,
            KeywordData::Bool(v) => v.len(),
            KeywordData::Mess => 0,
        };
        n as u64
    }
}

/// header + 数据：写文件、替换关键字时使用的完整值。
#[derive(Clone, Debug, PartialEq)]
pub struct Keyword {
    header: KwHeader,
    data: KeywordData,
}

impl Keyword {
    pub fn new(header: KwHeader, data: KeywordData) -> Result<Self> {
        if !data.matches_type(header.ty) {
            return Err(EclError::UnexpectedType {
                name: header.name.clone(),
                expected: header.ty.name(),
                found: data.type_name(),
            });
        }
        if header.ty != EclType::Mess && data.len() != header.count {
            return Err(EclError::ShapeMismatch {
                name: header.name.clone(),
                expected: header.shape(),
                found: format!("{} elements", data.len()),
            });
        }
        Ok(Self { header, data })
    }

    pub fn int(name: &str, values: Vec<i32>) -> Self {
        Self {
            header: KwHeader::new(name, values.len(), EclType::Int),
            data: KeywordData::Int(values),
        }
    }

    pub fn float(name: &str, values: Vec<f32>) -> Self {
        Self {
            header: KwHeader::new(name, values.len(), EclType::Float),
            data: KeywordData::Float(values),
        }
    }

    pub fn double(name: &str, values: Vec<f64>) -> Self {
        Self {
            header: KwHeader::new(name, values.len(), EclType::Double),
            data: KeywordData::Double(values),
        }
    }

    pub fn logical(name: &str, values: Vec<bool>) -> Self {
        Self {
            header: KwHeader::new(name, values.len(), EclType::Bool),
            data: KeywordData::Bool(values),
        }
    }

    pub fn chars(name: &str, values: Vec<String>) -> Self {
        Self {
            header: KwHeader::new(name, values.len(), EclType::Char),
            data: KeywordData::Char(values),
        }
    }

    pub fn message(name: &str) -> Self {
        Self {
            header: KwHeader::new(name, 0, EclType::Mess),
            data: KeywordData::Mess,
        }
    }

    pub fn header(&self) -> &KwHeader {
        &self.header
    }

    pub fn data(&self) -> &KeywordData {
        &self.data
    }

    pub fn into_parts(self) -> (KwHeader, KeywordData) {
        (self.header, self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_native_ints_and_bools() {
        let mut bytes = Vec::new();
        for v in [3i32, -1, 0] {
            bytes.extend_from_slice(&v.to_ne_bytes());
        }
        let ints = KeywordData::from_ne_bytes(EclType::Int, 3, &bytes).unwrap();
        assert_eq!(ints.as_ints(), Some(&[3, -1, 0][..]));

        let bools = KeywordData::from_ne_bytes(EclType::Bool, 3, &bytes).unwrap();
        assert_eq!(bools.as_bools(), Some(&[true, true, false][..]));

        assert!(KeywordData::from_ne_bytes(EclType::Int, 4, &bytes).is_none());
    }

    #[test]
    fn char_elements_are_right_trimmed() {
        let data = KeywordData::from_ne_bytes(EclType::Char, 2, b"WOPR    FOPT    ").unwrap();
        assert_eq!(data.as_strings().unwrap(), &["WOPR".to_string(), "FOPT".to_string()]);
    }

    #[test]
    fn keyword_new_rejects_mismatched_data() {
        let h = KwHeader::new("PRESSURE", 2, EclType::Float);
        assert!(Keyword::new(h.clone(), KeywordData::Int(vec![1, 2])).is_err());
        assert!(Keyword::new(h.clone(), KeywordData::Float(vec![1.0])).is_err());
        assert!(Keyword::new(h, KeywordData::Float(vec![1.0, 2.0])).is_ok());
    }
}
