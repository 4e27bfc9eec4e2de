//! 测试用的合成文件构造

use std::path::{Path, PathBuf};

use crate::core::Keyword;
use crate::storage::fortio::{Endian, KeywordWriter};

pub fn unique_tmp_dir(tag: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("ecl-index-{}-{}", tag, nanos));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn encode(kws: &[Keyword]) -> Vec<u8> {
    let mut w = KeywordWriter::new(Vec::new(), Endian::Big);
    for kw in kws {
        w.write_keyword(kw).unwrap();
    }
    w.into_inner()
}

pub fn write_file(path: &Path, kws: &[Keyword]) {
    std::fs::write(path, encode(kws)).unwrap();
}

/// `SEQHDR` 后跟 `steps` 组 `MINISTEP`/`PARAMS`
pub fn summary_keywords(steps: i32) -> Vec<Keyword> {
    let mut kws = vec![Keyword::int("SEQHDR", vec![0])];
    for i in 0..steps {
        kws.push(Keyword::int("MINISTEP", vec![i]));
        kws.push(Keyword::float("PARAMS", vec![i as f32; 4]));
    }
    kws
}

pub struct Step {
    pub report_step: i32,
    pub ymd: (i32, i32, i32),
    pub days: f64,
}

pub fn intehead(ymd: (i32, i32, i32)) -> Vec<i32> {
    let mut v = vec![0; 100];
    v[14] = 7;
    v[64] = ymd.2;
    v[65] = ymd.1;
    v[66] = ymd.0;
    v[94] = 100;
    v
}

/// 统一 restart 文件：每个 report step 一个 `SEQNUM` 块
pub fn restart_keywords(steps: &[Step]) -> Vec<Keyword> {
    let mut kws = Vec::new();
    for s in steps {
        kws.push(Keyword::int("SEQNUM", vec![s.report_step]));
        kws.push(Keyword::int("INTEHEAD", intehead(s.ymd)));
        kws.push(Keyword::double("DOUBHEAD", vec![s.days, 0.0]));
        kws.push(Keyword::float("PRESSURE", vec![200.0 + s.report_step as f32; 6]));
        kws.push(Keyword::float("SWAT", vec![0.25; 6]));
    }
    kws
}

pub fn three_restart_steps() -> Vec<Keyword> {
    restart_keywords(&[
        Step { report_step: 0, ymd: (2000, 1, 1), days: 0.0 },
        Step { report_step: 5, ymd: (2000, 2, 1), days: 31.0 },
        Step { report_step: 10, ymd: (2000, 3, 1), days: 60.0 },
    ])
}
