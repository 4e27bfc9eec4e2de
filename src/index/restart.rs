use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::core::{KeywordData, KeywordHandle};
use crate::error::{EclError, Result};
use crate::index::file_index::FileIndex;
use crate::index::view::{IndexView, ViewTag};

pub const SEQNUM: &str = "SEQNUM";
pub const SEQHDR: &str = "SEQHDR";
pub const INTEHEAD: &str = "INTEHEAD";
pub const DOUBHEAD: &str = "DOUBHEAD";

const INTEHEAD_PHASE_INDEX: usize = 14;
const INTEHEAD_DAY_INDEX: usize = 64;
const INTEHEAD_MONTH_INDEX: usize = 65;
const INTEHEAD_YEAR_INDEX: usize = 66;
const INTEHEAD_IPROG_INDEX: usize = 94;
const INTEHEAD_HOUR_INDEX: usize = 206;
const INTEHEAD_MINUTE_INDEX: usize = 207;
const INTEHEAD_MICROSECOND_INDEX: usize = 410;
const DOUBHEAD_DAYS_INDEX: usize = 0;

/// 按需解码：给一个 handle，返回（可能已缓存的）数据
pub type Loader<'a> = dyn FnMut(&KeywordHandle) -> Result<Arc<KeywordData>> + 'a;

/// 一个 restart 块解码出来的时间信息
#[derive(Clone, Debug, PartialEq)]
pub struct RestartHeader {
    /// 第几个 SEQNUM（文件内 occurrence，不一定等于 report step）
    pub seqnum_index: usize,
    pub report_step: i32,
    pub sim_time: DateTime<Utc>,
    pub sim_days: f64,
}

/// 选择 restart 块的方式
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum RestartQuery {
    SeqnumIndex(usize),
    ReportStep(i32),
    SimTime(DateTime<Utc>),
    SimDays(f64),
}

impl RestartQuery {
    fn matches(&self, h: &RestartHeader) -> bool {
        match *self {
            RestartQuery::SeqnumIndex(i) => h.seqnum_index == i,
            RestartQuery::ReportStep(n) => h.report_step == n,
            RestartQuery::SimTime(t) => h.sim_time == t,
            RestartQuery::SimDays(d) => days_equal(h.sim_days, d),
        }
    }
}

fn days_equal(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-6 * a.abs().max(b.abs()).max(1.0)
}

/// INTEHEAD 里的模拟器标识
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Simulator {
    Eclipse100,
    /// 300 与 300-Thermal(500) 都归这里
    Eclipse300,
    Intersect,
    FrontSim,
    Other(i32),
}

impl Simulator {
    fn from_iprog(v: i32) -> Self {
        match v {
            100 => Simulator::Eclipse100,
            300 | 500 => Simulator::Eclipse300,
            700 => Simulator::Intersect,
            800 => Simulator::FrontSim,
            other => Simulator::Other(other),
        }
    }
}

/// 相位位掩码：oil=1, water=2, gas=4
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Phases(pub i32);

impl Phases {
    pub fn oil(self) -> bool {
        self.0 & 1 != 0
    }

    pub fn water(self) -> bool {
        self.0 & 2 != 0
    }

    pub fn gas(self) -> bool {
        self.0 & 4 != 0
    }
}

fn ints<'a>(kw: &KeywordHandle, data: &'a KeywordData) -> Result<&'a [i32]> {
    data.as_ints().ok_or_else(|| EclError::UnexpectedType {
        name: kw.name().to_string(),
        expected: "INTE",
        found: data.type_name(),
    })
}

/// INTEHEAD → 模拟日期。小时/分钟/微秒只在 INTEHEAD 足够长时才有。
pub fn sim_time_from_intehead(ih: &[i32]) -> Option<DateTime<Utc>> {
    let day = *ih.get(INTEHEAD_DAY_INDEX)?;
    let month = *ih.get(INTEHEAD_MONTH_INDEX)?;
    let year = *ih.get(INTEHEAD_YEAR_INDEX)?;
    let (hour, minute, micros) = if ih.len() > INTEHEAD_MICROSECOND_INDEX {
        (
            ih[INTEHEAD_HOUR_INDEX],
            ih[INTEHEAD_MINUTE_INDEX],
            ih[INTEHEAD_MICROSECOND_INDEX],
        )
    } else {
        (0, 0, 0)
    };
    let date = NaiveDate::from_ymd_opt(year, u32::try_from(month).ok()?, u32::try_from(day).ok()?)?;
    // 微秒字段可能超过一分钟，整分钟进位
    let micros = u32::try_from(micros).ok()?;
    let naive = date
        .and_hms_opt(u32::try_from(hour).ok()?, u32::try_from(minute).ok()?, 0)?
        .checked_add_signed(chrono::Duration::microseconds(i64::from(micros)))?;
    Some(Utc.from_utc_datetime(&naive))
}

fn decode_sim_time(kw: &KeywordHandle, data: &KeywordData) -> Result<DateTime<Utc>> {
    sim_time_from_intehead(ints(kw, data)?).ok_or_else(|| EclError::CorruptPayload {
        name: kw.name().to_string(),
        offset: kw.offset(),
    })
}

/// 解码一个 SEQNUM 块的 header（SEQNUM[0]、INTEHEAD 日期、DOUBHEAD[0]）
pub fn decode_restart_header(
    view: &IndexView,
    index: &FileIndex,
    seqnum_index: usize,
    load: &mut Loader<'_>,
) -> Result<RestartHeader> {
    let seq = view
        .get_named(index, SEQNUM, 0)
        .ok_or_else(|| EclError::MissingKeyword(SEQNUM.to_string()))?;
    let seq_data = load(seq)?;
    let report_step = ints(seq, &seq_data)?
        .first()
        .copied()
        .ok_or_else(|| EclError::CorruptPayload {
            name: SEQNUM.to_string(),
            offset: seq.offset(),
        })?;

    let ih = view
        .get_named(index, INTEHEAD, 0)
        .ok_or_else(|| EclError::MissingKeyword(INTEHEAD.to_string()))?;
    let ih_data = load(ih)?;
    let sim_time = decode_sim_time(ih, &ih_data)?;

    let sim_days = match view.get_named(index, DOUBHEAD, 0) {
        Some(dh) => load(dh)?
            .as_doubles()
            .and_then(|d| d.get(DOUBHEAD_DAYS_INDEX).copied())
            .unwrap_or(0.0),
        None => 0.0,
    };

    Ok(RestartHeader {
        seqnum_index,
        report_step,
        sim_time,
        sim_days,
    })
}

/// view 内第 `i` 个 INTEHEAD 的模拟日期；没有这个 occurrence 时返回 `None`
pub fn sim_time_at(
    view: &IndexView,
    index: &FileIndex,
    i: usize,
    load: &mut Loader<'_>,
) -> Result<Option<DateTime<Utc>>> {
    let Some(kw) = view.get_named(index, INTEHEAD, i) else {
        return Ok(None);
    };
    let data = load(kw)?;
    decode_sim_time(kw, &data).map(Some)
}

/// view 内第 `i` 个 DOUBHEAD 的模拟天数
pub fn sim_days_at(
    view: &IndexView,
    index: &FileIndex,
    i: usize,
    load: &mut Loader<'_>,
) -> Result<Option<f64>> {
    let Some(kw) = view.get_named(index, DOUBHEAD, i) else {
        return Ok(None);
    };
    Ok(load(kw)?
        .as_doubles()
        .and_then(|d| d.get(DOUBHEAD_DAYS_INDEX).copied()))
}

/// 日期等于 `t` 的第一个 INTEHEAD 的 occurrence（= restart 索引）
pub fn find_sim_time(
    view: &IndexView,
    index: &FileIndex,
    t: DateTime<Utc>,
    load: &mut Loader<'_>,
) -> Result<Option<usize>> {
    for i in 0..view.num_named(INTEHEAD) {
        if sim_time_at(view, index, i, load)? == Some(t) {
            return Ok(Some(i));
        }
    }
    Ok(None)
}

/// SEQNUM 值等于 `step` 的第一个 SEQNUM 的 occurrence
pub fn find_report_step(
    view: &IndexView,
    index: &FileIndex,
    step: i32,
    load: &mut Loader<'_>,
) -> Result<Option<usize>> {
    let local = view.find_value(index, SEQNUM, &mut *load, |d| {
        d.as_ints().and_then(|v| v.first()) == Some(&step)
    })?;
    Ok(local.and_then(|l| view.occurrence_of_position(index, l)))
}

pub fn simulator(view: &IndexView, index: &FileIndex, load: &mut Loader<'_>) -> Result<Simulator> {
    let v = intehead_value(view, index, INTEHEAD_IPROG_INDEX, load)?;
    Ok(Simulator::from_iprog(v))
}

pub fn phases(view: &IndexView, index: &FileIndex, load: &mut Loader<'_>) -> Result<Phases> {
    intehead_value(view, index, INTEHEAD_PHASE_INDEX, load).map(Phases)
}

fn intehead_value(
    view: &IndexView,
    index: &FileIndex,
    at: usize,
    load: &mut Loader<'_>,
) -> Result<i32> {
    let kw = view
        .get_named(index, INTEHEAD, 0)
        .ok_or_else(|| EclError::MissingKeyword(INTEHEAD.to_string()))?;
    let data = load(kw)?;
    ints(kw, &data)?
        .get(at)
        .copied()
        .ok_or_else(|| EclError::CorruptPayload {
            name: INTEHEAD.to_string(),
            offset: kw.offset(),
        })
}

/// 已构建的 restart view，按 SEQNUM occurrence 存放，按需补建。
///
/// 总是相对全局 view 构建；全局索引被整体替换时必须 `clear`。
#[derive(Debug, Default)]
pub struct RestartCatalog {
    views: Vec<Option<Arc<IndexView>>>,
}

impl RestartCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.views.clear();
    }

    /// 已构建的 view 数
    pub fn built(&self) -> usize {
        self.views.iter().filter(|v| v.is_some()).count()
    }

    fn view_for_seqnum(
        &mut self,
        index: &FileIndex,
        global: &IndexView,
        i: usize,
        load: &mut Loader<'_>,
    ) -> Result<Option<Arc<IndexView>>> {
        let n = global.num_named(SEQNUM);
        if i >= n {
            return Ok(None);
        }
        if self.views.len() < n {
            self.views.resize(n, None);
        }
        if let Some(v) = &self.views[i] {
            return Ok(Some(v.clone()));
        }
        let Some(block) = global.block(index, Some(SEQNUM), Some(SEQNUM), i) else {
            return Ok(None);
        };
        let header = decode_restart_header(&block, index, i, load)?;
        tracing::debug!(
            "Restart view #{}: report_step={} sim_time={} days={}",
            i,
            header.report_step,
            header.sim_time,
            header.sim_days
        );
        let view = Arc::new(block.retag(ViewTag::Restart(header)));
        self.views[i] = Some(view.clone());
        Ok(Some(view))
    }

    /// 按 SEQNUM 顺序返回第一个匹配的块；已构建的 view 直接复用，其余按需补建。
    ///
    /// 按 report step 查找只比较 SEQNUM[0]，前面的块缺 INTEHEAD 也不影响；
    /// 按日期/天数查找时，解不出 header 的块跳过。
    pub fn add_restart_view(
        &mut self,
        index: &FileIndex,
        global: &IndexView,
        query: RestartQuery,
        load: &mut Loader<'_>,
    ) -> Result<Option<Arc<IndexView>>> {
        match query {
            RestartQuery::SeqnumIndex(i) => self.view_for_seqnum(index, global, i, load),
            RestartQuery::ReportStep(step) => match find_report_step(global, index, step, load)? {
                Some(i) => self.view_for_seqnum(index, global, i, load),
                None => Ok(None),
            },
            RestartQuery::SimTime(_) | RestartQuery::SimDays(_) => {
                for i in 0..global.num_named(SEQNUM) {
                    let view = match self.view_for_seqnum(index, global, i, load) {
                        Ok(Some(v)) => v,
                        Ok(None) => continue,
                        Err(
                            e @ (EclError::MissingKeyword(_)
                            | EclError::CorruptPayload { .. }
                            | EclError::UnexpectedType { .. }),
                        ) => {
                            tracing::warn!("Skipping restart block #{}: {}", i, e);
                            continue;
                        }
                        Err(e) => return Err(e),
                    };
                    if let ViewTag::Restart(h) = view.tag() {
                        if query.matches(h) {
                            return Ok(Some(view));
                        }
                    }
                }
                Ok(None)
            }
        }
    }

    pub fn find_sim_time(
        &mut self,
        index: &FileIndex,
        global: &IndexView,
        t: DateTime<Utc>,
        load: &mut Loader<'_>,
    ) -> Result<Option<Arc<IndexView>>> {
        self.add_restart_view(index, global, RestartQuery::SimTime(t), load)
    }

    pub fn find_report_step(
        &mut self,
        index: &FileIndex,
        global: &IndexView,
        step: i32,
        load: &mut Loader<'_>,
    ) -> Result<Option<Arc<IndexView>>> {
        self.add_restart_view(index, global, RestartQuery::ReportStep(step), load)
    }

    pub fn find_sim_days(
        &mut self,
        index: &FileIndex,
        global: &IndexView,
        days: f64,
        load: &mut Loader<'_>,
    ) -> Result<Option<Arc<IndexView>>> {
        self.add_restart_view(index, global, RestartQuery::SimDays(days), load)
    }
}
