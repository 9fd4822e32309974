//! 月単位の期間（MM-YYYY）
//!
//! サブスクリプションの開始・終了と集計範囲はすべて暦月で表す。
//! 比較は常に年→月の順で行い、文字列としての比較は行わない
//! （"01-2025" は文字列では "12-2024" より前に並ぶが、暦の上では後）。

use crate::shared::errors::{AppError, AppResult};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

static PERIOD_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(0[1-9]|1[0-2])-([0-9]{4})$").expect("期間フォーマットの正規表現が不正です")
});

/// 暦月（年と月の組）
///
/// フィールドの並び順（年→月）で`Ord`を導出しているため、
/// 比較結果は暦の前後関係と一致する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period {
    year: u16,
    month: u8,
}

impl Period {
    /// 月と年から期間を作成する
    ///
    /// # 引数
    /// * `month` - 月（1〜12）
    /// * `year` - 年（0〜9999）
    ///
    /// # 戻り値
    /// 期間、または範囲外の場合はバリデーションエラー
    pub fn new(month: u32, year: u32) -> AppResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(AppError::validation(format!(
                "月は1から12の間で指定してください: {month}"
            )));
        }
        if year > 9999 {
            return Err(AppError::validation(format!(
                "年は4桁で指定してください: {year}"
            )));
        }

        Ok(Self {
            year: year as u16,
            month: month as u8,
        })
    }

    /// MM-YYYY形式の文字列を解析する
    ///
    /// # 引数
    /// * `text` - 期間文字列（例: "01-2024"）
    ///
    /// # 戻り値
    /// 期間、または形式が不正な場合はバリデーションエラー
    pub fn parse(text: &str) -> AppResult<Self> {
        let captures = PERIOD_PATTERN.captures(text).ok_or_else(|| {
            AppError::validation(format!(
                "期間はMM-YYYY形式で入力してください: {text}"
            ))
        })?;

        // 正規表現で桁数と範囲は保証済み
        let month: u32 = captures[1]
            .parse()
            .map_err(|_| AppError::validation(format!("月が不正です: {text}")))?;
        let year: u32 = captures[2]
            .parse()
            .map_err(|_| AppError::validation(format!("年が不正です: {text}")))?;

        Self::new(month, year)
    }

    pub fn year(&self) -> u32 {
        u32::from(self.year)
    }

    pub fn month(&self) -> u32 {
        u32::from(self.month)
    }

    /// 二つの期間を暦の順序で比較する
    pub fn compare(a: &Period, b: &Period) -> Ordering {
        a.cmp(b)
    }

    /// 0年1月からの通し月番号
    ///
    /// 暦の順序と大小関係が一致するため、データベース上の範囲検索に使う。
    pub fn ordinal(&self) -> i64 {
        i64::from(self.year) * 12 + i64::from(self.month) - 1
    }

    /// `a`から`b`までの月数を両端を含めて数える
    ///
    /// `(b.year - a.year) * 12 + (b.month - a.month) + 1`
    ///
    /// # 戻り値
    /// 月数、`a`が`b`より後の場合はNone
    pub fn months_between(a: &Period, b: &Period) -> Option<u32> {
        if a > b {
            return None;
        }
        u32::try_from(b.ordinal() - a.ordinal() + 1).ok()
    }

    /// 候補の有効期間が問い合わせ範囲と重なるかどうか
    ///
    /// 候補開始 <= 問い合わせ終了 かつ（候補終了なし または 候補終了 >= 問い合わせ開始）
    pub fn overlaps(
        candidate_start: &Period,
        candidate_end: Option<&Period>,
        query_start: &Period,
        query_end: &Period,
    ) -> bool {
        candidate_start <= query_end && candidate_end.map_or(true, |end| end >= query_start)
    }

    /// 候補の有効期間と問い合わせ範囲の共通部分に含まれる月数
    ///
    /// 終了のない候補は無期限とみなす。重ならない場合は0。
    pub fn months_overlapping(
        candidate_start: &Period,
        candidate_end: Option<&Period>,
        query_start: &Period,
        query_end: &Period,
    ) -> u32 {
        if !Self::overlaps(candidate_start, candidate_end, query_start, query_end) {
            return 0;
        }

        let from = candidate_start.max(query_start);
        let to = match candidate_end {
            Some(end) => end.min(query_end),
            None => query_end,
        };

        Self::months_between(from, to).unwrap_or(0)
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}-{:04}", self.month, self.year)
    }
}

impl FromStr for Period {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Period {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Period::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// データベースにはMM-YYYY形式の文字列として保存する
impl ToSql for Period {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for Period {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        Period::parse(text).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}
