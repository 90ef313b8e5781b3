use crate::shared::errors::{AppError, AppResult};
use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// 先頭の`YYYY-MM-DD`部分を取り出す正規表現
static DATE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d{4})-(\d{2})-(\d{2})").expect("valid date regex"));

/// 暦日を表す値型
///
/// サーバーはUTCタイムスタンプ（例: `2024-03-05T00:00:00.000Z`）で日付を返すため、
/// タイムゾーン変換を行うと前日にずれることがある。
/// 文字列の日付部分だけを使い、以降は常にこの型で比較する。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DateKey(NaiveDate);

impl DateKey {
    /// 年月日から作成
    pub fn from_ymd(year: i32, month: u32, day: u32) -> AppResult<Self> {
        NaiveDate::from_ymd_opt(year, month, day)
            .map(Self)
            .ok_or_else(|| AppError::validation(format!("Invalid date: {year}-{month:02}-{day:02}")))
    }

    /// ISO形式に近い任意の日付文字列から作成
    ///
    /// `2024-03-05`、`2024-03-05T23:30:00Z`、`2024-03-05 08:00` などを受け付ける
    pub fn parse(value: &str) -> AppResult<Self> {
        let captures = DATE_PREFIX
            .captures(value)
            .ok_or_else(|| AppError::validation(format!("Unrecognized date: {value}")))?;

        let year: i32 = captures[1]
            .parse()
            .map_err(|_| AppError::validation(format!("Unrecognized date: {value}")))?;
        let month: u32 = captures[2]
            .parse()
            .map_err(|_| AppError::validation(format!("Unrecognized date: {value}")))?;
        let day: u32 = captures[3]
            .parse()
            .map_err(|_| AppError::validation(format!("Unrecognized date: {value}")))?;

        Self::from_ymd(year, month, day)
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }

    pub fn day(&self) -> u32 {
        self.0.day()
    }

    pub fn as_naive(&self) -> NaiveDate {
        self.0
    }

    /// 曜日の略称（表示用）
    pub fn weekday_short(&self) -> String {
        self.0.format("%a").to_string()
    }
}

impl From<NaiveDate> for DateKey {
    fn from(date: NaiveDate) -> Self {
        Self(date)
    }
}

impl fmt::Display for DateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl std::str::FromStr for DateKey {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for DateKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DateKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateKey::parse(&raw).map_err(|e| serde::de::Error::custom(e.user_message()))
    }
}

/// 対象月の年月を表す
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> AppResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(AppError::validation(format!(
                "Month must be between 1 and 12 (got {month})"
            )));
        }
        if !(1900..=2100).contains(&year) {
            return Err(AppError::validation(format!(
                "Year must be between 1900 and 2100 (got {year})"
            )));
        }
        Ok(Self { year, month })
    }

    /// 月の日数
    pub fn days_in_month(&self) -> u32 {
        let (next_year, next_month) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(next_year, next_month, 1)
            .and_then(|first| first.pred_opt())
            .map(|last| last.day())
            .unwrap_or(28)
    }

    /// 月の全日を順に返す
    pub fn days(&self) -> Vec<DateKey> {
        (1..=self.days_in_month())
            .filter_map(|day| NaiveDate::from_ymd_opt(self.year, self.month, day))
            .map(DateKey)
            .collect()
    }

    /// 日付がこの月に含まれるか
    pub fn contains(&self, date: &DateKey) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.year, self.month)
    }
}
