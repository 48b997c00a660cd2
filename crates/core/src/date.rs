//! 日付のパースと固定 UTC オフセット上での日数計算。
//!
//! 現在時刻は常に引数で受け取る。時刻源は [`crate::Clock`] に任せる。

use std::{fmt, str::FromStr, sync::LazyLock};

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Offset, Utc};
use regex::Regex;
use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid ISO date pattern"));
static DOTTED_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}\.\d{2}\.\d{4}$").expect("valid dotted date pattern"));
static OFFSET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([+-])(\d{2}):(\d{2})$").expect("valid offset pattern"));

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DateError {
    #[error("Invalid date: {0:?}")]
    InvalidDate(String),
    #[error("Invalid UTC offset: {0:?}")]
    InvalidOffset(String),
}

/// `±HH:MM` 形式の固定 UTC オフセット。夏時間は扱わない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, SerializeDisplay, DeserializeFromStr)]
pub struct TzOffset(FixedOffset);

impl TzOffset {
    /// UTC (`+00:00`)。
    pub fn utc() -> Self {
        Self(Utc.fix())
    }

    pub fn fixed(&self) -> FixedOffset {
        self.0
    }
}

impl Default for TzOffset {
    fn default() -> Self {
        Self::utc()
    }
}

impl fmt::Display for TzOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let seconds = self.0.local_minus_utc();
        let sign = if seconds < 0 { '-' } else { '+' };
        let minutes = seconds.unsigned_abs() / 60;
        write!(f, "{sign}{:02}:{:02}", minutes / 60, minutes % 60)
    }
}

impl FromStr for TzOffset {
    type Err = DateError;

    /// 符号・2 桁の時・2 桁の分が揃った `±HH:MM` のみ受け付ける。
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let invalid = || DateError::InvalidOffset(input.to_string());

        let caps = OFFSET.captures(input).ok_or_else(invalid)?;
        let hours: i32 = caps[2].parse().map_err(|_| invalid())?;
        let minutes: i32 = caps[3].parse().map_err(|_| invalid())?;
        if hours > 23 || minutes > 59 {
            return Err(invalid());
        }

        let sign = if &caps[1] == "-" { -1 } else { 1 };
        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
            .map(Self)
            .ok_or_else(invalid)
    }
}

/// `YYYY-MM-DD` または `DD.MM.YYYY` 形式の日付をパースする。
///
/// 前後の空白は無視する。この順で試し、それ以外の形式は受け付けない。
pub fn parse_date(input: &str) -> Result<NaiveDate, DateError> {
    let input = input.trim();
    let formats = [(&*ISO_DATE, "%Y-%m-%d"), (&*DOTTED_DATE, "%d.%m.%Y")];

    formats
        .iter()
        .filter(|(shape, _)| shape.is_match(input))
        .find_map(|(_, format)| NaiveDate::parse_from_str(input, format).ok())
        .ok_or_else(|| DateError::InvalidDate(input.to_string()))
}

/// 返信用に `DD.MM.YYYY` 形式で表示する。
pub fn format_date(date: NaiveDate) -> String {
    date.format("%d.%m.%Y").to_string()
}

/// オフセット上の現在時刻。
pub fn local_now(offset: TzOffset, now: DateTime<Utc>) -> DateTime<FixedOffset> {
    now.with_timezone(&offset.fixed())
}

/// オフセット上の今日の日付。
pub fn today(offset: TzOffset, now: DateTime<Utc>) -> NaiveDate {
    local_now(offset, now).date_naive()
}

pub fn today_iso(offset: TzOffset, now: DateTime<Utc>) -> String {
    today(offset, now).to_string()
}

/// 目標日までの残り日数。今日なら 0、過ぎていれば負になる。
pub fn days_left(target: NaiveDate, offset: TzOffset, now: DateTime<Utc>) -> i64 {
    (target - today(offset, now)).num_days()
}

/// 年内通算日 (1 始まり) をフレーズ数で割った余りで、その日のフレーズを選ぶ。
pub fn daily_phrase(phrases: &[String], offset: TzOffset, now: DateTime<Utc>) -> Option<&str> {
    if phrases.is_empty() {
        return None;
    }
    let ordinal = local_now(offset, now).ordinal() as usize;
    phrases.get(ordinal % phrases.len()).map(String::as_str)
}
