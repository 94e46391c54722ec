/// 时钟与时区策略
///
/// 所有拍摄/发送时间都按同一个配置时区的本地墙钟时间解释

use chrono::{FixedOffset, Local, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// 当前时间来源
pub trait Clock: Send + Sync {
    /// 配置时区下的当前墙钟时间
    fn now(&self) -> NaiveDateTime;
}

/// 时区策略：系统本地时区或固定 UTC 偏移
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ZonePolicy {
    #[default]
    Local,
    Fixed(FixedOffset),
}

impl FromStr for ZonePolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("local") {
            return Ok(Self::Local);
        }
        if s.eq_ignore_ascii_case("utc") || s == "Z" {
            return FixedOffset::east_opt(0)
                .map(Self::Fixed)
                .ok_or_else(|| AppError::config(20, "无效的时区偏移"));
        }

        let invalid = || AppError::config(21, format!("时区必须是 local、utc 或 ±HH:MM: {}", s));

        let (sign, rest) = match s.chars().next() {
            Some('+') => (1, &s[1..]),
            Some('-') => (-1, &s[1..]),
            _ => return Err(invalid()),
        };
        let (hours, minutes) = rest.split_once(':').ok_or_else(invalid)?;
        let hours: i32 = hours.parse().map_err(|_| invalid())?;
        let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
        if hours > 14 || minutes > 59 {
            return Err(invalid());
        }

        FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
            .map(Self::Fixed)
            .ok_or_else(invalid)
    }
}

impl TryFrom<String> for ZonePolicy {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ZonePolicy> for String {
    fn from(value: ZonePolicy) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ZonePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Fixed(offset) => write!(f, "{}", offset),
        }
    }
}

/// 系统时钟
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock {
    zone: ZonePolicy,
}

impl SystemClock {
    pub fn new(zone: ZonePolicy) -> Self {
        Self { zone }
    }

    pub fn zone(&self) -> ZonePolicy {
        self.zone
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        match self.zone {
            ZonePolicy::Local => Local::now().naive_local(),
            ZonePolicy::Fixed(offset) => Utc::now().with_timezone(&offset).naive_local(),
        }
    }
}
