/// 拍摄与发送时间计算
///
/// 根据工作日/周末拍摄时间表和每日发送时间，计算严格晚于当前时刻的
/// 下一次拍摄时刻与下一次发送时刻。所有计算均为纯函数，便于测试。

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{AppError, AppResult};

pub mod clock;
pub use clock::{Clock, SystemClock, ZonePolicy};

/// 默认每日发送时间 20:00
pub const DEFAULT_SEND_TIME: TimeOfDay = TimeOfDay { hour: 20, minute: 0 };

/// 一天中的某个时刻（分钟精度）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    /// 创建时刻，小时 0-23，分钟 0-59
    pub fn new(hour: u32, minute: u32) -> AppResult<Self> {
        if hour > 23 {
            return Err(AppError::validation(10, format!("小时必须在 0-23 之间: {}", hour)));
        }
        if minute > 59 {
            return Err(AppError::validation(11, format!("分钟必须在 0-59 之间: {}", minute)));
        }
        Ok(Self {
            hour: hour as u8,
            minute: minute as u8,
        })
    }

    /// 从旧式 HHMM 整数创建（例如 2000 表示 20:00）
    pub fn from_hhmm(value: i64) -> AppResult<Self> {
        if !(0..=2359).contains(&value) || value % 100 >= 60 {
            return Err(AppError::validation(
                12,
                format!("时间 {} 必须是 HHMM 格式 (0000-2359)", value),
            ));
        }
        Self::new((value / 100) as u32, (value % 100) as u32)
    }

    pub fn hour(&self) -> u32 {
        self.hour as u32
    }

    pub fn minute(&self) -> u32 {
        self.minute as u32
    }

    pub fn to_naive_time(self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour(), self.minute(), 0).unwrap_or(NaiveTime::MIN)
    }

    /// 与指定日期组合为具体时刻
    pub fn on(self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(self.to_naive_time())
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// 解析 HH:MM 格式
impl FromStr for TimeOfDay {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hour, minute) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| AppError::validation(13, format!("时间格式必须是 HH:MM: {}", s)))?;

        let hour: u32 = hour
            .parse()
            .map_err(|_| AppError::validation(14, format!("小时必须是有效的数字: {}", s)))?;
        let minute: u32 = minute
            .parse()
            .map_err(|_| AppError::validation(15, format!("分钟必须是有效的数字: {}", s)))?;

        Self::new(hour, minute)
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// 同时接受 "HH:MM" 字符串和 HHMM 整数
impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct TimeOfDayVisitor;

        impl<'de> Visitor<'de> for TimeOfDayVisitor {
            type Value = TimeOfDay;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a time as \"HH:MM\" or an HHMM integer")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<TimeOfDay, E> {
                v.parse().map_err(|e: AppError| E::custom(e))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<TimeOfDay, E> {
                TimeOfDay::from_hhmm(v).map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<TimeOfDay, E> {
                let v = i64::try_from(v).map_err(|_| E::custom("time value out of range"))?;
                self.visit_i64(v)
            }
        }

        deserializer.deserialize_any(TimeOfDayVisitor)
    }
}

/// 周六、周日为周末
pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// 拍摄/发送时间表
///
/// 每次重新配置时整体替换，构造后不可变
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleConfig {
    weekday: Vec<TimeOfDay>,
    weekend: Vec<TimeOfDay>,
    send_time: TimeOfDay,
}

impl ScheduleConfig {
    /// 创建时间表，时间列表会被排序去重；两个列表不能同时为空
    pub fn new(
        mut weekday: Vec<TimeOfDay>,
        mut weekend: Vec<TimeOfDay>,
        send_time: TimeOfDay,
    ) -> AppResult<Self> {
        weekday.sort();
        weekday.dedup();
        weekend.sort();
        weekend.dedup();

        if weekday.is_empty() && weekend.is_empty() {
            return Err(AppError::validation(16, "拍摄时间表不能为空"));
        }

        Ok(Self {
            weekday,
            weekend,
            send_time,
        })
    }

    pub fn weekday_times(&self) -> &[TimeOfDay] {
        &self.weekday
    }

    pub fn weekend_times(&self) -> &[TimeOfDay] {
        &self.weekend
    }

    pub fn send_time(&self) -> TimeOfDay {
        self.send_time
    }

    /// 指定日期适用的拍摄时间列表
    pub fn times_for(&self, date: NaiveDate) -> &[TimeOfDay] {
        if is_weekend(date) {
            &self.weekend
        } else {
            &self.weekday
        }
    }

    /// 指定日期的发送时刻
    pub fn send_instant_on(&self, date: NaiveDate) -> NaiveDateTime {
        self.send_time.on(date)
    }

    /// 严格晚于 `now` 的下一次拍摄时刻
    ///
    /// 从当天开始逐日向后查找，每天按该日期的工作日/周末分类取时间列表。
    /// 构造时保证至少一个列表非空，因此最多向后查找一周。
    pub fn next_capture(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        (0..=7).find_map(|offset| {
            let date = now.date() + Duration::days(offset);
            self.times_for(date)
                .iter()
                .map(|t| t.on(date))
                .filter(|candidate| *candidate > now)
                .min()
        })
    }

    /// 严格晚于 `now` 的下一次发送时刻（每天恰好一次）
    pub fn next_send(&self, now: NaiveDateTime) -> NaiveDateTime {
        let today = self.send_instant_on(now.date());
        if today > now {
            today
        } else {
            self.send_instant_on(now.date() + Duration::days(1))
        }
    }
}

/// 计算下一次拍摄时刻
pub fn next_capture(now: NaiveDateTime, schedule: &ScheduleConfig) -> Option<NaiveDateTime> {
    schedule.next_capture(now)
}

/// 计算下一次发送时刻
pub fn next_send(now: NaiveDateTime, schedule: &ScheduleConfig) -> NaiveDateTime {
    schedule.next_send(now)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> TimeOfDay {
        s.parse().unwrap()
    }

    fn at(date: (i32, u32, u32), hms: (u32, u32, u32)) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(date.0, date.1, date.2)
            .unwrap()
            .and_hms_opt(hms.0, hms.1, hms.2)
            .unwrap()
    }

    // 2026-10-19 是周一，2026-10-23 是周五
    const MONDAY: (i32, u32, u32) = (2026, 10, 19);
    const FRIDAY: (i32, u32, u32) = (2026, 10, 23);
    const SATURDAY: (i32, u32, u32) = (2026, 10, 24);

    fn schedule() -> ScheduleConfig {
        ScheduleConfig::new(
            vec![t("12:00"), t("07:00")],
            vec![t("10:00")],
            t("20:00"),
        )
        .unwrap()
    }

    #[test]
    fn test_parse_time_of_day() {
        assert_eq!(t("07:05").to_string(), "07:05");
        assert_eq!(t("7:05").to_string(), "07:05");
        assert!("24:00".parse::<TimeOfDay>().is_err());
        assert!("12:60".parse::<TimeOfDay>().is_err());
        assert!("12-30".parse::<TimeOfDay>().is_err());
    }

    #[test]
    fn test_legacy_hhmm() {
        assert_eq!(TimeOfDay::from_hhmm(2000).unwrap(), t("20:00"));
        assert_eq!(TimeOfDay::from_hhmm(5).unwrap(), t("00:05"));
        assert!(TimeOfDay::from_hhmm(1260).is_err());
        assert!(TimeOfDay::from_hhmm(2400).is_err());
        assert!(TimeOfDay::from_hhmm(-1).is_err());
    }

    #[test]
    fn test_deserialize_mixed_formats() {
        let times: Vec<TimeOfDay> = serde_json::from_str(r#"["07:00", 1230]"#).unwrap();
        assert_eq!(times, vec![t("07:00"), t("12:30")]);
        assert!(serde_json::from_str::<TimeOfDay>("1299").is_err());
    }

    #[test]
    fn test_empty_schedule_rejected() {
        assert!(ScheduleConfig::new(vec![], vec![], t("20:00")).is_err());
        assert!(ScheduleConfig::new(vec![t("07:00")], vec![], t("20:00")).is_ok());
    }

    #[test]
    fn test_monday_morning_scenario() {
        let s = ScheduleConfig::new(vec![t("07:00"), t("12:00")], vec![], t("20:00")).unwrap();

        assert_eq!(s.next_capture(at(MONDAY, (6, 59, 0))), Some(at(MONDAY, (7, 0, 0))));
        assert_eq!(s.next_capture(at(MONDAY, (7, 0, 1))), Some(at(MONDAY, (12, 0, 0))));
    }

    #[test]
    fn test_capture_exactly_at_slot_moves_forward() {
        let s = schedule();
        assert_eq!(s.next_capture(at(MONDAY, (7, 0, 0))), Some(at(MONDAY, (12, 0, 0))));
    }

    #[test]
    fn test_friday_night_rolls_into_weekend_list() {
        let s = schedule();
        assert_eq!(s.next_capture(at(FRIDAY, (23, 59, 0))), Some(at(SATURDAY, (10, 0, 0))));
    }

    #[test]
    fn test_sunday_night_rolls_into_weekday_list() {
        let s = schedule();
        let sunday_night = at((2026, 10, 25), (22, 0, 0));
        assert_eq!(s.next_capture(sunday_night), Some(at((2026, 10, 26), (7, 0, 0))));
    }

    #[test]
    fn test_empty_weekend_skips_to_monday() {
        let s = ScheduleConfig::new(vec![t("07:00")], vec![], t("20:00")).unwrap();
        let next = s.next_capture(at(FRIDAY, (8, 0, 0))).unwrap();
        assert_eq!(next, at((2026, 10, 26), (7, 0, 0)));
    }

    #[test]
    fn test_capture_draws_from_matching_list() {
        let s = schedule();
        let mut now = at(MONDAY, (0, 0, 0));
        for _ in 0..200 {
            let next = s.next_capture(now).unwrap();
            assert!(next > now);
            let list = if is_weekend(next.date()) { s.weekend_times() } else { s.weekday_times() };
            assert!(list.iter().any(|time| time.to_naive_time() == next.time()));
            now = next;
        }
    }

    #[test]
    fn test_next_send_strictly_after_now() {
        let s = schedule();
        assert_eq!(s.next_send(at(MONDAY, (19, 59, 59))), at(MONDAY, (20, 0, 0)));
        assert_eq!(s.next_send(at(MONDAY, (20, 0, 0))), at((2026, 10, 20), (20, 0, 0)));
        assert_eq!(s.next_send(at(MONDAY, (23, 0, 0))), at((2026, 10, 20), (20, 0, 0)));
    }

    #[test]
    fn test_results_always_after_now() {
        let s = schedule();
        let mut now = at(MONDAY, (0, 0, 0));
        // 覆盖一周内每 17 分钟的时刻
        while now < at((2026, 10, 26), (0, 0, 0)) {
            assert!(s.next_capture(now).unwrap() > now);
            assert!(s.next_send(now) > now);
            now += Duration::minutes(17);
        }
    }

    #[test]
    fn test_free_functions_match_methods() {
        let s = schedule();
        let now = at(MONDAY, (9, 30, 0));
        assert_eq!(next_capture(now, &s), s.next_capture(now));
        assert_eq!(next_send(now, &s), s.next_send(now));
    }
}
