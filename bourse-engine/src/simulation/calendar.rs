use chrono::{Datelike, Days, NaiveDate, Weekday};

/// Named trading calendar deciding which dates are sessions.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TradingCalendar {
    /// New York Stock Exchange: weekdays minus US market holidays.
    Xnys,
    /// Every calendar day is a session.
    AlwaysOpen,
}

impl TradingCalendar {
    /// Resolve a calendar by its configured name.
    pub fn resolve(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "XNYS" | "NYSE" => Some(Self::Xnys),
            "24/7" | "ALWAYS_OPEN" => Some(Self::AlwaysOpen),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Xnys => "XNYS",
            Self::AlwaysOpen => "24/7",
        }
    }

    pub fn is_session(&self, date: NaiveDate) -> bool {
        match self {
            Self::AlwaysOpen => true,
            Self::Xnys => {
                !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
                    && !us_market_holidays(date.year()).contains(&date)
            }
        }
    }

    /// All sessions in `[start, end]`, ascending.
    pub fn sessions(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        let mut sessions = Vec::new();
        let mut date = start;
        while date <= end {
            if self.is_session(date) {
                sessions.push(date);
            }
            match date.checked_add_days(Days::new(1)) {
                Some(next) => date = next,
                None => break,
            }
        }
        sessions
    }
}

/// US equity market holidays for `year`, observed dates.
fn us_market_holidays(year: i32) -> Vec<NaiveDate> {
    let mut holidays = vec![
        observed(NaiveDate::from_ymd_opt(year, 1, 1).unwrap()),
        nth_weekday(year, 1, Weekday::Mon, 3),
        nth_weekday(year, 2, Weekday::Mon, 3),
        good_friday(year),
        last_weekday(year, 5, Weekday::Mon),
        observed(NaiveDate::from_ymd_opt(year, 7, 4).unwrap()),
        nth_weekday(year, 9, Weekday::Mon, 1),
        nth_weekday(year, 11, Weekday::Thu, 4),
        observed(NaiveDate::from_ymd_opt(year, 12, 25).unwrap()),
    ];
    if year >= 2022 {
        holidays.push(observed(NaiveDate::from_ymd_opt(year, 6, 19).unwrap()));
    }
    holidays
}

/// Saturday holidays observe the preceding Friday, Sunday the following
/// Monday.
fn observed(date: NaiveDate) -> NaiveDate {
    match date.weekday() {
        Weekday::Sat => date.pred_opt().unwrap(),
        Weekday::Sun => date.succ_opt().unwrap(),
        _ => date,
    }
}

fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u8) -> NaiveDate {
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, n).unwrap()
}

fn last_weekday(year: i32, month: u32, weekday: Weekday) -> NaiveDate {
    (4..=5)
        .rev()
        .filter_map(|n| NaiveDate::from_weekday_of_month_opt(year, month, weekday, n))
        .next()
        .unwrap()
}

/// Good Friday via the anonymous Gregorian Easter computus.
fn good_friday(year: i32) -> NaiveDate {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;

    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
        .unwrap()
        .checked_sub_days(Days::new(2))
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn test_resolve_known_names() {
        assert_eq!(TradingCalendar::resolve("nyse"), Some(TradingCalendar::Xnys));
        assert_eq!(TradingCalendar::resolve("XNYS"), Some(TradingCalendar::Xnys));
        assert_eq!(
            TradingCalendar::resolve("24/7"),
            Some(TradingCalendar::AlwaysOpen)
        );
        assert_eq!(TradingCalendar::resolve("LUNAR"), None);
    }

    #[test]
    fn test_january_2020_has_eighteen_sessions() {
        let sessions = TradingCalendar::Xnys.sessions(date(2020, 1, 7), date(2020, 2, 1));
        assert_eq!(sessions.len(), 18);
        // Martin Luther King Jr. Day.
        assert!(!sessions.contains(&date(2020, 1, 20)));
        // 2020-02-01 is a Saturday.
        assert_eq!(*sessions.last().unwrap(), date(2020, 1, 31));
    }

    #[test]
    fn test_weekend_holidays_are_observed() {
        // 2020-07-04 fell on a Saturday; the preceding Friday closes.
        assert!(!TradingCalendar::Xnys.is_session(date(2020, 7, 3)));
        // 2021-12-25 fell on a Saturday; Friday the 24th closes.
        assert!(!TradingCalendar::Xnys.is_session(date(2021, 12, 24)));
    }

    #[test]
    fn test_good_friday_2020() {
        assert!(!TradingCalendar::Xnys.is_session(date(2020, 4, 10)));
        assert!(TradingCalendar::Xnys.is_session(date(2020, 4, 9)));
    }

    #[test]
    fn test_always_open_includes_weekends() {
        let sessions = TradingCalendar::AlwaysOpen.sessions(date(2020, 1, 4), date(2020, 1, 6));
        assert_eq!(sessions.len(), 3);
    }
}
