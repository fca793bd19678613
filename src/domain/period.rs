//! Calendar periods used as aggregation buckets.
//!
//! A [`Period`] is a half-open interval `[start, end)` covering either one
//! calendar month or one calendar quarter. It is identified by its start date,
//! so period assignment is a pure function of the date.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use super::types::Granularity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Period {
    granularity: Granularity,
    start: NaiveDate,
}

impl Period {
    /// The period of the given granularity that contains `date`.
    pub fn containing(date: NaiveDate, granularity: Granularity) -> Self {
        let month = match granularity {
            Granularity::Monthly => date.month(),
            Granularity::Quarterly => (date.month0() / 3) * 3 + 1,
        };
        // Day 1 of a month that `date` proves exists.
        let start = date
            .with_day(1)
            .and_then(|d| d.with_month(month))
            .unwrap_or(date);
        Self { granularity, start }
    }

    /// Build a period from a year and a 1-based month (1..=12) or quarter (1..=4).
    pub fn from_parts(granularity: Granularity, year: i32, index: u32) -> Option<Self> {
        let month = match granularity {
            Granularity::Monthly if (1..=12).contains(&index) => index,
            Granularity::Quarterly if (1..=4).contains(&index) => (index - 1) * 3 + 1,
            _ => return None,
        };
        let start = NaiveDate::from_ymd_opt(year, month, 1)?;
        Some(Self { granularity, start })
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn year(&self) -> i32 {
        self.start.year()
    }

    /// 1-based month (monthly) or quarter (quarterly) number.
    pub fn index(&self) -> u32 {
        match self.granularity {
            Granularity::Monthly => self.start.month(),
            Granularity::Quarterly => self.start.month0() / 3 + 1,
        }
    }

    /// First day of the period (inclusive).
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// First day after the period (exclusive).
    pub fn end(&self) -> NaiveDate {
        self.start
            .checked_add_months(Months::new(self.granularity.months()))
            .unwrap_or(NaiveDate::MAX)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end()
    }

    /// Canonical label: `2021-03` or `2021-Q1`.
    pub fn label(&self) -> String {
        match self.granularity {
            Granularity::Monthly => format!("{:04}-{:02}", self.year(), self.index()),
            Granularity::Quarterly => format!("{:04}-Q{}", self.year(), self.index()),
        }
    }

    /// Label shown in tables: `March 2021` or `2021-Q1`.
    pub fn display_label(&self) -> String {
        match self.granularity {
            Granularity::Monthly => self.start.format("%B %Y").to_string(),
            Granularity::Quarterly => self.label(),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl FromStr for Period {
    type Err = String;

    /// Accepts canonical labels (`2021-03`, `2021-Q1`), the compact quarter
    /// form (`2021Q1`), and month display labels (`March 2021`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || format!("Invalid period '{s}'. Expected YYYY-MM, YYYY-Qn, or 'Month YYYY'.");

        let upper = s.to_ascii_uppercase();
        if let Some((year, quarter)) = upper.split_once('Q') {
            let year = year.trim_end_matches('-');
            let year: i32 = year.parse().map_err(|_| invalid())?;
            let quarter: u32 = quarter.parse().map_err(|_| invalid())?;
            return Period::from_parts(Granularity::Quarterly, year, quarter).ok_or_else(invalid);
        }

        if let Some((year, month)) = s.split_once('-') {
            let year: i32 = year.parse().map_err(|_| invalid())?;
            let month: u32 = month.parse().map_err(|_| invalid())?;
            return Period::from_parts(Granularity::Monthly, year, month).ok_or_else(invalid);
        }

        let date = NaiveDate::parse_from_str(&format!("1 {s}"), "%d %B %Y").map_err(|_| invalid())?;
        Ok(Period::containing(date, Granularity::Monthly))
    }
}

impl From<Period> for String {
    fn from(value: Period) -> Self {
        value.label()
    }
}

impl TryFrom<String> for Period {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn month_truncates_to_first_day() {
        let p = Period::containing(d(2021, 3, 17), Granularity::Monthly);
        assert_eq!(p.start(), d(2021, 3, 1));
        assert_eq!(p.end(), d(2021, 4, 1));
        assert_eq!(p.label(), "2021-03");
        assert_eq!(p.display_label(), "March 2021");
    }

    #[test]
    fn quarter_starts_on_jan_apr_jul_oct() {
        let cases = [
            (d(2021, 2, 28), d(2021, 1, 1), 1),
            (d(2021, 4, 1), d(2021, 4, 1), 2),
            (d(2021, 9, 30), d(2021, 7, 1), 3),
            (d(2021, 12, 31), d(2021, 10, 1), 4),
        ];
        for (date, start, q) in cases {
            let p = Period::containing(date, Granularity::Quarterly);
            assert_eq!(p.start(), start);
            assert_eq!(p.index(), q);
        }
    }

    #[test]
    fn quarter_end_is_exclusive() {
        let q1 = Period::containing(d(2021, 3, 31), Granularity::Quarterly);
        assert_eq!(q1.end(), d(2021, 4, 1));
        assert!(q1.contains(d(2021, 1, 1)));
        assert!(q1.contains(d(2021, 3, 31)));
        assert!(!q1.contains(d(2021, 4, 1)));
    }

    #[test]
    fn march_and_april_land_in_different_quarters() {
        let march = Period::containing(d(2021, 3, 30), Granularity::Quarterly);
        let april = Period::containing(d(2021, 4, 2), Granularity::Quarterly);
        assert_eq!(march.label(), "2021-Q1");
        assert_eq!(april.label(), "2021-Q2");
        assert!(march < april);
    }

    #[test]
    fn labels_parse_back_to_the_same_period() {
        let month = Period::containing(d(2020, 11, 5), Granularity::Monthly);
        let quarter = Period::containing(d(2020, 11, 5), Granularity::Quarterly);

        assert_eq!(month.label().parse::<Period>().unwrap(), month);
        assert_eq!(month.display_label().parse::<Period>().unwrap(), month);
        assert_eq!(quarter.label().parse::<Period>().unwrap(), quarter);
        assert_eq!("2020Q4".parse::<Period>().unwrap(), quarter);
    }

    #[test]
    fn rejects_out_of_range_labels() {
        assert!("2021-13".parse::<Period>().is_err());
        assert!("2021-Q5".parse::<Period>().is_err());
        assert!("Smarch 2021".parse::<Period>().is_err());
    }

    #[test]
    fn serializes_as_canonical_label() {
        let p = Period::from_parts(Granularity::Quarterly, 2021, 1).unwrap();
        assert_eq!(serde_json::to_string(&p).unwrap(), "\"2021-Q1\"");
        let back: Period = serde_json::from_str("\"2021-Q1\"").unwrap();
        assert_eq!(back, p);
    }
}
