use chrono::{Local, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Half-day wagering period, split at local noon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Period {
    AM,
    PM,
}

/// Identifies a wagering window: a calendar date plus AM/PM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct SessionKey {
    pub date: NaiveDate,
    pub period: Period,
}

impl SessionKey {
    pub fn new(date: NaiveDate, period: Period) -> Self {
        SessionKey { date, period }
    }

    /// Window containing the given local wall-clock time.
    pub fn at(local: NaiveDateTime) -> Self {
        let period = if local.hour() < 12 { Period::AM } else { Period::PM };
        SessionKey::new(local.date(), period)
    }

    /// Window for the current local time.
    pub fn now() -> Self {
        Self::at(Local::now().naive_local())
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let period = match self.period {
            Period::AM => "AM",
            Period::PM => "PM",
        };
        write!(f, "{} {}", self.date.format("%d/%m/%Y"), period)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid session key: {0}")]
pub struct ParseSessionKeyError(String);

impl FromStr for SessionKey {
    type Err = ParseSessionKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseSessionKeyError(s.to_string());
        let (date, period) = s.trim().rsplit_once(' ').ok_or_else(err)?;
        let date = NaiveDate::parse_from_str(date, "%d/%m/%Y").map_err(|_| err())?;
        let period = match period {
            "AM" => Period::AM,
            "PM" => Period::PM,
            _ => return Err(err()),
        };
        Ok(SessionKey::new(date, period))
    }
}

impl From<SessionKey> for String {
    fn from(key: SessionKey) -> String {
        key.to_string()
    }
}

impl TryFrom<String> for SessionKey {
    type Error = ParseSessionKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Open/closed flag per session window. Unknown windows are closed.
#[derive(Debug, Default)]
pub struct SessionGate {
    flags: HashMap<SessionKey, bool>,
}

impl SessionGate {
    pub fn is_open(&self, key: &SessionKey) -> bool {
        self.flags.get(key).copied().unwrap_or(false)
    }

    pub fn set_open(&mut self, key: SessionKey, open: bool) {
        self.flags.insert(key, open);
    }

    /// Every window that has been toggled at least once, oldest first.
    pub fn known(&self) -> Vec<(SessionKey, bool)> {
        let mut all: Vec<_> = self.flags.iter().map(|(k, v)| (*k, *v)).collect();
        all.sort_by_key(|(k, _)| *k);
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn noon_splits_periods() {
        assert_eq!(SessionKey::at(dt(11, 59)).period, Period::AM);
        assert_eq!(SessionKey::at(dt(12, 0)).period, Period::PM);
        assert_eq!(SessionKey::at(dt(0, 0)).period, Period::AM);
    }

    #[test]
    fn display_and_parse_agree() {
        let key = SessionKey::at(dt(15, 30));
        assert_eq!(key.to_string(), "09/03/2024 PM");
        assert_eq!("09/03/2024 PM".parse::<SessionKey>().unwrap(), key);
        assert!("09/03/2024 XM".parse::<SessionKey>().is_err());
        assert!("garbage".parse::<SessionKey>().is_err());
    }

    #[test]
    fn unknown_sessions_are_closed() {
        let gate = SessionGate::default();
        assert!(!gate.is_open(&SessionKey::at(dt(9, 0))));
    }

    #[test]
    fn set_open_is_idempotent_and_per_window() {
        let mut gate = SessionGate::default();
        let am = SessionKey::at(dt(9, 0));
        let pm = SessionKey::at(dt(13, 0));
        gate.set_open(am, true);
        gate.set_open(am, true);
        assert!(gate.is_open(&am));
        assert!(!gate.is_open(&pm));
        gate.set_open(am, false);
        assert!(!gate.is_open(&am));
        assert_eq!(gate.known(), vec![(am, false)]);
    }
}
