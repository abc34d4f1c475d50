//! Okno ciszy nocnej: start + długość, z obsługą przejścia przez północ.

use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};

use crate::error::ConfigError;

pub const MIN_SLEEP_SECS: i64 = 1;
pub const MAX_SLEEP_SECS: i64 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurfewWindow {
    start: NaiveTime,
    end: NaiveTime,
    duration_hours: i64,
}

impl CurfewWindow {
    /// "HH:MM" albo "HH.MM"; "24:00" znaczy północ.
    pub fn parse_start(raw: &str) -> Result<NaiveTime, ConfigError> {
        let bad = || ConfigError::InvalidTime(raw.to_string());
        let trimmed = raw.trim();
        let (h, m) = trimmed
            .split_once(':')
            .or_else(|| trimmed.split_once('.'))
            .ok_or_else(bad)?;
        let hour: u32 = h.trim().parse().map_err(|_| bad())?;
        let minute: u32 = m.trim().parse().map_err(|_| bad())?;

        match (hour, minute) {
            (24, 0) => Ok(NaiveTime::MIN),
            (h, m) if h < 24 && m < 60 => NaiveTime::from_hms_opt(h, m, 0).ok_or_else(bad),
            _ => Err(bad()),
        }
    }

    pub fn new(start: &str, duration_hours: i64) -> Result<Self, ConfigError> {
        let start = Self::parse_start(start)?;
        Self::from_parts(start, duration_hours)
    }

    pub fn from_parts(start: NaiveTime, duration_hours: i64) -> Result<Self, ConfigError> {
        if !(1..=24).contains(&duration_hours) {
            return Err(ConfigError::DurationOutOfRange(duration_hours));
        }
        let (end, _) = start.overflowing_add_signed(Duration::hours(duration_hours));
        Ok(Self {
            start,
            end,
            duration_hours,
        })
    }

    pub fn start(&self) -> NaiveTime {
        self.start
    }

    pub fn end(&self) -> NaiveTime {
        self.end
    }

    pub fn duration_hours(&self) -> i64 {
        self.duration_hours
    }

    pub fn is_cross_day(&self) -> bool {
        self.start >= self.end
    }

    pub fn is_curfew_time(&self, now: NaiveTime) -> bool {
        if self.is_cross_day() {
            now >= self.start || now < self.end
        } else {
            self.start <= now && now < self.end
        }
    }

    /// Sekundy do najbliższej istotnej granicy okna, przycięte do [1, 3600].
    pub fn next_check_seconds(&self, now: NaiveDateTime) -> u64 {
        let t = now.time();
        let today = now.date();

        let target = if self.is_curfew_time(t) {
            // koniec: dziś, chyba że okno zaczęło się dziś i kończy jutro
            if self.is_cross_day() && t >= self.start {
                (today + Duration::days(1)).and_time(self.end)
            } else {
                today.and_time(self.end)
            }
        } else if t < self.start {
            today.and_time(self.start)
        } else {
            (today + Duration::days(1)).and_time(self.start)
        };

        (target - now)
            .num_seconds()
            .clamp(MIN_SLEEP_SECS, MAX_SLEEP_SECS) as u64
    }

    /// Północ pokazujemy jako "24:00".
    pub fn start_display(&self) -> String {
        if self.start == NaiveTime::MIN {
            "24:00".to_string()
        } else {
            hh_mm(self.start)
        }
    }

    pub fn end_display(&self) -> String {
        hh_mm(self.end)
    }
}

fn hh_mm(t: NaiveTime) -> String {
    format!("{:02}:{:02}", t.hour(), t.minute())
}
