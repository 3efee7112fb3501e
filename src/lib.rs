/*!
Hostel leave management.

Students apply for leave; admins add students and accept or reject
applications. Everything a view needs goes through a `store::DataStore`;
who is logged in lives in a `session::SessionStore`, and `route` decides
which views each identity may see.
*/
use time::{Date, OffsetDateTime, UtcOffset};

pub mod auth;
pub mod config;
pub mod error;
pub mod inter;
pub mod leave;
pub mod route;
pub mod session;
pub mod store;
pub mod user;

// Calendar dates travel as `YYYY-MM-DD` in forms, JSON, and templates.
time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

pub const DATE_FMT: &[time::format_description::FormatItem] =
    time::macros::format_description!("[year]-[month]-[day]");

pub fn now() -> OffsetDateTime { OffsetDateTime::now_utc() }

/// `[+-]HH:MM`, as in the `utc_offset` configuration key.
pub const OFFSET_FMT: &[time::format_description::FormatItem] =
    time::macros::format_description!("[offset_hour sign:mandatory]:[offset_minute]");

/// The calendar date `at` falls on for someone `offset` from UTC.
pub fn local_date(at: OffsetDateTime, offset: UtcOffset) -> Date {
    at.to_offset(offset).date()
}

/// Today's date at `offset`.
pub fn today_at(offset: UtcOffset) -> Date { local_date(now(), offset) }

pub fn log_level_from_env() -> simplelog::LevelFilter {
    use simplelog::LevelFilter;

    let mut level_string = match std::env::var("LOG_LEVEL") {
        Err(_) => { return LevelFilter::Warn; },
        Ok(s) => s,
    };

    level_string.make_ascii_lowercase();
    match level_string.as_str() {
        "max" => LevelFilter::max(),
        "trace" => LevelFilter::Trace,
        "debug" => LevelFilter::Debug,
        "info" => LevelFilter::Info,
        "warn" => LevelFilter::Warn,
        "error" => LevelFilter::Error,
        "off" => LevelFilter::Off,
        _ => LevelFilter::Warn,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub fn ensure_logging() {
        use simplelog::{TermLogger, TerminalMode, ColorChoice};
        let log_cfg = simplelog::ConfigBuilder::new()
            .add_filter_allow_str("leavex")
            .build();
        let res = TermLogger::init(
            log_level_from_env(),
            log_cfg,
            TerminalMode::Stdout,
            ColorChoice::Auto
        );

        match res {
            Ok(_) => { log::info!("Test logging started."); },
            Err(_) => { log::info!("Test logging already started."); },
        }
    }

    #[test]
    fn local_date_follows_offset() {
        use time::macros::{date, datetime, offset};

        let late = datetime!(2025-01-09 20:00 UTC);
        assert_eq!(local_date(late, UtcOffset::UTC), date!(2025 - 01 - 09));
        assert_eq!(local_date(late, offset!(+5:30)), date!(2025 - 01 - 10));
        assert_eq!(local_date(datetime!(2025-01-10 02:00 UTC), offset!(-3:00)), date!(2025 - 01 - 09));

        assert_eq!(UtcOffset::parse("+05:30", OFFSET_FMT).unwrap(), offset!(+5:30));
        assert_eq!(UtcOffset::parse("-03:00", OFFSET_FMT).unwrap(), offset!(-3:00));
        assert!(UtcOffset::parse("05:30", OFFSET_FMT).is_err());
    }

    #[test]
    fn date_format_is_iso() {
        let d = time::macros::date!(2025 - 01 - 10);
        assert_eq!(d.format(DATE_FMT).unwrap(), "2025-01-10");
        assert_eq!(Date::parse("2005-03-15", DATE_FMT).unwrap(), time::macros::date!(2005 - 03 - 15));
    }
}
