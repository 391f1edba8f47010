//! Column policy and the options that configure it.
//!
//! A [`Policy`] starts from [`Policy::default`] and is updated by the
//! [`Opt`] values passed to each prepare call. Options replace one policy
//! dimension at a time and report whether the change invalidates the
//! cached column catalog.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Default serial (auto-increment) column name.
pub const DEFAULT_SERIAL_COLUMN: &str = "id";

/// Unit of integer timestamps stored in datetime fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DateTimeUnit {
    /// Nanoseconds since the Unix epoch.
    #[default]
    Nanos,
    /// Microseconds since the Unix epoch.
    Micros,
    /// Milliseconds since the Unix epoch.
    Millis,
    /// Seconds since the Unix epoch.
    Seconds,
}

impl DateTimeUnit {
    /// Interpret `ts` as a timestamp in this unit.
    pub fn to_datetime(self, ts: i64) -> Result<DateTime<Utc>> {
        let dt = match self {
            DateTimeUnit::Nanos => Some(DateTime::from_timestamp_nanos(ts)),
            DateTimeUnit::Micros => DateTime::from_timestamp_micros(ts),
            DateTimeUnit::Millis => DateTime::from_timestamp_millis(ts),
            DateTimeUnit::Seconds => DateTime::from_timestamp(ts, 0),
        };
        dt.ok_or_else(|| Error::TimestampOutOfRange {
            value: ts,
            unit: self.to_string(),
        })
    }

    /// Convert `dt` to an integer timestamp in this unit.
    pub fn to_timestamp(self, dt: DateTime<Utc>) -> Result<i64> {
        match self {
            DateTimeUnit::Nanos => dt.timestamp_nanos_opt().ok_or_else(|| {
                Error::TimestampOutOfRange {
                    value: dt.timestamp(),
                    unit: DateTimeUnit::Seconds.to_string(),
                }
            }),
            DateTimeUnit::Micros => Ok(dt.timestamp_micros()),
            DateTimeUnit::Millis => Ok(dt.timestamp_millis()),
            DateTimeUnit::Seconds => Ok(dt.timestamp()),
        }
    }
}

impl FromStr for DateTimeUnit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ns" => Ok(DateTimeUnit::Nanos),
            "us" | "µs" => Ok(DateTimeUnit::Micros),
            "ms" => Ok(DateTimeUnit::Millis),
            "s" => Ok(DateTimeUnit::Seconds),
            _ => Err(Error::InvalidDateTimeUnit {
                token: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for DateTimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            DateTimeUnit::Nanos => "ns",
            DateTimeUnit::Micros => "us",
            DateTimeUnit::Millis => "ms",
            DateTimeUnit::Seconds => "s",
        };
        f.write_str(token)
    }
}

/// Column policy applied while building catalogs and converting values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    /// Auto-increment column, never written on insert/update.
    pub serial_column: String,
    /// Columns whose zero value is written as NULL.
    pub nullable_columns: HashSet<String>,
    /// Integer fields stored as SQL timestamps.
    pub date_time_columns: HashSet<String>,
    /// Unit of the integer timestamps in datetime fields.
    pub date_time_unit: DateTimeUnit,
    /// Datetime columns set to the current time on insert.
    pub auto_create_columns: HashSet<String>,
    /// Datetime columns set to the current time on insert and update.
    pub auto_update_columns: HashSet<String>,
    /// Columns left out of the catalog.
    pub ignore_columns: HashSet<String>,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            serial_column: DEFAULT_SERIAL_COLUMN.to_string(),
            nullable_columns: HashSet::new(),
            date_time_columns: HashSet::new(),
            date_time_unit: DateTimeUnit::default(),
            auto_create_columns: HashSet::new(),
            auto_update_columns: HashSet::new(),
            ignore_columns: HashSet::new(),
        }
    }
}

impl Policy {
    /// Check if `column` is the serial column.
    pub fn is_serial(&self, column: &str) -> bool {
        self.serial_column == column
    }

    /// Check if `column` holds an integer timestamp.
    pub fn is_date_time(&self, column: &str) -> bool {
        self.date_time_columns.contains(column)
    }

    /// Check if `column` writes NULL for zero values.
    pub fn is_nullable(&self, column: &str) -> bool {
        self.nullable_columns.contains(column)
    }
}

/// A single policy override passed to a prepare call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Opt {
    SerialColumn(String),
    NullableColumns(HashSet<String>),
    DateTimeColumns(HashSet<String>),
    DateTimeUnit(DateTimeUnit),
    AutoCreateDateTimeColumns(HashSet<String>),
    AutoUpdateDateTimeColumns(HashSet<String>),
    IgnoreColumns(HashSet<String>),
}

fn column_set<I, S>(columns: I) -> HashSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    columns.into_iter().map(Into::into).collect()
}

impl Opt {
    /// Name of the serial column excluded from write parameters.
    pub fn serial_column(column: impl Into<String>) -> Self {
        Opt::SerialColumn(column.into())
    }

    /// Columns written as NULL instead of their zero value.
    pub fn nullable_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Opt::NullableColumns(column_set(columns))
    }

    /// Integer fields converted to and from SQL timestamps.
    pub fn date_time_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Opt::DateTimeColumns(column_set(columns))
    }

    /// Unit of integer timestamps.
    pub fn date_time_unit(unit: DateTimeUnit) -> Self {
        Opt::DateTimeUnit(unit)
    }

    /// Datetime columns stamped with the current time on insert, ignoring the field value.
    pub fn auto_create_date_time_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Opt::AutoCreateDateTimeColumns(column_set(columns))
    }

    /// Datetime columns stamped with the current time on insert and update.
    pub fn auto_update_date_time_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Opt::AutoUpdateDateTimeColumns(column_set(columns))
    }

    /// Columns left out of the column list.
    pub fn ignore_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Opt::IgnoreColumns(column_set(columns))
    }

    /// Apply this option to `policy`.
    ///
    /// Returns `true` when the change affects which columns the catalog
    /// includes, so the caller must rebuild it.
    pub fn apply(self, policy: &mut Policy) -> bool {
        match self {
            Opt::SerialColumn(column) => replace(&mut policy.serial_column, column),
            Opt::NullableColumns(columns) => {
                policy.nullable_columns = columns;
                false
            }
            Opt::DateTimeColumns(columns) => {
                policy.date_time_columns = columns;
                false
            }
            Opt::DateTimeUnit(unit) => {
                policy.date_time_unit = unit;
                false
            }
            Opt::AutoCreateDateTimeColumns(columns) => {
                replace(&mut policy.auto_create_columns, columns)
            }
            Opt::AutoUpdateDateTimeColumns(columns) => {
                replace(&mut policy.auto_update_columns, columns)
            }
            Opt::IgnoreColumns(columns) => replace(&mut policy.ignore_columns, columns),
        }
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}
