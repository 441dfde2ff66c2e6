use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use itertools::{EitherOrBoth, Itertools};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::{prelude::*, quantity::energy::KilowattHours};

/// Input format of the since-date operations, for example `10.09.2023 12:17`.
pub const SINCE_DATE_FORMAT: &str = "%d.%m.%Y %H:%M";

pub fn parse_since_date(date: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(date, SINCE_DATE_FORMAT).map_err(Error::InvalidDate)
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub enum Resolution {
    QuarterHour,
    Day,
    Month,
}

/// Single value of a per-period series.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct Sample {
    pub start: NaiveDateTime,

    /// `None` when the meter has not transmitted this period yet.
    pub consumption: Option<KilowattHours>,
}

#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct ConsumptionRecord {
    /// Period start, local time.
    pub timestamp: NaiveDateTime,

    pub resolution: Resolution,

    /// Energy consumed within the period.
    pub consumption: KilowattHours,

    /// Offset plus all consumption up to and including this period.
    pub total: KilowattHours,
}

impl ConsumptionRecord {
    /// Zero-consumption record which only carries the offset.
    pub const fn anchor(timestamp: NaiveDateTime, offset: KilowattHours) -> Self {
        Self {
            timestamp,
            resolution: Resolution::QuarterHour,
            consumption: KilowattHours::ZERO,
            total: offset,
        }
    }
}

/// Meter total at a point in time.
#[must_use]
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct MeterReading {
    pub timestamp: NaiveDateTime,
    pub total: KilowattHours,
}

/// Accumulates the running total while series get appended in chronological order.
pub struct RunningTotal {
    total: KilowattHours,
    records: Vec<ConsumptionRecord>,
}

impl RunningTotal {
    pub const fn new(offset: KilowattHours) -> Self {
        Self { total: offset, records: Vec::new() }
    }

    pub fn extend(&mut self, resolution: Resolution, samples: impl IntoIterator<Item = Sample>) {
        for sample in samples {
            let Some(consumption) = sample.consumption else {
                trace!(start = %sample.start, "No data");
                continue;
            };
            self.total += consumption;
            self.records.push(ConsumptionRecord {
                timestamp: sample.start,
                resolution,
                consumption,
                total: self.total,
            });
        }
    }

    pub const fn total(&self) -> KilowattHours {
        self.total
    }

    pub fn into_records(self) -> Vec<ConsumptionRecord> {
        self.records
    }
}

/// Raw `ConsumptionRecord/*` payload.
///
/// Despite the name, `peakDemandTimes` only carries period timestamps in the day series.
#[serde_as]
#[derive(Deserialize)]
pub struct ConsumptionData {
    #[serde_as(as = "serde_with::DefaultOnNull")]
    #[serde(rename = "peakDemandTimes", default)]
    pub peak_demand_times: Vec<Option<NaiveDateTime>>,

    #[serde_as(as = "serde_with::DefaultOnNull")]
    #[serde(rename = "meteredValues", default)]
    pub metered_values: Vec<Option<f64>>,

    /// The year series reports here instead of `meteredValues`.
    #[serde_as(as = "serde_with::DefaultOnNull")]
    #[serde(rename = "values", default)]
    pub values: Vec<Option<f64>>,
}

impl ConsumptionData {
    /// Pair up the quarter-hour timestamps with their values.
    pub fn into_quarter_hours(self, path: &str) -> Result<Vec<Sample>, ApiError> {
        let (n_timestamps, n_values) = (self.peak_demand_times.len(), self.metered_values.len());
        self.peak_demand_times
            .into_iter()
            .zip_longest(self.metered_values)
            .filter_map(|pair| match pair {
                EitherOrBoth::Both(Some(start), value) => {
                    Some(Ok(Sample { start, consumption: value.map(KilowattHours) }))
                }
                EitherOrBoth::Both(None, _) => None,
                EitherOrBoth::Left(_) | EitherOrBoth::Right(_) => {
                    Some(Err(ApiError::LengthMismatch {
                        path: path.to_owned(),
                        n_timestamps,
                        n_values,
                    }))
                }
            })
            .collect()
    }

    /// Daily values, the index being the day of the month.
    pub fn into_days(self, year: i32, month: u32) -> Vec<Sample> {
        Self::index_samples(self.metered_values, |index| {
            NaiveDate::from_ymd_opt(year, month, index + 1)
        })
    }

    /// Monthly values, the index being the month of the year.
    pub fn into_months(self, year: i32) -> Vec<Sample> {
        let values = if self.values.is_empty() { self.metered_values } else { self.values };
        Self::index_samples(values, |index| NaiveDate::from_ymd_opt(year, index + 1, 1))
    }

    fn index_samples(
        values: Vec<Option<f64>>,
        date_of: impl Fn(u32) -> Option<NaiveDate>,
    ) -> Vec<Sample> {
        (0..)
            .zip(values)
            .map_while(|(index, value)| {
                let start = date_of(index)?.and_time(NaiveTime::MIN);
                Some(Sample { start, consumption: value.map(KilowattHours) })
            })
            .collect()
    }
}
