use std::{
    collections::HashMap,
    io::{self, BufRead, Write},
    str::FromStr,
};

use logos::Logos;
use miette::Diagnostic;
use thiserror::Error;
use time::{macros::format_description, OffsetDateTime, UtcOffset};

const FIELD_COUNT: usize = 9;

#[derive(Logos, Debug, PartialEq)]
#[logos(skip r"\t")] // Consecutive tabs count as a single separator
enum Token {
    #[regex(r"[^\t]+")]
    Field,
}

/// One decoded observation line. Lives only long enough to be folded into a
/// [`RegionStats`].
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub region: String,
    // Unix timestamp in seconds, the raw field is in milliseconds
    pub timestamp: i64,
    pub humidity: f64,
    pub snow: f64,
    pub cloud_cover: f64,
    pub lightning_strikes: u64,
    pub pressure: f64,
    // Kelvin
    pub surface_temperature: f64,
}

#[derive(Debug, Error, Diagnostic)]
pub enum ParseError {
    #[error("incorrect number of fields in line (expected 9, found {found}): {line}")]
    FieldCount { found: usize, line: String },
}

// Malformed numbers count as zero instead of failing the whole line
fn float_or_zero(token: &str) -> f64 {
    token.parse().unwrap_or(0.0)
}

fn int_or_zero(token: &str) -> i64 {
    token.parse().unwrap_or(0)
}

impl FromStr for Observation {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut lexer = Token::lexer(line);
        let mut fields = Vec::with_capacity(FIELD_COUNT);
        while lexer.next().is_some() {
            fields.push(lexer.slice());
        }

        if fields.len() != FIELD_COUNT {
            return Err(ParseError::FieldCount {
                found: fields.len(),
                line: line.to_string(),
            });
        }

        // region, timestamp, <ignored>, humidity, snow, cloud cover,
        // lightning strikes, pressure, surface temperature
        Ok(Self {
            region: fields[0].to_string(),
            timestamp: int_or_zero(fields[1]) / 1000,
            humidity: float_or_zero(fields[3]),
            snow: float_or_zero(fields[4]),
            cloud_cover: float_or_zero(fields[5]),
            lightning_strikes: int_or_zero(fields[6]).max(0) as u64,
            pressure: float_or_zero(fields[7]),
            surface_temperature: float_or_zero(fields[8]),
        })
    }
}

impl Observation {
    pub fn snow_present(&self) -> bool {
        self.snow > 0.0
    }
}

/// Running statistics for one region. Sums stay in the input units
/// (temperatures in Kelvin), conversion happens at display time.
#[derive(Debug, Clone)]
pub struct RegionStats {
    pub code: String,
    pub records: u64,
    pub temperature_sum: f64,
    pub humidity_sum: f64,
    pub cloud_cover_sum: f64,
    pub pressure_sum: f64,
    pub snow_records: u64,
    pub lightning_strikes: u64,
    pub max_temperature: f64,
    pub max_temperature_at: i64,
    pub min_temperature: f64,
    pub min_temperature_at: i64,
}

impl RegionStats {
    fn seed(observation: &Observation) -> Self {
        Self {
            code: observation.region.clone(),
            records: 1,
            temperature_sum: observation.surface_temperature,
            humidity_sum: observation.humidity,
            cloud_cover_sum: observation.cloud_cover,
            pressure_sum: observation.pressure,
            snow_records: observation.snow_present() as u64,
            // The total starts out as a presence flag, every later record
            // adds its full count
            lightning_strikes: (observation.lightning_strikes > 0) as u64,
            max_temperature: observation.surface_temperature,
            max_temperature_at: observation.timestamp,
            min_temperature: observation.surface_temperature,
            min_temperature_at: observation.timestamp,
        }
    }

    fn fold(&mut self, observation: &Observation) {
        self.records += 1;
        self.temperature_sum += observation.surface_temperature;
        self.humidity_sum += observation.humidity;
        self.cloud_cover_sum += observation.cloud_cover;
        self.pressure_sum += observation.pressure;
        if observation.snow_present() {
            self.snow_records += 1;
        }
        self.lightning_strikes += observation.lightning_strikes;

        // Strict comparisons, a tie keeps the first-seen timestamp
        if observation.surface_temperature > self.max_temperature {
            self.max_temperature = observation.surface_temperature;
            self.max_temperature_at = observation.timestamp;
        }
        if observation.surface_temperature < self.min_temperature {
            self.min_temperature = observation.surface_temperature;
            self.min_temperature_at = observation.timestamp;
        }
    }

    pub fn average_temperature(&self) -> f64 {
        self.temperature_sum / self.records as f64
    }

    pub fn average_humidity(&self) -> f64 {
        self.humidity_sum / self.records as f64
    }

    pub fn average_cloud_cover(&self) -> f64 {
        self.cloud_cover_sum / self.records as f64
    }
}

#[derive(Debug, Error, Diagnostic)]
#[error("no room left for region {code}: limit of {limit} regions reached")]
pub struct RegionLimitError {
    pub code: String,
    pub limit: usize,
}

/// The aggregation context shared across every input file. Regions are kept
/// in the order they were first seen.
#[derive(Debug, Default)]
pub struct Summary {
    index: HashMap<String, usize>,
    regions: Vec<RegionStats>,
    region_limit: Option<usize>,
}

impl Summary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the number of distinct regions. Records for regions beyond the
    /// cap are rejected, existing regions keep accepting records.
    pub fn with_region_limit(limit: usize) -> Self {
        Self {
            region_limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn record(&mut self, observation: &Observation) -> Result<(), RegionLimitError> {
        match self.index.get(observation.region.as_str()) {
            Some(&slot) => self.regions[slot].fold(observation),
            None => {
                if let Some(limit) = self.region_limit {
                    if self.regions.len() >= limit {
                        return Err(RegionLimitError {
                            code: observation.region.clone(),
                            limit,
                        });
                    }
                }
                self.index
                    .insert(observation.region.clone(), self.regions.len());
                self.regions.push(RegionStats::seed(observation));
            }
        }
        Ok(())
    }

    /// Regions in first-seen order.
    pub fn regions(&self) -> &[RegionStats] {
        &self.regions
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

/// Folds every line of `reader` into `summary`. Lines with the wrong field
/// count and records rejected by the region limit are reported and skipped,
/// they never abort the scan.
pub fn analyze(reader: impl BufRead, summary: &mut Summary) -> io::Result<()> {
    for line in reader.lines() {
        let line = line?;
        let observation = match line.parse::<Observation>() {
            Ok(observation) => observation,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };
        if let Err(e) = summary.record(&observation) {
            eprintln!("{e}");
        }
    }
    Ok(())
}

pub fn kelvin_to_fahrenheit(kelvin: f64) -> f64 {
    (kelvin - 273.15) * 9.0 / 5.0 + 32.0
}

/// Renders a Unix timestamp as local calendar time, `Tue Nov 14 22:13:20
/// 2023`. Falls back to UTC when the local offset cannot be determined.
pub fn format_timestamp(unix_seconds: i64) -> String {
    let format = format_description!(
        "[weekday repr:short] [month repr:short] [day padding:space] [hour]:[minute]:[second] [year]"
    );
    let timestamp =
        OffsetDateTime::from_unix_timestamp(unix_seconds).unwrap_or(OffsetDateTime::UNIX_EPOCH);
    let local = match UtcOffset::current_local_offset() {
        Ok(offset) => timestamp.to_offset(offset),
        Err(_) => timestamp,
    };
    local
        .format(&format)
        .unwrap_or_else(|_| local.to_string())
}

/// Prints the region codes first, then one detail block per region, both in
/// first-seen order.
pub fn write_report(summary: &Summary, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "Regions found:")?;
    for region in summary.regions() {
        write!(out, "{} ", region.code)?;
    }
    writeln!(out)?;

    for region in summary.regions() {
        writeln!(out, "-- Region: {} --", region.code)?;
        writeln!(out, "Number of Records: {}", region.records)?;
        writeln!(out, "Average Humidity: {:.1}%", region.average_humidity())?;
        writeln!(
            out,
            "Average Temperature: {:.1}F",
            kelvin_to_fahrenheit(region.average_temperature())
        )?;
        writeln!(
            out,
            "Max Temperature: {:.1}F",
            kelvin_to_fahrenheit(region.max_temperature)
        )?;
        writeln!(
            out,
            "Max Temperature on: {}",
            format_timestamp(region.max_temperature_at)
        )?;
        writeln!(
            out,
            "Min Temperature: {:.1}F",
            kelvin_to_fahrenheit(region.min_temperature)
        )?;
        writeln!(
            out,
            "Min Temperature on: {}",
            format_timestamp(region.min_temperature_at)
        )?;
        writeln!(out, "Lightning Strikes: {}", region.lightning_strikes)?;
        writeln!(out, "Records with Snow Cover: {}", region.snow_records)?;
        writeln!(
            out,
            "Average Cloud Cover: {:.1}%",
            region.average_cloud_cover()
        )?;
    }
    Ok(())
}
