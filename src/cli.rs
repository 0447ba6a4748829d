use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use nostr::Timestamp;
use std::path::PathBuf;
use std::str::FromStr;

use relay_router::QueryFilter;

#[derive(Parser, Debug, Clone)]
#[command(name = "relay-router")]
#[command(about = "Query and publish Nostr events across several relays")]
pub struct Cli {
    /// Configuration file, created with defaults when missing
    #[arg(long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Use a named preset from the configuration
    #[arg(long)]
    pub preset: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Fetch events from the selected relays and print them as JSON lines
    Query(QueryArgs),

    /// Publish a signed event read from a JSON file ("-" for stdin)
    Publish {
        #[arg(value_name = "FILE")]
        file: String,
    },

    /// Show which relays queries and publishes go to
    Relays,
}

#[derive(Args, Debug, Clone, Default)]
pub struct QueryArgs {
    /// Event kind (repeatable)
    #[arg(long = "kind", value_name = "KIND")]
    pub kinds: Vec<u16>,

    /// Author public key in hex (repeatable)
    #[arg(long = "author", value_name = "HEX")]
    pub authors: Vec<String>,

    /// Event id in hex (repeatable)
    #[arg(long = "id", value_name = "HEX")]
    pub ids: Vec<String>,

    /// Tag constraint as NAME=VALUE, e.g. t=rust (repeatable)
    #[arg(long = "tag", value_name = "NAME=VALUE")]
    pub tags: Vec<String>,

    /// Only events newer than this (e.g., 5min, 4h, 3d, 1w, 2m, 1y)
    #[arg(long, value_name = "DURATION", conflicts_with = "from")]
    pub back: Option<String>,

    /// Only events created on or after this date (yyyy-mm-dd)
    #[arg(long, value_name = "DATE")]
    pub from: Option<String>,

    /// Only events created before this date (yyyy-mm-dd)
    #[arg(long, value_name = "DATE")]
    pub until_date: Option<String>,

    /// Maximum number of events per relay
    #[arg(long)]
    pub limit: Option<usize>,

    /// Timeout for this query (e.g., 5s, 1min), capped by the configured one
    #[arg(long, value_name = "DURATION")]
    pub timeout: Option<String>,

    /// Keep copies of the same event returned by different relays
    #[arg(long)]
    pub no_dedup: bool,
}

impl QueryArgs {
    /// Build the query filter described by the arguments
    pub fn to_filter(&self) -> Result<QueryFilter> {
        let mut filter = QueryFilter::new();

        for kind in &self.kinds {
            filter = filter.kind(*kind);
        }
        for author in &self.authors {
            filter = filter.author(author.clone());
        }
        for id in &self.ids {
            filter = filter.id(id.clone());
        }
        for tag in &self.tags {
            let (name, value) = tag
                .split_once('=')
                .ok_or_else(|| anyhow!("Invalid tag constraint (expected NAME=VALUE): {}", tag))?;
            filter = filter.tag(name, value);
        }

        if let Some(ref back) = self.back {
            filter = filter.since(timestamp_from_duration_ago(back)?);
        }
        if let Some(ref from) = self.from {
            filter = filter.since(timestamp_from_date(from)?);
        }
        if let Some(ref until) = self.until_date {
            filter = filter.until(timestamp_from_date(until)?);
        }
        if let Some(limit) = self.limit {
            filter = filter.limit(limit);
        }

        Ok(filter)
    }

    pub fn timeout(&self) -> Result<Option<std::time::Duration>> {
        self.timeout
            .as_deref()
            .map(|s| {
                let duration = parse_duration(s)?;
                Ok(std::time::Duration::from_secs(duration_to_seconds(&duration)))
            })
            .transpose()
    }
}

/// Parse duration string like "5s", "5min", "4h", "3d", "1w", "2m", "1y"
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim().to_lowercase();

    // Extract number and unit
    let (num_str, unit) = s
        .char_indices()
        .find(|(_, c)| c.is_alphabetic())
        .map(|(i, _)| (&s[..i], &s[i..]))
        .ok_or_else(|| anyhow!("Invalid duration format: {}", s))?;

    let num: i64 = num_str
        .parse()
        .map_err(|_| anyhow!("Invalid number in duration: {}", num_str))?;

    let out_of_range = || anyhow!("Duration out of range: {}", s);

    let duration = match unit {
        "s" | "sec" | "secs" | "second" | "seconds" => Duration::try_seconds(num),
        "min" | "mins" | "minute" | "minutes" => Duration::try_minutes(num),
        "h" | "hr" | "hrs" | "hour" | "hours" => Duration::try_hours(num),
        "d" | "day" | "days" => Duration::try_days(num),
        "w" | "wk" | "week" | "weeks" => Duration::try_weeks(num),
        // Months and years are approximate
        "m" | "mo" | "month" | "months" => num.checked_mul(30).and_then(Duration::try_days),
        "y" | "yr" | "year" | "years" => num.checked_mul(365).and_then(Duration::try_days),
        _ => return Err(anyhow!("Unknown time unit: {}", unit)),
    }
    .ok_or_else(out_of_range)?;

    Ok(duration)
}

/// Parse date string in yyyy-mm-dd format
pub fn parse_date(s: &str) -> Result<DateTime<Utc>> {
    let date = NaiveDate::from_str(s)
        .map_err(|e| anyhow!("Invalid date format (expected yyyy-mm-dd): {}", e))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow!("Invalid date: {}", s))?;
    Ok(DateTime::from_naive_utc_and_offset(midnight, Utc))
}

/// Convert duration to seconds
pub fn duration_to_seconds(duration: &Duration) -> u64 {
    duration.num_seconds().max(0) as u64
}

/// Calculate timestamp from duration ago
pub fn timestamp_from_duration_ago(duration_str: &str) -> Result<Timestamp> {
    let duration = parse_duration(duration_str)?;
    let now = Timestamp::now();
    let seconds_ago = duration_to_seconds(&duration);
    Ok(Timestamp::from(now.as_u64().saturating_sub(seconds_ago)))
}

/// Calculate timestamp from date string
pub fn timestamp_from_date(date_str: &str) -> Result<Timestamp> {
    let dt = parse_date(date_str)?;
    Ok(Timestamp::from(dt.timestamp().max(0) as u64))
}
