use anyhow::Context;
use clap::{Parser, Subcommand};
use std::{fmt::Display, path::PathBuf, sync::Arc};
use weather_report_core::{
    Config, ObservationStore, PrecipitationHandler, ReportAggregator, ReportBuilder, ReportHandler,
    ReportStore, SqliteReportStore, StoredReport, WeatherReport,
    handler::{validate_days, validate_zip},
};

use crate::server;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-report", version, about = "Weather report service")]
pub struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve `GET /weather-report/{zip}?days={n}`.
    ServeReport {
        /// Address to bind, e.g. "0.0.0.0:8080". Defaults to `listen` from the config.
        #[arg(long)]
        listen: Option<String>,
    },

    /// Serve the precipitation observation endpoints.
    ServePrecipitation {
        #[arg(long)]
        listen: Option<String>,
    },

    /// Build a report for a zip code, store it, and print it.
    Report {
        zip: String,

        /// Size of the trailing window, 1 to 30 days.
        #[arg(long)]
        days: i64,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List stored reports for a zip code, newest first.
    History {
        zip: String,

        #[arg(long)]
        json: bool,
    },

    /// Show where the config lives and what it resolves to.
    Config,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let config_path = match &self.config {
            Some(path) => path.clone(),
            None => Config::config_file_path()?,
        };
        let config = Config::load_from(&config_path)?;

        match self.command {
            Command::ServeReport { listen } => {
                let store = open_report_store(&config)?;
                let aggregator = ReportAggregator::from_config(&config, store)?;
                let handler = ReportHandler::new(Arc::new(aggregator));

                let listen = listen.unwrap_or_else(|| config.listen.clone());
                server::serve(server::report_router(handler), &listen).await?;
            }
            Command::ServePrecipitation { listen } => {
                let store = ObservationStore::open(&config.connection_string).with_context(|| {
                    format!("Failed to open observation store '{}'", config.connection_string)
                })?;
                let handler = PrecipitationHandler::new(Arc::new(store));

                let listen = listen.unwrap_or_else(|| config.listen.clone());
                server::serve(server::precipitation_router(handler), &listen).await?;
            }
            Command::Report { zip, days, json } => {
                let zip = validate_zip(&zip)?.to_string();
                let days = validate_days(Some(days))?;
                let store = open_report_store(&config)?;
                let aggregator = ReportAggregator::from_config(&config, store)?;

                let report = aggregator
                    .build_weekly_report(&zip, days)
                    .await
                    .with_context(|| format!("Failed to build report for {zip}"))?;

                if json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    print!("{}", render_report(&report, Some(days)));
                }
            }
            Command::History { zip, json } => {
                let store = open_report_store(&config)?;
                let reports = store.reports_for_zip(&zip).await?;

                if json {
                    println!("{}", serde_json::to_string_pretty(&reports)?);
                } else if reports.is_empty() {
                    println!("No reports stored for {zip}.");
                } else {
                    for StoredReport { id, report } in &reports {
                        println!("#{id}");
                        print!("{}", render_report(report, None));
                    }
                }
            }
            Command::Config => {
                println!("Config file: {}", config_path.display());
                if !config_path.exists() {
                    println!("(file not found, using defaults)");
                }
                println!();
                print!("{}", toml::to_string_pretty(&config)?);
            }
        }

        Ok(())
    }
}

fn open_report_store(config: &Config) -> anyhow::Result<Arc<dyn ReportStore>> {
    let store = SqliteReportStore::open(&config.connection_string)
        .with_context(|| format!("Failed to open report store '{}'", config.connection_string))?;
    Ok(Arc::new(store))
}

fn render_report(report: &WeatherReport, days: Option<u32>) -> String {
    let window = days.map(|d| format!(" (last {d} days)")).unwrap_or_default();

    format!(
        "Weather report for {zip}{window}\n\
         \x20 Created:       {created}\n\
         \x20 Average high:  {high}\n\
         \x20 Average low:   {low}\n\
         \x20 Rain total:    {rain:.1} in\n\
         \x20 Snow total:    {snow:.1} in\n",
        zip = report.zip_code,
        created = report.created_on.format("%Y-%m-%d %H:%M:%S UTC"),
        high = fahrenheit(report.average_high_f.as_ref()),
        low = fahrenheit(report.average_low_f.as_ref()),
        rain = report.rain_fall_total_inches,
        snow = report.snow_total_inches,
    )
}

fn fahrenheit<T: Display>(value: Option<T>) -> String {
    match value {
        Some(v) => format!("{v:.1} °F"),
        None => "n/a".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample(high: Option<&str>) -> WeatherReport {
        let json = serde_json::json!({
            "zipCode": "12345",
            "createdOn": "2024-05-01T08:00:00Z",
            "averageHighF": high.map(|h| h.parse::<f64>().unwrap()),
            "averageLowF": null,
            "rainFallTotalInches": 1.5,
            "snowTotalInches": 0,
        });
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn renders_report_summary() {
        let out = render_report(&sample(Some("75")), Some(7));

        assert!(out.starts_with("Weather report for 12345 (last 7 days)\n"));
        assert!(out.contains("Average high:  75.0 °F"));
        assert!(out.contains("Average low:   n/a"));
        assert!(out.contains("Rain total:    1.5 in"));
        assert!(out.contains("Snow total:    0.0 in"));
        assert!(out.contains("2024-05-01 08:00:00 UTC"));
    }

    #[test]
    fn history_rendering_omits_window() {
        let report = sample(None);
        assert_eq!(report.created_on, Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap());

        let out = render_report(&report, None);
        assert!(out.starts_with("Weather report for 12345\n"));
    }

    #[test]
    fn parses_report_subcommand() {
        let cli = Cli::try_parse_from(["weather-report", "report", "12345", "--days", "7", "--json"]).unwrap();
        assert!(matches!(cli.command, Command::Report { ref zip, days: 7, json: true } if zip == "12345"));

        let cli = Cli::try_parse_from(["weather-report", "--config", "/tmp/w.toml", "config"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/w.toml")));
    }

    fn run_with_missing_config(args: &[&str]) -> Cli {
        let config = std::env::temp_dir().join("weather-report-cli-test-absent.toml");
        let mut argv = vec!["weather-report", "--config", config.to_str().unwrap()];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[tokio::test]
    async fn report_rejects_blank_zip_before_building() {
        let err = run_with_missing_config(&["report", "", "--days", "7"]).run().await.unwrap_err();
        assert_eq!(err.to_string(), "A zip code is required");

        let err = run_with_missing_config(&["report", "   ", "--days", "7"]).run().await.unwrap_err();
        assert_eq!(err.to_string(), "A zip code is required");
    }

    #[tokio::test]
    async fn report_rejects_days_out_of_range() {
        let err = run_with_missing_config(&["report", "12345", "--days", "31"]).run().await.unwrap_err();
        assert!(err.to_string().contains("between 1 and 30"));
    }
}
