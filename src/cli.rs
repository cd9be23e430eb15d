use clap::{Arg, ArgMatches, Command, value_parser};
use std::time::Duration;

use crate::config::{PipelineConfig, RecordFormat, app_name, version};

pub fn command() -> Command {
    Command::new(app_name())
        .version(version())
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .arg(
            Arg::new("count")
                .value_name("COUNT")
                .help("Number of motion events sent through the pipeline.")
                .required(true)
                .value_parser(value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new("interval-ms")
                .short('i')
                .long("interval-ms")
                .value_name("MILLIS")
                .help("Pause between events emitted by the source.")
                .value_parser(value_parser!(u64))
                .default_value("100"),
        )
        .arg(
            Arg::new("timeout-secs")
                .short('t')
                .long("timeout-secs")
                .value_name("SECONDS")
                .help("Fail the run once no stage has made progress for this long.")
                .value_parser(value_parser!(u64).range(1..))
                .default_value("30"),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_name("FORMAT")
                .help("How the sink records events (log/json).")
                .ignore_case(true)
                .value_parser(["log", "json"])
                .default_value("log"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_name("SEED")
                .help("Seed for the generated motion events.")
                .value_parser(value_parser!(u64)),
        )
}

/// Build the run configuration from parsed arguments
pub fn config_from(matches: &ArgMatches) -> Result<PipelineConfig, String> {
    let mut config = PipelineConfig::default();

    if let Some(count) = matches.get_one::<u64>("count") {
        let count = usize::try_from(*count).map_err(|_| format!("count {} is too large", count))?;
        config = config.with_event_count(count);
    }
    if let Some(millis) = matches.get_one::<u64>("interval-ms") {
        config = config.with_emit_interval(Duration::from_millis(*millis));
    }
    if let Some(secs) = matches.get_one::<u64>("timeout-secs") {
        config = config.with_stage_timeout(Duration::from_secs(*secs));
    }
    if let Some(format) = matches.get_one::<String>("format") {
        config = config.with_record_format(format.parse::<RecordFormat>()?);
    }
    if let Some(seed) = matches.get_one::<u64>("seed") {
        config = config.with_seed(*seed);
    }

    // Otherwise a healthy source looks stalled between two events
    if config.emit_interval >= config.stage_timeout {
        return Err(format!(
            "interval {:?} must be shorter than the timeout {:?}",
            config.emit_interval, config.stage_timeout
        ));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<PipelineConfig, String> {
        let matches = command()
            .try_get_matches_from(args)
            .map_err(|e| e.to_string())?;
        config_from(&matches)
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["motion-pipeline", "5"]).unwrap();

        assert_eq!(config.event_count, 5);
        assert_eq!(config.emit_interval, Duration::from_millis(100));
        assert_eq!(config.stage_timeout, Duration::from_secs(30));
        assert_eq!(config.record_format, RecordFormat::Log);
        assert_eq!(config.seed, None);
    }

    #[test]
    fn test_all_options() {
        let config = parse(&[
            "motion-pipeline",
            "12",
            "--interval-ms",
            "0",
            "-t",
            "3",
            "--format",
            "JSON",
            "--seed",
            "42",
        ])
        .unwrap();

        assert_eq!(config.event_count, 12);
        assert_eq!(config.emit_interval, Duration::ZERO);
        assert_eq!(config.stage_timeout, Duration::from_secs(3));
        assert_eq!(config.record_format, RecordFormat::Json);
        assert_eq!(config.seed, Some(42));
    }

    #[test]
    fn test_count_must_be_positive() {
        assert!(parse(&["motion-pipeline", "0"]).is_err());
        assert!(parse(&["motion-pipeline", "-3"]).is_err());
        assert!(parse(&["motion-pipeline"]).is_err());
    }

    #[test]
    fn test_interval_must_be_shorter_than_timeout() {
        let err = parse(&["motion-pipeline", "3", "-i", "2000", "-t", "2"]).unwrap_err();
        assert!(err.contains("must be shorter than the timeout"));
        assert!(parse(&["motion-pipeline", "3", "-i", "1999", "-t", "2"]).is_ok());
    }

    #[test]
    fn test_unknown_format_rejected() {
        assert!(parse(&["motion-pipeline", "1", "--format", "xml"]).is_err());
    }
}
