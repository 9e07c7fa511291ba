use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use vg_core::command::CommandRunner;

use crate::error::{run_checked, HelperError, Result};

const POWERMETRICS: &str = "/usr/bin/powermetrics";
const SAMPLE_TIMEOUT: Duration = Duration::from_secs(10);

static CELSIUS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]+(?:\.[0-9]+)?)\s*C").expect("valid celsius regex"));

/// Samples the SoC temperature with `powermetrics`.
pub struct SocTemperatureProvider {
    runner: Arc<dyn CommandRunner>,
}

impl SocTemperatureProvider {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    pub async fn current_temperature_c(&self) -> Result<f64> {
        let out = run_checked(
            self.runner.as_ref(),
            POWERMETRICS,
            &["-n", "1", "-s", "cpu_power", "--sample-rate", "1000"],
            SAMPLE_TIMEOUT,
        )
        .await?;
        parse_temperature(&out.stdout).ok_or(HelperError::ParseFailed("powermetrics"))
    }
}

/// Prefer a die/CPU/SoC temperature line; otherwise the first Celsius reading.
pub fn parse_temperature(text: &str) -> Option<f64> {
    let primary = text.lines().find(|line| {
        let lower = line.to_lowercase();
        lower.contains("die temperature")
            || lower.contains("cpu temperature")
            || lower.contains("soc temperature")
    });
    if let Some(value) = primary.and_then(extract_celsius) {
        return Some(value);
    }
    text.lines().find_map(extract_celsius)
}

fn extract_celsius(line: &str) -> Option<f64> {
    CELSIUS
        .captures(line)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_die_temperature_line() {
        let text = "\
**** Processor usage ****
GPU 12.5 C
CPU die temperature: 68.42 C
";
        assert_eq!(parse_temperature(text), Some(68.42));
    }

    #[test]
    fn falls_back_to_first_reading() {
        assert_eq!(parse_temperature("ANE 41 C\nGPU 55.0 C\n"), Some(41.0));
    }

    #[test]
    fn ignores_lines_without_celsius() {
        assert_eq!(parse_temperature("CPU Power: 1200 mW\nCombined Power: 1500 mW\n"), None);
    }

    #[test]
    fn primary_line_without_value_falls_through() {
        let text = "SoC temperature: unavailable\nthermal 73.1C\n";
        assert_eq!(parse_temperature(text), Some(73.1));
    }
}
