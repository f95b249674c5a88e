use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub bind_addr: String,
    /// Upper bound on how long a duplicate Submit waits for an in-flight
    /// grading pass before reporting Timeout.
    pub submit_wait_seconds: u64,
    pub grading: GradingConfig,
}

/// Thresholds and the percentage -> letter table are configuration inputs,
/// not hardwired logic.
#[derive(Debug, Clone, Deserialize)]
pub struct GradingConfig {
    pub pass_threshold: u32,
    /// Subjects scoring below this percentage get a review recommendation.
    pub review_threshold: u32,
    pub grade_bands: Vec<GradeBand>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GradeBand {
    pub min_percentage: u32,
    pub letter: String,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            pass_threshold: 60,
            review_threshold: 50,
            grade_bands: default_grade_bands(),
        }
    }
}

fn default_grade_bands() -> Vec<GradeBand> {
    [(90, "A"), (80, "A-"), (70, "B"), (60, "C")]
        .into_iter()
        .map(|(min_percentage, letter)| GradeBand {
            min_percentage,
            letter: letter.to_string(),
        })
        .collect()
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        // Determine environment (defaults to dev)
        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let settings = config::Config::builder()
            .add_source(
                config::File::with_name(&format!("config/{}", env)).required(false), // Allow missing config file, fallback to ENV
            )
            .add_source(config::Environment::with_prefix("APP").separator("__"))
            .build()?;

        let bind_addr = settings
            .get_string("server.bind_addr")
            .or_else(|_| env::var("BIND_ADDR"))
            .unwrap_or_else(|_| "0.0.0.0:8081".to_string());

        let submit_wait_seconds = settings
            .get_int("session.submit_wait_seconds")
            .ok()
            .or_else(|| {
                env::var("SUBMIT_WAIT_SECONDS")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok())
            })
            .filter(|v| *v > 0)
            .unwrap_or(10) as u64;

        let pass_threshold = settings
            .get_int("grading.pass_threshold")
            .ok()
            .filter(|v| (0..=100).contains(v))
            .map(|v| v as u32)
            .unwrap_or(60);

        let review_threshold = settings
            .get_int("grading.review_threshold")
            .ok()
            .filter(|v| (0..=100).contains(v))
            .map(|v| v as u32)
            .unwrap_or(50);

        let grade_bands = settings
            .get::<Vec<GradeBand>>("grading.grade_bands")
            .unwrap_or_else(|_| default_grade_bands());

        Ok(Config {
            bind_addr,
            submit_wait_seconds,
            grading: GradingConfig {
                pass_threshold,
                review_threshold,
                grade_bands,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn load_falls_back_to_defaults() {
        std::env::remove_var("APP__SESSION__SUBMIT_WAIT_SECONDS");
        std::env::remove_var("SUBMIT_WAIT_SECONDS");
        std::env::remove_var("BIND_ADDR");

        let config = Config::load().unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8081");
        assert_eq!(config.submit_wait_seconds, 10);
        assert_eq!(config.grading.pass_threshold, 60);
        assert_eq!(config.grading.grade_bands.len(), 4);
        assert_eq!(config.grading.grade_bands[0].letter, "A");
    }

    #[test]
    #[serial]
    fn env_overrides_submit_wait() {
        std::env::set_var("SUBMIT_WAIT_SECONDS", "3");
        let config = Config::load().unwrap();
        assert_eq!(config.submit_wait_seconds, 3);
        std::env::remove_var("SUBMIT_WAIT_SECONDS");
    }
}
