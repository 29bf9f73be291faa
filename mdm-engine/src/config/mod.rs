//! Configuration management
//!
//! Provides the engine configuration with defaults, validation, and
//! environment-based overrides.

use crate::constants;
use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Service configuration
    pub service: ServiceConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Lease lock configuration
    pub locking: LockingConfig,
    /// Scheduler configuration
    pub scheduler: SchedulerConfig,
    /// Business work window configuration
    pub workday: WorkdayConfig,
    /// Allocation configuration
    pub allocation: AllocationConfig,
}

impl AppConfig {
    /// Load configuration from environment variables on top of defaults
    pub fn load_from_env() -> EngineResult<AppConfig> {
        let mut config = AppConfig::default();

        if let Ok(val) = std::env::var("MDM_LOG_LEVEL") {
            config.logging.level = val;
        }
        if let Ok(val) = std::env::var("MDM_SERVICE_NAME") {
            config.service.name = val;
        }
        if let Ok(val) = std::env::var("MDM_BIND_ADDR") {
            config.service.bind_addr = val;
        }
        if let Ok(val) = std::env::var("MDM_DEFAULT_AGENT") {
            config.allocation.default_agent = val;
        }
        if let Ok(val) = std::env::var("MDM_SWEEP_INTERVAL_SECS") {
            let secs: u64 = val
                .parse()
                .map_err(|_| EngineError::Configuration(format!("bad MDM_SWEEP_INTERVAL_SECS: {}", val)))?;
            config.scheduler.sweep_interval = Duration::from_secs(secs);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> EngineResult<()> {
        self.service.validate()?;
        self.logging.validate()?;
        self.locking.validate()?;
        self.scheduler.validate()?;
        self.workday.validate()?;
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig::default(),
            logging: LoggingConfig::default(),
            locking: LockingConfig::default(),
            scheduler: SchedulerConfig::default(),
            workday: WorkdayConfig::default(),
            allocation: AllocationConfig::default(),
        }
    }
}

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name
    pub name: String,
    /// Service version
    pub version: String,
    /// HTTP bind address
    pub bind_addr: String,
}

impl ServiceConfig {
    fn validate(&self) -> EngineResult<()> {
        if self.name.is_empty() {
            return Err(EngineError::Configuration(
                "service name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "mdm-request-engine".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            bind_addr: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Enable JSON output
    pub json: bool,
}

impl LoggingConfig {
    fn validate(&self) -> EngineResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.level.as_str()) {
            return Err(EngineError::Configuration(format!(
                "invalid log level: {}",
                self.level
            )));
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Lease lock configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockingConfig {
    /// Lease duration granted on acquire and on each heartbeat
    pub lease: Duration,
    /// Heartbeat silence after which a holder is considered stale
    pub stale_threshold: Duration,
    /// Default wait budget for an acquire
    pub default_wait: Duration,
}

impl LockingConfig {
    fn validate(&self) -> EngineResult<()> {
        if self.stale_threshold >= self.lease {
            return Err(EngineError::Configuration(
                "stale threshold must be shorter than the lease".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for LockingConfig {
    fn default() -> Self {
        Self {
            lease: Duration::from_millis(constants::LEASE_MS),
            stale_threshold: Duration::from_millis(constants::STALE_THRESHOLD_MS),
            default_wait: Duration::from_millis(constants::DEFAULT_LOCK_WAIT_MS),
        }
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Master tables swept by the interval poller
    pub master_tables: Vec<String>,
    /// Pause between sweeps of the same table
    pub sweep_interval: Duration,
    /// Per-sweep time budget; a sweep stops cleanly when it is exceeded
    pub sweep_budget: Duration,
    /// Age after which an incomplete submission is re-submitted
    pub submit_retry_after: Duration,
}

impl SchedulerConfig {
    fn validate(&self) -> EngineResult<()> {
        if self.sweep_budget.is_zero() {
            return Err(EngineError::Configuration(
                "sweep budget must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            master_tables: vec![
                "BOM".to_string(),
                "Pricing".to_string(),
                "Promo".to_string(),
                "Customer".to_string(),
                "Vendor".to_string(),
            ],
            sweep_interval: Duration::from_secs(60),
            sweep_budget: Duration::from_secs(240),
            submit_retry_after: Duration::from_secs(600),
        }
    }
}

/// Business work window configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkdayConfig {
    /// Hour the work window opens
    pub start_hour: u32,
    /// Hour the work window closes
    pub end_hour: u32,
    /// Lunch break start hour
    pub lunch_start_hour: u32,
    /// Lunch break end hour
    pub lunch_end_hour: u32,
    /// Business days without activity after which a pending request expires
    pub expired_day_limit: i64,
}

impl WorkdayConfig {
    fn validate(&self) -> EngineResult<()> {
        if self.start_hour >= self.end_hour {
            return Err(EngineError::Configuration(
                "work window must open before it closes".to_string(),
            ));
        }
        if self.lunch_start_hour >= self.lunch_end_hour
            || self.lunch_start_hour < self.start_hour
            || self.lunch_end_hour > self.end_hour
        {
            return Err(EngineError::Configuration(
                "lunch break must sit inside the work window".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for WorkdayConfig {
    fn default() -> Self {
        Self {
            start_hour: constants::WORK_DAY_START_HOUR,
            end_hour: constants::WORK_DAY_END_HOUR,
            lunch_start_hour: constants::LUNCH_START_HOUR,
            lunch_end_hour: constants::LUNCH_END_HOUR,
            expired_day_limit: constants::EXPIRED_DAY_LIMIT,
        }
    }
}

/// Allocation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationConfig {
    /// Agent assigned when every other path is exhausted
    pub default_agent: String,
    /// Department routed straight to the default agent
    pub special_project_department: String,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            default_agent: "MDM Default".to_string(),
            special_project_department: "SPECIAL PROJECT".to_string(),
        }
    }
}
