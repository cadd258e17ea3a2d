//! Layered configuration for the façade binary (spec §2 ambient stack,
//! SPEC_FULL.md §2): defaults, then an optional file, then environment
//! overrides, then CLI flags — the same `config::Config` layering the host
//! codebase's `Configuration` wrapper uses (see
//! `batata-server::model::common::Configuration::new`), just with a
//! smaller, ArbiterLock-scoped set of keys.

use arbiterlock_engine::EngineConfig;
use clap::Parser;
use config::{Config, Environment};

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_STORE_URL: &str = "redis://127.0.0.1:6379";

#[derive(Debug, Parser)]
#[command(name = "arbiterlock-server")]
struct Cli {
    /// Address the HTTP façade binds to, e.g. 0.0.0.0:8080.
    #[arg(short = 'l', long = "listen-addr")]
    listen_addr: Option<String>,

    /// Atomic store URL. Use `memory://` to run against the in-process
    /// store instead of Redis (tests, local dev).
    #[arg(short = 's', long = "store-url")]
    store_url: Option<String>,

    /// tracing `EnvFilter` directive, e.g. "info" or "arbiterlock=debug".
    #[arg(long = "log-level")]
    log_level: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Configuration {
    config: Config,
}

impl Configuration {
    pub fn new() -> Self {
        let args = Cli::parse();

        let mut builder = Config::builder()
            .set_default("arbiterlock.listen_addr", DEFAULT_LISTEN_ADDR)
            .expect("failed to set listen_addr default")
            .set_default("arbiterlock.store_url", DEFAULT_STORE_URL)
            .expect("failed to set store_url default")
            .set_default("arbiterlock.default_ttl_secs", i64::from(arbiterlock_common::DEFAULT_TTL_SECS as i32))
            .expect("failed to set default_ttl_secs default")
            .set_default(
                "arbiterlock.queued_agent_lock_ttl_secs",
                i64::from(arbiterlock_common::DEFAULT_QUEUED_AGENT_LOCK_TTL_SECS as i32),
            )
            .expect("failed to set queued_agent_lock_ttl_secs default")
            .set_default(
                "arbiterlock.cancel_ttl_secs",
                i64::from(arbiterlock_common::DEFAULT_CANCEL_TTL_SECS as i32),
            )
            .expect("failed to set cancel_ttl_secs default")
            .set_default(
                "arbiterlock.handoff_retry_budget",
                i64::from(arbiterlock_common::DEFAULT_HANDOFF_RETRY_BUDGET),
            )
            .expect("failed to set handoff_retry_budget default")
            .set_default("arbiterlock.scavenger_enabled", false)
            .expect("failed to set scavenger_enabled default")
            .set_default("arbiterlock.scavenger_interval_secs", 30i64)
            .expect("failed to set scavenger_interval_secs default")
            .set_default("arbiterlock.log_level", "info")
            .expect("failed to set log_level default")
            .add_source(
                config::File::with_name("conf/arbiterlock")
                    .required(false),
            )
            .add_source(
                Environment::with_prefix("arbiterlock")
                    .separator("_")
                    .try_parsing(true),
            );

        if let Some(v) = args.listen_addr {
            builder = builder
                .set_override("arbiterlock.listen_addr", v)
                .expect("failed to set listen_addr override");
        }
        if let Some(v) = args.store_url {
            builder = builder
                .set_override("arbiterlock.store_url", v)
                .expect("failed to set store_url override");
        }
        if let Some(v) = args.log_level {
            builder = builder
                .set_override("arbiterlock.log_level", v)
                .expect("failed to set log_level override");
        }

        let config = builder
            .build()
            .expect("failed to build configuration - check conf/arbiterlock.yml and ARBITERLOCK_* env vars");

        Configuration { config }
    }

    pub fn listen_addr(&self) -> String {
        self.config
            .get_string("arbiterlock.listen_addr")
            .unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string())
    }

    pub fn store_url(&self) -> String {
        self.config
            .get_string("arbiterlock.store_url")
            .unwrap_or_else(|_| DEFAULT_STORE_URL.to_string())
    }

    pub fn log_level(&self) -> String {
        self.config
            .get_string("arbiterlock.log_level")
            .unwrap_or_else(|_| "info".to_string())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            default_ttl_secs: self.get_u64("arbiterlock.default_ttl_secs", 300),
            queued_agent_lock_ttl_secs: self.get_u64("arbiterlock.queued_agent_lock_ttl_secs", 3600),
            cancel_ttl_secs: self.get_u64("arbiterlock.cancel_ttl_secs", 60),
            handoff_retry_budget: self.get_u64("arbiterlock.handoff_retry_budget", 10) as u32,
            scavenger_enabled: self
                .config
                .get_bool("arbiterlock.scavenger_enabled")
                .unwrap_or(false),
            scavenger_interval_secs: self.get_u64("arbiterlock.scavenger_interval_secs", 30),
        }
    }

    fn get_u64(&self, key: &str, default: u64) -> u64 {
        self.config
            .get_int(key)
            .map(|v| v.max(0) as u64)
            .unwrap_or(default)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}
