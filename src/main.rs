use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn, Level};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::{LevelFilter, Targets};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use dbcluster::config::{ConfigProvider, FileConfig, LogRotation, Settings, SqlLogConfig};
use dbcluster::metrics::metrics;
use dbcluster::pool::SQL_LOG_TARGET;
use dbcluster::{Cluster, MysqlDialer, Role};

const DEFAULT_CONFIG_PATH: &str = "config/dbcluster.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let provider = Arc::new(FileConfig::new(&path));
    let doc = provider
        .load()
        .with_context(|| format!("loading {}", path.display()))?;
    let settings = Settings::from_table(&doc)?;

    init_tracing(&settings.sql_log)?;
    info!(path = %path.display(), "Loaded configuration");

    let cluster = Cluster::builder(provider, Arc::new(MysqlDialer))
        .init()
        .await
        .context("starting cluster")?;

    for name in cluster.instance_names() {
        for role in [Role::Primary, Role::Replica] {
            match cluster.resolve(&name, role) {
                Ok(backend) => info!(
                    instance = %name,
                    role = role.as_str(),
                    backend = ?backend,
                    "Resolved handle"
                ),
                Err(e) => warn!(instance = %name, error = %e, "Resolve failed"),
            }
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    cluster.shutdown().await;

    info!(metrics = %metrics().gather(), "Final metrics");
    Ok(())
}

/// Console output filtered by `RUST_LOG`, plus the SQL target routed to its
/// own rolling file when `[sql_log] log_file` is set
fn init_tracing(sql_log: &SqlLogConfig) -> anyhow::Result<()> {
    let console = fmt::layer().with_filter(
        EnvFilter::builder()
            .with_default_directive(Level::INFO.into())
            .from_env_lossy(),
    );

    let sql_file = match sql_log.file_location() {
        Some((dir, prefix)) => {
            let rotation = match sql_log.rotation() {
                LogRotation::Never => Rotation::NEVER,
                LogRotation::Hourly => Rotation::HOURLY,
                LogRotation::Daily => Rotation::DAILY,
            };
            let mut appender = RollingFileAppender::builder()
                .rotation(rotation)
                .filename_prefix(prefix)
                .filename_suffix("log");
            if let Some(max_files) = sql_log.max_files() {
                appender = appender.max_log_files(max_files);
            }
            let appender = appender
                .build(&dir)
                .with_context(|| format!("opening SQL log in {}", dir.display()))?;

            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(appender)
                    .with_filter(Targets::new().with_target(SQL_LOG_TARGET, LevelFilter::TRACE)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(sql_file)
        .init();
    Ok(())
}
