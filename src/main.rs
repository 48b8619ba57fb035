use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::info;

use parlot::engine::EngineConfig;
use parlot::limits;
use parlot::merchant::MerchantManager;
use parlot::model::Ms;
use parlot::wire;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let metrics_port: Option<u16> = std::env::var("PARLOT_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    parlot::observability::init(metrics_port);

    let port = std::env::var("PARLOT_PORT").unwrap_or_else(|_| "5433".into());
    let bind = std::env::var("PARLOT_BIND").unwrap_or_else(|_| "0.0.0.0".into());
    let data_dir = std::env::var("PARLOT_DATA_DIR").unwrap_or_else(|_| "./data".into());
    let password = std::env::var("PARLOT_PASSWORD").unwrap_or_else(|_| "parlot".into());
    let max_connections: usize = std::env::var("PARLOT_MAX_CONNECTIONS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(256);
    let compact_threshold: u64 = std::env::var("PARLOT_COMPACT_THRESHOLD")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(1000);
    let retention_days: i64 = std::env::var("PARLOT_RETENTION_DAYS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(30);

    let defaults = EngineConfig::default();
    let config = EngineConfig {
        granularity_min: std::env::var("PARLOT_GRANULARITY_MIN")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|&g| {
                (limits::MIN_GRANULARITY_MIN..=limits::MAX_GRANULARITY_MIN).contains(&g)
                    && 60 % g == 0
            })
            .unwrap_or(defaults.granularity_min),
        lead_time_min: std::env::var("PARLOT_LEAD_TIME_MIN")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.lead_time_min),
        lock_ttl_ms: std::env::var("PARLOT_LOCK_TTL_SECS")
            .ok()
            .and_then(|s| s.parse::<Ms>().ok())
            .map(|s| s * 1_000)
            .unwrap_or(defaults.lock_ttl_ms),
        max_lock_lifetime_ms: std::env::var("PARLOT_LOCK_LIFETIME_SECS")
            .ok()
            .and_then(|s| s.parse::<Ms>().ok())
            .map(|s| s * 1_000)
            .unwrap_or(defaults.max_lock_lifetime_ms),
    };

    let tls_cert = std::env::var("PARLOT_TLS_CERT").ok();
    let tls_key = std::env::var("PARLOT_TLS_KEY").ok();
    let tls_acceptor = parlot::tls::load_tls_acceptor(tls_cert.as_deref(), tls_key.as_deref())?;

    // Ensure data directory exists
    std::fs::create_dir_all(&data_dir)?;

    let merchants = Arc::new(MerchantManager::new(
        PathBuf::from(&data_dir),
        compact_threshold,
        retention_days * 24 * 60 * 60 * 1_000,
        config,
    ));
    let semaphore = Arc::new(Semaphore::new(max_connections));

    let addr = format!("{bind}:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!("parlot listening on {addr}");
    info!("  data_dir: {data_dir}");
    info!("  max_connections: {max_connections}");
    info!(
        "  slots: {}min grid, {}min lead time",
        config.granularity_min, config.lead_time_min
    );
    info!(
        "  locks: {}s ttl, {}s lifetime ceiling",
        config.lock_ttl_ms / 1_000,
        config.max_lock_lifetime_ms / 1_000
    );
    info!("  tls: {}", if tls_acceptor.is_some() { "enabled" } else { "disabled" });
    info!("  metrics: {}", metrics_port.map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics")));

    // Graceful shutdown: stop accepting on SIGTERM/ctrl-c, drain in-flight connections
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (socket, peer) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::error!("accept error: {e}");
                        continue;
                    }
                };

                let permit = match semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        tracing::warn!("connection limit reached, rejecting {peer}");
                        metrics::counter!(parlot::observability::CONNECTIONS_REJECTED_TOTAL).increment(1);
                        drop(socket);
                        continue;
                    }
                };

                info!("connection from {peer}");
                metrics::counter!(parlot::observability::CONNECTIONS_TOTAL).increment(1);
                metrics::gauge!(parlot::observability::CONNECTIONS_ACTIVE).increment(1.0);
                let mm = merchants.clone();
                let pw = password.clone();
                let tls = tls_acceptor.clone();

                tokio::spawn(async move {
                    let _permit = permit; // held until connection closes
                    if let Err(e) = wire::process_connection(socket, mm, pw, tls).await {
                        tracing::error!("connection error from {peer}: {e}");
                    }
                    metrics::gauge!(parlot::observability::CONNECTIONS_ACTIVE).decrement(1.0);
                });
            }
            _ = &mut shutdown => {
                info!("shutdown signal received, stopping accept loop");
                break;
            }
        }
    }

    // Wait for in-flight connections to finish (up to 10s)
    info!("draining connections...");
    let drain_deadline = tokio::time::sleep(std::time::Duration::from_secs(10));
    tokio::pin!(drain_deadline);

    loop {
        if semaphore.available_permits() == max_connections {
            info!("all connections drained");
            break;
        }
        tokio::select! {
            _ = &mut drain_deadline => {
                let remaining = max_connections - semaphore.available_permits();
                tracing::warn!("drain timeout, {remaining} connections still open");
                break;
            }
            _ = tokio::time::sleep(std::time::Duration::from_millis(100)) => {}
        }
    }

    info!("parlot stopped");
    Ok(())
}
