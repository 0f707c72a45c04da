//! Process-wide tracing subscriber and optional Prometheus exporter.

use std::net::SocketAddr;
use std::str::FromStr;

use tracing_subscriber::EnvFilter;

/// Filter for `directives`, or `info` when they do not parse. The flag
/// reports whether the fallback was taken.
pub fn env_filter(directives: &str) -> (EnvFilter, bool) {
    match EnvFilter::from_str(directives) {
        Ok(f) => (f, false),
        Err(_) => (EnvFilter::new("info"), true),
    }
}

pub fn init_tracing(directives: &str) {
    let (filter, fell_back) = env_filter(directives);
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
    if fell_back {
        tracing::warn!(directives, "invalid log filter; using info");
    }
}

/// Install the exporter when an address is configured. A bad address or a
/// failed install is logged and the process carries on without metrics.
pub fn init_metrics(addr: Option<&str>) -> Option<SocketAddr> {
    let raw = addr?;
    let Ok(sock) = raw.parse::<SocketAddr>() else {
        tracing::warn!(addr = %raw, "invalid metrics address; expected host:port");
        return None;
    };
    match metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(sock).install() {
        Ok(()) => {
            tracing::info!(addr = %sock, "Prometheus metrics exporter listening");
            Some(sock)
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to install metrics exporter");
            None
        }
    }
}
