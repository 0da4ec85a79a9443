// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use std::str::FromStr;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const QUIET_MODULES: &str = "h2=info,hyper=info,hyper_util=info,reqwest=info,tokio_tungstenite=info,tungstenite=info,alloy_transport_http=info,alloy_transport_ws=info,alloy_pubsub=info,alloy_rpc_client=info";

/// Expands a bare level into a directive set that keeps transport crates quiet.
/// Directive strings (containing ',' or '=') are used as-is.
pub fn filter_spec(log_level: &str) -> String {
    let normalized = log_level.trim();
    if normalized.is_empty() {
        return format!("info,{QUIET_MODULES}");
    }
    if normalized.contains(',') || normalized.contains('=') {
        normalized.to_string()
    } else {
        format!("{normalized},{QUIET_MODULES}")
    }
}

/// `RUST_LOG` wins over the configured level when set.
pub fn setup_logging(log_level: &str, json_format: bool) {
    let spec = std::env::var("RUST_LOG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| filter_spec(log_level));
    let filter = EnvFilter::from_str(&spec).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = if json_format {
        let json_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(false);
        subscriber.with(json_layer).try_init().is_ok()
    } else {
        let fmt_layer = fmt::layer().with_target(true).compact();
        subscriber.with(fmt_layer).try_init().is_ok()
    };

    if installed {
        let base = spec.split(',').next().unwrap_or("info");
        tracing::info!(
            target: "config",
            base,
            format = if json_format { "json" } else { "compact" },
            "Logging initialized"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_level_gets_quiet_transport_defaults() {
        let spec = filter_spec("debug");
        assert!(spec.starts_with("debug,"));
        assert!(spec.contains("alloy_pubsub=info"));
    }

    #[test]
    fn explicit_directives_are_respected() {
        assert_eq!(filter_spec("vault_rescuer=trace"), "vault_rescuer=trace");
        assert!(filter_spec("  ").starts_with("info,"));
    }
}
