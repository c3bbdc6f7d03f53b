use super::PawmapConfig;
use std::str::FromStr;

fn env_value<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse::<T>().ok())
}

/// Layer `PAWMAP_*` env vars over `cfg`. Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut PawmapConfig) {
    if let Some(b) = env_value::<bool>("PAWMAP_HIGH_ACCURACY") {
        cfg.geolocation.high_accuracy = b;
    }
    if let Some(n) = env_value::<u64>("PAWMAP_FIX_TIMEOUT_MS") {
        cfg.geolocation.fix_timeout_ms = n;
    }
    if let Some(n) = env_value::<u64>("PAWMAP_MAX_FIX_AGE_MS") {
        cfg.geolocation.max_fix_age_ms = n;
    }
    if let Some(n) = env_value::<u32>("PAWMAP_MAX_TIMEOUT_RETRIES") {
        cfg.geolocation.max_timeout_retries = n;
    }
    if let Some(n) = env_value::<u64>("PAWMAP_PUBLISH_INTERVAL_SECONDS") {
        cfg.publisher.interval_seconds = n;
    }
    if let Some(n) = env_value::<u32>("PAWMAP_DEGRADED_AFTER_FAILURES") {
        cfg.publisher.degraded_after_failures = n;
    }
    if let Some(n) = env_value::<u64>("PAWMAP_WRITE_TIMEOUT_MS") {
        cfg.publisher.write_timeout_ms = n;
    }
    if let Ok(table) = std::env::var("PAWMAP_FEED_TABLE") {
        if !table.is_empty() {
            cfg.feed.table = table;
        }
    }
    if let Some(km) = env_value::<f64>("PAWMAP_DISCOVERY_RADIUS_KM") {
        cfg.feed.discovery_radius_km = Some(km);
    }
    if let Some(n) = env_value::<u64>("PAWMAP_READ_TIMEOUT_MS") {
        cfg.feed.read_timeout_ms = n;
    }
}
