use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Config — file-based loader (conflux.json) with env-var fallback
// ---------------------------------------------------------------------------

/// Cache TTLs, per result category.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct CacheConfig {
    /// Default TTL for result pages, in seconds.
    pub ttl_default_secs: Option<u64>,
    /// TTL for image result pages, in seconds.
    pub ttl_images_secs: Option<u64>,
    /// TTL for news result pages, in seconds.
    pub ttl_news_secs: Option<u64>,
}

impl CacheConfig {
    pub fn resolve_ttl_default(&self) -> Duration {
        Duration::from_secs(resolve_u64(
            self.ttl_default_secs,
            "CONFLUX_CACHE_TTL_DEFAULT_SECS",
            3600,
        ))
    }

    pub fn resolve_ttl_images(&self) -> Duration {
        Duration::from_secs(resolve_u64(
            self.ttl_images_secs,
            "CONFLUX_CACHE_TTL_IMAGES_SECS",
            900,
        ))
    }

    pub fn resolve_ttl_news(&self) -> Duration {
        Duration::from_secs(resolve_u64(
            self.ttl_news_secs,
            "CONFLUX_CACHE_TTL_NEWS_SECS",
            300,
        ))
    }
}

/// Fan-out budgets for the meta-search coordinator.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct MetaSearchConfig {
    /// Global wall-clock budget for one request, in milliseconds.
    pub request_budget_ms: Option<u64>,
    /// How long to keep collecting after the first result once the
    /// minimum engine count is met.
    pub early_return_ms: Option<u64>,
    /// Minimum engines that must report before early return is considered.
    pub min_engines: Option<usize>,
}

impl MetaSearchConfig {
    pub fn resolve_request_budget(&self) -> Duration {
        Duration::from_millis(resolve_u64(
            self.request_budget_ms,
            "CONFLUX_METASEARCH_REQUEST_BUDGET_MS",
            10_000,
        ))
    }

    pub fn resolve_early_return(&self) -> Duration {
        Duration::from_millis(resolve_u64(
            self.early_return_ms,
            "CONFLUX_METASEARCH_EARLY_RETURN_MS",
            300,
        ))
    }

    pub fn resolve_min_engines(&self) -> usize {
        resolve_u64(
            self.min_engines.map(|v| v as u64),
            "CONFLUX_METASEARCH_MIN_ENGINES",
            2,
        ) as usize
    }
}

/// Per-engine override block (`engines.<name>` in conflux.json).
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct EngineOverride {
    pub enabled: Option<bool>,
    pub weight: Option<f64>,
    pub timeout_ms: Option<u64>,
}

impl EngineOverride {
    /// Env vars take precedence over the file: `CONFLUX_ENGINE_<NAME>_ENABLED`,
    /// `..._WEIGHT`, `..._TIMEOUT_MS`.
    pub fn resolved_for(&self, name: &str) -> EngineOverride {
        let upper = name.to_ascii_uppercase().replace('-', "_");
        EngineOverride {
            enabled: env_parse::<bool>(&format!("CONFLUX_ENGINE_{}_ENABLED", upper))
                .or(self.enabled),
            weight: env_parse::<f64>(&format!("CONFLUX_ENGINE_{}_WEIGHT", upper)).or(self.weight),
            timeout_ms: env_parse::<u64>(&format!("CONFLUX_ENGINE_{}_TIMEOUT_MS", upper))
                .or(self.timeout_ms),
        }
    }
}

/// Recrawler worker and transport sizing.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct RecrawlerConfig {
    pub workers: Option<usize>,
    pub dns_workers: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub batch_size: Option<usize>,
    pub transport_shards: Option<usize>,
    pub max_conns_per_domain: Option<usize>,
    pub domain_fail_threshold: Option<u32>,
}

impl RecrawlerConfig {
    pub fn resolve_workers(&self) -> usize {
        resolve_u64(
            self.workers.map(|v| v as u64),
            "CONFLUX_RECRAWLER_WORKERS",
            200,
        ) as usize
    }

    pub fn resolve_dns_workers(&self) -> usize {
        resolve_u64(
            self.dns_workers.map(|v| v as u64),
            "CONFLUX_RECRAWLER_DNS_WORKERS",
            2000,
        ) as usize
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_millis(resolve_u64(
            self.timeout_ms,
            "CONFLUX_RECRAWLER_TIMEOUT_MS",
            5000,
        ))
    }

    pub fn resolve_batch_size(&self) -> usize {
        resolve_u64(
            self.batch_size.map(|v| v as u64),
            "CONFLUX_RECRAWLER_BATCH_SIZE",
            5000,
        ) as usize
    }

    pub fn resolve_transport_shards(&self) -> usize {
        resolve_u64(
            self.transport_shards.map(|v| v as u64),
            "CONFLUX_RECRAWLER_TRANSPORT_SHARDS",
            64,
        )
        .max(1) as usize
    }

    pub fn resolve_max_conns_per_domain(&self) -> usize {
        resolve_u64(
            self.max_conns_per_domain.map(|v| v as u64),
            "CONFLUX_RECRAWLER_MAX_CONNS_PER_DOMAIN",
            8,
        )
        .max(1) as usize
    }

    pub fn resolve_domain_fail_threshold(&self) -> u32 {
        resolve_u64(
            self.domain_fail_threshold.map(|v| v as u64),
            "CONFLUX_RECRAWLER_DOMAIN_FAIL_THRESHOLD",
            3,
        )
        .max(1) as u32
    }
}

/// Local full-text index settings.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct FtsConfig {
    /// Driver id; `"bm25"` is the built-in segment driver.
    pub driver: Option<String>,
    pub data_dir: Option<String>,
    /// BCP-47 tag used for the tokenizer's stemmer selection.
    pub language: Option<String>,
}

impl FtsConfig {
    pub fn resolve_driver(&self) -> String {
        resolve_string(self.driver.clone(), "CONFLUX_FTS_DRIVER", "bm25")
    }

    pub fn resolve_data_dir(&self) -> PathBuf {
        if let Some(dir) = env_nonempty("CONFLUX_FTS_DATA_DIR").or_else(|| self.data_dir.clone()) {
            return PathBuf::from(dir);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".conflux")
            .join("index")
    }

    pub fn resolve_language(&self) -> String {
        resolve_string(self.language.clone(), "CONFLUX_FTS_LANGUAGE", "en")
    }
}

/// Top-level config loaded from `conflux.json`.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub metasearch: MetaSearchConfig,
    #[serde(default)]
    pub engines: HashMap<String, EngineOverride>,
    #[serde(default)]
    pub recrawler: RecrawlerConfig,
    #[serde(default)]
    pub fts: FtsConfig,
}

impl Config {
    pub fn engine_override(&self, name: &str) -> EngineOverride {
        self.engines
            .get(name)
            .cloned()
            .unwrap_or_default()
            .resolved_for(name)
    }
}

/// Load `conflux.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `CONFLUX_CONFIG` env var path
/// 2. `./conflux.json` (process cwd)
/// 3. `../conflux.json` (repo root when running from a subdir)
///
/// Missing file → `Config::default()` (silent, all env-var fallbacks apply).
/// Parse error → log a warning, return `Config::default()`.
pub fn load_config() -> Config {
    let candidates: Vec<PathBuf> = {
        let mut v = vec![
            PathBuf::from("conflux.json"),
            PathBuf::from("../conflux.json"),
        ];
        if let Ok(env_path) = std::env::var("CONFLUX_CONFIG") {
            v.insert(0, PathBuf::from(env_path));
        }
        v
    };

    for path in &candidates {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Config>(&contents) {
                Ok(cfg) => {
                    tracing::info!("conflux.json loaded from {}", path.display());
                    return cfg;
                }
                Err(e) => {
                    tracing::warn!(
                        "conflux.json parse error at {}: {} — using defaults",
                        path.display(),
                        e
                    );
                    return Config::default();
                }
            },
            Err(_) => continue,
        }
    }

    Config::default()
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn resolve_u64(file_value: Option<u64>, env_key: &str, default: u64) -> u64 {
    env_parse::<u64>(env_key)
        .or(file_value)
        .unwrap_or(default)
}

fn resolve_string(file_value: Option<String>, env_key: &str, default: &str) -> String {
    env_nonempty(env_key)
        .or(file_value)
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.cache.resolve_ttl_default(), Duration::from_secs(3600));
        assert_eq!(cfg.cache.resolve_ttl_images(), Duration::from_secs(900));
        assert_eq!(cfg.cache.resolve_ttl_news(), Duration::from_secs(300));
        assert_eq!(
            cfg.metasearch.resolve_request_budget(),
            Duration::from_millis(10_000)
        );
        assert_eq!(cfg.metasearch.resolve_min_engines(), 2);
        assert_eq!(cfg.recrawler.resolve_workers(), 200);
        assert_eq!(cfg.recrawler.resolve_dns_workers(), 2000);
        assert_eq!(cfg.recrawler.resolve_batch_size(), 5000);
        assert_eq!(cfg.recrawler.resolve_transport_shards(), 64);
        assert_eq!(cfg.recrawler.resolve_max_conns_per_domain(), 8);
        assert_eq!(cfg.recrawler.resolve_domain_fail_threshold(), 3);
        assert_eq!(cfg.fts.resolve_driver(), "bm25");
    }

    #[test]
    fn file_values_win_over_defaults() {
        let cfg: Config = serde_json::from_str(
            r#"{
                "cache": { "ttl_default_secs": 120 },
                "engines": { "google": { "weight": 1.2, "enabled": false } },
                "recrawler": { "workers": 8 }
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.cache.resolve_ttl_default(), Duration::from_secs(120));
        let ov = cfg.engine_override("google");
        assert_eq!(ov.weight, Some(1.2));
        assert_eq!(ov.enabled, Some(false));
        assert_eq!(cfg.recrawler.resolve_workers(), 8);
    }
}
