/// Gateway configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP/WebSocket server binds to.
    pub port: u16,
    /// Redis connection string. `None` runs on the in-process bus, which
    /// only fans out within this one process.
    pub redis_url: Option<String>,
    /// Allow cross-origin requests from any origin.
    pub cors_allow_any: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let port = var("PORT")
            .or_else(|| var("ASGI_PORT"))
            .and_then(|v| v.parse().ok())
            .unwrap_or(8000);

        let redis_url = var("REDIS_URL").or_else(|| {
            var("REDIS_HOST").map(|host| {
                let port = var("REDIS_PORT").unwrap_or_else(|| "6379".to_string());
                format!("redis://{host}:{port}/0")
            })
        });

        let cors_allow_any = var("CORS_ALLOW_ANY")
            .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
            .unwrap_or(true);

        Self {
            port,
            redis_url,
            cors_allow_any,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let cfg = config(&[]);
        assert_eq!(cfg.port, 8000);
        assert!(cfg.redis_url.is_none());
        assert!(cfg.cors_allow_any);
    }

    #[test]
    fn redis_url_wins_over_host_and_port() {
        let cfg = config(&[
            ("REDIS_URL", "redis://cache:6380/1"),
            ("REDIS_HOST", "ignored"),
        ]);
        assert_eq!(cfg.redis_url.as_deref(), Some("redis://cache:6380/1"));
    }

    #[test]
    fn redis_host_and_port_build_url() {
        let cfg = config(&[("REDIS_HOST", "redis"), ("REDIS_PORT", "6390")]);
        assert_eq!(cfg.redis_url.as_deref(), Some("redis://redis:6390/0"));

        let cfg = config(&[("REDIS_HOST", "redis")]);
        assert_eq!(cfg.redis_url.as_deref(), Some("redis://redis:6379/0"));
    }

    #[test]
    fn asgi_port_is_accepted_and_bad_ports_fall_back() {
        assert_eq!(config(&[("ASGI_PORT", "9001")]).port, 9001);
        assert_eq!(config(&[("PORT", "9002"), ("ASGI_PORT", "9001")]).port, 9002);
        assert_eq!(config(&[("PORT", "not-a-port")]).port, 8000);
    }

    #[test]
    fn cors_can_be_disabled() {
        assert!(!config(&[("CORS_ALLOW_ANY", "0")]).cors_allow_any);
        assert!(!config(&[("CORS_ALLOW_ANY", "false")]).cors_allow_any);
        assert!(config(&[("CORS_ALLOW_ANY", "1")]).cors_allow_any);
    }
}
