//! Global application configuration manager.
//!
//! `AppConfig` is a lazily initialized, globally accessible singleton containing
//! runtime configuration values loaded from environment variables. It provides
//! thread-safe access and per-field setters so tests can override values without
//! touching the process environment.

use std::env;
use std::sync::{OnceLock, RwLock};

/// Represents the complete application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: String,
    pub project_name: String,
    pub log_level: String,
    pub log_file: String,
    pub log_to_stdout: bool,
    pub database_path: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub jwt_duration_minutes: u64,
    /// HMAC key used to sign event check-in (QR) tokens.
    pub qr_token_secret: String,
    /// Trailing window during which a second claim from the same subject is a duplicate.
    pub duplicate_window_minutes: u64,
    /// Distance beyond which a claimed location raises a mismatch flag.
    pub geofence_radius_meters: f64,
    /// Comma-separated inclusive IP ranges (`a.b.c.d-e.f.g.h`). Empty means
    /// "use the built-in private-network defaults".
    pub allowed_ip_ranges: String,
    /// Comma-separated remote ports commonly used by proxies.
    pub proxy_ports: String,
    /// Comma-separated substrings that mark a hostname as a VPN/proxy exit.
    pub vpn_hostname_markers: String,
}

/// Lazily-initialized, thread-safe singleton instance of `AppConfig`.
static CONFIG_INSTANCE: OnceLock<RwLock<AppConfig>> = OnceLock::new();

impl AppConfig {
    /// Loads the configuration from `.env` and environment variables.
    ///
    /// Panics if required variables are missing or improperly formatted.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            env: env::var("APP_ENV").unwrap_or_else(|_| "development".into()),
            project_name: env::var("PROJECT_NAME").unwrap_or_else(|_| "campus-presence".into()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "api=info".into()),
            log_file: env::var("LOG_FILE").unwrap_or_else(|_| "api.log".into()),
            log_to_stdout: env::var("LOG_TO_STDOUT").unwrap_or_else(|_| "false".into()) == "true",
            database_path: env::var("DATABASE_PATH").expect("DATABASE_PATH is required"),
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".into())
                .parse()
                .unwrap(),
            jwt_secret: env::var("JWT_SECRET").expect("JWT_SECRET is required"),
            jwt_duration_minutes: env::var("JWT_DURATION_MINUTES")
                .unwrap_or("60".into())
                .parse()
                .unwrap(),
            qr_token_secret: env::var("QR_TOKEN_SECRET").expect("QR_TOKEN_SECRET is required"),
            duplicate_window_minutes: env::var("DUPLICATE_WINDOW_MINUTES")
                .unwrap_or("5".into())
                .parse()
                .unwrap(),
            geofence_radius_meters: env::var("GEOFENCE_RADIUS_METERS")
                .unwrap_or("100".into())
                .parse()
                .unwrap(),
            allowed_ip_ranges: env::var("ALLOWED_IP_RANGES").unwrap_or_default(),
            proxy_ports: env::var("PROXY_PORTS")
                .unwrap_or_else(|_| "8080,3128,1080,9050,8888".into()),
            vpn_hostname_markers: env::var("VPN_HOSTNAME_MARKERS")
                .unwrap_or_else(|_| "vpn,proxy,tor,exit,relay".into()),
        }
    }

    /// Returns a shared reference to the global configuration.
    ///
    /// # Panics
    /// Panics if the lock cannot be acquired.
    pub fn global() -> std::sync::RwLockReadGuard<'static, AppConfig> {
        CONFIG_INSTANCE
            .get_or_init(|| RwLock::new(AppConfig::from_env()))
            .read()
            .expect("Failed to acquire AppConfig read lock")
    }

    /// Resets the configuration by reloading from environment variables.
    ///
    /// Useful in tests to clear overrides.
    pub fn reset() {
        if let Some(lock) = CONFIG_INSTANCE.get() {
            let mut guard = lock.write().unwrap();
            *guard = AppConfig::from_env();
        }
    }

    /// Generic internal setter for any field in the config.
    fn set_field<F>(setter: F)
    where
        F: FnOnce(&mut AppConfig),
    {
        let lock = CONFIG_INSTANCE.get_or_init(|| RwLock::new(AppConfig::from_env()));
        let mut guard = lock
            .write()
            .expect("Failed to acquire AppConfig write lock");
        setter(&mut guard);
    }

    // --- Per-field setters below ---

    pub fn set_env(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.env = value.into());
    }

    pub fn set_project_name(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.project_name = value.into());
    }

    pub fn set_log_level(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.log_level = value.into());
    }

    pub fn set_log_file(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.log_file = value.into());
    }

    pub fn set_log_to_stdout(value: bool) {
        AppConfig::set_field(|cfg| cfg.log_to_stdout = value);
    }

    pub fn set_database_path(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.database_path = value.into());
    }

    pub fn set_host(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.host = value.into());
    }

    pub fn set_port(value: u16) {
        AppConfig::set_field(|cfg| cfg.port = value);
    }

    pub fn set_jwt_secret(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.jwt_secret = value.into());
    }

    pub fn set_jwt_duration_minutes(value: impl Into<u64>) {
        AppConfig::set_field(|cfg| cfg.jwt_duration_minutes = value.into());
    }

    pub fn set_qr_token_secret(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.qr_token_secret = value.into());
    }

    pub fn set_duplicate_window_minutes(value: impl Into<u64>) {
        AppConfig::set_field(|cfg| cfg.duplicate_window_minutes = value.into());
    }

    pub fn set_geofence_radius_meters(value: f64) {
        AppConfig::set_field(|cfg| cfg.geofence_radius_meters = value);
    }

    pub fn set_allowed_ip_ranges(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.allowed_ip_ranges = value.into());
    }

    pub fn set_proxy_ports(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.proxy_ports = value.into());
    }

    pub fn set_vpn_hostname_markers(value: impl Into<String>) {
        AppConfig::set_field(|cfg| cfg.vpn_hostname_markers = value.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn seed_required_env() {
        unsafe {
            env::set_var("DATABASE_PATH", "data/test.db");
            env::set_var("JWT_SECRET", "test-jwt-secret");
            env::set_var("QR_TOKEN_SECRET", "test-qr-secret");
            env::remove_var("PORT");
            env::remove_var("DUPLICATE_WINDOW_MINUTES");
            env::remove_var("GEOFENCE_RADIUS_METERS");
            env::remove_var("ALLOWED_IP_RANGES");
        }
    }

    #[test]
    #[serial]
    fn optional_fields_fall_back_to_defaults() {
        seed_required_env();
        AppConfig::global();
        AppConfig::reset();

        let cfg = AppConfig::global();
        assert_eq!(cfg.port, 3000);
        assert_eq!(cfg.duplicate_window_minutes, 5);
        assert_eq!(cfg.geofence_radius_meters, 100.0);
        assert!(cfg.allowed_ip_ranges.is_empty());
        assert!(cfg.proxy_ports.contains("3128"));
    }

    #[test]
    #[serial]
    fn setters_override_until_reset() {
        seed_required_env();
        AppConfig::global();
        AppConfig::reset();

        AppConfig::set_geofence_radius_meters(250.0);
        AppConfig::set_duplicate_window_minutes(10u64);
        {
            let cfg = AppConfig::global();
            assert_eq!(cfg.geofence_radius_meters, 250.0);
            assert_eq!(cfg.duplicate_window_minutes, 10);
        }

        AppConfig::reset();
        assert_eq!(AppConfig::global().geofence_radius_meters, 100.0);
    }
}
