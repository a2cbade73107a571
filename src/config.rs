use once_cell::sync::Lazy;
use std::fs;

/// Address the HTTP server should bind to. Defaults to `0.0.0.0`.
pub static BIND_ADDRESS: Lazy<String> =
    Lazy::new(|| std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0".to_string()));

/// Port the HTTP server should listen on. Defaults to `3000`.
pub static BIND_PORT: Lazy<u16> = Lazy::new(|| {
    std::env::var("BIND_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(3000)
});

/// When set to a truthy value, allows the application to continue running even if database
/// migrations fail. Defaults to `false`.
pub static ALLOW_MIGRATION_FAILURE: Lazy<bool> = Lazy::new(|| truthy_env("ALLOW_MIGRATION_FAILURE"));

/// Hostname or address of the access controller's API service.
pub static ROUTEROS_HOST: Lazy<String> =
    Lazy::new(|| std::env::var("ROUTEROS_HOST").unwrap_or_else(|_| "192.168.88.1".to_string()));

/// API port on the access controller. Defaults to `8728` (plain transport).
pub static ROUTEROS_PORT: Lazy<u16> = Lazy::new(|| {
    std::env::var("ROUTEROS_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8728)
});

/// Controller API login name. Defaults to `admin`.
pub static ROUTEROS_USERNAME: Lazy<String> =
    Lazy::new(|| std::env::var("ROUTEROS_USERNAME").unwrap_or_else(|_| "admin".to_string()));

/// Controller API password, readable from `ROUTEROS_PASSWORD_FILE` as well.
/// Defaults to the empty string, matching a factory-fresh controller.
pub static ROUTEROS_PASSWORD: Lazy<String> = Lazy::new(|| {
    read_secret_env("ROUTEROS_PASSWORD", "ROUTEROS_PASSWORD_FILE").unwrap_or_default()
});

/// Whether to wrap the controller connection in TLS. Defaults to `false`.
pub static ROUTEROS_USE_TLS: Lazy<bool> = Lazy::new(|| truthy_env("ROUTEROS_USE_TLS"));

/// Accept self-signed controller certificates when TLS is enabled.
pub static ROUTEROS_TLS_INSECURE: Lazy<bool> = Lazy::new(|| truthy_env("ROUTEROS_TLS_INSECURE"));

/// Bound on the controller connection attempt, in seconds.
pub static ROUTEROS_CONNECT_TIMEOUT_SECS: Lazy<u64> = Lazy::new(|| {
    std::env::var("ROUTEROS_CONNECT_TIMEOUT_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(10)
});

/// Cadence of the plan-to-profile directory sync.
pub static PROFILE_SYNC_INTERVAL_SECS: Lazy<u64> = Lazy::new(|| {
    std::env::var("PROFILE_SYNC_INTERVAL_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(600)
});

/// Cadence of the provisioning retry scan.
pub static PROVISION_RETRY_INTERVAL_SECS: Lazy<u64> = Lazy::new(|| {
    std::env::var("PROVISION_RETRY_INTERVAL_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(60)
});

/// Base delay between retry attempts for one provisioning job; scaled linearly
/// with the attempt count.
pub static PROVISION_RETRY_BASE_DELAY_SECS: Lazy<u64> = Lazy::new(|| {
    std::env::var("PROVISION_RETRY_BASE_DELAY_SECS")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(120)
});

/// Payment gateway base URL. Defaults to the Daraja sandbox.
pub static MPESA_BASE_URL: Lazy<String> = Lazy::new(|| {
    std::env::var("MPESA_BASE_URL")
        .ok()
        .map(|value| value.trim().trim_end_matches('/').to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "https://sandbox.safaricom.co.ke".to_string())
});

/// Gateway consumer key. Must be set via `MPESA_CONSUMER_KEY`.
pub static MPESA_CONSUMER_KEY: Lazy<String> =
    Lazy::new(|| std::env::var("MPESA_CONSUMER_KEY").expect("MPESA_CONSUMER_KEY must be set"));

/// Gateway consumer secret, readable from `MPESA_CONSUMER_SECRET_FILE` as well.
pub static MPESA_CONSUMER_SECRET: Lazy<String> = Lazy::new(|| {
    read_secret_env("MPESA_CONSUMER_SECRET", "MPESA_CONSUMER_SECRET_FILE")
        .expect("MPESA_CONSUMER_SECRET must be set")
});

/// Paybill/till shortcode used as the push-payment party.
pub static MPESA_SHORTCODE: Lazy<String> =
    Lazy::new(|| std::env::var("MPESA_SHORTCODE").unwrap_or_else(|_| "174379".to_string()));

/// Passkey used to derive the push-payment password.
pub static MPESA_PASSKEY: Lazy<String> = Lazy::new(|| {
    read_secret_env("MPESA_PASSKEY", "MPESA_PASSKEY_FILE").expect("MPESA_PASSKEY must be set")
});

/// Publicly reachable URL the gateway posts payment confirmations to.
pub static MPESA_CALLBACK_URL: Lazy<String> =
    Lazy::new(|| std::env::var("MPESA_CALLBACK_URL").expect("MPESA_CALLBACK_URL must be set"));

fn truthy_env(key: &str) -> bool {
    std::env::var(key)
        .ok()
        .map(|value| {
            let normalized = value.trim().to_ascii_lowercase();
            matches!(normalized.as_str(), "1" | "true" | "yes")
        })
        .unwrap_or(false)
}

fn read_optional_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn read_secret_env(value_key: &str, file_key: &str) -> Option<String> {
    if let Some(path) = read_optional_env(file_key) {
        match fs::read_to_string(&path) {
            Ok(contents) => {
                let trimmed = contents.trim().to_string();
                if !trimmed.is_empty() {
                    return Some(trimmed);
                }
            }
            Err(err) => panic!("failed to read {file_key} from {path}: {err}"),
        }
    }

    read_optional_env(value_key)
}
