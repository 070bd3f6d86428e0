//! Scan pipeline and payment configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the scan pipeline and its supporting services.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Root directory for uploaded documents (default: `uploads`).
    pub upload_dir: PathBuf,
    /// Root directory for spreadsheet exports (default: `exports`).
    pub export_dir: PathBuf,
    /// Length of the random upload-path prefix tried first.
    pub initial_id_len: usize,
    /// Longest prefix tried before giving up.
    pub max_id_len: usize,
    /// Collisions tolerated at one prefix length before escalating.
    pub path_retries: u32,
    pub category_cache_ttl: Duration,
    pub category_cache_capacity: usize,
    /// Minimum gap between two `last_active_at` writes for one organization.
    pub last_active_threshold: Duration,
    pub last_active_capacity: usize,
    /// Bounding box of scan thumbnails, in pixels.
    pub thumbnail_size: u32,
    pub thumbnail_quality: u8,
    /// JPEG quality of the image sent to the extraction model.
    pub upload_quality: u8,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            export_dir: PathBuf::from("exports"),
            initial_id_len: 7,
            max_id_len: 10,
            path_retries: 5,
            category_cache_ttl: Duration::from_secs(5 * 60),
            category_cache_capacity: 1000,
            last_active_threshold: Duration::from_secs(10 * 60),
            last_active_capacity: 10_000,
            thumbnail_size: 128,
            thumbnail_quality: 60,
            upload_quality: 80,
        }
    }
}

/// Configuration for the payment provider.
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    /// Secret API key. Empty disables the provider.
    pub api_key: String,
    pub base_url: String,
    /// Metered price every subscription is created on.
    pub price_id: String,
    pub trial_period_days: u32,
    pub request_timeout: Duration,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.stripe.com/v1".into(),
            price_id: String::new(),
            trial_period_days: 7,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl PaymentConfig {
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}
