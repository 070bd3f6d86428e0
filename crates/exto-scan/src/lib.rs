//! Exto Scan — the scanning pipeline and the services around it.
//!
//! Uploads are stored under unique paths, sent through extraction, and
//! persisted as category data with a scan-history audit entry. Usage is
//! metered against the organization's payment customer.

pub mod accounts;
pub mod batches;
pub mod cache;
pub mod categories;
pub mod config;
pub mod error;
pub mod export;
pub mod files;
pub mod imaging;
pub mod metering;
pub mod organizations;
pub mod records;
pub mod scan;

pub use accounts::AccountService;
pub use batches::BatchService;
pub use cache::BoundedTtlCache;
pub use categories::CategoryRegistry;
pub use config::{PaymentConfig, ScanConfig};
pub use error::{ScanError, ScanResult};
pub use export::{ExportService, ExportedWorkbook, Workbook};
pub use files::{IdSource, RandomIdSource, UniquePathAllocator};
pub use metering::{
    MeterService, PaymentProvider, PaymentService, StripeClient, UsageRecorder,
};
pub use organizations::OrganizationService;
pub use records::CategoryDataService;
pub use scan::{ScanOrchestrator, ScanRequest, ScanStage};
