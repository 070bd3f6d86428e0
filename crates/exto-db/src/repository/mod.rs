//! SurrealDB repository implementations.

mod batch;
mod category;
mod category_data;
mod format;
mod identity;
mod meter_event;
mod organization;
mod registration;
mod scan_history;
mod subscription;
mod user;

pub use batch::SurrealBatchRepository;
pub use category::SurrealCategoryRepository;
pub use category_data::SurrealCategoryDataRepository;
pub use format::SurrealFormatRepository;
pub use identity::SurrealIdentityRepository;
pub use meter_event::SurrealMeterEventRepository;
pub use organization::SurrealOrganizationRepository;
pub use registration::SurrealRegistrationRepository;
pub use scan_history::SurrealScanHistoryRepository;
pub use subscription::SurrealSubscriptionRepository;
pub use user::SurrealUserRepository;
