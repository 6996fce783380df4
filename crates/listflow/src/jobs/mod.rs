pub mod dispatch;
pub mod model;
pub mod repo;
pub mod worker;

pub use dispatch::{CronOutcome, Dispatcher};
pub use model::{Campaign, CampaignStatus, DeliveryJob, JobStatus};
pub use repo::{CampaignsRepo, JobsRepo};
pub use worker::{DeliveryContext, DeliveryWorker, JobOutcome, RunSummary};
