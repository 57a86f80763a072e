pub mod fixtures;
pub mod repositories;
pub mod service;

pub use fixtures::{DemoDataset, SeedResult};
pub use repositories::RepositoryError;
pub use service::{
    ActionReceipt, ApprovalService, DashboardSummary, NewExpense, Repositories, ServiceSettings,
    StatusSummary,
};
