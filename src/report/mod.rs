//! Report builder: fetch, aggregate, shape, cache

pub mod builder;
pub mod cache;
pub mod templates;
pub mod types;

pub use builder::ReportBuilder;
pub use cache::ReportCache;
pub use templates::TemplateRegistry;
pub use types::{
    AnalyticsData, CustomReport, DonationAnalytics, FinancialData, ImpactData, ReportMetadata,
    ReportResponse,
};
