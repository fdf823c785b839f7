pub mod campaigns;
pub mod donations;
pub mod error;
pub mod media;
pub mod query;
pub mod regions;
pub mod reports;
