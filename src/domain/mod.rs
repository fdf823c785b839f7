pub mod campaign;
pub mod donation;
pub mod media;
pub mod region;
pub mod report;
pub mod user;
