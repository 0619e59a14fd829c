pub mod company;
pub mod dashboard;
pub mod link;
pub mod metric;
pub mod profile;
pub mod quarter;
pub mod record;
pub mod settings;
