pub mod admin_service;
pub mod auth_service;
pub mod availability_service;
pub mod dashboard_service;
pub mod link_service;
pub mod retry;
pub mod view_settings_service;
