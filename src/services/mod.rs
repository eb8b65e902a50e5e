pub mod auth_service;
pub mod capture_workflow;
pub mod media_store;
