pub mod activity_service;
pub mod auth;
pub mod commission;
pub mod contract_service;
pub mod pipeline_service;
pub mod rbac_service;
pub mod rules;
pub mod task_service;
