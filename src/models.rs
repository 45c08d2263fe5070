pub mod activities;
pub mod auth;
pub mod contracts;
pub mod pipeline;
pub mod rbac;
pub mod tasks;
