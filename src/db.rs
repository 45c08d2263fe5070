pub mod activity_repo;
pub use activity_repo::ActivityRepository;
pub mod contract_repo;
pub use contract_repo::ContractRepository;
pub mod pipeline_repo;
pub use pipeline_repo::PipelineRepository;
pub mod rbac_repo;
pub use rbac_repo::RbacRepository;
pub mod task_repo;
pub use task_repo::TaskRepository;
pub mod user_repo;
pub use user_repo::UserRepository;
