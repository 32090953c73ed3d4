//! HTTP API handlers for weasel-ai

pub mod admin;
pub mod analysis;
pub mod evaluate;
pub mod files;
pub mod health;
pub mod process;
pub mod upload;

pub use admin::admin_routes;
pub use analysis::analysis_routes;
pub use evaluate::evaluate_routes;
pub use files::file_routes;
pub use health::health_routes;
pub use process::process_routes;
pub use upload::upload_routes;
