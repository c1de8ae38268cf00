pub mod client;
pub mod config;
pub mod health;
pub mod launch_plan;
pub mod process;
pub mod supervisor;

pub use config::SupervisorConfig;
pub use supervisor::{BackendPhase, Supervisor, SupervisorError};
