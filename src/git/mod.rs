pub mod operations;
pub mod repository;
pub mod runner;
pub mod types;
pub mod worker;

pub use repository::{WorkTree, locate};
pub use runner::VcsRunner;
pub use types::*;
pub use worker::{Task, TaskQueue};
