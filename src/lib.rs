pub mod aop;
pub mod components;
pub mod config;
pub mod engine;
pub mod sinks;
pub mod sql;
pub mod topic;
pub mod types;
pub mod utils;

pub use config::RouterConfig;
pub use engine::{RoutingReport, TopicRouter};
pub use types::*;
