mod action;
mod report;
pub mod router;

pub use action::{ActionHandler, Sinks};
pub use report::*;
pub use router::{RouterBuilder, TopicRouter};
