mod invoke;
mod log;
mod metric;

pub use invoke::InvokeAction;
pub use log::{LogAction, LogConfig};
pub use metric::{MetricAction, MetricConfig};
