pub use crate::builder::TableBuilder;
pub use crate::options::{KeepAliveOptions, SetOptions};
pub use crate::table::{Exchanger, NoopExchanger, Table};

#[cfg(feature = "metrics")]
pub use crate::metered::{MeteredTable, ResourceKey};
#[cfg(feature = "metrics")]
pub use crate::metrics::{FetchHistogram, FetchMetricsSnapshot, FetchObserver};
