pub mod dates;
pub mod dedup;
pub mod early_stop;
pub mod extractor;
pub mod harvest;
pub mod locator;
pub mod pagination;
pub mod profile;
pub mod run_log;
pub mod stats;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;
pub mod webdriver;

pub use harvest::{HarvestReport, Harvester};
