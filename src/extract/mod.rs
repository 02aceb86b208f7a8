//! Archive extraction
//!
//! [`tool`] runs the external extractor for one archive and classifies the
//! result. [`scheduler`] spreads the discovered archives over a worker pool.

pub mod scheduler;
pub mod tool;

pub use scheduler::{ExtractionReport, ExtractionScheduler, FailedArchive};
pub use tool::{ChildRegistry, ExitClass, ExtractionOutcome, Extractor, SevenZip};
