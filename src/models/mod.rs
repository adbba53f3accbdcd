pub mod image_ref;
pub mod outcome;
pub mod record;

pub use image_ref::{ByteSource, ImageRef};
pub use outcome::{PipelineOutcome, UsageStats};
pub use record::{CatalogField, CatalogRow, ExtractedRecord, SENTINEL};
