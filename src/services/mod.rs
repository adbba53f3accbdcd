pub mod image_normalizer;
pub mod image_source;
pub mod llm_service;
pub mod report_writer;
pub mod response_parser;
pub mod sheet_writer;

pub use image_normalizer::{CanonicalImage, ImageNormalizer};
pub use image_source::{FileSource, LocalDirSource};
pub use llm_service::{Infer, InferenceReply, LlmService};
pub use report_writer::ReportWriter;
pub use sheet_writer::{RowSink, SheetWriter};
