//! The sectioned document format: reading with include indirection and a
//! content hash, canonical writing, and summary reporting.

mod hashing;
mod reader;
mod report;
mod writer;

pub use reader::{
    load_scenario, read_scenario, reload_section, DocError, DocErrorCode, DocReadError,
    SourceLocation,
};
pub use report::ScenarioSummary;
pub use writer::{
    render_root, render_section_document, save_scenario, save_section, DocWriteError,
};
