pub mod export_worker;

pub use export_worker::{ExportProcessor, ExportWorker};
