pub mod context_files;
pub mod file_processor;
pub mod schema_discovery;
pub mod sql_executor;
