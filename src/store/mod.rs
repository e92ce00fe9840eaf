pub mod enrollment_store;
pub mod record_storage;
