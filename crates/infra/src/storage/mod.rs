//! Blob storage adapters

pub mod file_blob;

pub use file_blob::FileBlobStorage;
