//! Locker storage backends
//!
//! This crate provides the concrete [`Storage`](locker_core::Storage)
//! implementations: local disk, S3-compatible object storage, and RAM,
//! plus the configuration used to build and register them.

pub mod config;
pub mod disk;
pub mod ram;
pub mod s3;

pub use config::{BackendConfig, DiskConfig, RamConfig, StorageConfig, register_all};
pub use disk::DiskStorage;
pub use ram::RamStorage;
pub use s3::{S3Config, S3Storage};
