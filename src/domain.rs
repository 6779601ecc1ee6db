//! Domain module - Core archive entities
//!
//! This module contains the value types the acquisition pipeline passes around:
//! gallery image descriptors, parsed detail pages, server-issued download
//! parameters, failure records and scraped artifact metadata.
//!
//! Modern Rust module organization (Rust 2018+ style):
//! - Each module is its own file in the domain/ directory
//! - Public exports are defined here for convenience

pub mod constants;
pub mod failure;
pub mod image;
pub mod metadata;

pub use failure::FailureRecord;
pub use image::{DownloadParams, ImageDescriptor, ItemDetailPage};
pub use metadata::{ArtifactMetadata, MetadataSection};
