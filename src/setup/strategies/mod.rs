//! Acquisition strategy implementations

pub mod container;
pub mod download;
pub mod git;
pub mod local;

pub use container::ExtractFromContainer;
pub use download::DownloadFromCatalog;
pub use git::BuildFromGit;
pub use local::LocalBinary;
