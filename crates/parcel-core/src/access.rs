//! Access checks applied while resolving and mutating shared state.

use crate::model::Package;
use crate::store::Blob;

/// Decides what the current caller may see and modify.
///
/// Write checks return an error carrying the reason for the refusal.
pub trait AccessPolicy: Send + Sync {
    fn can_read(&self, _package: &Package) -> bool {
        true
    }

    fn check_package_write(&self, package: &Package) -> anyhow::Result<()>;

    fn check_blob_write(&self, blob: &Blob) -> anyhow::Result<()>;
}

/// Grants everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn check_package_write(&self, _package: &Package) -> anyhow::Result<()> {
        Ok(())
    }

    fn check_blob_write(&self, _blob: &Blob) -> anyhow::Result<()> {
        Ok(())
    }
}
