use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::catalog::{self, CatalogError};
use crate::engine::{apply_catalog, ensure_jni_header, ApplicationResult};
use crate::host::{Host, SourcePicker, Status, StatusGuard, StatusIndicator};

/// "Apply JSON signatures to JNI functions" command.
///
/// The command is stateless; hosts call `setup` once, `execute` per
/// invocation and `teardown` when unloading.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct JniHelperCommand;

impl JniHelperCommand {
    pub(crate) const NAME: &'static str = "JNI Helper";

    pub(crate) fn setup(&self) {
        debug!(command = Self::NAME, "setup");
    }

    /// Run one application pass.
    ///
    /// `arg` distinguishes interactive (0) from unattended runs and is
    /// accepted for compatibility only. Returns `None` when no catalog was
    /// selected.
    pub(crate) fn execute<H, P>(
        &self,
        host: &mut H,
        picker: &mut P,
        status: &dyn StatusIndicator,
        arg: i32,
    ) -> Result<Option<ApplicationResult>>
    where
        H: Host + ?Sized,
        P: SourcePicker + ?Sized,
    {
        debug!(command = Self::NAME, arg, "execute");
        if ensure_jni_header(host).context("failed to load bundled jni.h")? {
            info!("loaded jni.h");
        }

        let _working = StatusGuard::acquire(status, Status::Working);
        let catalog = match catalog::load(picker.pick()) {
            Ok(catalog) => catalog,
            Err(CatalogError::SourceUnavailable) => {
                info!("no signature file selected");
                return Ok(None);
            }
            Err(err) => return Err(err).context("failed to load signature file"),
        };

        Ok(Some(apply_catalog(host, &catalog)))
    }

    pub(crate) fn teardown(&self) {
        debug!(command = Self::NAME, "teardown");
    }
}
