use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::catalog::Catalog;
use crate::classify::{classify, Kind};
use crate::host::{
    Address, BindError, DeclarationResolver, DiscoveredFunction, Host, PrototypeBinder,
    TypeVocabulary,
};
use crate::prototype::{export_declaration, hook_declaration};
use crate::types::ParseError;

/// JNI vocabulary loaded when the session does not know `JNIEnv` yet.
pub(crate) const BUNDLED_JNI_HEADER: &str = include_str!("../jni_headers/jni.h");

/// What happened to one discovered function.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Outcome {
    Applied,
    Skipped,
    Unmatched,
}

/// Why a prototype could not be applied to a function with a known signature.
#[derive(Debug, Error)]
pub(crate) enum ApplyError {
    #[error("malformed catalog entry: {0}")]
    MalformedEntry(#[source] serde_json::Error),

    #[error("declaration rejected: {0}")]
    Declaration(#[from] ParseError),

    #[error(transparent)]
    Bind(#[from] BindError),
}

/// A function whose prototype could not be applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct BindFailure {
    pub(crate) address: Address,
    pub(crate) name: String,
    pub(crate) reason: String,
}

/// Tally of one application pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct ApplicationResult {
    pub(crate) successes: usize,
    /// Exports without a catalog entry, in discovery order.
    pub(crate) unmatched: Vec<String>,
    pub(crate) failures: Vec<BindFailure>,
}

impl ApplicationResult {
    pub(crate) fn summary(&self) -> String {
        format!(
            "JNI functions loaded, {} success. {} failed. \n{}",
            self.successes,
            self.unmatched.len(),
            self.unmatched.join("\n")
        )
    }
}

/// Load the bundled JNI header unless the vocabulary already knows `JNIEnv`.
///
/// Returns whether the header was loaded.
pub(crate) fn ensure_jni_header<T: TypeVocabulary + ?Sized>(types: &mut T) -> Result<bool, ParseError> {
    if types.has_type("JNIEnv") {
        return Ok(false);
    }
    info!("loading bundled jni.h");
    let added = types.load_header(BUNDLED_JNI_HEADER)?;
    debug!(types = added, "registered JNI types");
    Ok(true)
}

/// Apply the matching prototype to a single function.
pub(crate) fn apply_function<H>(
    host: &mut H,
    function: &DiscoveredFunction,
    kind: Kind,
    catalog: &Catalog,
) -> Result<Outcome, ApplyError>
where
    H: DeclarationResolver + PrototypeBinder + ?Sized,
{
    let declaration = if let Some(hook) = hook_declaration(kind) {
        hook.to_string()
    } else if kind == Kind::BridgeExport {
        let Some(descriptor) = catalog.descriptor(&function.name) else {
            warn!(name = %function.name, "no signature found");
            return Ok(Outcome::Unmatched);
        };
        let descriptor = descriptor.map_err(ApplyError::MalformedEntry)?;
        export_declaration(&function.name, &descriptor)
    } else {
        return Ok(Outcome::Skipped);
    };

    info!("apply {:#x} {}", function.address, function.name);
    debug!(%declaration);
    let prototype = host.resolve(&declaration)?;
    host.bind(function.address, &prototype)?;
    Ok(Outcome::Applied)
}

/// Classify every discovered function and apply prototypes where possible.
pub(crate) fn apply_catalog<H: Host + ?Sized>(host: &mut H, catalog: &Catalog) -> ApplicationResult {
    let functions: Vec<DiscoveredFunction> = host.functions().collect();
    let mut result = ApplicationResult::default();

    for function in &functions {
        let kind = classify(&function.name);
        match apply_function(host, function, kind, catalog) {
            Ok(Outcome::Applied) => result.successes += 1,
            Ok(Outcome::Unmatched) => result.unmatched.push(function.name.clone()),
            Ok(Outcome::Skipped) => {}
            Err(err) => {
                error!("failed to apply {:#x} {}: {}", function.address, function.name, err);
                result.failures.push(BindFailure {
                    address: function.address,
                    name: function.name.clone(),
                    reason: err.to_string(),
                });
                // Hooks are counted even when the host rejects them.
                if matches!(kind, Kind::LoadHook | Kind::UnloadHook) {
                    result.successes += 1;
                }
            }
        }
    }

    result
}
