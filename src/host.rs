use thiserror::Error;

use crate::catalog::CatalogSource;
use crate::types::{ParseResult, Prototype};

/// Address of a function inside the analysed binary.
pub(crate) type Address = u64;

/// Function discovered by the analysis session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct DiscoveredFunction {
    pub(crate) address: Address,
    pub(crate) name: String,
}

impl DiscoveredFunction {
    pub(crate) fn new(address: Address, name: impl Into<String>) -> Self {
        Self {
            address,
            name: name.into(),
        }
    }
}

/// Errors raised when a prototype cannot be attached to an address.
#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum BindError {
    #[error("no function at {0:#x}")]
    NoFunction(Address),
}

/// Enumerates every function known to the session, in discovery order.
pub(crate) trait FunctionEnumerator {
    fn functions(&self) -> Box<dyn Iterator<Item = DiscoveredFunction> + '_>;
}

/// Turns a C declaration into a prototype.
pub(crate) trait DeclarationResolver {
    fn resolve(&self, declaration: &str) -> ParseResult<Prototype>;
}

/// Attaches prototypes to addresses. Binding an address again replaces the prior prototype.
pub(crate) trait PrototypeBinder {
    fn bind(&mut self, address: Address, prototype: &Prototype) -> Result<(), BindError>;
}

/// Named type registry fed by headers.
pub(crate) trait TypeVocabulary {
    fn has_type(&self, name: &str) -> bool;
    fn load_header(&mut self, source: &str) -> ParseResult<usize>;
}

/// Asks for a catalog source; `None` means the selection was cancelled.
pub(crate) trait SourcePicker {
    fn pick(&mut self) -> Option<CatalogSource>;
}

/// Host status shown to the user while a command runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum Status {
    #[default]
    Ready,
    Working,
}

/// Sets the host status and returns the previous one.
pub(crate) trait StatusIndicator {
    fn set_status(&self, status: Status) -> Status;
}

/// Everything the applier needs from an analysis session.
pub(crate) trait Host:
    FunctionEnumerator + DeclarationResolver + PrototypeBinder + TypeVocabulary
{
}

impl<T> Host for T where
    T: FunctionEnumerator + DeclarationResolver + PrototypeBinder + TypeVocabulary + ?Sized
{
}

/// Holds a status until dropped, then restores the prior one.
pub(crate) struct StatusGuard<'a> {
    indicator: &'a dyn StatusIndicator,
    prior: Status,
}

impl<'a> StatusGuard<'a> {
    pub(crate) fn acquire(indicator: &'a dyn StatusIndicator, status: Status) -> Self {
        let prior = indicator.set_status(status);
        Self { indicator, prior }
    }
}

impl Drop for StatusGuard<'_> {
    fn drop(&mut self) {
        self.indicator.set_status(self.prior);
    }
}
