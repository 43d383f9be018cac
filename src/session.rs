use std::cell::Cell;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::catalog::CatalogSource;
use crate::host::{
    Address, BindError, DeclarationResolver, DiscoveredFunction, FunctionEnumerator,
    PrototypeBinder, SourcePicker, Status, StatusIndicator, TypeVocabulary,
};
use crate::types::{ParseResult, Prototype, TypeDatabase};

/// Function listing entry as exported by a disassembler script.
#[derive(Debug, Deserialize)]
struct ListingEntry {
    address: ListingAddress,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListingAddress {
    Number(u64),
    Text(String),
}

impl ListingAddress {
    fn resolve(&self) -> Result<Address> {
        match self {
            ListingAddress::Number(value) => Ok(*value),
            ListingAddress::Text(text) => parse_address(text),
        }
    }
}

pub(crate) fn parse_address(text: &str) -> Result<Address> {
    let trimmed = text.trim();
    let parsed = match trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
    {
        Some(hex) => Address::from_str_radix(hex, 16),
        None => trimmed.parse::<Address>(),
    };
    parsed.with_context(|| format!("invalid address {text:?}"))
}

/// Prototype attached to a function address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Binding {
    pub(crate) address: Address,
    pub(crate) name: String,
    pub(crate) prototype: Prototype,
}

/// Serialized form of a binding.
#[derive(Debug, Serialize)]
pub(crate) struct BindingRecord {
    pub(crate) address: String,
    pub(crate) name: String,
    pub(crate) prototype: String,
}

impl From<&Binding> for BindingRecord {
    fn from(binding: &Binding) -> Self {
        Self {
            address: format!("{:#x}", binding.address),
            name: binding.name.clone(),
            prototype: binding.prototype.to_string(),
        }
    }
}

/// In-memory analysis session: discovered functions, type vocabulary and applied prototypes.
#[derive(Debug, Default)]
pub(crate) struct AnalysisSession {
    functions: Vec<DiscoveredFunction>,
    /// Position of the first function at each address.
    index: BTreeMap<Address, usize>,
    types: TypeDatabase,
    bindings: BTreeMap<Address, Binding>,
}

impl AnalysisSession {
    pub(crate) fn new(functions: Vec<DiscoveredFunction>) -> Self {
        let mut index = BTreeMap::new();
        for (position, function) in functions.iter().enumerate() {
            index.entry(function.address).or_insert(position);
        }
        Self {
            functions,
            index,
            ..Self::default()
        }
    }

    /// Open a JSON function listing (`[{"address": .., "name": ..}]`).
    pub(crate) fn from_listing(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let functions = parse_listing(BufReader::new(file))
            .with_context(|| format!("failed to read function listing {}", path.display()))?;
        debug!(functions = functions.len(), path = %path.display(), "opened session");
        Ok(Self::new(functions))
    }

    pub(crate) fn function_count(&self) -> usize {
        self.functions.len()
    }

    #[cfg(test)]
    pub(crate) fn binding(&self, address: Address) -> Option<&Binding> {
        self.bindings.get(&address)
    }

    /// Bindings in address order.
    pub(crate) fn bindings(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.values()
    }

    pub(crate) fn binding_records(&self) -> Vec<BindingRecord> {
        self.bindings().map(BindingRecord::from).collect()
    }
}

pub(crate) fn parse_listing<R: Read>(reader: R) -> Result<Vec<DiscoveredFunction>> {
    let entries: Vec<ListingEntry> =
        serde_json::from_reader(reader).context("function listing must be a JSON array")?;
    entries
        .into_iter()
        .map(|entry| {
            let address = entry
                .address
                .resolve()
                .with_context(|| format!("bad address for {}", entry.name))?;
            Ok(DiscoveredFunction::new(address, entry.name))
        })
        .collect()
}

impl FunctionEnumerator for AnalysisSession {
    fn functions(&self) -> Box<dyn Iterator<Item = DiscoveredFunction> + '_> {
        Box::new(self.functions.iter().cloned())
    }
}

impl DeclarationResolver for AnalysisSession {
    fn resolve(&self, declaration: &str) -> ParseResult<Prototype> {
        self.types.resolve(declaration)
    }
}

impl TypeVocabulary for AnalysisSession {
    fn has_type(&self, name: &str) -> bool {
        self.types.has_type(name)
    }

    fn load_header(&mut self, source: &str) -> ParseResult<usize> {
        self.types.load_header(source)
    }
}

impl PrototypeBinder for AnalysisSession {
    fn bind(&mut self, address: Address, prototype: &Prototype) -> Result<(), BindError> {
        let function = self
            .index
            .get(&address)
            .map(|&position| &self.functions[position])
            .ok_or(BindError::NoFunction(address))?;
        let binding = Binding {
            address,
            name: function.name.clone(),
            prototype: prototype.clone(),
        };
        if self.bindings.insert(address, binding).is_some() {
            debug!("replaced prototype at {:#x}", address);
        }
        Ok(())
    }
}

/// Status indicator that only reports transitions to the log.
#[derive(Debug, Default)]
pub(crate) struct ConsoleStatus {
    current: Cell<Status>,
}

impl StatusIndicator for ConsoleStatus {
    fn set_status(&self, status: Status) -> Status {
        let prior = self.current.replace(status);
        if prior != status {
            debug!(?prior, ?status, "status changed");
        }
        prior
    }
}

/// Picks the catalog given on the command line, or asks for one on stdin.
///
/// `-` selects stdin itself as the catalog stream.
pub(crate) struct ConsolePicker {
    preset: Option<PathBuf>,
    input: Option<Box<dyn BufRead>>,
}

impl ConsolePicker {
    pub(crate) fn new(preset: Option<PathBuf>) -> Self {
        Self::with_input(preset, Box::new(BufReader::new(io::stdin())))
    }

    pub(crate) fn with_input(preset: Option<PathBuf>, input: Box<dyn BufRead>) -> Self {
        Self {
            preset,
            input: Some(input),
        }
    }
}

impl SourcePicker for ConsolePicker {
    fn pick(&mut self) -> Option<CatalogSource> {
        let path = match self.preset.take() {
            Some(path) => path,
            None => prompt_for_path(self.input.as_mut()?, io::stderr())?,
        };
        if path == Path::new("-") {
            let input = self.input.take()?;
            return Some(CatalogSource::Reader(Box::new(input)));
        }
        Some(CatalogSource::Path(path))
    }
}

fn prompt_for_path<R: BufRead, W: Write>(mut input: R, mut prompt: W) -> Option<PathBuf> {
    // A failed prompt is treated like a cancelled selection.
    write!(prompt, "Select json signature file (empty to cancel): ").ok()?;
    prompt.flush().ok()?;
    let mut line = String::new();
    input.read_line(&mut line).ok()?;
    let answer = line.trim();
    if answer.is_empty() {
        None
    } else {
        Some(PathBuf::from(answer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CType;
    use std::io::Cursor;

    fn prototype(name: &str) -> Prototype {
        Prototype {
            name: name.to_string(),
            return_type: CType::named("int"),
            params: Vec::new(),
            variadic: false,
        }
    }

    #[test]
    fn parse_listing_accepts_hex_and_decimal_addresses() {
        let listing = r#"[
            {"address": "0x1000", "name": "Java_A_b"},
            {"address": 8192, "name": "JNI_OnLoad"},
            {"address": "12288", "name": "sub_3000"}
        ]"#;

        let functions = parse_listing(Cursor::new(listing)).expect("parse listing");

        assert_eq!(
            vec![
                DiscoveredFunction::new(0x1000, "Java_A_b"),
                DiscoveredFunction::new(0x2000, "JNI_OnLoad"),
                DiscoveredFunction::new(0x3000, "sub_3000"),
            ],
            functions
        );
    }

    #[test]
    fn parse_listing_rejects_bad_addresses() {
        let result = parse_listing(Cursor::new(r#"[{"address": "0xzz", "name": "f"}]"#));

        let err = result.expect_err("bad address");
        assert!(format!("{err:#}").contains("bad address for f"));
    }

    #[test]
    fn parse_listing_rejects_objects() {
        assert!(parse_listing(Cursor::new(r#"{"0x1000": "f"}"#)).is_err());
    }

    #[test]
    fn from_listing_reads_file() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("functions.json");
        std::fs::write(&path, r#"[{"address": "0x10", "name": "JNI_OnLoad"}]"#)
            .expect("write listing");

        let session = AnalysisSession::from_listing(&path).expect("open session");

        assert_eq!(1, session.function_count());
        assert_eq!(
            vec![DiscoveredFunction::new(0x10, "JNI_OnLoad")],
            session.functions().collect::<Vec<_>>()
        );
    }

    #[test]
    fn bind_replaces_prior_prototype() {
        let mut session = AnalysisSession::new(vec![DiscoveredFunction::new(0x10, "f")]);

        session.bind(0x10, &prototype("first")).expect("first bind");
        session.bind(0x10, &prototype("second")).expect("second bind");

        assert_eq!(1, session.bindings().count());
        let binding = session.binding(0x10).expect("binding");
        assert_eq!("f", binding.name);
        assert_eq!("second", binding.prototype.name);
    }

    #[test]
    fn bind_rejects_unknown_addresses() {
        let mut session = AnalysisSession::new(vec![DiscoveredFunction::new(0x10, "f")]);

        let err = session.bind(0x20, &prototype("g")).expect_err("no function");

        assert_eq!(BindError::NoFunction(0x20), err);
    }

    #[test]
    fn bind_names_first_function_at_shared_address() {
        let mut session = AnalysisSession::new(vec![
            DiscoveredFunction::new(0x30, "c"),
            DiscoveredFunction::new(0x10, "a"),
            DiscoveredFunction::new(0x10, "a_alias"),
        ]);

        session.bind(0x10, &prototype("a")).expect("bind a");
        session.bind(0x30, &prototype("c")).expect("bind c");

        assert_eq!("a", session.binding(0x10).expect("binding a").name);
        assert_eq!("c", session.binding(0x30).expect("binding c").name);
        assert_eq!(3, session.function_count());
    }

    #[test]
    fn binding_records_use_hex_addresses() {
        let mut session = AnalysisSession::new(vec![
            DiscoveredFunction::new(0x20, "b"),
            DiscoveredFunction::new(0x10, "a"),
        ]);
        session.bind(0x20, &prototype("b")).expect("bind b");
        session.bind(0x10, &prototype("a")).expect("bind a");

        let records = session.binding_records();
        let value = serde_json::to_value(&records).expect("serialize records");

        assert_eq!("0x10", value[0]["address"]);
        assert_eq!("a", value[0]["name"]);
        assert_eq!("int a(void)", value[0]["prototype"]);
        assert_eq!("0x20", value[1]["address"]);
    }

    #[test]
    fn console_status_returns_prior_status() {
        let status = ConsoleStatus::default();

        assert_eq!(Status::Ready, status.set_status(Status::Working));
        assert_eq!(Status::Working, status.set_status(Status::Ready));
    }

    #[test]
    fn prompt_accepts_path_and_cancels_on_empty_answer() {
        let mut prompt = Vec::new();

        let path = prompt_for_path(Cursor::new("lib_jni_sign.json\n"), &mut prompt);

        assert_eq!(Some(PathBuf::from("lib_jni_sign.json")), path);
        assert!(String::from_utf8_lossy(&prompt).contains("Select json signature file"));
        assert_eq!(None, prompt_for_path(Cursor::new("  \n"), Vec::new()));
        assert_eq!(None, prompt_for_path(Cursor::new(""), Vec::new()));
    }

    #[test]
    fn preset_picker_yields_path_once() {
        let mut picker = ConsolePicker::new(Some(PathBuf::from("sig.json")));

        let source = picker.pick().expect("preset source");

        assert!(matches!(source, CatalogSource::Path(path) if path == Path::new("sig.json")));
    }

    #[test]
    fn dash_selects_input_stream() {
        let mut picker = ConsolePicker::with_input(None, Box::new(Cursor::new("-\n{}")));

        let Some(CatalogSource::Reader(mut reader)) = picker.pick() else {
            panic!("expected stream source");
        };
        let mut rest = String::new();
        reader.read_to_string(&mut rest).expect("read stream");

        assert_eq!("{}", rest);
        assert!(picker.pick().is_none());
    }
}
