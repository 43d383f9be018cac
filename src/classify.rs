/// Name of the hook the VM calls after loading a native library.
pub(crate) const LOAD_HOOK: &str = "JNI_OnLoad";
/// Name of the hook the VM calls before unloading a native library.
pub(crate) const UNLOAD_HOOK: &str = "JNI_OnUnload";
/// Prefix shared by every statically registered native method.
pub(crate) const EXPORT_PREFIX: &str = "Java_";

/// Role a discovered function plays in the JNI bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Kind {
    BridgeExport,
    LoadHook,
    UnloadHook,
    Irrelevant,
}

/// Classify a function by name. Hooks match exactly, exports by prefix.
pub(crate) fn classify(name: &str) -> Kind {
    if name == LOAD_HOOK {
        Kind::LoadHook
    } else if name == UNLOAD_HOOK {
        Kind::UnloadHook
    } else if name.starts_with(EXPORT_PREFIX) {
        Kind::BridgeExport
    } else {
        Kind::Irrelevant
    }
}

/// Java-side identity of a bridge export.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct JavaMethodName {
    pub(crate) class_name: String,
    pub(crate) method_name: String,
    /// Argument descriptor of an overloaded method, e.g. `Ljava/lang/String;I`.
    pub(crate) signature: Option<String>,
}

impl JavaMethodName {
    pub(crate) fn qualified(&self) -> String {
        format!("{}.{}", self.class_name, self.method_name)
    }
}

/// Decode a `Java_` export name back to its class, method and optional overload signature.
pub(crate) fn demangle(name: &str) -> Option<JavaMethodName> {
    let mangled = name.strip_prefix(EXPORT_PREFIX)?;
    let (path, signature) = match mangled.split_once("__") {
        Some((path, signature)) => (path, Some(signature)),
        None => (mangled, None),
    };

    let qualified = unescape(path, '.')?;
    let (class_name, method_name) = qualified.rsplit_once('.')?;
    if class_name.is_empty() || method_name.is_empty() {
        return None;
    }
    let signature = match signature {
        Some(signature) => Some(unescape(signature, '/')?),
        None => None,
    };

    Some(JavaMethodName {
        class_name: class_name.to_string(),
        method_name: method_name.to_string(),
        signature,
    })
}

fn unescape(mangled: &str, separator: char) -> Option<String> {
    let mut out = String::with_capacity(mangled.len());
    let mut chars = mangled.chars();
    while let Some(ch) = chars.next() {
        if ch != '_' {
            out.push(ch);
            continue;
        }
        let mut lookahead = chars.clone();
        match lookahead.next() {
            Some('1') => out.push('_'),
            Some('2') => out.push(';'),
            Some('3') => out.push('['),
            Some('0') => {
                let hex: String = lookahead.by_ref().take(4).collect();
                if hex.len() != 4 {
                    return None;
                }
                let unit = u32::from_str_radix(&hex, 16).ok()?;
                out.push(char::from_u32(unit)?);
            }
            _ => {
                out.push(separator);
                continue;
            }
        }
        chars = lookahead;
    }
    Some(out)
}
