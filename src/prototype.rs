use crate::catalog::MethodDescriptor;
use crate::classify::Kind;

pub(crate) const LOAD_HOOK_DECLARATION: &str = "jint JNI_OnLoad(JavaVM *vm, void *reserved)";
pub(crate) const UNLOAD_HOOK_DECLARATION: &str = "void JNI_OnUnload(JavaVM *vm, void *reserved)";

/// Fixed declaration for a lifecycle hook, `None` for other kinds.
pub(crate) fn hook_declaration(kind: Kind) -> Option<&'static str> {
    match kind {
        Kind::LoadHook => Some(LOAD_HOOK_DECLARATION),
        Kind::UnloadHook => Some(UNLOAD_HOOK_DECLARATION),
        Kind::BridgeExport | Kind::Irrelevant => None,
    }
}

/// Build the native-side declaration of an exported method.
///
/// The VM passes `JNIEnv*` first, then the receiver (`jclass` for static
/// methods, `jobject` otherwise), then the Java arguments as `arg1..argN`.
pub(crate) fn export_declaration(name: &str, descriptor: &MethodDescriptor) -> String {
    let mut decl = format!("{} {}(JNIEnv* env, ", descriptor.return_type, name);
    if descriptor.is_static {
        decl.push_str("jclass clazz");
    } else {
        decl.push_str("jobject thiz");
    }
    for (index, arg_type) in descriptor.argument_types.iter().enumerate() {
        decl.push_str(&format!(", {} arg{}", arg_type, index + 1));
    }
    decl.push(')');
    decl
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(return_type: &str, is_static: bool, argument_types: &[&str]) -> MethodDescriptor {
        MethodDescriptor {
            return_type: return_type.to_string(),
            is_static,
            argument_types: argument_types.iter().map(|ty| ty.to_string()).collect(),
        }
    }

    #[test]
    fn static_method_declaration() {
        let decl = export_declaration(
            "Java_com_x_Y_foo",
            &descriptor("jint", true, &["jstring", "jint"]),
        );

        assert_eq!(
            "jint Java_com_x_Y_foo(JNIEnv* env, jclass clazz, jstring arg1, jint arg2)",
            decl
        );
    }

    #[test]
    fn instance_method_declaration_without_arguments() {
        let decl = export_declaration("Java_com_x_Y_bar", &descriptor("void", false, &[]));

        assert_eq!("void Java_com_x_Y_bar(JNIEnv* env, jobject thiz)", decl);
    }

    #[test]
    fn argument_order_is_preserved() {
        let decl = export_declaration(
            "Java_A_b",
            &descriptor("jobject", false, &["jlong", "jbyteArray", "jboolean"]),
        );

        assert_eq!(
            "jobject Java_A_b(JNIEnv* env, jobject thiz, jlong arg1, jbyteArray arg2, jboolean arg3)",
            decl
        );
    }

    #[test]
    fn hook_declarations_are_fixed() {
        assert_eq!(
            Some("jint JNI_OnLoad(JavaVM *vm, void *reserved)"),
            hook_declaration(Kind::LoadHook)
        );
        assert_eq!(
            Some("void JNI_OnUnload(JavaVM *vm, void *reserved)"),
            hook_declaration(Kind::UnloadHook)
        );
        assert_eq!(None, hook_declaration(Kind::BridgeExport));
        assert_eq!(None, hook_declaration(Kind::Irrelevant));
    }
}
