//! Class fingerprinting and entry-point detection.
//!
//! A class fingerprint is the sorted list of its direct method signatures,
//! joined with `|`. Two parses of a file yield equal fingerprints whenever no
//! method was added, removed, or had its positional parameters changed.

use rustc_hash::FxHashMap;
use tree_sitter::{Node, Tree};

use crate::import::node_text;

/// Class name to method-signature fingerprint.
///
/// Nested classes are keyed by their dotted path (`Outer.Inner`).
pub type ClassSignatures = FxHashMap<String, String>;

/// Name of the function an extension module must define at top level.
const SETUP_FUNCTION: &str = "setup";

/// Extracts a fingerprint for every class defined anywhere in the tree.
///
/// # Examples
///
/// ```
/// use hr_py_parser::PyParser;
///
/// let mut parser = PyParser::new()?;
/// let source = "class Ping:\n    def pong(self, ctx):\n        pass\n    async def cog_load(self):\n        pass\n";
/// let result = parser.parse(source)?;
///
/// assert_eq!(result.classes["Ping"], "cog_load(self)|pong(self, ctx)");
/// # Ok::<(), hr_py_parser::ParseError>(())
/// ```
#[must_use]
pub fn extract_class_signatures(tree: &Tree, source: &str) -> ClassSignatures {
    let mut classes = ClassSignatures::default();
    collect_classes(tree.root_node(), source.as_bytes(), None, &mut classes);
    classes
}

/// Returns `true` if the module defines a top-level `setup` function.
///
/// Plain, `async`, and decorated definitions all count. Functions nested in
/// classes or other functions do not.
#[must_use]
pub fn defines_setup(tree: &Tree, source: &str) -> bool {
    let source = source.as_bytes();
    let root = tree.root_node();
    let mut cursor = root.walk();
    root.named_children(&mut cursor).any(|child| {
        unwrap_decorated(child).is_some_and(|def| {
            def.kind() == "function_definition"
                && def
                    .child_by_field_name("name")
                    .and_then(|name| node_text(name, source))
                    == Some(SETUP_FUNCTION)
        })
    })
}

fn collect_classes(
    node: Node<'_>,
    source: &[u8],
    scope: Option<&str>,
    out: &mut ClassSignatures,
) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() != "class_definition" {
            collect_classes(child, source, scope, out);
            continue;
        }

        let Some(name) = child
            .child_by_field_name("name")
            .and_then(|n| node_text(n, source))
        else {
            continue;
        };
        let qualified = match scope {
            Some(outer) => format!("{outer}.{name}"),
            None => name.to_owned(),
        };

        if let Some(body) = child.child_by_field_name("body") {
            out.insert(qualified.clone(), class_fingerprint(body, source));
            collect_classes(body, source, Some(&qualified), out);
        } else {
            out.insert(qualified, String::new());
        }
    }
}

/// Builds the fingerprint of a class body from its direct methods.
fn class_fingerprint(body: Node<'_>, source: &[u8]) -> String {
    let mut methods: Vec<String> = Vec::new();
    let mut cursor = body.walk();
    for stmt in body.named_children(&mut cursor) {
        let Some(def) = unwrap_decorated(stmt) else {
            continue;
        };
        if def.kind() != "function_definition" {
            continue;
        }
        if let Some(signature) = method_signature(def, source) {
            methods.push(signature);
        }
    }
    methods.sort_unstable();
    methods.join("|")
}

/// Renders `name(p1, p2)` from the positional parameters of a definition.
fn method_signature(def: Node<'_>, source: &[u8]) -> Option<String> {
    let name = node_text(def.child_by_field_name("name")?, source)?;
    let mut params: Vec<&str> = Vec::new();

    if let Some(parameters) = def.child_by_field_name("parameters") {
        let mut cursor = parameters.walk();
        for param in parameters.named_children(&mut cursor) {
            match param.kind() {
                "identifier" => params.extend(node_text(param, source)),
                "typed_parameter" => {
                    let Some(inner) = param.named_child(0) else {
                        continue;
                    };
                    if inner.kind() != "identifier" {
                        // `*args: T` or `**kwargs: T`
                        break;
                    }
                    params.extend(node_text(inner, source));
                }
                "default_parameter" | "typed_default_parameter" => {
                    params.extend(
                        param
                            .child_by_field_name("name")
                            .and_then(|n| node_text(n, source)),
                    );
                }
                "list_splat_pattern" | "keyword_separator" | "dictionary_splat_pattern" => break,
                _ => {}
            }
        }
    }

    Some(format!("{name}({})", params.join(", ")))
}

/// Returns the definition wrapped by a `decorated_definition`, or the node itself.
fn unwrap_decorated(node: Node<'_>) -> Option<Node<'_>> {
    if node.kind() == "decorated_definition" {
        node.child_by_field_name("definition")
    } else {
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use crate::PyParser;

    fn parse(source: &str) -> crate::ParseResult {
        let mut parser = PyParser::new().expect("Parser creation failed");
        parser.parse(source).expect("Parse failed")
    }

    #[test]
    fn test_methods_sorted_and_joined() {
        let result = parse(
            "class Admin:\n    def kick(self, member, reason=None):\n        pass\n    def ban(self, member):\n        pass\n",
        );
        assert_eq!(result.classes["Admin"], "ban(self, member)|kick(self, member, reason)");
    }

    #[test]
    fn test_decorated_and_typed_methods() {
        let source = r"
class Cog:
    @commands.command()
    async def ping(self, ctx: Context) -> None:
        pass

    @staticmethod
    def helper(value: int = 3, *args, **kwargs):
        pass
";
        let result = parse(source);
        assert_eq!(result.classes["Cog"], "helper(value)|ping(self, ctx)");
    }

    #[test]
    fn test_keyword_only_params_ignored() {
        let result = parse("class A:\n    def f(self, a, *, b):\n        pass\n");
        assert_eq!(result.classes["A"], "f(self, a)");
    }

    #[test]
    fn test_body_change_keeps_fingerprint() {
        let before = parse("class A:\n    def f(self):\n        return 1\n");
        let after = parse("class A:\n    def f(self):\n        return 2\n");
        assert_eq!(before.classes, after.classes);
    }

    #[test]
    fn test_nested_classes() {
        let result = parse(
            "class Outer:\n    def a(self):\n        pass\n    class Inner:\n        def b(self):\n            pass\n",
        );
        assert_eq!(result.classes["Outer"], "a(self)");
        assert_eq!(result.classes["Outer.Inner"], "b(self)");
    }

    #[test]
    fn test_positional_only_and_typed_splat() {
        let result = parse("class A:\n    def f(self, a, /, b, *rest: int):\n        pass\n");
        assert_eq!(result.classes["A"], "f(self, a, b)");
    }

    #[test]
    fn test_empty_class() {
        let result = parse("class Empty:\n    pass\n");
        assert_eq!(result.classes["Empty"], "");
    }

    #[test]
    fn test_defines_setup() {
        assert!(parse("async def setup(bot):\n    await bot.add_cog(X(bot))\n").defines_setup);
        assert!(parse("def setup(bot):\n    pass\n").defines_setup);
        assert!(parse("@decorator\ndef setup(bot):\n    pass\n").defines_setup);
    }

    #[test]
    fn test_nested_setup_does_not_count() {
        assert!(!parse("class X:\n    def setup(self):\n        pass\n").defines_setup);
        assert!(!parse("def outer():\n    def setup():\n        pass\n").defines_setup);
        assert!(!parse("setup = 1\n").defines_setup);
    }
}
