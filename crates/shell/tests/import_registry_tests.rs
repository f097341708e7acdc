use sprig_shell::{ImportRecord, ImportRegistry, ImportSeed, ModuleReference, Owner};
use std::collections::BTreeSet;
use test_case::test_case;

fn module(path: &str) -> ModuleReference {
    ModuleReference::parse(path).expect("invalid module")
}

fn owner(name: &str) -> Owner {
    Owner::Name(name.into())
}

fn imports(statements: &[&str]) -> BTreeSet<String> {
    statements.iter().map(|s| s.to_string()).collect()
}

// A registry whose seed binds a prefix without making it implicit
fn registry_without_implicit_imports() -> ImportRegistry {
    ImportRegistry::new(ImportSeed {
        bootstrap: ImportRecord::new("interop", module("sprig/interop")),
        implicit_prefixes: Vec::new(),
    })
}

#[test_case("io", "net/http", "import net/http as io;"; "simple")]
#[test_case("client", "net/http.client", "import net/http.client as client;"; "dotted module")]
#[test_case("'while", "sprig/lists", "import sprig/lists as 'while;"; "keyword prefix")]
#[test_case("'first\\-name", "sprig/io", "import sprig/io as 'first\\-name;"; "escaped prefix")]
fn render_after_register(prefix: &str, module_path: &str, expected: &str) {
    let mut registry = ImportRegistry::default();
    let prefix = registry.register_import(prefix.into(), module(module_path));
    assert_eq!(registry.render_import(&prefix).as_deref(), Some(expected));
}

#[test]
fn rebinding_a_prefix_evicts_the_old_module() {
    let mut registry = ImportRegistry::default();
    registry.register_import("io".into(), module("net/http"));
    registry.register_import("io".into(), module("net/https"));

    assert_eq!(registry.prefix_of(&module("net/http")), None);
    assert_eq!(registry.prefix_of(&module("net/https")), Some(&"io".into()));
    assert!(registry.is_consistent());
}

#[test]
fn binding_a_module_under_a_new_prefix_moves_it() {
    let mut registry = ImportRegistry::default();
    registry.register_import("http".into(), module("net/http"));
    registry.register_import("web".into(), module("net/http"));

    assert!(!registry.has_prefix(&"http".into()));
    assert_eq!(registry.prefix_of(&module("net/http")), Some(&"web".into()));
    assert!(registry.is_consistent());
}

#[test]
fn implicit_imports_are_always_needed() {
    let mut registry = ImportRegistry::default();
    registry.register_import("io".into(), module("sprig/io"));
    registry.record_implicit_usage(["io".into()]);

    let expected = imports(&["import sprig/interop as interop;", "import sprig/io as io;"]);
    assert_eq!(registry.imports_needed_for([]), expected);
    assert_eq!(registry.implicit_imports(), expected);
    assert_eq!(registry.imports_needed_for([&owner("nobody")]), expected);
}

#[test]
fn needed_imports_ignore_owner_order_and_duplicates() {
    let mut registry = registry_without_implicit_imports();
    registry.register_import("io".into(), module("sprig/io"));
    registry.register_import("math".into(), module("sprig/math"));
    registry.record_usage(owner("a"), ["io".into()]);
    registry.record_usage(owner("b"), ["math".into(), "io".into()]);

    let forward = registry.imports_needed_for([&owner("a"), &owner("b")]);
    let reversed = registry.imports_needed_for([&owner("b"), &owner("a")]);
    let duplicated =
        registry.imports_needed_for([&owner("b"), &owner("a"), &owner("b"), &owner("unknown")]);

    assert_eq!(forward, reversed);
    assert_eq!(forward, duplicated);
    assert_eq!(
        forward,
        imports(&["import sprig/io as io;", "import sprig/math as math;"])
    );
}

#[test]
fn reset_restores_the_seed() {
    let mut registry = ImportRegistry::default();
    let seeded = registry.implicit_imports();

    registry.register_import("io".into(), module("sprig/io"));
    registry.register_import("interop".into(), module("other/interop"));
    registry.record_implicit_usage(["io".into()]);
    registry.record_usage(owner("f"), ["io".into()]);

    registry.reset();
    assert_eq!(registry.implicit_imports(), seeded);
    assert_eq!(registry.records().len(), 1);
    assert_eq!(registry.usage_of(&owner("f")), None);
}

#[test]
fn usage_follows_a_rebound_prefix() {
    let mut registry = registry_without_implicit_imports();
    registry.register_import("io".into(), module("net/http"));
    registry.record_usage(owner("fetchAll"), ["io".into()]);

    assert_eq!(
        registry.imports_needed_for([&owner("fetchAll")]),
        imports(&["import net/http as io;"])
    );

    registry.register_import("io".into(), module("net/https"));
    assert_eq!(
        registry.imports_needed_for([&owner("fetchAll")]),
        imports(&["import net/https as io;"])
    );
}
