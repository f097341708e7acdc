use crate::bimap::BiMap;
use indexmap::IndexMap;
use smallvec::{SmallVec, smallvec};
use sprig_parser::{ModulePath, QuotedIdentifier};
use std::{collections::BTreeSet, fmt};
use tracing::trace;

/// A reference to a module, e.g. `sprig/io` or `net/http.client`
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ModuleReference {
    org: QuotedIdentifier,
    names: SmallVec<[QuotedIdentifier; 2]>,
}

impl ModuleReference {
    /// Makes a module reference from an organization and its dotted name components
    ///
    /// Returns `None` if no name components are provided.
    pub fn new(
        org: QuotedIdentifier,
        names: impl IntoIterator<Item = QuotedIdentifier>,
    ) -> Option<Self> {
        let names: SmallVec<_> = names.into_iter().collect();
        if names.is_empty() {
            None
        } else {
            Some(Self { org, names })
        }
    }

    /// Parses a module reference from its `org/name.sub` form
    pub fn parse(module: &str) -> Option<Self> {
        let (org, names) = module.split_once('/')?;
        if org.is_empty() || names.split('.').any(str::is_empty) {
            return None;
        }
        Self::new(org.into(), names.split('.').map(QuotedIdentifier::from))
    }

    /// The module's organization
    pub fn org(&self) -> &QuotedIdentifier {
        &self.org
    }

    /// The module's dotted name components
    pub fn names(&self) -> &[QuotedIdentifier] {
        &self.names
    }

    /// The prefix that an import of this module binds when no prefix is given
    pub fn default_prefix(&self) -> QuotedIdentifier {
        // Construction guarantees at least one name component
        self.names.last().cloned().unwrap_or_else(|| self.org.clone())
    }
}

impl From<&ModulePath> for ModuleReference {
    fn from(path: &ModulePath) -> Self {
        Self {
            org: path.org.clone(),
            names: path.names.iter().cloned().collect(),
        }
    }
}

impl fmt::Display for ModuleReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/", self.org)?;
        for (i, name) in self.names.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{name}")?;
        }
        Ok(())
    }
}

/// An active import binding: a prefix bound to a module
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ImportRecord {
    /// The prefix that the module is imported as
    pub prefix: QuotedIdentifier,
    /// The imported module
    pub module: ModuleReference,
}

impl ImportRecord {
    /// Makes a new import record
    pub fn new(prefix: impl Into<QuotedIdentifier>, module: ModuleReference) -> Self {
        Self {
            prefix: prefix.into(),
            module,
        }
    }
}

impl fmt::Display for ImportRecord {
    /// Renders the canonical import statement, e.g. `import net/http as io;`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "import {} as {};", self.module, self.prefix)
    }
}

/// The owner of a set of used import prefixes
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Owner {
    /// Top-level snippets without a name, and the imports that are always in scope
    Anonymous,
    /// A named declaration
    Name(QuotedIdentifier),
}

impl From<QuotedIdentifier> for Owner {
    fn from(name: QuotedIdentifier) -> Self {
        Self::Name(name)
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("$"),
            Self::Name(name) => write!(f, "{name}"),
        }
    }
}

/// The imports that a new registry starts with, and that [ImportRegistry::reset] restores
#[derive(Clone, Debug)]
pub struct ImportSeed {
    /// The import that's bound when the registry is created
    pub bootstrap: ImportRecord,
    /// Prefixes that are recorded as used by [Owner::Anonymous], and so are always imported
    pub implicit_prefixes: Vec<QuotedIdentifier>,
}

impl ImportSeed {
    /// Makes a seed that binds the given import and always includes it in compilation units
    pub fn implicit(bootstrap: ImportRecord) -> Self {
        let implicit_prefixes = vec![bootstrap.prefix.clone()];
        Self {
            bootstrap,
            implicit_prefixes,
        }
    }
}

impl Default for ImportSeed {
    /// `import sprig/interop as interop;`, always in scope
    fn default() -> Self {
        let module = ModuleReference {
            org: "sprig".into(),
            names: smallvec!["interop".into()],
        };
        Self::implicit(ImportRecord::new("interop", module))
    }
}

/// Keeps track of import prefixes, the modules they're bound to, and which prefixes each
/// declaration needs
///
/// Prefixes and modules are held in a [BiMap], so that a module is imported under at most one
/// prefix. Registering a prefix again with a different module rebinds it, and everything that
/// recorded a use of the prefix will see the new module.
#[derive(Clone, Debug)]
pub struct ImportRegistry {
    seed: ImportSeed,
    bindings: BiMap<QuotedIdentifier, ModuleReference>,
    usage: IndexMap<Owner, BTreeSet<QuotedIdentifier>>,
}

impl ImportRegistry {
    /// Makes a registry containing the seeded imports
    pub fn new(seed: ImportSeed) -> Self {
        let mut result = Self {
            seed,
            bindings: BiMap::new(),
            usage: IndexMap::new(),
        };
        result.apply_seed();
        result
    }

    fn apply_seed(&mut self) {
        let bootstrap = self.seed.bootstrap.clone();
        self.register_import(bootstrap.prefix, bootstrap.module);
        let implicit = self.seed.implicit_prefixes.clone();
        self.record_implicit_usage(implicit);
    }

    /// Binds `prefix` to `module`, returning the prefix
    ///
    /// If the prefix was already bound then the old module is forgotten, and if the module was
    /// bound to another prefix then that prefix is unbound.
    pub fn register_import(
        &mut self,
        prefix: QuotedIdentifier,
        module: ModuleReference,
    ) -> QuotedIdentifier {
        for (old_prefix, old_module) in self.bindings.insert(prefix.clone(), module.clone()) {
            trace!(%old_prefix, %old_module, "import binding evicted");
        }
        trace!(%prefix, %module, "import registered");
        prefix
    }

    /// Returns true if the prefix is bound
    pub fn has_prefix(&self, prefix: &QuotedIdentifier) -> bool {
        self.bindings.contains_left(prefix)
    }

    /// Returns true if the module is bound to a prefix
    pub fn is_module_imported(&self, module: &ModuleReference) -> bool {
        self.bindings.contains_right(module)
    }

    /// Returns the prefix that the module is bound to
    pub fn prefix_of(&self, module: &ModuleReference) -> Option<&QuotedIdentifier> {
        self.bindings.get_by_right(module)
    }

    /// Returns the module that the prefix is bound to
    pub fn module_of(&self, prefix: &QuotedIdentifier) -> Option<&ModuleReference> {
        self.bindings.get_by_left(prefix)
    }

    /// Renders the import statement for a bound prefix
    ///
    /// An unbound prefix isn't an error, `None` is returned.
    pub fn render_import(&self, prefix: &QuotedIdentifier) -> Option<String> {
        self.record_for(prefix).map(|record| record.to_string())
    }

    /// Returns the import record for a bound prefix
    pub fn record_for(&self, prefix: &QuotedIdentifier) -> Option<ImportRecord> {
        self.module_of(prefix)
            .map(|module| ImportRecord::new(prefix.clone(), module.clone()))
    }

    /// Adds to the set of prefixes used by the owner
    pub fn record_usage(
        &mut self,
        owner: Owner,
        prefixes: impl IntoIterator<Item = QuotedIdentifier>,
    ) {
        let used = self.usage.entry(owner).or_default();
        used.extend(prefixes);
    }

    /// Adds to the set of prefixes that are always included in compilation units
    pub fn record_implicit_usage(&mut self, prefixes: impl IntoIterator<Item = QuotedIdentifier>) {
        self.record_usage(Owner::Anonymous, prefixes);
    }

    /// Forgets the prefixes used by the owner
    pub fn remove_usage(&mut self, owner: &Owner) -> Option<BTreeSet<QuotedIdentifier>> {
        self.usage.shift_remove(owner)
    }

    /// Returns the prefixes used by the owner
    pub fn usage_of(&self, owner: &Owner) -> Option<&BTreeSet<QuotedIdentifier>> {
        self.usage.get(owner)
    }

    /// The bound prefixes needed by the given owners, along with the implicit prefixes
    ///
    /// Owners without recorded usage are ignored, as are prefixes that are no longer bound.
    pub fn prefixes_needed_for<'a>(
        &self,
        owners: impl IntoIterator<Item = &'a Owner>,
    ) -> BTreeSet<QuotedIdentifier> {
        owners
            .into_iter()
            .chain(std::iter::once(&Owner::Anonymous))
            .filter_map(|owner| self.usage.get(owner))
            .flatten()
            .filter(|prefix| self.has_prefix(prefix))
            .cloned()
            .collect()
    }

    /// The import statements needed by the given owners, along with the implicit imports
    pub fn imports_needed_for<'a>(
        &self,
        owners: impl IntoIterator<Item = &'a Owner>,
    ) -> BTreeSet<String> {
        self.prefixes_needed_for(owners)
            .iter()
            .filter_map(|prefix| self.render_import(prefix))
            .collect()
    }

    /// The import statements that are always in scope
    pub fn implicit_imports(&self) -> BTreeSet<String> {
        self.imports_needed_for([])
    }

    /// The active import bindings, ordered by prefix
    pub fn records(&self) -> Vec<ImportRecord> {
        let mut result: Vec<_> = self
            .bindings
            .iter()
            .map(|(prefix, module)| ImportRecord::new(prefix.clone(), module.clone()))
            .collect();
        result.sort_by(|a, b| a.prefix.cmp(&b.prefix));
        result
    }

    /// The owners with recorded usage, in the order they were first recorded
    pub fn owners(&self) -> impl Iterator<Item = &Owner> {
        self.usage.keys()
    }

    /// Clears all bindings and usage, and then re-applies the seed
    pub fn reset(&mut self) {
        self.bindings.clear();
        self.usage.clear();
        self.apply_seed();
    }

    /// Returns true if the prefix/module bindings form a bijection
    pub fn is_consistent(&self) -> bool {
        self.bindings.is_consistent()
    }
}

impl Default for ImportRegistry {
    fn default() -> Self {
        Self::new(ImportSeed::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> QuotedIdentifier {
        QuotedIdentifier::new(s)
    }

    fn module(s: &str) -> ModuleReference {
        ModuleReference::parse(s).expect("invalid module")
    }

    fn owner(s: &str) -> Owner {
        Owner::Name(id(s))
    }

    #[test]
    fn module_reference_parsing() {
        let m = module("sprig/lang.value");
        assert_eq!(m.org(), &id("sprig"));
        assert_eq!(m.names(), &[id("lang"), id("value")]);
        assert_eq!(m.default_prefix(), id("value"));
        assert_eq!(m.to_string(), "sprig/lang.value");

        assert!(ModuleReference::parse("sprig").is_none());
        assert!(ModuleReference::parse("sprig/").is_none());
        assert!(ModuleReference::parse("/io").is_none());
        assert!(ModuleReference::parse("sprig/a..b").is_none());
    }

    #[test]
    fn render_after_register() {
        let mut registry = ImportRegistry::default();
        let prefix = registry.register_import(id("io"), module("net/http"));
        assert_eq!(prefix, id("io"));
        assert_eq!(
            registry.render_import(&id("io")).as_deref(),
            Some("import net/http as io;")
        );
    }

    #[test]
    fn render_requotes_keyword_prefix() {
        let mut registry = ImportRegistry::default();
        registry.register_import(id("'if"), module("sprig/io"));
        assert_eq!(
            registry.render_import(&id("if")).as_deref(),
            Some("import sprig/io as 'if;")
        );
    }

    #[test]
    fn render_unbound_prefix_is_none() {
        let registry = ImportRegistry::default();
        assert_eq!(registry.render_import(&id("nope")), None);
    }

    #[test]
    fn rebinding_prefix_leaves_no_dangling_reverse_entry() {
        let mut registry = ImportRegistry::default();
        registry.register_import(id("io"), module("net/http"));
        registry.register_import(id("io"), module("net/https"));

        assert_eq!(registry.prefix_of(&module("net/http")), None);
        assert!(!registry.is_module_imported(&module("net/http")));
        assert_eq!(registry.prefix_of(&module("net/https")), Some(&id("io")));
        assert!(registry.is_consistent());
    }

    #[test]
    fn usage_of_unbound_prefix_is_discarded() {
        let mut registry = ImportRegistry::default();
        registry.record_usage(owner("f"), [id("ghost")]);
        assert_eq!(registry.imports_needed_for([&owner("f")]), registry.implicit_imports());
    }

    #[test]
    fn seeded_state() {
        let registry = ImportRegistry::default();
        assert!(registry.has_prefix(&id("interop")));
        assert_eq!(
            registry.implicit_imports().into_iter().collect::<Vec<_>>(),
            vec!["import sprig/interop as interop;".to_string()]
        );
        assert_eq!(registry.owners().collect::<Vec<_>>(), vec![&Owner::Anonymous]);
    }

    #[test]
    fn custom_seed() {
        let seed = ImportSeed {
            bootstrap: ImportRecord::new("java", module("lang/jvm.java")),
            implicit_prefixes: vec![],
        };
        let registry = ImportRegistry::new(seed);
        assert!(registry.has_prefix(&id("java")));
        assert!(registry.implicit_imports().is_empty());
    }
}
