use indexmap::IndexMap;
use sprig_parser::QuotedIdentifier;
use std::{collections::BTreeSet, fmt, sync::Arc};
use tracing::trace;

/// The kinds of committed declaration
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum DeclarationKind {
    Import,
    Type,
    Function,
    ModuleVariable,
    /// A statement or expression, kept for provenance
    Statement,
}

impl DeclarationKind {
    /// Returns true if declarations of this kind can be found by name
    pub fn is_named(self) -> bool {
        matches!(self, Self::Type | Self::Function | Self::ModuleVariable)
    }
}

impl fmt::Display for DeclarationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Import => "import",
            Self::Type => "type",
            Self::Function => "function",
            Self::ModuleVariable => "variable",
            Self::Statement => "statement",
        })
    }
}

/// The position of a declaration in commit order
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeclarationId(usize);

impl DeclarationId {
    /// The declaration's index in the store's history
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for DeclarationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A committed top-level declaration
///
/// Declarations are immutable once committed. A later declaration with the same name shadows an
/// earlier one for lookups, but the earlier declaration stays in the store's history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Declaration {
    /// The declaration's position in commit order, assigned by the store
    pub id: DeclarationId,
    /// The name used for lookups
    ///
    /// Imports are named by their prefix, and statements by their execution slot, e.g. `$3`.
    pub name: QuotedIdentifier,
    /// The kind of declaration
    pub kind: DeclarationKind,
    /// The declaration's source, re-emitted verbatim into later compilation units
    pub source: Arc<str>,
    /// The names the declaration defines
    pub defined_names: BTreeSet<QuotedIdentifier>,
    /// The names the declaration refers to that it doesn't define itself
    pub free_names: BTreeSet<QuotedIdentifier>,
    /// The import prefixes the declaration refers to
    pub used_prefixes: BTreeSet<QuotedIdentifier>,
}

impl Declaration {
    /// Makes a declaration, the id is assigned when it's added to a [DeclarationStore]
    pub fn new(
        name: QuotedIdentifier,
        kind: DeclarationKind,
        source: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            id: DeclarationId::default(),
            name,
            kind,
            source: source.into(),
            defined_names: BTreeSet::new(),
            free_names: BTreeSet::new(),
            used_prefixes: BTreeSet::new(),
        }
    }

    /// Sets the defined names
    #[must_use]
    pub fn with_defined_names(mut self, names: impl IntoIterator<Item = QuotedIdentifier>) -> Self {
        self.defined_names = names.into_iter().collect();
        self
    }

    /// Sets the free names
    #[must_use]
    pub fn with_free_names(mut self, names: impl IntoIterator<Item = QuotedIdentifier>) -> Self {
        self.free_names = names.into_iter().collect();
        self
    }

    /// Sets the used prefixes
    #[must_use]
    pub fn with_used_prefixes(
        mut self,
        prefixes: impl IntoIterator<Item = QuotedIdentifier>,
    ) -> Self {
        self.used_prefixes = prefixes.into_iter().collect();
        self
    }
}

/// The append-only record of committed declarations
///
/// Named declarations (types, functions, and module variables) are indexed by name with the most
/// recent one winning. Imports and statements are kept in the history but aren't indexed, so they
/// can't be found by [lookup](Self::lookup).
#[derive(Clone, Debug, Default)]
pub struct DeclarationStore {
    history: Vec<Arc<Declaration>>,
    index: IndexMap<QuotedIdentifier, DeclarationId>,
}

impl DeclarationStore {
    /// Makes an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a declaration, returning its id
    ///
    /// A named declaration becomes the lookup target for its name, shadowing any earlier
    /// declaration with the same name.
    pub fn define(&mut self, mut declaration: Declaration) -> DeclarationId {
        let id = DeclarationId(self.history.len());
        declaration.id = id;

        if declaration.kind.is_named() {
            // Re-inserting moves the name to the end, so the index stays in commit order
            self.index.shift_remove(&declaration.name);
            self.index.insert(declaration.name.clone(), id);
        }

        trace!(name = %declaration.name, kind = %declaration.kind, %id, "declaration defined");
        self.history.push(Arc::new(declaration));
        id
    }

    /// Returns the most recent committed declaration with the given name
    pub fn lookup(&self, name: &QuotedIdentifier) -> Option<&Arc<Declaration>> {
        self.index
            .get(name)
            .and_then(|id| self.history.get(id.index()))
    }

    /// Returns the declaration with the given id
    pub fn get(&self, id: DeclarationId) -> Option<&Arc<Declaration>> {
        self.history.get(id.index())
    }

    /// The names of every committed declaration, in commit order
    ///
    /// Shadowed declarations are included, so a name appears once per commit.
    pub fn all_names(&self) -> Vec<QuotedIdentifier> {
        self.history
            .iter()
            .map(|declaration| declaration.name.clone())
            .collect()
    }

    /// The declarations that can currently be found by name, in commit order
    pub fn visible(&self) -> impl Iterator<Item = &Arc<Declaration>> {
        self.index
            .values()
            .filter_map(|id| self.history.get(id.index()))
    }

    /// Iterates over every committed declaration in commit order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Declaration>> {
        self.history.iter()
    }

    /// The number of committed declarations
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// Returns true if nothing has been committed
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Stops the given names from being found by lookup
    ///
    /// Either all of the names are removed, or if any of them isn't visible then the first
    /// unknown name is returned as the error and nothing is removed.
    pub fn remove(
        &mut self,
        names: &[QuotedIdentifier],
    ) -> Result<Vec<Arc<Declaration>>, QuotedIdentifier> {
        if let Some(unknown) = names.iter().find(|name| !self.index.contains_key(*name)) {
            return Err(unknown.clone());
        }

        let mut removed = Vec::with_capacity(names.len());
        for name in names {
            if let Some(id) = self.index.shift_remove(name) {
                trace!(%name, %id, "declaration removed");
                if let Some(declaration) = self.history.get(id.index()) {
                    removed.push(declaration.clone());
                }
            }
        }

        Ok(removed)
    }

    /// Removes every declaration
    pub fn clear(&mut self) {
        self.history.clear();
        self.index.clear();
    }
}
