use crate::{ClassifiedSnippet, Declaration, DeclarationStore, ImportRegistry, Owner};
use rustc_hash::FxHashSet;
use sprig_parser::QuotedIdentifier;
use std::{
    collections::{BTreeSet, VecDeque},
    sync::Arc,
};
use tracing::trace;

/// The prior state that a snippet needs in order to be compiled
#[derive(Clone, Debug, Default)]
pub struct Resolution {
    /// The transitive closure of declarations the snippet depends on, in commit order
    pub declarations: Vec<Arc<Declaration>>,
    /// The import prefixes needed by the closure and the snippet
    pub import_prefixes: BTreeSet<QuotedIdentifier>,
    /// Free names that didn't resolve to a committed declaration
    ///
    /// These are left for the semantic analyzer to report.
    pub unresolved: BTreeSet<QuotedIdentifier>,
}

impl Resolution {
    /// The names of the declarations in the closure
    pub fn declaration_names(&self) -> impl Iterator<Item = &QuotedIdentifier> {
        self.declarations.iter().map(|declaration| &declaration.name)
    }
}

/// Computes the minimal set of committed declarations and imports needed by a snippet
pub struct DependencyResolver;

impl DependencyResolver {
    /// Resolves the snippet's free names against the store, breadth-first
    ///
    /// Names that the snippet defines itself are never resolved, so that a redefinition shadows
    /// the committed declaration everywhere in the compilation unit.
    pub fn resolve(
        snippet: &ClassifiedSnippet,
        registry: &ImportRegistry,
        store: &DeclarationStore,
    ) -> Resolution {
        let mut visited: FxHashSet<&QuotedIdentifier> = FxHashSet::default();
        let mut queue: VecDeque<&QuotedIdentifier> = snippet.free_names.iter().collect();
        let mut declarations = Vec::new();
        let mut unresolved = BTreeSet::new();

        while let Some(name) = queue.pop_front() {
            if !visited.insert(name) || snippet.defined_names.contains(name) {
                continue;
            }

            match store.lookup(name) {
                Some(declaration) => {
                    queue.extend(declaration.free_names.iter());
                    declarations.push(declaration.clone());
                }
                None => {
                    unresolved.insert(name.clone());
                }
            }
        }

        declarations.sort_by_key(|declaration| declaration.id);

        let owners: Vec<Owner> = declarations
            .iter()
            .map(|declaration| Owner::Name(declaration.name.clone()))
            .collect();
        let mut import_prefixes = registry.prefixes_needed_for(&owners);
        // The snippet's own usage isn't recorded until it's committed
        import_prefixes.extend(snippet.used_prefixes.iter().cloned());

        trace!(
            closure = declarations.len(),
            prefixes = import_prefixes.len(),
            unresolved = unresolved.len(),
            "dependencies resolved"
        );

        Resolution {
            declarations,
            import_prefixes,
            unresolved,
        }
    }
}
