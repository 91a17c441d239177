use std::{collections::HashMap, sync::Arc};

use parking_lot::RwLock;

/// Identity of an interned selector/symbol name.
///
/// Ids are sequential so they fit in the 32-bit payload of a symbol handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(u32);

impl SymbolId {
    #[inline(always)]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline(always)]
    pub(crate) const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
}

struct SymbolsImpl {
    names: Vec<Arc<str>>,
    ids: HashMap<Arc<str>, u32>,
}

/// Process-lifetime selector/symbol interning table.
///
/// Doubles as the selector memoization for the call bridge: a selector
/// string is hashed once per distinct name, after which dispatch carries
/// only the id.
pub struct Symbols(RwLock<SymbolsImpl>);

impl Symbols {
    pub fn new() -> Self {
        Self(RwLock::new(SymbolsImpl {
            names: Vec::new(),
            ids: HashMap::new(),
        }))
    }

    pub fn intern(&self, name: &str) -> SymbolId {
        if let Some(&id) = self.0.read().ids.get(name) {
            return SymbolId(id);
        }
        let mut inner = self.0.write();
        if let Some(&id) = inner.ids.get(name) {
            return SymbolId(id);
        }
        let id = inner.names.len() as u32;
        let interned = Arc::<str>::from(name);
        inner.names.push(interned.clone());
        inner.ids.insert(interned, id);
        SymbolId(id)
    }

    pub fn name(&self, id: SymbolId) -> Option<Arc<str>> {
        self.0.read().names.get(id.0 as usize).cloned()
    }

    pub fn len(&self) -> usize {
        self.0.read().names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Symbols {
    fn default() -> Self {
        Self::new()
    }
}
