//! Scope tree as an arena of indexed nodes
//!
//! The global scope is the reserved index 0 and acts as its own parent, so
//! ancestor walks terminate by index comparison instead of pointer chasing.
//! Mangling joins the ancestor chain with `_` and appends the bare name.

/// Index of a scope in the arena; the global scope is always index 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub usize);

pub const GLOBAL_SCOPE: ScopeId = ScopeId(0);

#[derive(Debug)]
struct ScopeNode {
    /// Empty string for the global scope
    name: String,
    parent: ScopeId,
}

/// Arena of scope nodes
#[derive(Debug)]
pub struct ScopeArena {
    nodes: Vec<ScopeNode>,
}

impl Default for ScopeArena {
    fn default() -> Self {
        ScopeArena::new()
    }
}

impl ScopeArena {
    pub fn new() -> Self {
        ScopeArena {
            nodes: vec![ScopeNode {
                name: String::new(),
                parent: GLOBAL_SCOPE,
            }],
        }
    }

    /// Add a scope under `parent`, returning its id. Re-adding an existing
    /// name under the same parent returns the existing id.
    pub fn add(&mut self, parent: ScopeId, name: &str) -> ScopeId {
        if let Some(existing) = self.find_child(parent, name) {
            return existing;
        }
        let id = ScopeId(self.nodes.len());
        self.nodes.push(ScopeNode {
            name: name.to_string(),
            parent,
        });
        id
    }

    pub fn find_child(&self, parent: ScopeId, name: &str) -> Option<ScopeId> {
        self.nodes
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, node)| node.parent == parent && node.name == name)
            .map(|(index, _)| ScopeId(index))
    }

    /// Top-level scope by name
    pub fn find(&self, name: &str) -> Option<ScopeId> {
        self.find_child(GLOBAL_SCOPE, name)
    }

    pub fn name(&self, id: ScopeId) -> &str {
        &self.nodes[id.0].name
    }

    pub fn is_global(&self, id: ScopeId) -> bool {
        id == GLOBAL_SCOPE
    }

    /// Scope chain from the outermost named ancestor down to `id` itself
    pub fn chain(&self, id: ScopeId) -> Vec<&str> {
        let mut parts = Vec::new();
        let mut current = id;
        while current != GLOBAL_SCOPE {
            parts.push(self.nodes[current.0].name.as_str());
            current = self.nodes[current.0].parent;
        }
        parts.reverse();
        parts
    }

    /// C-mangled name of a symbol inside `scope`: the chain joined by `_`
    /// with the bare name appended. Global symbols keep their bare name.
    pub fn mangle(&self, scope: ScopeId, bare_name: &str) -> String {
        if scope == GLOBAL_SCOPE {
            return bare_name.to_string();
        }
        let mut parts = self.chain(scope);
        parts.push(bare_name);
        parts.join("_")
    }

    /// Mangled prefix of the scope itself, with a trailing `_`; empty for
    /// the global scope
    pub fn prefix(&self, scope: ScopeId) -> String {
        if scope == GLOBAL_SCOPE {
            return String::new();
        }
        let mut prefix = self.chain(scope).join("_");
        prefix.push('_');
        prefix
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_scope_is_its_own_parent() {
        let arena = ScopeArena::new();
        assert!(arena.is_global(GLOBAL_SCOPE));
        assert_eq!(arena.mangle(GLOBAL_SCOPE, "main"), "main");
        assert_eq!(arena.prefix(GLOBAL_SCOPE), "");
    }

    #[test]
    fn test_single_scope_mangling() {
        let mut arena = ScopeArena::new();
        let motor = arena.add(GLOBAL_SCOPE, "Motor");
        assert_eq!(arena.mangle(motor, "speed"), "Motor_speed");
        assert_eq!(arena.prefix(motor), "Motor_");
    }

    #[test]
    fn test_nested_scope_chain() {
        let mut arena = ScopeArena::new();
        let outer = arena.add(GLOBAL_SCOPE, "Display");
        let inner = arena.add(outer, "Backlight");
        assert_eq!(arena.mangle(inner, "level"), "Display_Backlight_level");
        assert_eq!(arena.chain(inner), vec!["Display", "Backlight"]);
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut arena = ScopeArena::new();
        let a = arena.add(GLOBAL_SCOPE, "Motor");
        let b = arena.add(GLOBAL_SCOPE, "Motor");
        assert_eq!(a, b);
    }

    #[test]
    fn test_find() {
        let mut arena = ScopeArena::new();
        let motor = arena.add(GLOBAL_SCOPE, "Motor");
        assert_eq!(arena.find("Motor"), Some(motor));
        assert_eq!(arena.find("Missing"), None);
    }
}
