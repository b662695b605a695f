use compact_str::CompactString;

use crate::variable::{VarId, VarKind, VarSize};
use crate::{IdCode, Result, ScopeType, VcdError};

/// A scope path argument to [`crate::VcdWriter::register_var`] or
/// [`crate::VcdWriter::set_scope_type`].
///
/// Accepts a dotted string (split on the writer's configured separator,
/// `.` by default) or a pre-split sequence of components, matching the two
/// input forms spec.md 3 calls for.
pub trait ScopePath {
    fn into_components(self, sep: char) -> Result<Vec<CompactString>>;
}

fn check_nonempty(parts: Vec<CompactString>) -> Result<Vec<CompactString>> {
    if parts.is_empty() || parts.iter().any(|p| p.is_empty()) {
        return Err(VcdError::Value(
            "scope path must be a non-empty sequence of non-empty names".into(),
        ));
    }
    Ok(parts)
}

impl ScopePath for &str {
    fn into_components(self, sep: char) -> Result<Vec<CompactString>> {
        check_nonempty(self.split(sep).map(CompactString::from).collect())
    }
}

impl ScopePath for &[&str] {
    fn into_components(self, _sep: char) -> Result<Vec<CompactString>> {
        check_nonempty(self.iter().map(|&p| CompactString::from(p)).collect())
    }
}

impl<const N: usize> ScopePath for [&str; N] {
    fn into_components(self, sep: char) -> Result<Vec<CompactString>> {
        (&self[..]).into_components(sep)
    }
}

impl ScopePath for Vec<&str> {
    fn into_components(self, sep: char) -> Result<Vec<CompactString>> {
        self.as_slice().into_components(sep)
    }
}

/// A variable declared directly at a scope node, in the form the header
/// emitter needs it (ident, name, kind, declared width).
#[derive(Debug, Clone)]
pub(crate) struct VarDecl {
    pub(crate) id: VarId,
    pub(crate) ident: IdCode,
    pub(crate) name: CompactString,
    pub(crate) kind: VarKind,
    pub(crate) size: VarSize,
}

/// A lightweight, owned description of an item declared directly at a
/// [`Scope`] — either a variable or a nested child scope — returned by
/// [`Scope::items`] for read-only introspection.
#[derive(Debug, Clone)]
pub enum ScopeItem {
    Var { ident: IdCode, name: CompactString, kind: VarKind },
    Child(CompactString),
}

/// One node of the hierarchical scope tree.
///
/// The tree owns both the nesting structure and the variable declarations
/// made at each node; a separate flat registry (kept by [`crate::VcdWriter`])
/// indexes the same variables by ident for O(1) lookup during `change`.
#[derive(Debug, Clone)]
pub struct Scope {
    pub(crate) name: CompactString,
    pub(crate) kind: ScopeType,
    pub(crate) vars: Vec<VarDecl>,
    pub(crate) children: Vec<Scope>,
}

impl Scope {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ScopeType {
        self.kind
    }

    /// All variables and child scopes declared directly at this node, in
    /// the order the header emitter serializes them: variables first (in
    /// registration order), then children (in insertion order).
    pub fn items(&self) -> Vec<ScopeItem> {
        let mut out = Vec::with_capacity(self.vars.len() + self.children.len());
        for v in &self.vars {
            out.push(ScopeItem::Var {
                ident: v.ident,
                name: v.name.clone(),
                kind: v.kind,
            });
        }
        for c in &self.children {
            out.push(ScopeItem::Child(c.name.clone()));
        }
        out
    }
}

fn descend<'a>(children: &'a mut Vec<Scope>, path: &[CompactString], default_kind: ScopeType) -> &'a mut Scope {
    let name = &path[0];
    let pos = match children.iter().position(|s| &s.name == name) {
        Some(p) => p,
        None => {
            children.push(Scope {
                name: name.clone(),
                kind: default_kind,
                vars: Vec::new(),
                children: Vec::new(),
            });
            children.len() - 1
        }
    };
    if path.len() == 1 {
        &mut children[pos]
    } else {
        descend(&mut children[pos].children, &path[1..], default_kind)
    }
}

/// The hierarchical scope tree, rooted at an implicit anonymous root that
/// is itself never emitted.
#[derive(Debug, Clone)]
pub(crate) struct ScopeTree {
    default_kind: ScopeType,
    roots: Vec<Scope>,
}

impl ScopeTree {
    pub(crate) fn new(default_kind: ScopeType) -> ScopeTree {
        ScopeTree {
            default_kind,
            roots: Vec::new(),
        }
    }

    pub(crate) fn ensure_path(&mut self, path: &[CompactString]) -> Result<&mut Scope> {
        if path.is_empty() {
            return Err(VcdError::Value(
                "scope path must have at least one component".into(),
            ));
        }
        Ok(descend(&mut self.roots, path, self.default_kind))
    }

    /// Non-mutating lookup: unlike [`ScopeTree::ensure_path`], never creates
    /// missing intermediate nodes. Used by validation that must not leave a
    /// trace behind when it turns up nothing, or when it's followed by a
    /// fallible step that might still abort the registration.
    pub(crate) fn find(&self, path: &[CompactString]) -> Option<&Scope> {
        let mut node = self.roots.iter().find(|s| s.name == path[0])?;
        for name in &path[1..] {
            node = node.children.iter().find(|s| &s.name == name)?;
        }
        Some(node)
    }

    pub(crate) fn set_kind(&mut self, path: &[CompactString], kind: ScopeType) -> Result<()> {
        self.ensure_path(path)?.kind = kind;
        Ok(())
    }

    /// The top-level scopes, in insertion order, for header serialization.
    pub(crate) fn roots(&self) -> &[Scope] {
        &self.roots
    }
}
