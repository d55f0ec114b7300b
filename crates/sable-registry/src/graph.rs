//! Declaration graph - hierarchical storage for every declaration.
//!
//! Uses `petgraph::DiGraph` with:
//! - Nodes: [`Declaration`], node index == declaration id (node 0 reserved)
//! - Edges: `Contains(name)` from parent to child
//!
//! Declarations are never removed, so ids stay stable for the whole build.
//! Instance ids come from one counter per graph and increase monotonically
//! across all declarations.

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use rustc_hash::{FxHashMap, FxHashSet};
use sable_core::{
    DeclId, InstanceId, InternalError, RegistrationError, Signature, SlotId, TypeKey, TypedChunk,
};

use crate::declaration::{DeclFlags, DeclKind, Declaration};
use crate::instances::{Instance, Probe};
use crate::type_table::TypeTable;

/// Edge types in the declaration graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclEdge {
    /// Parent contains child under the given name.
    Contains(String),
}

/// The declaration graph.
#[derive(Debug, Clone)]
pub struct DeclarationGraph {
    graph: DiGraph<Declaration, DeclEdge>,
    next_instance: u32,
    instance_owners: FxHashMap<InstanceId, DeclId>,
}

impl Default for DeclarationGraph {
    fn default() -> Self {
        Self::new()
    }
}

fn node(id: DeclId) -> NodeIndex {
    NodeIndex::new(id.index() as usize)
}

fn decl_id(node: NodeIndex) -> DeclId {
    DeclId::new(node.index() as u32)
}

impl DeclarationGraph {
    /// Create an empty graph with the reserved node in place.
    pub fn new() -> Self {
        let mut graph = DiGraph::new();
        graph.add_node(Declaration::new(DeclId::RESERVED, None, "", DeclKind::Unit));
        Self {
            graph,
            next_instance: 1,
            instance_owners: FxHashMap::default(),
        }
    }

    /// Number of declarations, excluding the reserved node.
    pub fn len(&self) -> usize {
        self.graph.node_count() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate over every declaration.
    pub fn iter(&self) -> impl Iterator<Item = &Declaration> {
        self.graph.node_weights().skip(1)
    }

    // ========================================================================
    // Creation and access
    // ========================================================================

    /// Allocate a declaration under `parent` (or at top level).
    pub fn create(
        &mut self,
        parent: Option<DeclId>,
        name: &str,
        kind: DeclKind,
    ) -> Result<DeclId, RegistrationError> {
        if let Some(parent) = parent {
            if self.get(parent).is_err() {
                return Err(RegistrationError::InvalidParent(parent));
            }
        }
        Ok(self.insert(parent, name, kind))
    }

    fn insert(&mut self, parent: Option<DeclId>, name: &str, kind: DeclKind) -> DeclId {
        let id = DeclId::new(self.graph.node_count() as u32);
        let index = self.graph.add_node(Declaration::new(id, parent, name, kind));
        if let Some(parent) = parent {
            self.graph
                .add_edge(node(parent), index, DeclEdge::Contains(name.to_string()));
        }
        id
    }

    /// Checked access to a declaration.
    pub fn get(&self, id: DeclId) -> Result<&Declaration, InternalError> {
        if id.is_reserved() {
            return Err(InternalError::InvalidDeclaration(id));
        }
        self.graph
            .node_weight(node(id))
            .ok_or(InternalError::InvalidDeclaration(id))
    }

    /// Checked mutable access to a declaration.
    pub fn get_mut(&mut self, id: DeclId) -> Result<&mut Declaration, InternalError> {
        if id.is_reserved() {
            return Err(InternalError::InvalidDeclaration(id));
        }
        self.graph
            .node_weight_mut(node(id))
            .ok_or(InternalError::InvalidDeclaration(id))
    }

    pub fn add_flags(&mut self, id: DeclId, flags: DeclFlags) -> Result<(), InternalError> {
        self.get_mut(id)?.flags.insert(flags);
        Ok(())
    }

    pub fn remove_flags(&mut self, id: DeclId, flags: DeclFlags) -> Result<(), InternalError> {
        self.get_mut(id)?.flags.remove(flags);
        Ok(())
    }

    // ========================================================================
    // Hierarchy
    // ========================================================================

    /// Parent of a declaration.
    pub fn parent(&self, id: DeclId) -> Option<DeclId> {
        self.graph
            .edges_directed(node(id), Direction::Incoming)
            .next()
            .map(|edge| decl_id(edge.source()))
    }

    /// Children in insertion order.
    pub fn children(&self, scope: DeclId) -> Vec<DeclId> {
        let mut children: Vec<DeclId> = self
            .graph
            .edges(node(scope))
            .map(|edge| decl_id(edge.target()))
            .collect();
        children.sort();
        children
    }

    /// Direct children named `name`, in insertion order. Clones are
    /// skipped.
    pub fn lookup_children(&self, scope: DeclId, name: &str) -> Vec<DeclId> {
        let mut found: Vec<DeclId> = self
            .graph
            .edges(node(scope))
            .filter(|edge| matches!(edge.weight(), DeclEdge::Contains(child) if child == name))
            .filter(|edge| !self.graph[edge.target()].has_flag(DeclFlags::CLONE))
            .map(|edge| decl_id(edge.target()))
            .collect();
        found.sort();
        found
    }

    /// Ancestors from the parent outward.
    pub fn ancestors(&self, id: DeclId) -> impl Iterator<Item = DeclId> + '_ {
        std::iter::successors(self.parent(id), move |&current| self.parent(current))
    }

    /// Resolve a name from inside `scope`.
    ///
    /// Inside a class, the class's own children come first, then enclosing
    /// scopes outward. Anywhere else the enclosing scopes are tried first,
    /// nearest outward, and the scope's own children last. The first level
    /// with any match wins.
    pub fn lookup_from_enclosing(&self, scope: DeclId, name: &str) -> Vec<DeclId> {
        let is_class = self.get(scope).is_ok_and(Declaration::is_class);
        if is_class {
            let own = self.lookup_children(scope, name);
            if !own.is_empty() {
                return own;
            }
        }
        for ancestor in self.ancestors(scope) {
            let found = self.lookup_children(ancestor, name);
            if !found.is_empty() {
                return found;
            }
        }
        if is_class {
            Vec::new()
        } else {
            self.lookup_children(scope, name)
        }
    }

    /// `a::b::c` style name, skipping units.
    pub fn qualified_name(&self, id: DeclId) -> String {
        let mut path = Vec::new();
        let mut current = Some(id);
        while let Some(decl) = current.and_then(|id| self.get(id).ok()) {
            if decl.kind != DeclKind::Unit && !decl.name.is_empty() {
                path.push(decl.name.as_str());
            }
            current = self.parent(decl.id);
        }
        path.reverse();
        path.join("::")
    }

    /// Nearest class strictly enclosing `id`.
    pub fn enclosing_class(&self, id: DeclId) -> Option<DeclId> {
        self.ancestors(id)
            .find(|&ancestor| self.get(ancestor).is_ok_and(Declaration::is_class))
    }

    /// Every name visible from `scope`, nearest first, without duplicates.
    pub fn visible_names(&self, scope: DeclId) -> Vec<String> {
        let mut seen = FxHashSet::default();
        std::iter::once(scope)
            .chain(self.ancestors(scope))
            .flat_map(|level| self.children(level))
            .filter_map(|child| self.get(child).ok())
            .filter(|decl| !decl.has_flag(DeclFlags::CLONE))
            .filter(|decl| seen.insert(decl.name.clone()))
            .map(|decl| decl.name.clone())
            .collect()
    }

    /// Deep-clone a declaration subtree under the same parent.
    ///
    /// The clones get fresh ids, copies of their type slots with every slot
    /// reference re-pointed into the clone, and empty instance caches. The
    /// root of the copy is flagged `CLONE` and hidden from name lookup.
    pub fn clone_declaration(
        &mut self,
        id: DeclId,
        types: &mut TypeTable,
    ) -> Result<DeclId, InternalError> {
        let mut order = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            self.get(current)?;
            order.push(current);
            stack.extend(self.children(current).into_iter().rev());
        }

        let mut remap: FxHashMap<DeclId, DeclId> = FxHashMap::default();
        for &original in &order {
            let source = self.get(original)?.clone();
            let parent = if original == id {
                source.parent
            } else {
                source.parent.and_then(|p| remap.get(&p).copied())
            };
            let clone = self.insert(parent, &source.name, source.kind);
            remap.insert(original, clone);
        }

        for &original in &order {
            let source = self.get(original)?.clone();
            let clone = remap[&original];
            let repoint = |slot: SlotId| match remap.get(&slot.decl) {
                Some(&decl) => decl.slot(slot.local),
                None => slot,
            };
            let target = self.get_mut(clone)?;
            target.params = source
                .params
                .iter()
                .map(|param| {
                    let mut param = param.clone();
                    param.slot = repoint(param.slot);
                    param
                })
                .collect();
            target.generics = source
                .generics
                .iter()
                .map(|generic| {
                    let mut generic = generic.clone();
                    generic.slot = repoint(generic.slot);
                    generic
                })
                .collect();
            target.body = source.body;
            target.flags = source
                .flags
                .difference(DeclFlags::INSTANTIATING | DeclFlags::RECURSIVE | DeclFlags::ERROR);
            if original == id {
                target.flags |= DeclFlags::CLONE;
            }
            target.pending_captures = source.pending_captures.clone();

            if types.slot_count(original) > 0 {
                types.clone_slots(original, clone, &remap)?;
            }
        }

        tracing::debug!(
            target: "sable::graph",
            original = %id,
            clone = %remap[&id],
            declarations = order.len(),
            "cloned declaration"
        );
        Ok(remap[&id])
    }

    // ========================================================================
    // Instances
    // ========================================================================

    /// Probe a declaration's instance cache.
    pub fn probe_instance(&self, decl: DeclId, signature: &Signature) -> Result<Probe, InternalError> {
        Ok(self.get(decl)?.instances.is_valid(signature))
    }

    /// Reserve an instance for a signature before its body is compiled.
    pub fn create_instance(
        &mut self,
        decl: DeclId,
        signature: Signature,
    ) -> Result<InstanceId, InternalError> {
        let fresh = InstanceId::new(self.next_instance);
        let id = self.get_mut(decl)?.instances.create(fresh, signature, decl);
        if id == fresh {
            self.next_instance += 1;
            self.instance_owners.insert(id, decl);
        }
        Ok(id)
    }

    /// Mark an instance compiled.
    pub fn update_instance(
        &mut self,
        id: InstanceId,
        symbol: String,
        return_type: TypeKey,
        code: TypedChunk,
    ) -> Result<(), InternalError> {
        let owner = self.instance_owner(id)?;
        self.get_mut(owner)?
            .instances
            .update(id, symbol, return_type, code)
    }

    /// Mark an instance permanently failed.
    pub fn invalidate_instance(&mut self, id: InstanceId) -> Result<(), InternalError> {
        let owner = self.instance_owner(id)?;
        self.get_mut(owner)?.instances.invalidate(id)
    }

    /// Record that `decl`'s `signature` is served by `target`.
    pub fn create_remap(
        &mut self,
        decl: DeclId,
        signature: Signature,
        target: DeclId,
    ) -> Result<InstanceId, InternalError> {
        let fresh = InstanceId::new(self.next_instance);
        let id = self
            .get_mut(decl)?
            .instances
            .create_remap(fresh, signature, decl, target);
        if id == fresh {
            self.next_instance += 1;
            self.instance_owners.insert(id, decl);
        }
        Ok(id)
    }

    /// Look up any instance by id.
    pub fn instance(&self, id: InstanceId) -> Option<&Instance> {
        let owner = self.instance_owners.get(&id)?;
        self.get(*owner).ok()?.instances.get(id)
    }

    /// Number of instance ids handed out.
    pub fn instance_count(&self) -> usize {
        self.instance_owners.len()
    }

    fn instance_owner(&self, id: InstanceId) -> Result<DeclId, InternalError> {
        self.instance_owners
            .get(&id)
            .copied()
            .ok_or(InternalError::InvalidInstance(id))
    }
}
