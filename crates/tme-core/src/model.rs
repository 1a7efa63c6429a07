//! Layer tree data model.
//!
//! The tree is an arena: nodes live in a `StableDiGraph` (edges go
//! parent → child) and are addressed by their interned `LayerId`. Child
//! order is stored explicitly per group; index 0 is the topmost child.
//! Mutations touch only the affected nodes and their parents' child lists.
//! Those that change stored state (structure, names, visibility, opacity,
//! positions, buffers) bump `version`; selection alone does not.
//!
//! Selection is a flag per node. A selected group makes its descendants
//! effectively selected, but that is always recomputed by walking parents,
//! never written into the children.

use crate::buffer::{TileBuffer, TilePoint};
use crate::error::EditError;
use crate::id::LayerId;
use petgraph::Direction;
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableDiGraph;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;
use std::sync::Arc;

// ─── Nodes ───────────────────────────────────────────────────────────────

/// Pixel position of a layer buffer's top-left corner, relative to the map
/// origin. Always a multiple of the tile dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The same point in tile units.
    pub fn to_tiles(self, tile: u32) -> TilePoint {
        let t = tile.max(1) as i32;
        TilePoint::new(self.x.div_euclid(t), self.y.div_euclid(t))
    }

    pub fn from_tiles(p: TilePoint, tile: u32) -> Self {
        Self::new(p.x * tile as i32, p.y * tile as i32)
    }
}

/// Leaf layer payload.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerData {
    /// 0.0 ..= 1.0
    pub opacity: f32,
    pub visible: bool,
    pub position: Position,
    /// Created lazily by the first draw. Replaced as a whole when it grows
    /// or is trimmed.
    pub buffer: Option<Arc<TileBuffer>>,
    /// Transient marker used by pending-change tracking.
    pub deleted: bool,
}

impl Default for LayerData {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            visible: true,
            position: Position::default(),
            buffer: None,
            deleted: false,
        }
    }
}

impl LayerData {
    pub fn buffer(&self) -> Option<&TileBuffer> {
        self.buffer.as_deref()
    }
}

/// The node kinds in the layer tree.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Container of ordered children.
    Group { expanded: bool },
    /// Paintable leaf.
    Layer(LayerData),
}

/// A single node in the layer tree.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerNode {
    pub id: LayerId,
    pub name: String,
    pub selected: bool,
    pub kind: NodeKind,
}

impl LayerNode {
    pub fn layer(id: LayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            selected: false,
            kind: NodeKind::Layer(LayerData::default()),
        }
    }

    pub fn group(id: LayerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            selected: false,
            kind: NodeKind::Group { expanded: true },
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, NodeKind::Group { .. })
    }

    pub fn as_layer(&self) -> Option<&LayerData> {
        match &self.kind {
            NodeKind::Layer(data) => Some(data),
            NodeKind::Group { .. } => None,
        }
    }

    pub fn as_layer_mut(&mut self) -> Option<&mut LayerData> {
        match &mut self.kind {
            NodeKind::Layer(data) => Some(data),
            NodeKind::Group { .. } => None,
        }
    }

    fn same_kind(&self, other: &LayerNode) -> bool {
        self.is_group() == other.is_group()
    }
}

/// Attribute overrides applied by the bulk update operations. Fields that
/// do not apply to a node's kind are skipped for that node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodePatch {
    pub name: Option<String>,
    pub selected: Option<bool>,
    pub expanded: Option<bool>,
    pub visible: Option<bool>,
    pub opacity: Option<f32>,
}

impl NodePatch {
    pub fn selected(selected: bool) -> Self {
        Self {
            selected: Some(selected),
            ..Default::default()
        }
    }

    pub fn visible(visible: bool) -> Self {
        Self {
            visible: Some(visible),
            ..Default::default()
        }
    }

    pub fn expanded(expanded: bool) -> Self {
        Self {
            expanded: Some(expanded),
            ..Default::default()
        }
    }

    /// Whether the patch touches anything besides selection.
    fn persists(&self) -> bool {
        self.name.is_some() || self.expanded.is_some() || self.visible.is_some() || self.opacity.is_some()
    }

    fn apply(&self, node: &mut LayerNode, is_root: bool) {
        if let Some(name) = &self.name {
            node.name.clone_from(name);
        }
        if let Some(selected) = self.selected
            && !is_root
        {
            node.selected = selected;
        }
        match &mut node.kind {
            NodeKind::Group { expanded } => {
                if let Some(e) = self.expanded {
                    *expanded = e;
                }
            }
            NodeKind::Layer(data) => {
                if let Some(v) = self.visible {
                    data.visible = v;
                }
                if let Some(o) = self.opacity {
                    data.opacity = o.clamp(0.0, 1.0);
                }
            }
        }
    }
}

// ─── Tree ────────────────────────────────────────────────────────────────

/// The layer tree of one map file.
#[derive(Debug, Clone)]
pub struct LayerTree {
    graph: StableDiGraph<LayerNode, ()>,
    root: NodeIndex,
    id_index: HashMap<LayerId, NodeIndex>,
    child_order: HashMap<NodeIndex, Vec<NodeIndex>>,
    last_selected: Option<LayerId>,
    version: u64,
}

impl LayerTree {
    /// Create a tree holding only the root group.
    #[must_use]
    pub fn new(root_id: LayerId) -> Self {
        let mut graph = StableDiGraph::new();
        let root = graph.add_node(LayerNode::group(root_id, "root"));
        let mut id_index = HashMap::new();
        id_index.insert(root_id, root);
        let mut child_order = HashMap::new();
        child_order.insert(root, Vec::new());
        Self {
            graph,
            root,
            id_index,
            child_order,
            last_selected: None,
            version: 0,
        }
    }

    /// Create a tree whose root group carries a stored name and expanded
    /// flag.
    #[must_use]
    pub fn with_root(root_id: LayerId, name: impl Into<String>, expanded: bool) -> Self {
        let mut tree = Self::new(root_id);
        let root = &mut tree.graph[tree.root];
        root.name = name.into();
        root.kind = NodeKind::Group { expanded };
        tree
    }

    pub fn root_id(&self) -> LayerId {
        self.graph[self.root].id
    }

    pub fn is_root(&self, id: LayerId) -> bool {
        id == self.root_id()
    }

    /// Incremented by every mutation of stored state. Selection changes
    /// leave it alone.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.graph.node_count() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn last_selected(&self) -> Option<LayerId> {
        self.last_selected
    }

    pub fn set_last_selected(&mut self, id: Option<LayerId>) {
        self.last_selected = id.filter(|id| self.contains(*id) && !self.is_root(*id));
    }

    pub fn contains(&self, id: LayerId) -> bool {
        self.id_index.contains_key(&id)
    }

    fn index(&self, id: LayerId) -> Result<NodeIndex, EditError> {
        self.id_index.get(&id).copied().ok_or(EditError::NotFound(id))
    }

    pub fn get(&self, id: LayerId) -> Option<&LayerNode> {
        self.id_index.get(&id).map(|idx| &self.graph[*idx])
    }

    /// Leaf payload of `id`.
    pub fn layer(&self, id: LayerId) -> Result<&LayerData, EditError> {
        let idx = self.index(id)?;
        self.graph[idx].as_layer().ok_or(EditError::NotALayer(id))
    }

    /// Mutable leaf payload of `id`. Counts as a mutation.
    pub fn layer_mut(&mut self, id: LayerId) -> Result<&mut LayerData, EditError> {
        let idx = self.index(id)?;
        let layer = self.graph[idx].as_layer_mut().ok_or(EditError::NotALayer(id))?;
        self.version += 1;
        Ok(layer)
    }

    /// Ordered children of a group (topmost first).
    pub fn children(&self, id: LayerId) -> Result<Vec<LayerId>, EditError> {
        let idx = self.index(id)?;
        Ok(self.child_indices(idx).iter().map(|c| self.graph[*c].id).collect())
    }

    fn child_indices(&self, idx: NodeIndex) -> &[NodeIndex] {
        self.child_order.get(&idx).map_or(&[], Vec::as_slice)
    }

    fn parent_index(&self, idx: NodeIndex) -> Option<NodeIndex> {
        self.graph.neighbors_directed(idx, Direction::Incoming).next()
    }

    pub fn parent(&self, id: LayerId) -> Option<LayerId> {
        let idx = self.id_index.get(&id)?;
        self.parent_index(*idx).map(|p| self.graph[p].id)
    }

    /// Check if `ancestor` is a parent/grandparent/etc. of `descendant`.
    pub fn is_ancestor_of(&self, ancestor: LayerId, descendant: LayerId) -> bool {
        let Some(mut current) = self.id_index.get(&descendant).copied() else {
            return false;
        };
        while let Some(parent) = self.parent_index(current) {
            if self.graph[parent].id == ancestor {
                return true;
            }
            current = parent;
        }
        false
    }

    /// Selected itself, or inside a selected group.
    pub fn is_effectively_selected(&self, id: LayerId) -> bool {
        let Some(mut current) = self.id_index.get(&id).copied() else {
            return false;
        };
        loop {
            if self.graph[current].selected {
                return true;
            }
            match self.parent_index(current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// Pre-order traversal of the whole tree, root excluded, expansion ignored.
    pub fn document_order(&self) -> Vec<LayerId> {
        let mut out = Vec::with_capacity(self.len());
        for &child in self.child_indices(self.root) {
            self.walk(child, &mut |idx| out.push(self.graph[idx].id));
        }
        out
    }

    /// Leaf layers from the bottom of the visual stack to the top.
    pub fn layers_bottom_up(&self) -> Vec<LayerId> {
        let mut out: Vec<LayerId> = self
            .document_order()
            .into_iter()
            .filter(|id| self.get(*id).is_some_and(|n| !n.is_group()))
            .collect();
        out.reverse();
        out
    }

    fn walk(&self, idx: NodeIndex, visit: &mut impl FnMut(NodeIndex)) {
        visit(idx);
        for &child in self.child_indices(idx) {
            self.walk(child, visit);
        }
    }

    fn subtree(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut out = Vec::new();
        self.walk(idx, &mut |i| out.push(i));
        out
    }

    // ─── Structural mutation ─────────────────────────────────────────────

    /// Insert `node` under `parent` at `index` (clamped; `None` = top).
    pub fn insert(
        &mut self,
        parent: LayerId,
        index: Option<usize>,
        node: LayerNode,
    ) -> Result<(), EditError> {
        if self.contains(node.id) {
            return Err(EditError::DuplicateId(node.id));
        }
        let parent_idx = self.index(parent)?;
        if !self.graph[parent_idx].is_group() {
            return Err(EditError::NotAGroup(parent));
        }
        let id = node.id;
        let is_group = node.is_group();
        let idx = self.graph.add_node(node);
        self.id_index.insert(id, idx);
        if is_group {
            self.child_order.insert(idx, Vec::new());
        }
        self.attach(parent_idx, index.unwrap_or(0), &[idx]);
        self.version += 1;
        log::debug!("insert {id:?} under {parent:?}");
        Ok(())
    }

    fn attach(&mut self, parent: NodeIndex, at: usize, nodes: &[NodeIndex]) {
        for &n in nodes {
            self.graph.add_edge(parent, n, ());
        }
        let order = self.child_order.entry(parent).or_default();
        let at = at.min(order.len());
        order.splice(at..at, nodes.iter().copied());
    }

    fn detach(&mut self, idx: NodeIndex) {
        let Some(parent) = self.parent_index(idx) else {
            return;
        };
        if let Some(edge) = self.graph.find_edge(parent, idx) {
            self.graph.remove_edge(edge);
        }
        if let Some(order) = self.child_order.get_mut(&parent) {
            order.retain(|&c| c != idx);
        }
    }

    /// Replace the node `id` with `node`, keeping its place and children.
    /// The replacement keeps the original id. Returns the old node.
    pub fn update_node(&mut self, id: LayerId, mut node: LayerNode) -> Result<LayerNode, EditError> {
        let idx = self.index(id)?;
        if idx == self.root {
            return Err(EditError::RootImmutable);
        }
        if !self.graph[idx].same_kind(&node) {
            return Err(EditError::KindMismatch(id));
        }
        node.id = id;
        let old = &self.graph[idx];
        if old.name != node.name || old.kind != node.kind {
            self.version += 1;
        }
        Ok(std::mem::replace(&mut self.graph[idx], node))
    }

    /// Apply `patch` to `id` and every descendant. Returns the number of
    /// nodes patched.
    pub fn update_subtree(&mut self, id: LayerId, patch: &NodePatch) -> Result<usize, EditError> {
        let idx = self.index(id)?;
        let nodes = self.subtree(idx);
        for &n in &nodes {
            let is_root = n == self.root;
            patch.apply(&mut self.graph[n], is_root);
        }
        if patch.persists() {
            self.version += 1;
        }
        Ok(nodes.len())
    }

    /// Apply `patch` to every node (root included, selection excepted)
    /// satisfying `predicate`. Returns the number of nodes patched.
    pub fn update_all_matching(
        &mut self,
        predicate: impl Fn(&LayerNode) -> bool,
        patch: &NodePatch,
    ) -> usize {
        let matching: Vec<NodeIndex> = self
            .subtree(self.root)
            .into_iter()
            .filter(|&n| predicate(&self.graph[n]))
            .collect();
        for &n in &matching {
            let is_root = n == self.root;
            patch.apply(&mut self.graph[n], is_root);
        }
        if !matching.is_empty() && patch.persists() {
            self.version += 1;
        }
        matching.len()
    }

    /// Apply `patch` to the inclusive run between `start` and `end` in
    /// document order, whichever comes first. If either id is missing the
    /// run is empty. Returns the number of nodes patched.
    pub fn update_range_between(&mut self, start: LayerId, end: LayerId, patch: &NodePatch) -> usize {
        let order = self.document_order();
        let (Some(a), Some(b)) = (
            order.iter().position(|&id| id == start),
            order.iter().position(|&id| id == end),
        ) else {
            return 0;
        };
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        for id in &order[lo..=hi] {
            let idx = self.id_index[id];
            patch.apply(&mut self.graph[idx], false);
        }
        if patch.persists() {
            self.version += 1;
        }
        hi - lo + 1
    }

    /// Selected nodes in document order, skipping any node whose ancestor
    /// is already selected.
    pub fn collect_selected(&self) -> Vec<LayerId> {
        let mut out = Vec::new();
        for &child in self.child_indices(self.root) {
            self.collect_selected_from(child, &mut out);
        }
        out
    }

    fn collect_selected_from(&self, idx: NodeIndex, out: &mut Vec<LayerId>) {
        let node = &self.graph[idx];
        if node.selected {
            out.push(node.id);
            return;
        }
        for &child in self.child_indices(idx) {
            self.collect_selected_from(child, out);
        }
    }

    /// Leaf layers inside `id`'s subtree (itself if it is a layer).
    pub fn leaves_of(&self, id: LayerId) -> Vec<LayerId> {
        let Some(&idx) = self.id_index.get(&id) else {
            return Vec::new();
        };
        self.subtree(idx)
            .into_iter()
            .filter(|&n| !self.graph[n].is_group())
            .map(|n| self.graph[n].id)
            .collect()
    }

    /// Move the selection to `target`: right after it when it is a layer,
    /// as its first children when it is a group. Relative order of the
    /// moved nodes is kept.
    ///
    /// Returns every leaf layer that moved; the backing store addresses
    /// layers by id, so each must be re-emitted at its new place.
    ///
    /// # Errors
    /// `InvalidMove` if `target` is selected or inside a selected group,
    /// `NotFound` if it does not exist, `EmptySelection` when nothing is
    /// selected. The tree is left untouched in every error case.
    pub fn move_selected(&mut self, target: LayerId) -> Result<Vec<LayerId>, EditError> {
        let target_idx = self.index(target)?;
        if self.is_effectively_selected(target) {
            return Err(EditError::InvalidMove);
        }
        let selected = self.collect_selected();
        if selected.is_empty() {
            return Err(EditError::EmptySelection);
        }

        let moving: SmallVec<[NodeIndex; 8]> =
            selected.iter().map(|id| self.id_index[id]).collect();
        let moved_leaves: Vec<LayerId> = selected.iter().flat_map(|id| self.leaves_of(*id)).collect();

        for &idx in &moving {
            self.detach(idx);
        }

        let (parent, at) = if self.graph[target_idx].is_group() {
            (target_idx, 0)
        } else {
            let parent = self.parent_index(target_idx).unwrap_or(self.root);
            let pos = self
                .child_indices(parent)
                .iter()
                .position(|&c| c == target_idx)
                .map_or(0, |p| p + 1);
            (parent, pos)
        };
        self.attach(parent, at, &moving);
        self.version += 1;
        log::debug!("moved {} node(s) to {target:?}", moving.len());
        Ok(moved_leaves)
    }

    /// Remove the selection from the tree. Returns every removed leaf layer.
    pub fn delete_selected(&mut self) -> Vec<LayerId> {
        let selected = self.collect_selected();
        let removed_any = !selected.is_empty();
        let mut removed_leaves = Vec::new();
        for id in selected {
            let Some(&idx) = self.id_index.get(&id) else {
                continue;
            };
            self.detach(idx);
            for n in self.subtree(idx) {
                if let Some(node) = self.graph.remove_node(n) {
                    if !node.is_group() {
                        removed_leaves.push(node.id);
                    }
                    self.id_index.remove(&node.id);
                    self.child_order.remove(&n);
                }
            }
        }
        if let Some(last) = self.last_selected
            && !self.contains(last)
        {
            self.last_selected = None;
        }
        if !removed_leaves.is_empty() {
            log::debug!("deleted {} layer(s)", removed_leaves.len());
        }
        if removed_any {
            self.version += 1;
        }
        removed_leaves
    }

    // ─── Selection helpers (click semantics) ─────────────────────────────

    /// Plain click: select only `id`.
    pub fn select_only(&mut self, id: LayerId) -> Result<(), EditError> {
        if self.is_root(id) {
            return Err(EditError::RootImmutable);
        }
        let idx = self.index(id)?;
        self.update_all_matching(|n| n.selected, &NodePatch::selected(false));
        self.graph[idx].selected = true;
        self.last_selected = Some(id);
        Ok(())
    }

    /// Ctrl-click: flip `id`'s flag; selecting a group selects its subtree.
    pub fn toggle_selected(&mut self, id: LayerId) -> Result<(), EditError> {
        if self.is_root(id) {
            return Err(EditError::RootImmutable);
        }
        let idx = self.index(id)?;
        let now = !self.graph[idx].selected;
        self.update_subtree(id, &NodePatch::selected(now))?;
        if now {
            self.last_selected = Some(id);
        }
        Ok(())
    }

    /// Shift-click: select the run from the last selected node to `id`.
    pub fn select_range_to(&mut self, id: LayerId) -> Result<usize, EditError> {
        if !self.contains(id) {
            return Err(EditError::NotFound(id));
        }
        let anchor = self.last_selected.unwrap_or(id);
        let n = self.update_range_between(anchor, id, &NodePatch::selected(true));
        self.last_selected = Some(id);
        Ok(n)
    }

    pub fn clear_selection(&mut self) {
        self.update_all_matching(|n| n.selected, &NodePatch::selected(false));
    }
}
