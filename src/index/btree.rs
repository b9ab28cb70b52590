//! B-tree index
//!
//! Maps string keys to value objects. Nodes are single-block objects in the
//! [`ObjectStore`]; existing nodes are rewritten in place with `update`,
//! while nodes created by a split get a fresh `write`.
//!
//! ## Write ordering
//! - Split: every new sibling (and on a root split the new left half and
//!   root) is written before any existing node is rewritten. Rewrites go
//!   parents first, and the root slot switches last.
//! - Delete: every surviving node is rewritten before any node or value
//!   object is freed, so no live node ever points at released blocks.
//!
//! The index carries no lock of its own. The engine guards it with the index
//! lock: `find`, `keys` and `verify` take `&self`, mutations take `&mut self`.

use std::sync::Arc;

use crate::error::{BlockError, Result};
use crate::storage::{BlockPointer, ObjectStore};

use super::node::{validate_key, BTreeNode, MIN_KEYS};
use super::RootSlot;

/// Deeper descents than this mean a pointer cycle
const MAX_DEPTH: usize = 64;

/// One step of a root-to-leaf descent
struct PathEntry {
    ptr: BlockPointer,
    node: BTreeNode,
    /// Child slot taken out of `node`
    slot: usize,
}

/// Node changes an insert commits once every fresh node is written
#[derive(Default)]
struct InsertPlan {
    /// Encoded rewrites of existing nodes, parents first
    updates: Vec<(BlockPointer, Vec<u8>)>,
    /// Root written by a root split
    new_root: Option<BlockPointer>,
    /// Old root, freed after the slot switches
    retired_root: Option<BlockPointer>,
    /// Value pointer displaced by replacing an existing key
    replaced: Option<BlockPointer>,
}

/// Shape of the tree as found by [`BTreeIndex::verify`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexStats {
    /// Levels from root to leaves (1 for a lone leaf root)
    pub depth: usize,
    pub nodes: usize,
    pub leaves: usize,
    pub keys: usize,
}

/// On-disk B-tree over the object store
pub struct BTreeIndex {
    objects: Arc<ObjectStore>,
    slot: RootSlot,
    root: BlockPointer,
}

impl BTreeIndex {
    /// Open the index rooted at `slot`, creating an empty one if needed
    pub fn open(objects: Arc<ObjectStore>, slot: RootSlot) -> Result<Self> {
        let root = match slot.load()? {
            Some(root) => {
                // Fail startup on an unreadable root
                let node = BTreeNode::decode(&objects.read(root)?)?;
                tracing::info!(
                    "Opened index at {:?} ({} root keys)",
                    root,
                    node.keys.len()
                );
                root
            }
            None => {
                let root = objects.write(&BTreeNode::empty_leaf().encode()?)?;
                slot.store(root)?;
                tracing::info!("Created empty index at {:?}", root);
                root
            }
        };

        Ok(Self {
            objects,
            slot,
            root,
        })
    }

    /// Pointer to the current root node
    pub fn root(&self) -> BlockPointer {
        self.root
    }

    /// Value pointer stored under `key`
    pub fn find(&self, key: &str) -> Result<BlockPointer> {
        validate_key(key)?;
        let (_, _, leaf) = self.descend(key)?;
        match leaf.search(key) {
            Ok(i) => Ok(leaf.children[i]),
            Err(_) => Err(BlockError::NotFound),
        }
    }

    /// Store `value` and map `key` to it, replacing any previous value
    ///
    /// A failure before the first node rewrite leaves the tree and the
    /// allocator exactly as they were.
    pub fn insert(&mut self, key: &str, value: &[u8]) -> Result<()> {
        validate_key(key)?;
        let value_ptr = self.objects.write(value)?;

        if let Some(old) = self.insert_pointer(key, value_ptr)? {
            self.free_or_warn(old);
        }
        Ok(())
    }

    /// Remove `key` and free its value object
    pub fn delete(&mut self, key: &str) -> Result<()> {
        validate_key(key)?;
        let (mut path, mut ptr, mut node) = self.descend(key)?;

        let i = node.search(key).map_err(|_| BlockError::NotFound)?;
        node.keys.remove(i);
        let value_ptr = node.children.remove(i);

        // Freed only once the tree no longer references them
        let mut freed = vec![value_ptr];

        loop {
            let Some(PathEntry {
                ptr: parent_ptr,
                node: mut parent,
                slot,
            }) = path.pop()
            else {
                if !node.is_leaf() && node.keys.is_empty() {
                    // Root left with a single child after a merge
                    let new_root = node.children[0];
                    self.set_root(new_root)?;
                    freed.push(ptr);
                    tracing::debug!("Index root collapsed into {:?}", new_root);
                } else {
                    self.update_node(ptr, &node)?;
                }
                break;
            };

            if node.keys.len() >= MIN_KEYS {
                self.update_node(ptr, &node)?;
                break;
            }

            let mut left = match slot.checked_sub(1) {
                Some(s) => {
                    let left_ptr = parent.children[s];
                    Some((left_ptr, self.load_node(left_ptr)?))
                }
                None => None,
            };
            if let Some((left_ptr, left)) = left.as_mut() {
                if left.keys.len() > MIN_KEYS {
                    borrow_from_left(&mut parent, slot, left, &mut node);
                    self.update_node(*left_ptr, left)?;
                    self.update_node(ptr, &node)?;
                    self.update_node(parent_ptr, &parent)?;
                    break;
                }
            }

            let mut right = match parent.children.get(slot + 1) {
                Some(&right_ptr) => Some((right_ptr, self.load_node(right_ptr)?)),
                None => None,
            };
            if let Some((right_ptr, right)) = right.as_mut() {
                if right.keys.len() > MIN_KEYS {
                    borrow_from_right(&mut parent, slot, &mut node, right);
                    self.update_node(*right_ptr, right)?;
                    self.update_node(ptr, &node)?;
                    self.update_node(parent_ptr, &parent)?;
                    break;
                }
            }

            match (left, right) {
                (Some((left_ptr, mut left)), _) => {
                    let separator = parent.keys.remove(slot - 1);
                    parent.children.remove(slot);
                    left.merge(separator, node);
                    self.update_node(left_ptr, &left)?;
                    freed.push(ptr);
                }
                (None, Some((right_ptr, right))) => {
                    let separator = parent.keys.remove(slot);
                    parent.children.remove(slot + 1);
                    node.merge(separator, right);
                    self.update_node(ptr, &node)?;
                    freed.push(right_ptr);
                }
                (None, None) => {
                    return Err(BlockError::Corruption(format!(
                        "internal node {:?} has a single child",
                        parent_ptr
                    )));
                }
            }

            ptr = parent_ptr;
            node = parent;
        }

        for p in freed {
            self.free_or_warn(p);
        }
        Ok(())
    }

    /// All keys in ascending order, optionally only those starting with `prefix`
    pub fn keys(&self, prefix: Option<&str>) -> Result<Vec<String>> {
        let mut out = Vec::new();
        self.collect_keys(self.root, prefix.unwrap_or(""), 0, &mut out)?;
        Ok(out)
    }

    /// Walk the whole tree checking ordering, separator bounds, occupancy
    /// and that every leaf sits at the same depth
    pub fn verify(&self) -> Result<IndexStats> {
        let mut stats = IndexStats::default();
        let mut leaf_depth = None;
        self.verify_node(self.root, None, None, 1, &mut leaf_depth, &mut stats)?;
        stats.depth = leaf_depth.unwrap_or(1);
        Ok(stats)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Map `key` to `value_ptr`, returning the pointer it replaced
    ///
    /// Takes ownership of `value_ptr`: it is freed again if the tree was
    /// left untouched.
    fn insert_pointer(
        &mut self,
        key: &str,
        value_ptr: BlockPointer,
    ) -> Result<Option<BlockPointer>> {
        let mut fresh = Vec::new();
        let plan = match self.plan_insert(key, value_ptr, &mut fresh) {
            Ok(plan) => plan,
            Err(e) => {
                self.abandon(fresh, value_ptr);
                return Err(e);
            }
        };

        for (i, (ptr, bytes)) in plan.updates.iter().enumerate() {
            if let Err(e) = self.objects.update(*ptr, bytes) {
                if i == 0 {
                    self.abandon(fresh, value_ptr);
                } else {
                    tracing::warn!("Index partially updated, rewrite of {:?} failed: {}", ptr, e);
                }
                return Err(e);
            }
        }

        if let Some(new_root) = plan.new_root {
            if let Err(e) = self.set_root(new_root) {
                if plan.updates.is_empty() {
                    self.abandon(fresh, value_ptr);
                } else {
                    tracing::warn!("Index partially updated, root switch failed: {}", e);
                }
                return Err(e);
            }
            tracing::debug!("Index root split, new root {:?}", new_root);
        }
        if let Some(old_root) = plan.retired_root {
            self.free_or_warn(old_root);
        }

        Ok(plan.replaced)
    }

    /// Work out every node change an insert needs
    ///
    /// Split siblings and new root nodes are written here (their pointers
    /// collected in `fresh`); existing nodes are only encoded. On a root
    /// split the left half is written fresh too, so the old tree stays
    /// intact until the root slot switches.
    fn plan_insert(
        &self,
        key: &str,
        value_ptr: BlockPointer,
        fresh: &mut Vec<BlockPointer>,
    ) -> Result<InsertPlan> {
        let (mut path, mut ptr, mut node) = self.descend(key)?;
        let mut plan = InsertPlan::default();

        match node.search(key) {
            Ok(i) => {
                plan.replaced = Some(std::mem::replace(&mut node.children[i], value_ptr));
                plan.updates.push((ptr, node.encode()?));
                return Ok(plan);
            }
            Err(i) => {
                node.keys.insert(i, key.to_string());
                node.children.insert(i, value_ptr);
            }
        }

        loop {
            if node.keys.len() <= super::NODE_KEYS {
                plan.updates.push((ptr, node.encode()?));
                break;
            }

            let (separator, right) = node.split();
            let right_ptr = self.write_node(&right)?;
            fresh.push(right_ptr);

            match path.pop() {
                Some(PathEntry {
                    ptr: parent_ptr,
                    node: mut parent,
                    slot,
                }) => {
                    plan.updates.push((ptr, node.encode()?));
                    parent.keys.insert(slot, separator);
                    parent.children.insert(slot + 1, right_ptr);
                    ptr = parent_ptr;
                    node = parent;
                }
                None => {
                    let left_ptr = self.write_node(&node)?;
                    fresh.push(left_ptr);
                    let root = BTreeNode::internal(vec![separator], vec![left_ptr, right_ptr]);
                    let root_ptr = self.write_node(&root)?;
                    fresh.push(root_ptr);
                    plan.new_root = Some(root_ptr);
                    plan.retired_root = Some(ptr);
                    break;
                }
            }
        }

        // Parents before children: a child keeps all its keys until the
        // parent already routes the moved half to the new sibling
        plan.updates.reverse();
        Ok(plan)
    }

    /// Free the objects of an insert that changed nothing
    fn abandon(&self, fresh: Vec<BlockPointer>, value_ptr: BlockPointer) {
        for ptr in fresh {
            self.free_or_warn(ptr);
        }
        self.free_or_warn(value_ptr);
    }

    /// Descend from the root to the leaf responsible for `key`
    fn descend(&self, key: &str) -> Result<(Vec<PathEntry>, BlockPointer, BTreeNode)> {
        let mut path = Vec::new();
        let mut ptr = self.root;
        let mut node = self.load_node(ptr)?;

        while !node.is_leaf() {
            if path.len() >= MAX_DEPTH {
                return Err(BlockError::Corruption(format!(
                    "index deeper than {} levels",
                    MAX_DEPTH
                )));
            }
            let slot = node.child_index(key);
            let child = node.children[slot];
            path.push(PathEntry { ptr, node, slot });
            ptr = child;
            node = self.load_node(ptr)?;
        }

        Ok((path, ptr, node))
    }

    /// In-order walk; returns `false` once past the prefix range
    fn collect_keys(
        &self,
        ptr: BlockPointer,
        prefix: &str,
        depth: usize,
        out: &mut Vec<String>,
    ) -> Result<bool> {
        if depth >= MAX_DEPTH {
            return Err(BlockError::Corruption(format!(
                "index deeper than {} levels",
                MAX_DEPTH
            )));
        }
        let node = self.load_node(ptr)?;

        if node.is_leaf() {
            for key in node.keys {
                if key.starts_with(prefix) {
                    out.push(key);
                } else if key.as_str() > prefix {
                    return Ok(false);
                }
            }
            return Ok(true);
        }

        for (i, &child) in node.children.iter().enumerate() {
            // Everything in child i sorts below keys[i]
            if node.keys.get(i).is_some_and(|upper| upper.as_str() <= prefix) {
                continue;
            }
            // Everything in child i sorts at or above keys[i-1]
            if let Some(lower) = i.checked_sub(1).map(|j| &node.keys[j]) {
                if lower.as_str() > prefix && !lower.starts_with(prefix) {
                    return Ok(false);
                }
            }
            if !self.collect_keys(child, prefix, depth + 1, out)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn verify_node(
        &self,
        ptr: BlockPointer,
        lower: Option<&str>,
        upper: Option<&str>,
        depth: usize,
        leaf_depth: &mut Option<usize>,
        stats: &mut IndexStats,
    ) -> Result<()> {
        if depth > MAX_DEPTH {
            return Err(BlockError::Corruption(format!(
                "index deeper than {} levels",
                MAX_DEPTH
            )));
        }
        let node = self.load_node(ptr)?;
        stats.nodes += 1;

        if ptr != self.root && node.keys.len() < MIN_KEYS {
            return Err(BlockError::Corruption(format!(
                "node {:?} holds {} keys, minimum is {}",
                ptr,
                node.keys.len(),
                MIN_KEYS
            )));
        }
        for key in &node.keys {
            let above = lower.map_or(true, |l| key.as_str() >= l);
            let below = upper.map_or(true, |u| key.as_str() < u);
            if !above || !below {
                return Err(BlockError::Corruption(format!(
                    "key {:?} in {:?} outside separator bounds {:?}..{:?}",
                    key, ptr, lower, upper
                )));
            }
        }

        if node.is_leaf() {
            stats.leaves += 1;
            stats.keys += node.keys.len();
            match *leaf_depth {
                None => *leaf_depth = Some(depth),
                Some(d) if d != depth => {
                    return Err(BlockError::Corruption(format!(
                        "leaf {:?} at depth {}, expected {}",
                        ptr, depth, d
                    )));
                }
                Some(_) => {}
            }
            return Ok(());
        }

        for (i, &child) in node.children.iter().enumerate() {
            let child_lower = i.checked_sub(1).map(|j| node.keys[j].as_str()).or(lower);
            let child_upper = node.keys.get(i).map(String::as_str).or(upper);
            self.verify_node(child, child_lower, child_upper, depth + 1, leaf_depth, stats)?;
        }
        Ok(())
    }

    fn load_node(&self, ptr: BlockPointer) -> Result<BTreeNode> {
        BTreeNode::decode(&self.objects.read(ptr)?)
    }

    fn write_node(&self, node: &BTreeNode) -> Result<BlockPointer> {
        self.objects.write(&node.encode()?)
    }

    fn update_node(&self, ptr: BlockPointer, node: &BTreeNode) -> Result<()> {
        self.objects.update(ptr, &node.encode()?)
    }

    fn set_root(&mut self, root: BlockPointer) -> Result<()> {
        self.slot.store(root)?;
        self.root = root;
        Ok(())
    }

    fn free_or_warn(&self, ptr: BlockPointer) {
        if let Err(e) = self.objects.delete(ptr) {
            tracing::warn!("Potential block leak at {:?}: {}", ptr, e);
        }
    }
}

/// Move the left sibling's last entry into `node` (at `slot` in `parent`)
fn borrow_from_left(
    parent: &mut BTreeNode,
    slot: usize,
    left: &mut BTreeNode,
    node: &mut BTreeNode,
) {
    let (Some(key), Some(child)) = (left.keys.pop(), left.children.pop()) else {
        return;
    };
    if node.is_leaf() {
        node.keys.insert(0, key);
        node.children.insert(0, child);
        parent.keys[slot - 1] = node.keys[0].clone();
    } else {
        let separator = std::mem::replace(&mut parent.keys[slot - 1], key);
        node.keys.insert(0, separator);
        node.children.insert(0, child);
    }
}

/// Move the right sibling's first entry into `node` (at `slot` in `parent`)
fn borrow_from_right(
    parent: &mut BTreeNode,
    slot: usize,
    node: &mut BTreeNode,
    right: &mut BTreeNode,
) {
    if right.keys.is_empty() || right.children.is_empty() {
        return;
    }
    let key = right.keys.remove(0);
    let child = right.children.remove(0);
    if node.is_leaf() {
        node.keys.push(key);
        node.children.push(child);
        parent.keys[slot] = right.keys[0].clone();
    } else {
        let separator = std::mem::replace(&mut parent.keys[slot], key);
        node.keys.push(separator);
        node.children.push(child);
    }
}
