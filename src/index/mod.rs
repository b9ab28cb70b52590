//! Index Module
//!
//! B-tree mapping string keys to value objects in the object store.
//!
//! ## Responsibilities
//! - Ordered point lookups and prefix scans
//! - Split on overflow, borrow or merge on underflow
//! - Persist the root pointer across restarts
//!
//! ## Shape
//! ```text
//!                  ┌───────────────┐
//!                  │ root (internal)│ ◄── root slot file
//!                  │   [ "m" ]     │
//!                  └──┬─────────┬──┘
//!                     │         │
//!            ┌────────▼──┐   ┌──▼────────┐
//!            │ leaf      │   │ leaf      │
//!            │ a  c  f   │   │ m  q  x   │
//!            └─┬──┬──┬───┘   └─┬──┬──┬───┘
//!              ▼  ▼  ▼         ▼  ▼  ▼
//!            value objects (ObjectStore)
//! ```
//! Order `NODE_KEYS + 1`; non-root nodes hold at least `MIN_KEYS` keys.

mod btree;
mod node;
mod root;

pub use btree::{BTreeIndex, IndexStats};
pub use node::{validate_key, BTreeNode, NodeKind, KEY_LEN, MIN_KEYS, NODE_KEYS, NODE_SIZE};
pub use root::RootSlot;
