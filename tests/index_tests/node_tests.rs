//! B-tree Node Tests
//!
//! These tests verify:
//! - Fixed-width record encoding
//! - CRC and structural validation on decode
//! - Split and merge shapes
//! - Key validation

use blockkv::error::BlockError;
use blockkv::index::{validate_key, BTreeNode, NodeKind, KEY_LEN, MIN_KEYS, NODE_KEYS, NODE_SIZE};
use blockkv::storage::{BlockPointer, BLOCK_SIZE};

// =============================================================================
// Helper Functions
// =============================================================================

fn keys(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn pointers(n: usize) -> Vec<BlockPointer> {
    (0..n).map(|i| BlockPointer::new(i as u64 + 1, 1)).collect()
}

fn full_leaf(count: usize) -> BTreeNode {
    let names: Vec<String> = (0..count).map(|i| format!("k{:02}", i)).collect();
    BTreeNode::leaf(names, pointers(count))
}

// =============================================================================
// Constant Tests
// =============================================================================

#[test]
fn test_layout_constants() {
    assert_eq!(NODE_KEYS, 10);
    assert_eq!(KEY_LEN, 240);
    assert_eq!(MIN_KEYS, 5);
    assert_eq!(NODE_SIZE, 10 * 240 + 11 * 12 + 7);
    assert!(NODE_SIZE <= BLOCK_SIZE);
}

// =============================================================================
// Encoding Tests
// =============================================================================

#[test]
fn test_encode_is_fixed_size() {
    assert_eq!(BTreeNode::empty_leaf().encode().unwrap().len(), NODE_SIZE);
    assert_eq!(full_leaf(NODE_KEYS).encode().unwrap().len(), NODE_SIZE);
}

#[test]
fn test_encode_decode_leaf() {
    let node = BTreeNode::leaf(keys(&["alice", "bob", "carl"]), pointers(3));
    let decoded = BTreeNode::decode(&node.encode().unwrap()).unwrap();
    assert_eq!(decoded, node);
    assert!(decoded.is_leaf());
}

#[test]
fn test_encode_decode_internal() {
    let node = BTreeNode::internal(keys(&["m", "t"]), pointers(3));
    let decoded = BTreeNode::decode(&node.encode().unwrap()).unwrap();
    assert_eq!(decoded.kind, NodeKind::Internal);
    assert_eq!(decoded, node);
}

#[test]
fn test_decode_accepts_block_padding() {
    let node = BTreeNode::leaf(keys(&["key"]), pointers(1));
    let mut bytes = node.encode().unwrap();
    bytes.resize(BLOCK_SIZE, 0);
    assert_eq!(BTreeNode::decode(&bytes).unwrap(), node);
}

#[test]
fn test_max_length_key_round_trips() {
    let long = "x".repeat(KEY_LEN);
    let node = BTreeNode::leaf(vec![long.clone()], pointers(1));
    let decoded = BTreeNode::decode(&node.encode().unwrap()).unwrap();
    assert_eq!(decoded.keys, vec![long]);
}

#[test]
fn test_key_field_layout() {
    let node = BTreeNode::leaf(keys(&["ab", "cd"]), vec![BlockPointer::new(7, 2); 2]);
    let bytes = node.encode().unwrap();

    assert_eq!(&bytes[..2], b"ab");
    assert!(bytes[2..KEY_LEN].iter().all(|&b| b == 0));
    assert_eq!(&bytes[KEY_LEN..KEY_LEN + 2], b"cd");

    let ptr_start = NODE_KEYS * KEY_LEN;
    assert_eq!(&bytes[ptr_start..ptr_start + 8], &7i64.to_le_bytes());
    assert_eq!(&bytes[ptr_start + 8..ptr_start + 12], &2i32.to_le_bytes());
}

#[test]
fn test_encode_rejects_too_many_keys() {
    let node = full_leaf(NODE_KEYS + 1);
    assert!(matches!(node.encode(), Err(BlockError::Corruption(_))));
}

#[test]
fn test_encode_rejects_child_count_mismatch() {
    let node = BTreeNode::internal(keys(&["m"]), pointers(1));
    assert!(matches!(node.encode(), Err(BlockError::Corruption(_))));
}

// =============================================================================
// Decode Validation Tests
// =============================================================================

#[test]
fn test_decode_detects_flipped_byte() {
    let mut bytes = full_leaf(4).encode().unwrap();
    bytes[10] ^= 0x01;
    assert!(matches!(
        BTreeNode::decode(&bytes),
        Err(BlockError::Corruption(_))
    ));
}

#[test]
fn test_decode_rejects_all_zero_block() {
    assert!(matches!(
        BTreeNode::decode(&vec![0u8; BLOCK_SIZE]),
        Err(BlockError::Corruption(_))
    ));
}

#[test]
fn test_decode_rejects_short_record() {
    assert!(matches!(
        BTreeNode::decode(&[0u8; 100]),
        Err(BlockError::Corruption(_))
    ));
}

// =============================================================================
// Split/Merge Tests
// =============================================================================

#[test]
fn test_leaf_split_copies_separator_up() {
    let mut node = full_leaf(NODE_KEYS + 1);
    let (separator, right) = node.split();

    assert_eq!(node.keys.len(), 5);
    assert_eq!(right.keys.len(), 6);
    assert_eq!(separator, right.keys[0]);
    assert_eq!(separator, "k05");
    assert_eq!(node.children.len(), 5);
    assert_eq!(right.children.len(), 6);
}

#[test]
fn test_internal_split_moves_median_up() {
    let names: Vec<String> = (0..NODE_KEYS + 1).map(|i| format!("k{:02}", i)).collect();
    let mut node = BTreeNode::internal(names, pointers(NODE_KEYS + 2));
    let (separator, right) = node.split();

    assert_eq!(separator, "k05");
    assert_eq!(node.keys.len(), 5);
    assert_eq!(right.keys.len(), 5);
    assert_eq!(node.children.len(), 6);
    assert_eq!(right.children.len(), 6);
    assert!(!node.keys.contains(&separator));
    assert!(!right.keys.contains(&separator));
}

#[test]
fn test_merge_internal_pulls_separator_down() {
    let mut left = BTreeNode::internal(keys(&["b"]), pointers(2));
    let right = BTreeNode::internal(keys(&["f"]), pointers(2));
    left.merge("d".to_string(), right);

    assert_eq!(left.keys, keys(&["b", "d", "f"]));
    assert_eq!(left.children.len(), 4);
}

#[test]
fn test_merge_leaf_drops_separator() {
    let mut left = BTreeNode::leaf(keys(&["a", "b"]), pointers(2));
    let right = BTreeNode::leaf(keys(&["c", "d"]), pointers(2));
    left.merge("c".to_string(), right);

    assert_eq!(left.keys, keys(&["a", "b", "c", "d"]));
    assert_eq!(left.children.len(), 4);
}

// =============================================================================
// Search Tests
// =============================================================================

#[test]
fn test_child_index_routes_equal_keys_right() {
    let node = BTreeNode::internal(keys(&["g", "p"]), pointers(3));

    assert_eq!(node.child_index("a"), 0);
    assert_eq!(node.child_index("g"), 1);
    assert_eq!(node.child_index("h"), 1);
    assert_eq!(node.child_index("p"), 2);
    assert_eq!(node.child_index("z"), 2);
}

// =============================================================================
// Key Validation Tests
// =============================================================================

#[test]
fn test_validate_key() {
    assert!(validate_key("alice").is_ok());
    assert!(validate_key(&"k".repeat(KEY_LEN)).is_ok());

    assert!(matches!(validate_key(""), Err(BlockError::Argument(_))));
    assert!(matches!(
        validate_key(&"k".repeat(KEY_LEN + 1)),
        Err(BlockError::Argument(_))
    ));
    assert!(matches!(validate_key("a b"), Err(BlockError::Argument(_))));
    assert!(matches!(validate_key("a\0b"), Err(BlockError::Argument(_))));
}
