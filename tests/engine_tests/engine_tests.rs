//! Tests for Engine
//!
//! These tests verify:
//! - Basic insert/find/delete operations
//! - Key and value validation
//! - Command execution
//! - Persistence across close/reopen
//! - Concurrent access patterns
//! - Engine lifecycle (open/close)

use std::sync::Arc;
use std::thread;

use blockkv::config::Config;
use blockkv::engine::Engine;
use blockkv::error::BlockError;
use blockkv::protocol::Command;
use blockkv::storage::BLOCK_SIZE;
use tempfile::TempDir;

const TEST_BLOCKS: u64 = 4096;

// =============================================================================
// Helper Functions
// =============================================================================

fn test_config(dir: &std::path::Path) -> Config {
    Config::builder()
        .data_dir(dir)
        .max_blocks(TEST_BLOCKS)
        .build()
}

fn setup_temp_engine() -> (TempDir, Engine) {
    let temp_dir = TempDir::new().unwrap();
    let engine = Engine::open(test_config(temp_dir.path())).unwrap();
    (temp_dir, engine)
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_engine_open_creates_files() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("mydb");

    let _engine = Engine::open(test_config(&data_dir)).unwrap();

    assert!(data_dir.join("db").exists());
    assert!(data_dir.join("root").exists());
    let bitmap_len = std::fs::metadata(data_dir.join("block_bitmap"))
        .unwrap()
        .len();
    assert_eq!(bitmap_len, test_config(&data_dir).bitmap_bytes());
}

#[test]
fn test_engine_open_path_convenience() {
    let temp_dir = TempDir::new().unwrap();

    let engine = Engine::open_path(temp_dir.path()).unwrap();
    engine.insert("key", b"value").unwrap();

    assert_eq!(engine.data_dir(), temp_dir.path());
    assert_eq!(engine.config().max_blocks, blockkv::config::DEFAULT_MAX_BLOCKS);
    assert_eq!(engine.find("key").unwrap(), b"value");
}

#[test]
fn test_engine_insert_find() {
    let (_temp, engine) = setup_temp_engine();

    engine.insert("hello", b"world").unwrap();
    assert_eq!(engine.find("hello").unwrap(), b"world");
}

#[test]
fn test_engine_find_nonexistent_key() {
    let (_temp, engine) = setup_temp_engine();
    assert!(matches!(engine.find("missing"), Err(BlockError::NotFound)));
}

#[test]
fn test_engine_insert_overwrite() {
    let (_temp, engine) = setup_temp_engine();

    engine.insert("key", b"value1").unwrap();
    engine.insert("key", b"value2").unwrap();

    assert_eq!(engine.find("key").unwrap(), b"value2");
    assert_eq!(engine.keys(None).unwrap(), vec!["key"]);
}

#[test]
fn test_engine_delete() {
    let (_temp, engine) = setup_temp_engine();

    engine.insert("key", b"value").unwrap();
    engine.delete("key").unwrap();

    assert!(matches!(engine.find("key"), Err(BlockError::NotFound)));
    assert_eq!(engine.used_blocks(), 1);
}

#[test]
fn test_engine_delete_nonexistent_key() {
    let (_temp, engine) = setup_temp_engine();
    assert!(matches!(engine.delete("nope"), Err(BlockError::NotFound)));
}

#[test]
fn test_engine_multiple_keys() {
    let (_temp, engine) = setup_temp_engine();

    for i in 0..100 {
        engine
            .insert(&format!("key{:03}", i), format!("value{}", i).as_bytes())
            .unwrap();
    }

    for i in 0..100 {
        assert_eq!(
            engine.find(&format!("key{:03}", i)).unwrap(),
            format!("value{}", i).into_bytes()
        );
    }
    assert_eq!(engine.keys(None).unwrap().len(), 100);
    assert_eq!(engine.keys(Some("key05")).unwrap().len(), 10);
    assert_eq!(engine.verify().unwrap().keys, 100);
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_engine_rejects_bad_keys() {
    let (_temp, engine) = setup_temp_engine();

    assert!(matches!(engine.insert("", b"v"), Err(BlockError::Argument(_))));
    assert!(matches!(
        engine.insert(&"k".repeat(241), b"v"),
        Err(BlockError::Argument(_))
    ));
    assert!(matches!(engine.find("two words"), Err(BlockError::Argument(_))));
    assert_eq!(engine.used_blocks(), 1);
}

#[test]
fn test_engine_rejects_bad_values() {
    let (_temp, engine) = setup_temp_engine();

    assert!(matches!(engine.insert("k", b""), Err(BlockError::Argument(_))));
    assert!(matches!(
        engine.insert("k", b"a\0b"),
        Err(BlockError::Argument(_))
    ));
    assert_eq!(engine.used_blocks(), 1);
}

#[test]
fn test_engine_large_value() {
    let (_temp, engine) = setup_temp_engine();

    let large_value = vec![0xAB; 100_000];
    engine.insert("large_key", &large_value).unwrap();

    assert_eq!(engine.find("large_key").unwrap(), large_value);
    // root + value span
    assert_eq!(engine.used_blocks(), 1 + (100_000u64).div_ceil(BLOCK_SIZE as u64));
}

#[test]
fn test_engine_value_larger_than_store_fails() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .data_dir(temp_dir.path())
        .max_blocks(8)
        .build();
    let engine = Engine::open(config).unwrap();

    let result = engine.insert("big", &vec![1u8; BLOCK_SIZE * 8]);
    assert!(matches!(result, Err(BlockError::AllocationFailure { .. })));

    // The failure leaves the engine usable
    engine.insert("small", b"ok").unwrap();
    assert_eq!(engine.find("small").unwrap(), b"ok");
}

// =============================================================================
// Command Execution Tests
// =============================================================================

#[test]
fn test_engine_execute_insert_find() {
    let (_temp, engine) = setup_temp_engine();

    let msg = engine
        .execute(Command::Insert {
            key: "greeting".to_string(),
            value: "hello there".to_string(),
        })
        .unwrap();
    assert_eq!(msg, "Inserted.");

    let msg = engine
        .execute(Command::Find {
            key: "greeting".to_string(),
        })
        .unwrap();
    assert_eq!(msg, "hello there");
}

#[test]
fn test_engine_execute_delete() {
    let (_temp, engine) = setup_temp_engine();
    engine.insert("k", b"v").unwrap();

    let msg = engine
        .execute(Command::Delete {
            key: "k".to_string(),
        })
        .unwrap();
    assert_eq!(msg, "Deleted.");

    let result = engine.execute(Command::Find {
        key: "k".to_string(),
    });
    assert!(matches!(result, Err(BlockError::NotFound)));
}

#[test]
fn test_engine_execute_keys() {
    let (_temp, engine) = setup_temp_engine();
    for k in ["beta", "alpha", "alpine"] {
        engine.insert(k, b"v").unwrap();
    }

    let all = engine.execute(Command::Keys { prefix: None }).unwrap();
    assert_eq!(all, "alpha\nalpine\nbeta");

    let some = engine
        .execute(Command::Keys {
            prefix: Some("alp".to_string()),
        })
        .unwrap();
    assert_eq!(some, "alpha\nalpine");

    let none = engine
        .execute(Command::Keys {
            prefix: Some("zz".to_string()),
        })
        .unwrap();
    assert_eq!(none, "");
}

#[test]
fn test_engine_execute_quit() {
    let (_temp, engine) = setup_temp_engine();
    assert_eq!(engine.execute(Command::Quit).unwrap(), "Bye.");
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_engine_data_survives_close_and_reopen() {
    let temp_dir = TempDir::new().unwrap();

    {
        let engine = Engine::open(test_config(temp_dir.path())).unwrap();
        for i in 0..60 {
            engine
                .insert(&format!("key{:02}", i), format!("value{}", i).as_bytes())
                .unwrap();
        }
        engine.delete("key13").unwrap();
        engine.close().unwrap();
    }

    let engine = Engine::open(test_config(temp_dir.path())).unwrap();
    assert_eq!(engine.keys(None).unwrap().len(), 59);
    assert_eq!(engine.find("key42").unwrap(), b"value42");
    assert!(matches!(engine.find("key13"), Err(BlockError::NotFound)));
    engine.verify().unwrap();
}

#[test]
fn test_engine_reopen_with_different_max_blocks_fails() {
    let temp_dir = TempDir::new().unwrap();
    drop(Engine::open(test_config(temp_dir.path())).unwrap());

    let config = Config::builder()
        .data_dir(temp_dir.path())
        .max_blocks(TEST_BLOCKS * 2)
        .build();
    assert!(matches!(Engine::open(config), Err(BlockError::Config(_))));
}

#[test]
fn test_engine_accessors() {
    let (temp, engine) = setup_temp_engine();

    assert_eq!(engine.data_dir(), temp.path());
    assert_eq!(engine.config().max_blocks, TEST_BLOCKS);
    assert_eq!(engine.allocator().max_blocks(), TEST_BLOCKS);
    assert_eq!(engine.used_blocks(), 1);
}

// =============================================================================
// Concurrent Access Tests
// =============================================================================

#[test]
fn test_engine_concurrent_reads() {
    let temp_dir = TempDir::new().unwrap();
    let engine = Arc::new(Engine::open(test_config(temp_dir.path())).unwrap());

    for i in 0..100 {
        engine
            .insert(&format!("key{}", i), format!("value{}", i).as_bytes())
            .unwrap();
    }

    let mut handles = vec![];
    for _ in 0..4 {
        let engine_clone = Arc::clone(&engine);
        handles.push(thread::spawn(move || {
            for i in 0..100 {
                let result = engine_clone.find(&format!("key{}", i)).unwrap();
                assert_eq!(result, format!("value{}", i).into_bytes());
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_engine_concurrent_writes() {
    let temp_dir = TempDir::new().unwrap();
    let engine = Arc::new(Engine::open(test_config(temp_dir.path())).unwrap());

    let mut handles = vec![];
    for t in 0..4 {
        let engine_clone = Arc::clone(&engine);
        handles.push(thread::spawn(move || {
            for i in 0..25 {
                let key = format!("thread{}_key{}", t, i);
                let value = format!("thread{}_value{}", t, i);
                engine_clone.insert(&key, value.as_bytes()).unwrap();
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }

    for t in 0..4 {
        for i in 0..25 {
            let key = format!("thread{}_key{}", t, i);
            let expected = format!("thread{}_value{}", t, i);
            assert_eq!(engine.find(&key).unwrap(), expected.into_bytes());
        }
    }
    assert_eq!(engine.verify().unwrap().keys, 100);
}

#[test]
fn test_engine_concurrent_mixed_workload() {
    let temp_dir = TempDir::new().unwrap();
    let engine = Arc::new(Engine::open(test_config(temp_dir.path())).unwrap());

    for i in 0..50 {
        engine.insert(&format!("stable{}", i), b"fixed").unwrap();
    }

    let writer = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            for round in 0..5 {
                for i in 0..40 {
                    let key = format!("churn{}", i);
                    if round % 2 == 0 {
                        engine.insert(&key, b"churning").unwrap();
                    } else {
                        engine.delete(&key).unwrap();
                    }
                }
            }
        })
    };

    let readers: Vec<_> = (0..3)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for _ in 0..5 {
                    for i in 0..50 {
                        assert_eq!(engine.find(&format!("stable{}", i)).unwrap(), b"fixed");
                    }
                }
            })
        })
        .collect();

    writer.join().unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    // Rounds 0, 2 and 4 insert; rounds 1 and 3 delete
    assert_eq!(engine.keys(Some("churn")).unwrap().len(), 40);
    let stats = engine.verify().unwrap();
    assert_eq!(stats.keys, 90);
    assert_eq!(engine.used_blocks(), (stats.nodes + 90) as u64);
}
