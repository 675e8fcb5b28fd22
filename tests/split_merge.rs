use keydex::storage::btree::BPlusTree;
use keydex::storage::page::Key;
use tempfile::TempDir;

fn open_tree(dir: &TempDir) -> BPlusTree {
    BPlusTree::open(dir.path().join("index.db")).unwrap()
}

fn key(s: &str) -> Key {
    Key::new(s.as_bytes()).unwrap()
}

#[test]
fn duplicate_payload_run_splits_and_merges() {
    let dir = TempDir::new().unwrap();
    let mut tree = open_tree(&dir);
    for p in 1..=10 {
        tree.insert(key("k"), p).unwrap();
        tree.verify().unwrap();
    }
    assert_eq!(tree.find_all(&key("k")).unwrap(), (1..=10).collect::<Vec<_>>());
    for p in 1..=8 {
        tree.remove(key("k"), p).unwrap();
        tree.verify().unwrap();
    }
    assert_eq!(tree.find_all(&key("k")).unwrap(), vec![9, 10]);
}

#[test]
fn ascending_inserts_then_ascending_deletes() {
    let dir = TempDir::new().unwrap();
    let mut tree = open_tree(&dir);
    let keys: Vec<String> = (0..200).map(|i| format!("key{i:04}")).collect();
    for (i, k) in keys.iter().enumerate() {
        tree.insert(key(k), i as i32).unwrap();
        tree.verify().unwrap();
    }
    for (i, k) in keys.iter().enumerate() {
        assert_eq!(tree.find_one(&key(k)).unwrap(), Some(i as i32));
    }
    for (i, k) in keys.iter().enumerate() {
        tree.remove(key(k), i as i32).unwrap();
        tree.verify().unwrap();
    }
    assert!(tree.is_empty());
}

#[test]
fn descending_inserts_then_descending_deletes() {
    let dir = TempDir::new().unwrap();
    let mut tree = open_tree(&dir);
    let keys: Vec<String> = (0..200).rev().map(|i| format!("key{i:04}")).collect();
    for k in &keys {
        tree.insert(key(k), 0).unwrap();
        tree.verify().unwrap();
    }
    for k in &keys {
        tree.remove(key(k), 0).unwrap();
        tree.verify().unwrap();
    }
    assert!(tree.is_empty());
}

#[test]
fn deleting_from_the_middle_forces_borrows_and_merges() {
    let dir = TempDir::new().unwrap();
    let mut tree = open_tree(&dir);
    let keys: Vec<String> = (0..120).map(|i| format!("k{i:03}")).collect();
    for (i, k) in keys.iter().enumerate() {
        tree.insert(key(k), i as i32).unwrap();
    }
    tree.verify().unwrap();
    // Walk outward from the middle so underflow lands on interior pages.
    let mut order: Vec<usize> = Vec::new();
    let (mut lo, mut hi) = (59i32, 60usize);
    while order.len() < keys.len() {
        if lo >= 0 {
            order.push(lo as usize);
            lo -= 1;
        }
        if hi < keys.len() {
            order.push(hi);
            hi += 1;
        }
    }
    for &i in &order {
        tree.remove(key(&keys[i]), i as i32).unwrap();
        tree.verify().unwrap();
    }
    assert!(tree.is_empty());
}

#[test]
fn deleting_the_maximum_repairs_routing_keys() {
    let dir = TempDir::new().unwrap();
    let mut tree = open_tree(&dir);
    let keys: Vec<String> = (0..60).map(|i| format!("k{i:02}")).collect();
    for k in &keys {
        tree.insert(key(k), 7).unwrap();
    }
    tree.verify().unwrap();
    // Repeatedly delete the largest key; each removal invalidates the
    // rightmost routing entry at every level above the leaf.
    for k in keys.iter().rev() {
        tree.remove(key(k), 7).unwrap();
        tree.verify().unwrap();
        assert_eq!(tree.find_one(&key(k)).unwrap(), None);
    }
    assert!(tree.is_empty());
}

#[test]
fn reinserting_after_heavy_deletion_still_routes_correctly() {
    let dir = TempDir::new().unwrap();
    let mut tree = open_tree(&dir);
    for i in 0..100 {
        tree.insert(key(&format!("k{i:03}")), i).unwrap();
    }
    for i in (0..100).step_by(2) {
        tree.remove(key(&format!("k{i:03}")), i).unwrap();
    }
    tree.verify().unwrap();
    for i in (0..100).step_by(2) {
        tree.insert(key(&format!("k{i:03}")), 1000 + i).unwrap();
    }
    tree.verify().unwrap();
    for i in 0..100 {
        let expected = if i % 2 == 0 { 1000 + i } else { i };
        assert_eq!(tree.find_one(&key(&format!("k{i:03}"))).unwrap(), Some(expected));
    }
}
