use keydex::storage::btree::BPlusTree;
use keydex::storage::page::{Key, MAX_KEY_LEN};
use tempfile::TempDir;

fn open_tree(dir: &TempDir) -> BPlusTree {
    BPlusTree::open(dir.path().join("index.db")).unwrap()
}

fn key(s: &str) -> Key {
    Key::new(s.as_bytes()).unwrap()
}

#[test]
fn empty_tree_finds_nothing() {
    let dir = TempDir::new().unwrap();
    let mut tree = open_tree(&dir);
    assert!(tree.is_empty());
    assert_eq!(tree.find_one(&key("a")).unwrap(), None);
    assert!(tree.find_all(&key("a")).unwrap().is_empty());
}

#[test]
fn insert_then_find() {
    let dir = TempDir::new().unwrap();
    let mut tree = open_tree(&dir);
    tree.insert(key("a"), 1).unwrap();
    assert!(!tree.is_empty());
    assert_eq!(tree.find_one(&key("a")).unwrap(), Some(1));
    assert_eq!(tree.find_all(&key("a")).unwrap(), vec![1]);
    assert_eq!(tree.find_one(&key("b")).unwrap(), None);
    tree.verify().unwrap();
}

#[test]
fn exact_duplicate_insert_is_a_noop() {
    let dir = TempDir::new().unwrap();
    let mut tree = open_tree(&dir);
    tree.insert(key("x"), 5).unwrap();
    tree.insert(key("x"), 5).unwrap();
    assert_eq!(tree.find_all(&key("x")).unwrap(), vec![5]);
    tree.verify().unwrap();
}

#[test]
fn delete_of_absent_payload_is_a_noop() {
    let dir = TempDir::new().unwrap();
    let mut tree = open_tree(&dir);
    tree.insert(key("a"), 1).unwrap();
    tree.remove(key("a"), 2).unwrap();
    tree.remove(key("b"), 1).unwrap();
    assert_eq!(tree.find_all(&key("a")).unwrap(), vec![1]);
    tree.verify().unwrap();
}

#[test]
fn delete_on_empty_tree_is_a_noop() {
    let dir = TempDir::new().unwrap();
    let mut tree = open_tree(&dir);
    tree.remove(key("a"), 1).unwrap();
    assert!(tree.is_empty());
}

#[test]
fn removing_the_last_entry_empties_the_tree() {
    let dir = TempDir::new().unwrap();
    let mut tree = open_tree(&dir);
    tree.insert(key("solo"), 9).unwrap();
    tree.remove(key("solo"), 9).unwrap();
    assert!(tree.is_empty());
    assert_eq!(tree.find_all(&key("solo")).unwrap(), Vec::<i32>::new());
    tree.verify().unwrap();
    // the tree is usable again afterwards
    tree.insert(key("solo"), 10).unwrap();
    assert_eq!(tree.find_one(&key("solo")).unwrap(), Some(10));
}

#[test]
fn insert_then_delete_restores_the_previous_contents() {
    let dir = TempDir::new().unwrap();
    let mut tree = open_tree(&dir);
    for (k, p) in [("ant", 1), ("bee", 2), ("cat", 3)] {
        tree.insert(key(k), p).unwrap();
    }
    tree.insert(key("bee"), 99).unwrap();
    tree.remove(key("bee"), 99).unwrap();
    assert_eq!(tree.find_all(&key("ant")).unwrap(), vec![1]);
    assert_eq!(tree.find_all(&key("bee")).unwrap(), vec![2]);
    assert_eq!(tree.find_all(&key("cat")).unwrap(), vec![3]);
    tree.verify().unwrap();
}

#[test]
fn keys_are_found_in_byte_order() {
    let dir = TempDir::new().unwrap();
    let mut tree = open_tree(&dir);
    let names = ["pear", "apple", "Banana", "apricot", "a", "zz", "0digit"];
    for (i, name) in names.iter().enumerate() {
        tree.insert(key(name), i as i32).unwrap();
    }
    tree.verify().unwrap();
    for (i, name) in names.iter().enumerate() {
        assert_eq!(tree.find_one(&key(name)).unwrap(), Some(i as i32), "key {name}");
    }
}

#[test]
fn max_length_keys_are_accepted() {
    let dir = TempDir::new().unwrap();
    let mut tree = open_tree(&dir);
    let long_a = "a".repeat(MAX_KEY_LEN);
    let long_b = "b".repeat(MAX_KEY_LEN);
    tree.insert(key(&long_a), 1).unwrap();
    tree.insert(key(&long_b), 2).unwrap();
    assert_eq!(tree.find_one(&key(&long_a)).unwrap(), Some(1));
    assert_eq!(tree.find_one(&key(&long_b)).unwrap(), Some(2));
    assert!(Key::new("c".repeat(MAX_KEY_LEN + 1).as_bytes()).is_err());
}

#[test]
fn prefix_keys_stay_distinct() {
    let dir = TempDir::new().unwrap();
    let mut tree = open_tree(&dir);
    tree.insert(key("ab"), 1).unwrap();
    tree.insert(key("abc"), 2).unwrap();
    tree.insert(key("abcd"), 3).unwrap();
    assert_eq!(tree.find_all(&key("ab")).unwrap(), vec![1]);
    assert_eq!(tree.find_all(&key("abc")).unwrap(), vec![2]);
    assert_eq!(tree.find_all(&key("abcd")).unwrap(), vec![3]);
    tree.verify().unwrap();
}
