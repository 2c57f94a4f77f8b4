use arena_hashset::{Map, SystemAllocator, UniqueBlock};

fn table<K, V>(max_nodes: usize) -> (UniqueBlock, Map<K, V>) {
    let owner = UniqueBlock::<SystemAllocator>::new(Map::<K, V>::memory_requirement(max_nodes)).unwrap();
    let map = unsafe { Map::from_block(owner.get(), max_nodes) };
    (owner, map)
}

/// Invariant: erasing one key leaves the others reachable.
#[test]
fn string_map_scenario() {
    let (_owner, mut map) = table::<String, i32>(8);
    map.insert("a".to_string(), 1).unwrap();
    map.insert("b".to_string(), 2).unwrap();
    assert_eq!(*map.at("a"), 1);
    assert_eq!(map.remove("a"), Some(1));
    assert!(map.find("a").is_none());
    assert_eq!(*map.at("b"), 2);
    assert_eq!(map["b"], 2);
}

/// Invariant: the value is reachable and mutable through the key, and a
/// second insert of the key does not replace it.
#[test]
fn values_are_updated_through_get_mut() {
    let (_owner, mut map) = table::<String, Vec<u32>>(4);
    map.insert("xs".into(), vec![1]).unwrap();
    map.get_mut("xs").unwrap().push(2);
    *map.at_mut("xs") = vec![3];
    let (v, inserted) = map.emplace("xs".into(), vec![9]).unwrap();
    assert!(!inserted);
    assert_eq!(v, &vec![3]);
}

/// Invariant: keys, values and drain see exactly the live entries.
#[test]
fn iteration_views_agree() {
    let (_owner, mut map) = table::<u32, u32>(16);
    for k in 0..10 {
        map.insert(k, k * k).unwrap();
    }
    let mut keys: Vec<u32> = map.keys().copied().collect();
    keys.sort_unstable();
    assert_eq!(keys, (0..10).collect::<Vec<_>>());
    assert_eq!(map.values().copied().sum::<u32>(), (0..10).map(|k| k * k).sum());
    for (_, v) in map.iter_mut() {
        *v += 1;
    }
    let mut drained: Vec<(u32, u32)> = map.drain().collect();
    drained.sort_unstable();
    assert_eq!(drained, (0..10).map(|k| (k, k * k + 1)).collect::<Vec<_>>());
    assert!(map.is_empty());
}

/// Invariant: a full map still answers lookups and reports capacity
/// errors without losing entries.
#[test]
fn full_map_keeps_entries() {
    let (_owner, mut map) = table::<u8, char>(3);
    for (k, c) in [(1, 'a'), (2, 'b'), (3, 'c')] {
        map.insert(k, c).unwrap();
    }
    assert!(map.insert(4, 'd').unwrap_err().is_capacity());
    assert_eq!(map.len(), 3);
    assert_eq!(map.get(&3), Some(&'c'));
}
