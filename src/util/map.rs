use hashbrown::HashMap;

/// 快取與索引用的鍵名
pub trait Keyable {
    fn key(&self) -> String;
    /// 含前置字元
    fn key_with_prefix(&self) -> String;
}

/// 依 `key()` 分組，同一組內保持原本順序
pub fn group_by_key<T: Keyable>(entities: Vec<T>) -> HashMap<String, Vec<T>> {
    let mut map: HashMap<String, Vec<T>> = HashMap::with_capacity(entities.len());
    for e in entities {
        map.entry(e.key()).or_default().push(e);
    }
    map
}
