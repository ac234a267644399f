//! Attribute store used to stage measurements before table population.
//!
//! An attribute is either single-key (`name -> value`) or multi-key
//! (`name -> { (k1, .., kn) -> value }`). Multi-key attributes may name their
//! tuple positions; named attributes accept keyed access in any order and
//! support projections onto a subset of the positions.

mod value;

pub use value::{Key, Value};

use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NamespaceError {
    /// A single-key attribute was read before it was ever set
    #[error("attribute '{0}' is not defined")]
    NotFound(String),

    /// Keyed access that cannot work with the declared sub-keys
    #[error("attribute '{attribute}': {reason}")]
    Configuration { attribute: String, reason: String },
}

impl NamespaceError {
    fn configuration(attribute: &str, reason: impl Into<String>) -> Self {
        NamespaceError::Configuration {
            attribute: attribute.to_string(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct MultiKey {
    names: Vec<String>,
    entries: BTreeMap<Vec<Key>, Value>,
}

#[derive(Debug, Clone, Default)]
pub struct Namespace {
    /// Attribute names in first-write order
    order: Vec<String>,
    single: HashMap<String, Value>,
    multi: HashMap<String, MultiKey>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&mut self, name: &str) {
        if !self.order.iter().any(|n| n == name) {
            self.order.push(name.to_string());
        }
    }

    /// Set a single-key attribute. Replaces a multi-key attribute of the same name.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        self.multi.remove(&name);
        self.register(&name);
        self.single.insert(name, value.into());
    }

    /// Read a single-key attribute; reading one that was never set is an error.
    pub fn get(&self, name: &str) -> Result<&Value, NamespaceError> {
        self.single
            .get(name)
            .ok_or_else(|| NamespaceError::NotFound(name.to_string()))
    }

    /// Name the tuple positions of a multi-key attribute.
    pub fn set_key_names(&mut self, name: &str, names: &[&str]) {
        let entry = self.multi.entry(name.to_string()).or_default();
        entry.names = names.iter().map(|n| n.to_string()).collect();
    }

    /// Declared sub-key names, empty when the attribute is unnamed or unknown.
    pub fn key_names(&self, name: &str) -> &[String] {
        self.multi.get(name).map(|m| m.names.as_slice()).unwrap_or(&[])
    }

    /// Direct ordered-tuple write; does not require named sub-keys.
    pub fn insert(&mut self, name: &str, key: Vec<Key>, value: impl Into<Value>) {
        self.single.remove(name);
        self.register(name);
        self.multi
            .entry(name.to_string())
            .or_default()
            .entries
            .insert(key, value.into());
    }

    /// Direct ordered-tuple read.
    pub fn get_tuple(&self, name: &str, key: &[Key]) -> Option<&Value> {
        self.multi.get(name).and_then(|m| m.entries.get(key))
    }

    fn tuple_for(&self, name: &str, key: &[(&str, Key)]) -> Result<Vec<Key>, NamespaceError> {
        let names = self.key_names(name);
        if names.is_empty() {
            return Err(NamespaceError::configuration(name, "sub-key names were never declared"));
        }
        if key.len() != names.len() {
            return Err(NamespaceError::configuration(
                name,
                format!("expected {} sub-keys, got {}", names.len(), key.len()),
            ));
        }
        names
            .iter()
            .map(|n| {
                key.iter()
                    .find(|(k, _)| k == n)
                    .map(|(_, v)| v.clone())
                    .ok_or_else(|| NamespaceError::configuration(name, format!("missing sub-key '{}'", n)))
            })
            .collect()
    }

    /// Keyed write: `key` maps declared sub-key names to values, in any order.
    pub fn set_keyed(
        &mut self,
        name: &str,
        key: &[(&str, Key)],
        value: impl Into<Value>,
    ) -> Result<(), NamespaceError> {
        let tuple = self.tuple_for(name, key)?;
        self.insert(name, tuple, value);
        Ok(())
    }

    /// Keyed read. An absent entry is `Ok(None)` so callers can apply a fallback.
    pub fn get_keyed(&self, name: &str, key: &[(&str, Key)]) -> Result<Option<&Value>, NamespaceError> {
        let tuple = self.tuple_for(name, key)?;
        Ok(self.get_tuple(name, &tuple))
    }

    /// Project every entry of a named attribute onto the given sub-keys
    /// (all of them when `onto` is empty), in full-key order.
    pub fn project(&self, name: &str, onto: &[&str]) -> Result<Vec<(Vec<Key>, &Value)>, NamespaceError> {
        let multi = self
            .multi
            .get(name)
            .filter(|m| !m.names.is_empty())
            .ok_or_else(|| NamespaceError::configuration(name, "projection needs named sub-keys"))?;

        let positions: Vec<usize> = if onto.is_empty() {
            (0..multi.names.len()).collect()
        } else {
            onto.iter()
                .map(|o| {
                    multi
                        .names
                        .iter()
                        .position(|n| n == o)
                        .ok_or_else(|| NamespaceError::configuration(name, format!("unknown sub-key '{}'", o)))
                })
                .collect::<Result<_, _>>()?
        };

        Ok(multi
            .entries
            .iter()
            .map(|(k, v)| (positions.iter().filter_map(|&p| k.get(p).cloned()).collect(), v))
            .collect())
    }

    /// All values of a multi-key attribute in key order.
    pub fn values(&self, name: &str) -> Vec<&Value> {
        self.multi
            .get(name)
            .map(|m| m.entries.values().collect())
            .unwrap_or_default()
    }

    pub fn is_multi(&self, name: &str) -> bool {
        self.multi.get(name).is_some_and(|m| !m.entries.is_empty())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.single.contains_key(name) || self.is_multi(name)
    }

    /// Attribute names in first-write order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str).filter(|n| self.contains(n))
    }

    pub fn len(&self) -> usize {
        self.names().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn remove(&mut self, name: &str) {
        self.single.remove(name);
        self.multi.remove(name);
        self.order.retain(|n| n != name);
    }

    /// Restore an empty namespace.
    pub fn clear(&mut self) {
        self.order.clear();
        self.single.clear();
        self.multi.clear();
    }

    /// Copy every attribute of `other` into this namespace, overwriting clashes.
    pub fn update(&mut self, other: &Namespace) {
        for name in other.names() {
            if let Some(v) = other.single.get(name) {
                self.set(name, v.clone());
            } else if let Some(m) = other.multi.get(name) {
                for (k, v) in &m.entries {
                    self.insert(name, k.clone(), v.clone());
                }
                if !m.names.is_empty() {
                    let names: Vec<&str> = m.names.iter().map(String::as_str).collect();
                    self.set_key_names(name, &names);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expanded() -> Namespace {
        let mut ns = Namespace::new();
        ns.insert("expanded", vec![Key::Int(10), Key::Int(36)], 2i64);
        ns.insert("expanded", vec![Key::Int(10), Key::Int(37)], 8i64);
        ns.insert("expanded", vec![Key::Int(11), Key::Int(36)], 10i64);
        ns.set_key_names("expanded", &["depth", "f"]);
        ns
    }

    #[test]
    fn single_key_roundtrip_and_not_found() {
        let mut ns = Namespace::new();
        ns.set("cputime", 9.89);
        assert_eq!(ns.get("cputime"), Ok(&Value::Real(9.89)));
        assert_eq!(ns.get("wctime"), Err(NamespaceError::NotFound("wctime".into())));
    }

    #[test]
    fn keyed_access_is_order_independent() {
        let mut ns = expanded();
        ns.set_keyed("expanded", &[("f", Key::Int(37)), ("depth", Key::Int(12))], 319i64)
            .unwrap();
        ns.set_keyed("expanded", &[("depth", Key::Int(12)), ("f", Key::Int(36))], 58i64)
            .unwrap();

        assert_eq!(
            ns.get_tuple("expanded", &[Key::Int(12), Key::Int(37)]),
            Some(&Value::Int(319))
        );
        assert_eq!(
            ns.get_keyed("expanded", &[("f", Key::Int(36)), ("depth", Key::Int(12))]),
            Ok(Some(&Value::Int(58)))
        );
    }

    #[test]
    fn keyed_access_without_names_is_configuration_error() {
        let mut ns = Namespace::new();
        ns.insert("generated", vec![Key::Int(1), Key::Int(2)], 3i64);
        let err = ns.set_keyed("generated", &[("a", Key::Int(1))], 4i64).unwrap_err();
        assert!(matches!(err, NamespaceError::Configuration { .. }));
        assert!(matches!(
            ns.get_keyed("generated", &[("a", Key::Int(1))]),
            Err(NamespaceError::Configuration { .. })
        ));
    }

    #[test]
    fn absent_keyed_entry_is_none() {
        let ns = expanded();
        assert_eq!(
            ns.get_keyed("expanded", &[("depth", Key::Int(99)), ("f", Key::Int(1))]),
            Ok(None)
        );
    }

    #[test]
    fn missing_sub_key_is_configuration_error() {
        let ns = expanded();
        assert!(matches!(
            ns.get_keyed("expanded", &[("depth", Key::Int(10)), ("g", Key::Int(36))]),
            Err(NamespaceError::Configuration { .. })
        ));
    }

    #[test]
    fn projection_drops_unselected_positions() {
        let ns = expanded();
        let depths: Vec<(Vec<Key>, i64)> = ns
            .project("expanded", &["depth"])
            .unwrap()
            .into_iter()
            .map(|(k, v)| match v {
                Value::Int(i) => (k, *i),
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(
            depths,
            vec![
                (vec![Key::Int(10)], 2),
                (vec![Key::Int(10)], 8),
                (vec![Key::Int(11)], 10)
            ]
        );

        let swapped = ns.project("expanded", &["f", "depth"]).unwrap();
        assert_eq!(swapped[0].0, vec![Key::Int(36), Key::Int(10)]);
    }

    #[test]
    fn clear_and_membership() {
        let mut ns = expanded();
        ns.set("vsize", 107i64);
        assert!(ns.contains("expanded"));
        assert!(ns.contains("vsize"));
        assert_eq!(ns.names().collect::<Vec<_>>(), vec!["expanded", "vsize"]);

        ns.clear();
        assert!(ns.is_empty());
        assert!(ns.key_names("expanded").is_empty());
        assert!(!ns.contains("vsize"));
    }

    #[test]
    fn update_overwrites_and_copies_names() {
        let mut ns = expanded();
        let mut other = Namespace::new();
        other.insert("expanded", vec![Key::Int(10), Key::Int(36)], 12i64);
        other.set_key_names("expanded", &["a", "b"]);
        other.set("cost", "52");

        ns.update(&other);
        assert_eq!(ns.get_tuple("expanded", &[Key::Int(10), Key::Int(36)]), Some(&Value::Int(12)));
        assert_eq!(ns.key_names("expanded"), &["a".to_string(), "b".to_string()]);
        assert_eq!(ns.get("cost"), Ok(&Value::Text("52".into())));
    }
}
