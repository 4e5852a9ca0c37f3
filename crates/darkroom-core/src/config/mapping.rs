use std::collections::BTreeMap;

use serde::{Serialize, Serializer};

use crate::error::{DarkroomError, Result};

/// Swap keys and values of a map.
///
/// Duplicate values collide and the entry visited last wins, so
/// `invert(invert(t)) == t` only holds when the values of `t` are unique.
pub fn invert<K, V>(map: &BTreeMap<K, V>) -> BTreeMap<V, K>
where
    K: Clone + Ord,
    V: Clone + Ord,
{
    map.iter().map(|(k, v)| (v.clone(), k.clone())).collect()
}

/// A bidirectional name <-> id table (scopes, visibility levels, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingTable {
    forward: BTreeMap<String, u32>,
    reverse: BTreeMap<u32, String>,
}

impl MappingTable {
    /// Build a table from its name -> id direction.
    ///
    /// Fails when two names share an id, since the reverse direction could
    /// not tell them apart.
    pub fn new(kind: &str, forward: BTreeMap<String, u32>) -> Result<Self> {
        let mut reverse = BTreeMap::new();
        for (name, id) in &forward {
            if let Some(previous) = reverse.insert(*id, name.clone()) {
                return Err(DarkroomError::Config(format!(
                    "{} mapping assigns id {} to both `{}` and `{}`",
                    kind, id, previous, name
                )));
            }
        }
        Ok(Self { forward, reverse })
    }

    /// Id for a name.
    pub fn id(&self, name: &str) -> Option<u32> {
        self.forward.get(name).copied()
    }

    /// Name for an id.
    pub fn name(&self, id: u32) -> Option<&str> {
        self.reverse.get(&id).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.forward.keys().map(String::as_str)
    }

    pub fn ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.reverse.keys().copied()
    }

    pub fn forward(&self) -> &BTreeMap<String, u32> {
        &self.forward
    }

    pub fn reverse(&self) -> &BTreeMap<u32, String> {
        &self.reverse
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

impl Serialize for MappingTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.forward.serialize(serializer)
    }
}
