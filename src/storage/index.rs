//! Secondary indexes for the embedded engine
//!
//! A regular index maps key tuples to the sequence numbers of the documents
//! holding them. Array values produce one entry per element (multikey).
//! Text and 2dsphere indexes keep no entries; they only record which fields
//! `$text` and `$geoNear` search.

use bson::{Bson, Document};
use docql::{Condition, IndexKey, IndexKind};
use std::collections::{BTreeMap, BTreeSet};

use crate::query::value::{compare, path_values, type_rank, OrderedBson};

pub type Key = Vec<OrderedBson>;

#[derive(Debug, Clone, PartialEq)]
pub enum IndexType {
    Regular,
    Text { language: String },
    Sphere2d,
}

#[derive(Debug, Clone)]
pub struct Index {
    pub name: String,
    pub keys: Vec<IndexKey>,
    pub unique: bool,
    pub kind: IndexType,
    entries: BTreeMap<Key, BTreeSet<u64>>,
}

/// Candidate documents found through an index
#[derive(Debug, Clone, Default)]
pub struct IndexScan {
    pub seqs: BTreeSet<u64>,
    pub keys_examined: u64,
}

impl Index {
    pub fn new(name: String, keys: Vec<IndexKey>, unique: bool, language: Option<String>) -> Self {
        let kind = if keys.iter().any(|k| k.kind == IndexKind::Text) {
            IndexType::Text {
                language: language.unwrap_or_else(|| "english".to_string()),
            }
        } else if keys.iter().any(|k| k.kind == IndexKind::Sphere2d) {
            IndexType::Sphere2d
        } else {
            IndexType::Regular
        };
        Self {
            name,
            keys,
            unique,
            kind,
            entries: BTreeMap::new(),
        }
    }

    /// The `_id_` index every collection carries
    pub fn primary() -> Self {
        Self::new(
            "_id_".to_string(),
            vec![IndexKey {
                path: "_id".to_string(),
                kind: IndexKind::Ascending,
            }],
            true,
            None,
        )
    }

    pub fn is_regular(&self) -> bool {
        self.kind == IndexType::Regular
    }

    /// Key pattern as it appears in explain output
    pub fn key_pattern(&self) -> Document {
        let mut pattern = Document::new();
        for key in &self.keys {
            let value = match key.kind {
                IndexKind::Ascending => Bson::Int32(1),
                IndexKind::Descending => Bson::Int32(-1),
                other => Bson::String(other.suffix().to_string()),
            };
            pattern.insert(key.path.clone(), value);
        }
        pattern
    }

    pub fn same_keys(&self, keys: &[IndexKey]) -> bool {
        self.keys == keys
    }

    pub fn leading_path(&self) -> &str {
        self.keys.first().map(|k| k.path.as_str()).unwrap_or_default()
    }

    pub fn field_paths(&self) -> Vec<String> {
        self.keys.iter().map(|k| k.path.clone()).collect()
    }

    /// All key tuples a document contributes
    fn keys_of(&self, doc: &Document) -> Vec<Key> {
        let mut tuples: Vec<Key> = vec![Vec::new()];
        for key in &self.keys {
            let mut values: Vec<Bson> = Vec::new();
            for value in path_values(doc, &key.path) {
                match value {
                    Bson::Array(items) if !items.is_empty() => values.extend(items.iter().cloned()),
                    other => values.push(other.clone()),
                }
            }
            if values.is_empty() {
                values.push(Bson::Null);
            }
            tuples = tuples
                .into_iter()
                .flat_map(|prefix| {
                    values.iter().map(move |v| {
                        let mut next = prefix.clone();
                        next.push(OrderedBson(v.clone()));
                        next
                    })
                })
                .collect();
        }
        tuples.sort();
        tuples.dedup();
        tuples
    }

    /// The first key this document would duplicate, ignoring `seq` itself
    pub fn conflict(&self, doc: &Document, seq: Option<u64>) -> Option<String> {
        if !self.unique || !self.is_regular() {
            return None;
        }
        self.keys_of(doc).into_iter().find_map(|key| {
            let holders = self.entries.get(&key)?;
            holders
                .iter()
                .any(|holder| Some(*holder) != seq)
                .then(|| self.describe_key(&key))
        })
    }

    fn describe_key(&self, key: &Key) -> String {
        let parts: Vec<String> = self
            .keys
            .iter()
            .zip(key.iter())
            .map(|(k, v)| format!("{}: {}", k.path, v.0))
            .collect();
        format!("index {} dup key: {{ {} }}", self.name, parts.join(", "))
    }

    pub fn insert(&mut self, seq: u64, doc: &Document) {
        if !self.is_regular() {
            return;
        }
        for key in self.keys_of(doc) {
            self.entries.entry(key).or_default().insert(seq);
        }
    }

    pub fn remove(&mut self, seq: u64, doc: &Document) {
        if !self.is_regular() {
            return;
        }
        for key in self.keys_of(doc) {
            if let Some(holders) = self.entries.get_mut(&key) {
                holders.remove(&seq);
                if holders.is_empty() {
                    self.entries.remove(&key);
                }
            }
        }
    }

    /// Documents whose leading key satisfies the condition, if the index can answer it
    pub fn scan(&self, condition: &Condition) -> Option<IndexScan> {
        if !self.is_regular() {
            return None;
        }
        let bounds = Bounds::from_condition(condition)?;
        let mut scan = IndexScan::default();
        for (key, seqs) in &self.entries {
            let Some(first) = key.first() else { continue };
            if bounds.contains(&first.0) {
                scan.keys_examined += 1;
                scan.seqs.extend(seqs.iter().copied());
            }
        }
        Some(scan)
    }
}

/// Accepted values for the leading key component
#[derive(Debug, Clone)]
enum Bounds {
    Points(Vec<Bson>),
    Range {
        lower: Option<(Bson, bool)>,
        upper: Option<(Bson, bool)>,
    },
}

impl Bounds {
    fn from_condition(condition: &Condition) -> Option<Self> {
        let parts = condition.parts();
        for part in &parts {
            match part {
                Condition::Eq(v) if indexable_point(v) => return Some(Bounds::Points(vec![v.clone()])),
                Condition::In(values) if values.iter().all(indexable_point) => {
                    return Some(Bounds::Points(values.clone()))
                }
                _ => {}
            }
        }

        let mut lower = None;
        let mut upper = None;
        for part in parts {
            match part {
                Condition::Gt(v) => lower = Some((v.clone(), false)),
                Condition::Gte(v) => lower = Some((v.clone(), true)),
                Condition::Lt(v) => upper = Some((v.clone(), false)),
                Condition::Lte(v) => upper = Some((v.clone(), true)),
                _ => {}
            }
        }
        if lower.is_none() && upper.is_none() {
            return None;
        }
        Some(Bounds::Range { lower, upper })
    }

    fn contains(&self, value: &Bson) -> bool {
        match self {
            Bounds::Points(points) => points
                .iter()
                .any(|p| type_rank(p) == type_rank(value) && compare(p, value).is_eq()),
            Bounds::Range { lower, upper } => {
                let lower_ok = lower.as_ref().map_or(true, |(bound, inclusive)| {
                    type_rank(bound) == type_rank(value) && {
                        let ord = compare(value, bound);
                        ord.is_gt() || (*inclusive && ord.is_eq())
                    }
                });
                let upper_ok = upper.as_ref().map_or(true, |(bound, inclusive)| {
                    type_rank(bound) == type_rank(value) && {
                        let ord = compare(value, bound);
                        ord.is_lt() || (*inclusive && ord.is_eq())
                    }
                });
                lower_ok && upper_ok
            }
        }
    }
}

/// Values whose equality matches can be answered from index entries alone
fn indexable_point(value: &Bson) -> bool {
    !matches!(
        value,
        Bson::Null | Bson::Array(_) | Bson::Document(_) | Bson::RegularExpression(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn index(keys: Document, unique: bool) -> Index {
        let keys = docql::index_keys(&keys).unwrap();
        Index::new(docql::default_index_name(&keys), keys, unique, None)
    }

    #[test]
    fn test_unique_conflict() {
        let mut idx = index(doc! { "email": 1 }, true);
        idx.insert(1, &doc! { "email": "a@x.com" });
        assert!(idx.conflict(&doc! { "email": "a@x.com" }, None).is_some());
        assert!(idx.conflict(&doc! { "email": "a@x.com" }, Some(1)).is_none());
        assert!(idx.conflict(&doc! { "email": "b@x.com" }, None).is_none());
    }

    #[test]
    fn test_range_scan() {
        let mut idx = index(doc! { "price": 1 }, false);
        for (seq, price) in [(1, 29.99), (2, 99.0), (3, 150.0), (4, 299.99)] {
            idx.insert(seq, &doc! { "price": price });
        }
        idx.insert(5, &doc! { "price": "free" });
        let condition = match docql::filter(&doc! { "price": { "$gte": 50, "$lte": 200 } }).unwrap() {
            docql::Filter::Field(f) => f.condition,
            other => panic!("unexpected {:?}", other),
        };
        let scan = idx.scan(&condition).unwrap();
        assert_eq!(scan.seqs.into_iter().collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(scan.keys_examined, 2);
    }

    #[test]
    fn test_multikey_entries() {
        let mut idx = index(doc! { "tags": 1 }, false);
        idx.insert(1, &doc! { "tags": ["python", "data"] });
        let scan = idx.scan(&Condition::Eq(Bson::String("data".into()))).unwrap();
        assert!(scan.seqs.contains(&1));
        idx.remove(1, &doc! { "tags": ["python", "data"] });
        assert!(idx.scan(&Condition::Eq(Bson::String("data".into()))).unwrap().seqs.is_empty());
    }

    #[test]
    fn test_text_index_has_no_entries() {
        let idx = index(doc! { "title": "text", "description": "text" }, false);
        assert!(matches!(idx.kind, IndexType::Text { .. }));
        assert!(idx.scan(&Condition::Eq(Bson::Int32(1))).is_none());
        assert_eq!(idx.key_pattern(), doc! { "title": "text", "description": "text" });
    }
}
