//! Collection - documents in insertion order plus their indexes
//!
//! Documents are keyed by a sequence number assigned on insert, so a
//! collection scan returns them in insertion order. Every write goes
//! through the validator and the unique indexes before it touches the
//! document map.
//!
//! ```text
//! Collection
//!   docs:    seq -> Document
//!   indexes: _id_, email_1, ...   (key tuple -> seqs)
//! ```

use bson::{oid::ObjectId, Bson, Document};
use docql::{Filter, IndexKind, Update, Validator};
use std::collections::BTreeMap;
use tracing::debug;

use super::index::{Index, IndexScan, IndexType};
use crate::error::{Error, Result};
use crate::query::{filter, text, update, validate};
use crate::store::{IndexSpec, UpdateOutcome, ValidationLevel};

/// A collection of documents
#[derive(Debug)]
pub struct Collection {
    pub name: String,
    docs: BTreeMap<u64, Document>,
    next_seq: u64,
    indexes: Vec<Index>,
    validator: Option<(Validator, ValidationLevel)>,
}

/// How a scan located its documents
#[derive(Debug, Clone, PartialEq)]
pub enum Access {
    CollectionScan,
    IndexScan { index: String, key_pattern: Document },
    Text { index: String },
    GeoNear { index: String },
}

/// Documents selected by a filter, with the work it took
#[derive(Debug, Clone)]
pub struct ScanResult {
    pub matches: Vec<Matched>,
    pub access: Access,
    pub keys_examined: u64,
    pub docs_examined: u64,
}

#[derive(Debug, Clone)]
pub struct Matched {
    pub seq: u64,
    pub text_score: Option<f64>,
}

impl Collection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            docs: BTreeMap::new(),
            next_seq: 0,
            indexes: vec![Index::primary()],
            validator: None,
        }
    }

    pub fn with_validator(mut self, validator: Option<Validator>, level: ValidationLevel) -> Self {
        self.validator = validator.map(|v| (v, level));
        self
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn get(&self, seq: u64) -> Option<&Document> {
        self.docs.get(&seq)
    }

    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.docs.values()
    }

    // =========================================================================
    // Indexes
    // =========================================================================

    pub fn index_names(&self) -> Vec<String> {
        self.indexes.iter().map(|i| i.name.clone()).collect()
    }

    /// Build an index over the existing documents
    ///
    /// Re-creating an index with the same name and keys is a no-op.
    pub fn create_index(&mut self, spec: &IndexSpec) -> Result<String> {
        let keys = docql::index_keys(&spec.keys)?;
        let name = spec.resolved_name()?;

        if let Some(existing) = self.indexes.iter().find(|i| i.name == name) {
            if existing.same_keys(&keys) {
                return Ok(name);
            }
            return Err(Error::Query {
                message: format!("an index named '{}' already exists with different keys", name),
            });
        }

        let mut index = Index::new(name.clone(), keys, spec.unique, spec.default_language.clone());
        if matches!(index.kind, IndexType::Text { .. }) && self.text_index().is_some() {
            return Err(Error::Query {
                message: format!("collection '{}' already has a text index", self.name),
            });
        }

        for (seq, doc) in &self.docs {
            if let Some(key) = index.conflict(doc, Some(*seq)) {
                return Err(Error::DuplicateKey {
                    collection: self.name.clone(),
                    key,
                });
            }
            index.insert(*seq, doc);
        }

        debug!(collection = %self.name, index = %name, "index created");
        self.indexes.push(index);
        Ok(name)
    }

    pub fn text_index(&self) -> Option<&Index> {
        self.indexes
            .iter()
            .find(|i| matches!(i.kind, IndexType::Text { .. }))
    }

    /// The 2dsphere index for `$geoNear`, by field when a key is given
    pub fn geo_index(&self, key: Option<&str>) -> Option<&Index> {
        self.indexes.iter().find(|i| {
            i.kind == IndexType::Sphere2d
                && key.map_or(true, |k| {
                    i.keys.iter().any(|ik| ik.kind == IndexKind::Sphere2d && ik.path == k)
                })
        })
    }

    // =========================================================================
    // Writes
    // =========================================================================

    fn check_valid(&self, doc: &Document) -> Result<()> {
        if let Some((validator, level)) = &self.validator {
            if *level == ValidationLevel::Off {
                return Ok(());
            }
            validate::check(validator, doc).map_err(|message| Error::ValidationFailure {
                collection: self.name.clone(),
                message: format!("Document failed validation: {}", message),
            })?;
        }
        Ok(())
    }

    fn is_valid(&self, doc: &Document) -> bool {
        match &self.validator {
            Some((validator, _)) => validate::check(validator, doc).is_ok(),
            None => true,
        }
    }

    fn check_unique(&self, doc: &Document, seq: Option<u64>) -> Result<()> {
        for index in &self.indexes {
            if let Some(key) = index.conflict(doc, seq) {
                return Err(Error::DuplicateKey {
                    collection: self.name.clone(),
                    key,
                });
            }
        }
        Ok(())
    }

    /// Insert a document, assigning an ObjectId `_id` if it has none
    pub fn insert(&mut self, mut doc: Document) -> Result<Bson> {
        if !doc.contains_key("_id") {
            let mut with_id = Document::new();
            with_id.insert("_id", ObjectId::new());
            for (key, value) in doc {
                with_id.insert(key, value);
            }
            doc = with_id;
        }
        self.check_valid(&doc)?;
        self.check_unique(&doc, None)?;

        let seq = self.next_seq;
        self.next_seq += 1;
        for index in &mut self.indexes {
            index.insert(seq, &doc);
        }
        let id = doc.get("_id").cloned().unwrap_or(Bson::Null);
        self.docs.insert(seq, doc);
        Ok(id)
    }

    /// Apply an update to the matching documents (the first one unless `multi`)
    ///
    /// Under moderate validation, a document that already failed the
    /// validator may be updated without being re-checked.
    pub fn update(&mut self, filter: &Filter, update: &Update, multi: bool) -> Result<UpdateOutcome> {
        let scan = self.scan(filter, None)?;
        let targets: Vec<u64> = if multi {
            scan.matches.iter().map(|m| m.seq).collect()
        } else {
            scan.matches.first().map(|m| m.seq).into_iter().collect()
        };

        let mut outcome = UpdateOutcome {
            matched: targets.len() as u64,
            modified: 0,
        };
        for seq in targets {
            let Some(before) = self.docs.get(&seq).cloned() else { continue };
            let mut after = before.clone();
            if !update::apply(update, &mut after)? {
                continue;
            }

            let enforce = match &self.validator {
                Some((_, ValidationLevel::Strict)) => true,
                Some((_, ValidationLevel::Moderate)) => self.is_valid(&before),
                _ => false,
            };
            if enforce {
                self.check_valid(&after)?;
            }
            self.check_unique(&after, Some(seq))?;

            for index in &mut self.indexes {
                index.remove(seq, &before);
                index.insert(seq, &after);
            }
            self.docs.insert(seq, after);
            outcome.modified += 1;
        }
        Ok(outcome)
    }

    /// Delete the matching documents (the first one unless `multi`)
    pub fn delete(&mut self, filter: &Filter, multi: bool) -> Result<u64> {
        let scan = self.scan(filter, None)?;
        let targets: Vec<u64> = scan
            .matches
            .iter()
            .map(|m| m.seq)
            .take(if multi { usize::MAX } else { 1 })
            .collect();

        let mut deleted = 0;
        for seq in targets {
            if let Some(doc) = self.docs.remove(&seq) {
                for index in &mut self.indexes {
                    index.remove(seq, &doc);
                }
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Select documents matching a filter
    ///
    /// Picks the regular index answering a top-level predicate with the
    /// fewest candidates; otherwise scans the whole collection. A `$text`
    /// clause requires the collection's text index and attaches scores.
    pub fn scan(&self, filter: &Filter, limit_hint: Option<usize>) -> Result<ScanResult> {
        if filter.has_text() {
            return self.text_scan(filter);
        }

        let mut best: Option<(&Index, IndexScan)> = None;
        for conjunct in filter.conjuncts() {
            for index in self.indexes.iter().filter(|i| i.leading_path() == conjunct.path) {
                if let Some(scan) = index.scan(&conjunct.condition) {
                    let better = best
                        .as_ref()
                        .map_or(true, |(_, current)| scan.seqs.len() < current.seqs.len());
                    if better {
                        best = Some((index, scan));
                    }
                }
            }
        }

        let (access, candidates, keys_examined): (Access, Vec<u64>, u64) = match best {
            Some((index, scan)) => (
                Access::IndexScan {
                    index: index.name.clone(),
                    key_pattern: index.key_pattern(),
                },
                scan.seqs.into_iter().collect(),
                scan.keys_examined,
            ),
            None => (Access::CollectionScan, self.docs.keys().copied().collect(), 0),
        };

        let mut matches = Vec::new();
        let mut docs_examined = 0;
        for seq in candidates {
            let Some(doc) = self.docs.get(&seq) else { continue };
            docs_examined += 1;
            if filter::matches(filter, doc) {
                matches.push(Matched { seq, text_score: None });
                if limit_hint.is_some_and(|limit| matches.len() >= limit) {
                    break;
                }
            }
        }

        Ok(ScanResult {
            matches,
            access,
            keys_examined,
            docs_examined,
        })
    }

    fn text_scan(&self, filter: &Filter) -> Result<ScanResult> {
        let index = self.text_index().ok_or_else(|| Error::Query {
            message: format!("text index required for $text query on '{}'", self.name),
        })?;
        let Some(search) = filter.text_search() else {
            return Err(Error::Query {
                message: "$text must appear at the top level of the filter".to_string(),
            });
        };
        let fields = index.field_paths();

        let mut matches = Vec::new();
        let mut keys_examined = 0;
        for (seq, doc) in &self.docs {
            let Some(score) = text::score(search, doc, &fields) else { continue };
            keys_examined += 1;
            if filter::matches_with_text(filter, doc, &fields) {
                matches.push(Matched {
                    seq: *seq,
                    text_score: Some(score),
                });
            }
        }

        Ok(ScanResult {
            docs_examined: keys_examined,
            keys_examined,
            matches,
            access: Access::Text {
                index: index.name.clone(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn users() -> Collection {
        let validator = docql::validator(&doc! {
            "$jsonSchema": {
                "bsonType": "object",
                "required": ["email"],
                "properties": { "email": { "bsonType": "string" } }
            }
        })
        .unwrap();
        let mut users = Collection::new("users").with_validator(Some(validator), ValidationLevel::Moderate);
        users
            .create_index(&IndexSpec::new(doc! { "email": 1 }).unique())
            .unwrap();
        users
    }

    fn filter(doc: Document) -> Filter {
        docql::filter(&doc).unwrap()
    }

    #[test]
    fn test_collection_crud() {
        let mut users = users();

        // Create
        let id = users.insert(doc! { "_id": "u1", "email": "a@x.com", "age": 30 }).unwrap();
        assert_eq!(id, Bson::String("u1".into()));

        // Generated ids come first
        let generated = users.insert(doc! { "email": "b@x.com" }).unwrap();
        assert!(matches!(generated, Bson::ObjectId(_)));
        assert_eq!(users.get(1).unwrap().keys().next().unwrap(), "_id");

        // Update
        let update = docql::update(&doc! { "$inc": { "age": 1 } }).unwrap();
        let outcome = users.update(&filter(doc! { "_id": "u1" }), &update, false).unwrap();
        assert_eq!(outcome, UpdateOutcome { matched: 1, modified: 1 });

        // Delete
        assert_eq!(users.delete(&filter(doc! { "email": "b@x.com" }), false).unwrap(), 1);
        assert_eq!(users.len(), 1);
    }

    #[test]
    fn test_insert_rejections_leave_no_trace() {
        let mut users = users();
        users.insert(doc! { "_id": "u1", "email": "a@x.com" }).unwrap();

        let dup = users.insert(doc! { "_id": "u2", "email": "a@x.com" }).unwrap_err();
        assert!(matches!(dup, Error::DuplicateKey { .. }));

        let dup_id = users.insert(doc! { "_id": "u1", "email": "c@x.com" }).unwrap_err();
        assert!(matches!(dup_id, Error::DuplicateKey { ref key, .. } if key.contains("_id_")));

        let invalid = users.insert(doc! { "_id": "u3", "email": 42 }).unwrap_err();
        assert!(matches!(invalid, Error::ValidationFailure { .. }));
        assert_eq!(users.len(), 1);
    }

    #[test]
    fn test_update_validation_is_moderate() {
        let mut users = users();
        users.insert(doc! { "_id": "u1", "email": "a@x.com" }).unwrap();
        let bad = docql::update(&doc! { "$set": { "email": 5 } }).unwrap();
        let err = users.update(&filter(doc! { "_id": "u1" }), &bad, false).unwrap_err();
        assert!(matches!(err, Error::ValidationFailure { .. }));
        assert_eq!(users.get(0).unwrap().get_str("email").unwrap(), "a@x.com");
    }

    #[test]
    fn test_planner_prefers_index() {
        let mut users = users();
        for i in 0..10 {
            users
                .insert(doc! { "_id": format!("u{}", i), "email": format!("{}@x.com", i) })
                .unwrap();
        }
        let scan = users.scan(&filter(doc! { "email": "3@x.com" }), None).unwrap();
        assert!(matches!(scan.access, Access::IndexScan { ref index, .. } if index == "email_1"));
        assert_eq!(scan.docs_examined, 1);
        assert_eq!(scan.matches.len(), 1);

        let scan = users.scan(&filter(doc! { "age": { "$gt": 5 } }), None).unwrap();
        assert_eq!(scan.access, Access::CollectionScan);
        assert_eq!(scan.docs_examined, 10);
    }

    #[test]
    fn test_unique_index_build_fails_on_existing_duplicates() {
        let mut c = Collection::new("c");
        c.insert(doc! { "k": 1 }).unwrap();
        c.insert(doc! { "k": 1 }).unwrap();
        let err = c.create_index(&IndexSpec::new(doc! { "k": 1 }).unique()).unwrap_err();
        assert!(matches!(err, Error::DuplicateKey { .. }));
        assert_eq!(c.index_names(), vec!["_id_"]);
    }

    #[test]
    fn test_text_scan_requires_index() {
        let mut c = Collection::new("courses");
        c.insert(doc! { "title": "Python Basics", "description": "Learn Python" }).unwrap();
        let text = filter(doc! { "$text": { "$search": "python" } });
        assert!(c.scan(&text, None).is_err());

        c.create_index(
            &IndexSpec::new(doc! { "title": "text", "description": "text" }).named("course_text_index"),
        )
        .unwrap();
        let scan = c.scan(&text, None).unwrap();
        assert_eq!(scan.matches.len(), 1);
        assert!(scan.matches[0].text_score.unwrap() > 0.0);
    }
}
