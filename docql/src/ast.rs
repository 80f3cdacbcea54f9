//! Abstract Syntax Tree for DocQL

use bson::Bson;
use regex::{Regex, RegexBuilder};

use crate::error::QueryError;

// ============================================================================
// Filters
// ============================================================================

/// A query filter, as accepted by `find`, `$match` and validators
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Empty filter, matches every document
    All,
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Nor(Vec<Filter>),
    /// Predicate on one (possibly dotted) field
    Field(FieldFilter),
    /// `$text` search against the collection's text index
    Text(TextSearch),
}

impl Filter {
    /// True if a `$text` clause appears anywhere in the filter
    pub fn has_text(&self) -> bool {
        match self {
            Filter::Text(_) => true,
            Filter::And(items) | Filter::Or(items) | Filter::Nor(items) => {
                items.iter().any(Filter::has_text)
            }
            _ => false,
        }
    }

    /// The `$text` clause usable for scoring, if the filter has one at top level
    pub fn text_search(&self) -> Option<&TextSearch> {
        match self {
            Filter::Text(search) => Some(search),
            Filter::And(items) => items.iter().find_map(|f| match f {
                Filter::Text(search) => Some(search),
                _ => None,
            }),
            _ => None,
        }
    }

    /// Field predicates that must all hold (top level, or directly under `$and`)
    pub fn conjuncts(&self) -> Vec<&FieldFilter> {
        match self {
            Filter::Field(field) => vec![field],
            Filter::And(items) => items.iter().flat_map(Filter::conjuncts).collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldFilter {
    pub path: String,
    pub condition: Condition,
}

/// Condition applied to the value(s) found at a field path
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Bson),
    Ne(Bson),
    Gt(Bson),
    Gte(Bson),
    Lt(Bson),
    Lte(Bson),
    In(Vec<Bson>),
    Nin(Vec<Bson>),
    Exists(bool),
    Regex(Pattern),
    Size(usize),
    All(Vec<Bson>),
    ElemMatch(ElemMatch),
    Not(Box<Condition>),
    /// Several operators on the same field: `{"$gte": 50, "$lte": 200}`
    Conjunction(Vec<Condition>),
}

impl Condition {
    /// Flatten a conjunction into its members
    pub fn parts(&self) -> Vec<&Condition> {
        match self {
            Condition::Conjunction(items) => items.iter().flat_map(Condition::parts).collect(),
            other => vec![other],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElemMatch {
    /// Element documents must satisfy a sub-filter
    Document(Box<Filter>),
    /// Scalar elements must satisfy operators directly
    Value(Box<Condition>),
}

/// A compiled regular expression together with its source form
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    options: String,
    regex: Regex,
}

impl Pattern {
    pub fn new(source: impl Into<String>, options: impl Into<String>) -> Result<Self, QueryError> {
        let source = source.into();
        let options = options.into();
        let mut builder = RegexBuilder::new(&source);
        for flag in options.chars() {
            match flag {
                'i' => builder.case_insensitive(true),
                'm' => builder.multi_line(true),
                's' => builder.dot_matches_new_line(true),
                'x' => builder.ignore_whitespace(true),
                'u' => &mut builder,
                other => {
                    return Err(QueryError::new(format!("invalid regex option: {}", other)))
                }
            };
        }
        let regex = builder.build()?;
        Ok(Self {
            source,
            options,
            regex,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn options(&self) -> &str {
        &self.options
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.options == other.options
    }
}

/// `$text` search terms
#[derive(Debug, Clone, PartialEq)]
pub struct TextSearch {
    pub raw: String,
    /// Terms of which at least one must appear
    pub terms: Vec<String>,
    /// Terms prefixed with `-`; their presence excludes the document
    pub excluded: Vec<String>,
    pub case_sensitive: bool,
}

// ============================================================================
// Updates
// ============================================================================

/// An update document made of atomic operators
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub ops: Vec<UpdateOp>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOp {
    Set { path: String, value: Bson },
    Unset { path: String },
    Inc { path: String, by: Bson },
    Push { path: String, values: Vec<Bson> },
    /// Append-if-absent; `$each` expands to several values
    AddToSet { path: String, values: Vec<Bson> },
}

impl UpdateOp {
    pub fn path(&self) -> &str {
        match self {
            UpdateOp::Set { path, .. }
            | UpdateOp::Unset { path }
            | UpdateOp::Inc { path, .. }
            | UpdateOp::Push { path, .. }
            | UpdateOp::AddToSet { path, .. } => path,
        }
    }
}

// ============================================================================
// Aggregation
// ============================================================================

/// One stage of an aggregation pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Filter),
    Project(Projection),
    AddFields(Vec<(String, Expr)>),
    Lookup(Lookup),
    Unwind(Unwind),
    Group(Group),
    Sort(Vec<SortKey>),
    Limit(usize),
    Skip(usize),
    Count(String),
    GeoNear(GeoNear),
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Match(_) => "$match",
            Stage::Project(_) => "$project",
            Stage::AddFields(_) => "$addFields",
            Stage::Lookup(_) => "$lookup",
            Stage::Unwind(_) => "$unwind",
            Stage::Group(_) => "$group",
            Stage::Sort(_) => "$sort",
            Stage::Limit(_) => "$limit",
            Stage::Skip(_) => "$skip",
            Stage::Count(_) => "$count",
            Stage::GeoNear(_) => "$geoNear",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    /// Inclusion mode (`{a: 1}` / computed fields) vs exclusion mode (`{a: 0}`)
    pub inclusive: bool,
    /// Whether `_id` survives when not listed explicitly
    pub keep_id: bool,
    pub fields: Vec<(String, ProjectItem)>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProjectItem {
    Include,
    Exclude,
    Computed(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Lookup {
    pub from: String,
    pub local_field: String,
    pub foreign_field: String,
    pub as_field: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Unwind {
    pub path: String,
    pub preserve_null_and_empty: bool,
    pub include_array_index: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub id: Expr,
    pub accumulators: Vec<(String, Accumulator)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Accumulator {
    pub op: AccumulatorOp,
    pub expr: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorOp {
    Sum,
    Avg,
    Min,
    Max,
    First,
    Last,
    Push,
    AddToSet,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub path: String,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeoNear {
    /// (longitude, latitude)
    pub near: (f64, f64),
    pub distance_field: String,
    /// Meters when `spherical`
    pub max_distance: Option<f64>,
    pub min_distance: Option<f64>,
    pub query: Option<Filter>,
    pub key: Option<String>,
    pub spherical: bool,
    pub distance_multiplier: Option<f64>,
}

/// Aggregation expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Bson),
    /// `"$field.path"`
    FieldPath(String),
    /// `"$$ROOT"`
    Root,
    Object(Vec<(String, Expr)>),
    Array(Vec<Expr>),
    Op { op: Operator, args: Vec<Expr> },
    Cond {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Meta(MetaField),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaField {
    TextScore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Concat,
    Round,
    Size,
    IfNull,
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    And,
    Or,
    Not,
    Add,
    Subtract,
    Multiply,
    Divide,
    Year,
    Month,
    DayOfMonth,
    ToLower,
    ToUpper,
}

impl Operator {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "$concat" => Operator::Concat,
            "$round" => Operator::Round,
            "$size" => Operator::Size,
            "$ifNull" => Operator::IfNull,
            "$eq" => Operator::Eq,
            "$ne" => Operator::Ne,
            "$gt" => Operator::Gt,
            "$gte" => Operator::Gte,
            "$lt" => Operator::Lt,
            "$lte" => Operator::Lte,
            "$and" => Operator::And,
            "$or" => Operator::Or,
            "$not" => Operator::Not,
            "$add" => Operator::Add,
            "$subtract" => Operator::Subtract,
            "$multiply" => Operator::Multiply,
            "$divide" => Operator::Divide,
            "$year" => Operator::Year,
            "$month" => Operator::Month,
            "$dayOfMonth" => Operator::DayOfMonth,
            "$toLower" => Operator::ToLower,
            "$toUpper" => Operator::ToUpper,
            _ => return None,
        })
    }

    /// Accepted argument count as (min, max)
    pub fn arity(&self) -> (usize, usize) {
        match self {
            Operator::Concat | Operator::And | Operator::Or | Operator::Add | Operator::Multiply => {
                (0, usize::MAX)
            }
            Operator::IfNull => (2, usize::MAX),
            Operator::Round => (1, 2),
            Operator::Size
            | Operator::Not
            | Operator::Year
            | Operator::Month
            | Operator::DayOfMonth
            | Operator::ToLower
            | Operator::ToUpper => (1, 1),
            Operator::Eq
            | Operator::Ne
            | Operator::Gt
            | Operator::Gte
            | Operator::Lt
            | Operator::Lte
            | Operator::Subtract
            | Operator::Divide => (2, 2),
        }
    }
}

// ============================================================================
// Validators and indexes
// ============================================================================

/// A collection validator
#[derive(Debug, Clone, PartialEq)]
pub enum Validator {
    JsonSchema(JsonSchema),
    Query(Filter),
}

/// The `$jsonSchema` subset understood by the engine
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JsonSchema {
    pub bson_types: Vec<BsonType>,
    pub required: Vec<String>,
    pub properties: Vec<(String, JsonSchema)>,
    pub enum_values: Option<Vec<Bson>>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub pattern: Option<Pattern>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub items: Option<Box<JsonSchema>>,
    pub additional_properties: Option<bool>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BsonType {
    Object,
    Array,
    String,
    Int,
    Long,
    Double,
    Decimal,
    /// Any numeric type
    Number,
    Bool,
    Date,
    Null,
    ObjectId,
}

impl BsonType {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "object" => BsonType::Object,
            "array" => BsonType::Array,
            "string" => BsonType::String,
            "int" => BsonType::Int,
            "long" => BsonType::Long,
            "double" => BsonType::Double,
            "decimal" => BsonType::Decimal,
            "number" => BsonType::Number,
            "bool" => BsonType::Bool,
            "date" => BsonType::Date,
            "null" => BsonType::Null,
            "objectId" => BsonType::ObjectId,
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            BsonType::Object => "object",
            BsonType::Array => "array",
            BsonType::String => "string",
            BsonType::Int => "int",
            BsonType::Long => "long",
            BsonType::Double => "double",
            BsonType::Decimal => "decimal",
            BsonType::Number => "number",
            BsonType::Bool => "bool",
            BsonType::Date => "date",
            BsonType::Null => "null",
            BsonType::ObjectId => "objectId",
        }
    }

    /// Whether a value is of this type
    pub fn accepts(&self, value: &Bson) -> bool {
        match (self, value) {
            (BsonType::Object, Bson::Document(_))
            | (BsonType::Array, Bson::Array(_))
            | (BsonType::String, Bson::String(_))
            | (BsonType::Int, Bson::Int32(_))
            | (BsonType::Long, Bson::Int64(_))
            | (BsonType::Double, Bson::Double(_))
            | (BsonType::Decimal, Bson::Decimal128(_))
            | (BsonType::Bool, Bson::Boolean(_))
            | (BsonType::Date, Bson::DateTime(_))
            | (BsonType::Null, Bson::Null)
            | (BsonType::ObjectId, Bson::ObjectId(_)) => true,
            (BsonType::Number, v) => matches!(
                v,
                Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) | Bson::Decimal128(_)
            ),
            _ => false,
        }
    }
}

/// One component of an index key pattern
#[derive(Debug, Clone, PartialEq)]
pub struct IndexKey {
    pub path: String,
    pub kind: IndexKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Ascending,
    Descending,
    Text,
    Sphere2d,
}

impl IndexKind {
    pub fn suffix(&self) -> &'static str {
        match self {
            IndexKind::Ascending => "1",
            IndexKind::Descending => "-1",
            IndexKind::Text => "text",
            IndexKind::Sphere2d => "2dsphere",
        }
    }
}

/// Default index name for a key pattern: `title_1_category_1`
pub fn default_index_name(keys: &[IndexKey]) -> String {
    keys.iter()
        .map(|k| format!("{}_{}", k.path, k.kind.suffix()))
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_options() {
        let pattern = Pattern::new("python", "i").unwrap();
        assert!(pattern.is_match("Intro to PYTHON"));
        assert!(Pattern::new("x", "q").is_err());
    }

    #[test]
    fn test_default_index_name() {
        let keys = vec![
            IndexKey { path: "title".into(), kind: IndexKind::Ascending },
            IndexKey { path: "category".into(), kind: IndexKind::Ascending },
        ];
        assert_eq!(default_index_name(&keys), "title_1_category_1");
    }

    #[test]
    fn test_bson_type_number() {
        assert!(BsonType::Number.accepts(&Bson::Int32(1)));
        assert!(BsonType::Number.accepts(&Bson::Double(1.5)));
        assert!(!BsonType::Double.accepts(&Bson::Int32(1)));
    }
}
