//! DocQL parser
//!
//! Turns BSON query documents (filters, updates, pipelines, validators and
//! index key patterns) into AST nodes, rejecting unknown operators up front.

use bson::{Bson, Document};

use crate::ast::*;
use crate::error::QueryError;

type Result<T> = std::result::Result<T, QueryError>;

// ============================================================================
// Filters
// ============================================================================

pub fn parse_filter(doc: &Document) -> Result<Filter> {
    let mut clauses = Vec::new();

    for (key, value) in doc {
        match key.as_str() {
            "$and" => clauses.push(Filter::And(filter_list(key, value)?)),
            "$or" => clauses.push(Filter::Or(filter_list(key, value)?)),
            "$nor" => clauses.push(Filter::Nor(filter_list(key, value)?)),
            "$text" => clauses.push(Filter::Text(text_search(value).map_err(|e| e.at(key))?)),
            "$comment" => {}
            op if op.starts_with('$') => {
                return Err(QueryError::new(format!("unknown top level operator: {}", op)))
            }
            path => clauses.push(Filter::Field(FieldFilter {
                path: path.to_string(),
                condition: condition(value).map_err(|e| e.at(path))?,
            })),
        }
    }

    Ok(match clauses.len() {
        0 => Filter::All,
        1 => clauses.swap_remove(0),
        _ => Filter::And(clauses),
    })
}

fn filter_list(op: &str, value: &Bson) -> Result<Vec<Filter>> {
    let items = value
        .as_array()
        .filter(|items| !items.is_empty())
        .ok_or_else(|| QueryError::new(format!("{} must be a nonempty array", op)))?;

    items
        .iter()
        .enumerate()
        .map(|(i, item)| match item {
            Bson::Document(doc) => parse_filter(doc).map_err(|e| e.at(format!("{}.{}", op, i))),
            _ => Err(QueryError::new(format!("{} entries must be objects", op))),
        })
        .collect()
}

fn text_search(value: &Bson) -> Result<TextSearch> {
    let doc = value
        .as_document()
        .ok_or_else(|| QueryError::new("$text needs an object"))?;
    let raw = doc
        .get_str("$search")
        .map_err(|_| QueryError::new("$text requires a $search string"))?
        .to_string();
    let case_sensitive = doc.get_bool("$caseSensitive").unwrap_or(false);

    let mut terms = Vec::new();
    let mut excluded = Vec::new();
    for word in raw.split_whitespace() {
        match word.strip_prefix('-') {
            Some(term) if !term.is_empty() => excluded.push(term.to_string()),
            _ => terms.push(word.trim_matches('"').to_string()),
        }
    }

    Ok(TextSearch {
        raw,
        terms,
        excluded,
        case_sensitive,
    })
}

/// Parse the right-hand side of `{path: value}`
fn condition(value: &Bson) -> Result<Condition> {
    match value {
        Bson::Document(doc) if is_operator_doc(doc) => operator_conditions(doc),
        Bson::RegularExpression(regex) => Ok(Condition::Regex(Pattern::new(
            regex.pattern.clone(),
            regex.options.clone(),
        )?)),
        other => Ok(Condition::Eq(other.clone())),
    }
}

fn is_operator_doc(doc: &Document) -> bool {
    doc.keys().next().map(|k| k.starts_with('$')).unwrap_or(false)
}

fn operator_conditions(doc: &Document) -> Result<Condition> {
    let mut parts = Vec::new();

    // $regex and $options travel together
    let options = match doc.get("$options") {
        Some(Bson::String(s)) => Some(s.clone()),
        Some(_) => return Err(QueryError::new("$options must be a string")),
        None => None,
    };

    for (op, arg) in doc {
        let part = match op.as_str() {
            "$eq" => Condition::Eq(arg.clone()),
            "$ne" => Condition::Ne(arg.clone()),
            "$gt" => Condition::Gt(arg.clone()),
            "$gte" => Condition::Gte(arg.clone()),
            "$lt" => Condition::Lt(arg.clone()),
            "$lte" => Condition::Lte(arg.clone()),
            "$in" => Condition::In(array_arg(op, arg)?),
            "$nin" => Condition::Nin(array_arg(op, arg)?),
            "$all" => Condition::All(array_arg(op, arg)?),
            "$exists" => Condition::Exists(truthy_arg(arg)),
            "$size" => Condition::Size(
                integer(arg)
                    .filter(|n| *n >= 0)
                    .ok_or_else(|| QueryError::new("$size needs a non-negative integer"))?
                    as usize,
            ),
            "$regex" => Condition::Regex(regex_arg(arg, options.as_deref())?),
            "$options" => {
                if !doc.contains_key("$regex") {
                    return Err(QueryError::new("$options needs a $regex"));
                }
                continue;
            }
            "$not" => Condition::Not(Box::new(match arg {
                Bson::Document(inner) if is_operator_doc(inner) => operator_conditions(inner)?,
                Bson::RegularExpression(_) => condition(arg)?,
                _ => return Err(QueryError::new("$not needs a regex or a document")),
            })),
            "$elemMatch" => {
                let inner = arg
                    .as_document()
                    .ok_or_else(|| QueryError::new("$elemMatch needs an Object"))?;
                let value_form = is_operator_doc(inner)
                    && !inner.keys().any(|k| matches!(k.as_str(), "$and" | "$or" | "$nor"));
                if value_form {
                    Condition::ElemMatch(ElemMatch::Value(Box::new(operator_conditions(inner)?)))
                } else {
                    Condition::ElemMatch(ElemMatch::Document(Box::new(parse_filter(inner)?)))
                }
            }
            other => return Err(QueryError::new(format!("unknown operator: {}", other))),
        };
        parts.push(part);
    }

    Ok(match parts.len() {
        1 => parts.swap_remove(0),
        _ => Condition::Conjunction(parts),
    })
}

fn regex_arg(arg: &Bson, options: Option<&str>) -> Result<Pattern> {
    match arg {
        Bson::String(source) => Pattern::new(source.clone(), options.unwrap_or("")),
        Bson::RegularExpression(regex) => {
            Pattern::new(regex.pattern.clone(), options.unwrap_or(&regex.options))
        }
        _ => Err(QueryError::new("$regex has to be a string")),
    }
}

fn array_arg(op: &str, arg: &Bson) -> Result<Vec<Bson>> {
    arg.as_array()
        .cloned()
        .ok_or_else(|| QueryError::new(format!("{} needs an array", op)))
}

fn truthy_arg(arg: &Bson) -> bool {
    match arg {
        Bson::Boolean(b) => *b,
        Bson::Null | Bson::Undefined => false,
        other => integer(other).map(|n| n != 0).unwrap_or(true),
    }
}

/// Integral value of a numeric BSON, if it has one
pub(crate) fn integer(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(n) => Some(i64::from(*n)),
        Bson::Int64(n) => Some(*n),
        Bson::Double(f) if f.fract() == 0.0 => Some(*f as i64),
        _ => None,
    }
}

fn number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(f) => Some(*f),
        _ => None,
    }
}

// ============================================================================
// Updates
// ============================================================================

pub fn parse_update(doc: &Document) -> Result<Update> {
    if doc.is_empty() {
        return Err(QueryError::new("update document must not be empty"));
    }

    let mut ops = Vec::new();
    for (op, arg) in doc {
        let fields = match arg {
            Bson::Document(fields) => fields,
            _ if !op.starts_with('$') => {
                return Err(QueryError::new("update document requires atomic operators"))
            }
            _ => return Err(QueryError::new(format!("modifier {} needs an object", op))),
        };

        for (path, value) in fields {
            let parsed = match op.as_str() {
                "$set" => UpdateOp::Set {
                    path: path.clone(),
                    value: value.clone(),
                },
                "$unset" => UpdateOp::Unset { path: path.clone() },
                "$inc" => {
                    if number(value).is_none() {
                        return Err(QueryError::new("cannot increment with non-numeric argument")
                            .at(path.as_str()));
                    }
                    UpdateOp::Inc {
                        path: path.clone(),
                        by: value.clone(),
                    }
                }
                "$push" => UpdateOp::Push {
                    path: path.clone(),
                    values: each_values(value),
                },
                "$addToSet" => UpdateOp::AddToSet {
                    path: path.clone(),
                    values: each_values(value),
                },
                other if other.starts_with('$') => {
                    return Err(QueryError::new(format!("unknown modifier: {}", other)))
                }
                _ => return Err(QueryError::new("update document requires atomic operators")),
            };
            ops.push(parsed);
        }
    }

    // Two operators on the same path conflict
    for (i, a) in ops.iter().enumerate() {
        if let Some(b) = ops[i + 1..].iter().find(|b| paths_conflict(a.path(), b.path())) {
            return Err(QueryError::new(format!(
                "updating the path '{}' would create a conflict at '{}'",
                b.path(),
                a.path()
            )));
        }
    }

    Ok(Update { ops })
}

fn each_values(value: &Bson) -> Vec<Bson> {
    match value {
        Bson::Document(doc) if doc.len() == 1 && doc.contains_key("$each") => doc
            .get_array("$each")
            .map(|items| items.clone())
            .unwrap_or_default(),
        other => vec![other.clone()],
    }
}

fn paths_conflict(a: &str, b: &str) -> bool {
    a == b
        || a.strip_prefix(b).map(|rest| rest.starts_with('.')).unwrap_or(false)
        || b.strip_prefix(a).map(|rest| rest.starts_with('.')).unwrap_or(false)
}

// ============================================================================
// Pipelines
// ============================================================================

pub fn parse_pipeline(stages: &[Document]) -> Result<Vec<Stage>> {
    stages
        .iter()
        .enumerate()
        .map(|(i, doc)| stage(doc).map_err(|e| e.at(format!("stage {}", i))))
        .collect()
}

fn stage(doc: &Document) -> Result<Stage> {
    if doc.len() != 1 {
        return Err(QueryError::new(
            "a pipeline stage specification object must contain exactly one field",
        ));
    }
    let (name, arg) = match doc.iter().next() {
        Some(entry) => entry,
        None => return Err(QueryError::new("empty pipeline stage")),
    };

    let stage = match name.as_str() {
        "$match" => Stage::Match(parse_filter(object_arg(name, arg)?)?),
        "$project" => Stage::Project(projection(object_arg(name, arg)?)?),
        "$addFields" | "$set" => Stage::AddFields(
            object_arg(name, arg)?
                .iter()
                .map(|(k, v)| Ok((k.clone(), parse_expr(v).map_err(|e| e.at(k.as_str()))?)))
                .collect::<Result<_>>()?,
        ),
        "$lookup" => Stage::Lookup(lookup(object_arg(name, arg)?)?),
        "$unwind" => Stage::Unwind(unwind(arg)?),
        "$group" => Stage::Group(group(object_arg(name, arg)?)?),
        "$sort" => Stage::Sort(sort_keys(object_arg(name, arg)?)?),
        "$limit" => Stage::Limit(
            integer(arg)
                .filter(|n| *n > 0)
                .ok_or_else(|| QueryError::new("the limit must be positive"))? as usize,
        ),
        "$skip" => Stage::Skip(
            integer(arg)
                .filter(|n| *n >= 0)
                .ok_or_else(|| QueryError::new("the skip must be non-negative"))?
                as usize,
        ),
        "$count" => Stage::Count(
            arg.as_str()
                .filter(|s| !s.is_empty() && !s.starts_with('$') && !s.contains('.'))
                .ok_or_else(|| QueryError::new("$count needs a non-empty field name"))?
                .to_string(),
        ),
        "$geoNear" => Stage::GeoNear(geo_near(object_arg(name, arg)?)?),
        other => {
            return Err(QueryError::new(format!(
                "unrecognized pipeline stage name: '{}'",
                other
            )))
        }
    };
    Ok(stage)
}

fn object_arg<'a>(name: &str, arg: &'a Bson) -> Result<&'a Document> {
    arg.as_document()
        .ok_or_else(|| QueryError::new(format!("the {} stage specification must be an object", name)))
}

fn projection(doc: &Document) -> Result<Projection> {
    let mut fields = Vec::new();
    let mut keep_id = true;
    let mut inclusive: Option<bool> = None;

    for (path, value) in doc {
        let item = match value {
            Bson::Boolean(b) => flag_item(*b),
            Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => {
                flag_item(number(value).map(|n| n != 0.0).unwrap_or(false))
            }
            other => ProjectItem::Computed(parse_expr(other).map_err(|e| e.at(path.as_str()))?),
        };

        if path == "_id" {
            if item == ProjectItem::Exclude {
                keep_id = false;
                continue;
            }
        } else {
            let this_inclusive = item != ProjectItem::Exclude;
            match inclusive {
                Some(mode) if mode != this_inclusive => {
                    return Err(QueryError::new(format!(
                        "cannot mix inclusion and exclusion in projection (field {})",
                        path
                    )))
                }
                _ => inclusive = Some(this_inclusive),
            }
        }
        fields.push((path.clone(), item));
    }

    Ok(Projection {
        inclusive: inclusive.unwrap_or(!fields.is_empty() || keep_id),
        keep_id,
        fields,
    })
}

fn flag_item(on: bool) -> ProjectItem {
    if on {
        ProjectItem::Include
    } else {
        ProjectItem::Exclude
    }
}

fn lookup(doc: &Document) -> Result<Lookup> {
    let field = |key: &str| {
        doc.get_str(key)
            .map(|s| s.to_string())
            .map_err(|_| QueryError::new(format!("$lookup requires '{}' as a string", key)))
    };
    if doc.contains_key("pipeline") {
        return Err(QueryError::new("$lookup with a sub-pipeline is not supported"));
    }
    Ok(Lookup {
        from: field("from")?,
        local_field: field("localField")?,
        foreign_field: field("foreignField")?,
        as_field: field("as")?,
    })
}

fn unwind(arg: &Bson) -> Result<Unwind> {
    let field_path = |value: &str| {
        value
            .strip_prefix('$')
            .filter(|p| !p.is_empty())
            .map(|p| p.to_string())
            .ok_or_else(|| QueryError::new("$unwind path must be prefixed by a '$'"))
    };

    match arg {
        Bson::String(path) => Ok(Unwind {
            path: field_path(path)?,
            preserve_null_and_empty: false,
            include_array_index: None,
        }),
        Bson::Document(doc) => Ok(Unwind {
            path: field_path(
                doc.get_str("path")
                    .map_err(|_| QueryError::new("$unwind requires a path"))?,
            )?,
            preserve_null_and_empty: doc.get_bool("preserveNullAndEmptyArrays").unwrap_or(false),
            include_array_index: doc.get_str("includeArrayIndex").ok().map(|s| s.to_string()),
        }),
        _ => Err(QueryError::new("$unwind expects a string or an object")),
    }
}

fn group(doc: &Document) -> Result<Group> {
    let id = doc
        .get("_id")
        .ok_or_else(|| QueryError::new("a group specification must include an _id"))?;
    let id = parse_expr(id).map_err(|e| e.at("_id"))?;

    let mut accumulators = Vec::new();
    for (field, spec) in doc.iter().filter(|(k, _)| k.as_str() != "_id") {
        let spec = spec
            .as_document()
            .filter(|d| d.len() == 1)
            .ok_or_else(|| QueryError::new(format!("the field '{}' must be an accumulator object", field)))?;
        let (name, arg) = match spec.iter().next() {
            Some(entry) => entry,
            None => continue,
        };
        let op = match name.as_str() {
            "$sum" => AccumulatorOp::Sum,
            "$avg" => AccumulatorOp::Avg,
            "$min" => AccumulatorOp::Min,
            "$max" => AccumulatorOp::Max,
            "$first" => AccumulatorOp::First,
            "$last" => AccumulatorOp::Last,
            "$push" => AccumulatorOp::Push,
            "$addToSet" => AccumulatorOp::AddToSet,
            other => {
                return Err(QueryError::new(format!("unknown group operator '{}'", other))
                    .at(field.as_str()))
            }
        };
        accumulators.push((
            field.clone(),
            Accumulator {
                op,
                expr: parse_expr(arg).map_err(|e| e.at(field.as_str()))?,
            },
        ));
    }

    Ok(Group { id, accumulators })
}

fn sort_keys(doc: &Document) -> Result<Vec<SortKey>> {
    if doc.is_empty() {
        return Err(QueryError::new("$sort stage must have at least one sort key"));
    }
    doc.iter()
        .map(|(path, value)| {
            let direction = match integer(value) {
                Some(1) => SortDirection::Ascending,
                Some(-1) => SortDirection::Descending,
                _ => return Err(QueryError::new("$sort key ordering must be 1 (for ascending) or -1 (for descending)").at(path.as_str())),
            };
            Ok(SortKey {
                path: path.clone(),
                direction,
            })
        })
        .collect()
}

/// Parse a `$sort`-style specification outside of a pipeline (used by `find`)
pub fn parse_sort(doc: &Document) -> Result<Vec<SortKey>> {
    sort_keys(doc)
}

fn geo_near(doc: &Document) -> Result<GeoNear> {
    let near = match doc.get("near") {
        Some(Bson::Document(point)) => point
            .get_array("coordinates")
            .ok()
            .and_then(|c| coordinates(c)),
        Some(Bson::Array(pair)) => coordinates(pair),
        _ => None,
    }
    .ok_or_else(|| QueryError::new("$geoNear requires a 'near' point"))?;

    let distance_field = doc
        .get_str("distanceField")
        .map_err(|_| QueryError::new("$geoNear requires a 'distanceField' option as a String"))?
        .to_string();

    let query = match doc.get("query") {
        Some(Bson::Document(q)) => Some(parse_filter(q).map_err(|e| e.at("query"))?),
        Some(_) => return Err(QueryError::new("$geoNear query must be an object")),
        None => None,
    };

    Ok(GeoNear {
        near,
        distance_field,
        max_distance: doc.get("maxDistance").and_then(number),
        min_distance: doc.get("minDistance").and_then(number),
        query,
        key: doc.get_str("key").ok().map(|s| s.to_string()),
        spherical: doc.get_bool("spherical").unwrap_or(false),
        distance_multiplier: doc.get("distanceMultiplier").and_then(number),
    })
}

fn coordinates(values: &[Bson]) -> Option<(f64, f64)> {
    match values {
        [lon, lat] => Some((number(lon)?, number(lat)?)),
        _ => None,
    }
}

// ============================================================================
// Expressions
// ============================================================================

pub fn parse_expr(value: &Bson) -> Result<Expr> {
    match value {
        Bson::String(s) if s == "$$ROOT" || s == "$$CURRENT" => Ok(Expr::Root),
        Bson::String(s) if s.starts_with("$$") => {
            Err(QueryError::new(format!("use of undefined variable: {}", &s[2..])))
        }
        Bson::String(s) if s.starts_with('$') => {
            let path = &s[1..];
            if path.is_empty() {
                return Err(QueryError::new("'$' by itself is not a valid FieldPath"));
            }
            Ok(Expr::FieldPath(path.to_string()))
        }
        Bson::Array(items) => Ok(Expr::Array(
            items.iter().map(parse_expr).collect::<Result<_>>()?,
        )),
        Bson::Document(doc) if is_operator_doc(doc) => operator_expr(doc),
        Bson::Document(doc) => Ok(Expr::Object(
            doc.iter()
                .map(|(k, v)| Ok((k.clone(), parse_expr(v).map_err(|e| e.at(k.as_str()))?)))
                .collect::<Result<_>>()?,
        )),
        other => Ok(Expr::Literal(other.clone())),
    }
}

fn operator_expr(doc: &Document) -> Result<Expr> {
    if doc.len() != 1 {
        return Err(QueryError::new(
            "an expression specification must contain exactly one field",
        ));
    }
    let (name, arg) = match doc.iter().next() {
        Some(entry) => entry,
        None => return Err(QueryError::new("empty expression")),
    };

    match name.as_str() {
        "$literal" => return Ok(Expr::Literal(arg.clone())),
        "$meta" => {
            return match arg.as_str() {
                Some("textScore") => Ok(Expr::Meta(MetaField::TextScore)),
                _ => Err(QueryError::new(format!("unsupported argument to $meta: {}", arg))),
            }
        }
        "$cond" => return cond(arg),
        _ => {}
    }

    let op = Operator::from_name(name)
        .ok_or_else(|| QueryError::new(format!("unrecognized expression '{}'", name)))?;
    let args = match arg {
        Bson::Array(items) => items.iter().map(parse_expr).collect::<Result<Vec<_>>>()?,
        single => vec![parse_expr(single)?],
    };

    let (min, max) = op.arity();
    if args.len() < min || args.len() > max {
        return Err(QueryError::new(format!(
            "expression {} takes {} arguments, {} were passed in",
            name,
            if min == max { min.to_string() } else { format!("{}..{}", min, max) },
            args.len()
        )));
    }

    Ok(Expr::Op { op, args })
}

fn cond(arg: &Bson) -> Result<Expr> {
    let (condition, then, otherwise) = match arg {
        Bson::Array(items) if items.len() == 3 => (&items[0], &items[1], &items[2]),
        Bson::Document(doc) => (
            doc.get("if").ok_or_else(|| QueryError::new("missing 'if' parameter to $cond"))?,
            doc.get("then").ok_or_else(|| QueryError::new("missing 'then' parameter to $cond"))?,
            doc.get("else").ok_or_else(|| QueryError::new("missing 'else' parameter to $cond"))?,
        ),
        _ => return Err(QueryError::new("$cond takes exactly 3 arguments")),
    };
    Ok(Expr::Cond {
        condition: Box::new(parse_expr(condition)?),
        then: Box::new(parse_expr(then)?),
        otherwise: Box::new(parse_expr(otherwise)?),
    })
}

// ============================================================================
// Validators and index keys
// ============================================================================

pub fn parse_validator(doc: &Document) -> Result<Validator> {
    match doc.get("$jsonSchema") {
        Some(Bson::Document(schema)) if doc.len() == 1 => {
            Ok(Validator::JsonSchema(json_schema(schema).map_err(|e| e.at("$jsonSchema"))?))
        }
        Some(_) if doc.len() == 1 => Err(QueryError::new("$jsonSchema must be an object")),
        Some(_) => Err(QueryError::new("$jsonSchema cannot be combined with other operators")),
        None => Ok(Validator::Query(parse_filter(doc)?)),
    }
}

fn json_schema(doc: &Document) -> Result<JsonSchema> {
    let mut schema = JsonSchema::default();

    for (key, value) in doc {
        match key.as_str() {
            "bsonType" => {
                let names: Vec<&str> = match value {
                    Bson::String(s) => vec![s.as_str()],
                    Bson::Array(items) => items.iter().filter_map(|b| b.as_str()).collect(),
                    _ => return Err(QueryError::new("bsonType must be a string or array")),
                };
                schema.bson_types = names
                    .into_iter()
                    .map(|n| {
                        BsonType::from_name(n)
                            .ok_or_else(|| QueryError::new(format!("unknown bsonType: {}", n)))
                    })
                    .collect::<Result<_>>()?;
            }
            "required" => {
                schema.required = value
                    .as_array()
                    .ok_or_else(|| QueryError::new("required must be an array"))?
                    .iter()
                    .map(|b| {
                        b.as_str()
                            .map(|s| s.to_string())
                            .ok_or_else(|| QueryError::new("required entries must be strings"))
                    })
                    .collect::<Result<_>>()?;
            }
            "properties" => {
                let props = value
                    .as_document()
                    .ok_or_else(|| QueryError::new("properties must be an object"))?;
                for (name, prop) in props {
                    let prop = prop.as_document().ok_or_else(|| {
                        QueryError::new("property schemas must be objects").at(name.as_str())
                    })?;
                    schema
                        .properties
                        .push((name.clone(), json_schema(prop).map_err(|e| e.at(name.as_str()))?));
                }
            }
            "enum" => {
                schema.enum_values = Some(
                    value
                        .as_array()
                        .cloned()
                        .ok_or_else(|| QueryError::new("enum must be an array"))?,
                )
            }
            "minLength" => schema.min_length = Some(non_negative(key, value)?),
            "maxLength" => schema.max_length = Some(non_negative(key, value)?),
            "pattern" => {
                let source = value
                    .as_str()
                    .ok_or_else(|| QueryError::new("pattern must be a string"))?;
                schema.pattern = Some(Pattern::new(source, "")?);
            }
            "minimum" => {
                schema.minimum =
                    Some(number(value).ok_or_else(|| QueryError::new("minimum must be a number"))?)
            }
            "maximum" => {
                schema.maximum =
                    Some(number(value).ok_or_else(|| QueryError::new("maximum must be a number"))?)
            }
            "items" => {
                let items = value
                    .as_document()
                    .ok_or_else(|| QueryError::new("items must be an object"))?;
                schema.items = Some(Box::new(json_schema(items).map_err(|e| e.at("items"))?));
            }
            "additionalProperties" => {
                schema.additional_properties = Some(
                    value
                        .as_bool()
                        .ok_or_else(|| QueryError::new("additionalProperties must be a boolean"))?,
                )
            }
            "description" | "title" => schema.description = value.as_str().map(|s| s.to_string()),
            other => {
                return Err(QueryError::new(format!(
                    "unknown $jsonSchema keyword: {}",
                    other
                )))
            }
        }
    }

    Ok(schema)
}

fn non_negative(key: &str, value: &Bson) -> Result<usize> {
    integer(value)
        .filter(|n| *n >= 0)
        .map(|n| n as usize)
        .ok_or_else(|| QueryError::new(format!("{} must be a non-negative integer", key)))
}

pub fn parse_index_keys(doc: &Document) -> Result<Vec<IndexKey>> {
    if doc.is_empty() {
        return Err(QueryError::new("index key pattern must not be empty"));
    }
    doc.iter()
        .map(|(path, value)| {
            let kind = match value {
                Bson::String(s) if s == "text" => IndexKind::Text,
                Bson::String(s) if s == "2dsphere" => IndexKind::Sphere2d,
                other => match number(other) {
                    Some(n) if n > 0.0 => IndexKind::Ascending,
                    Some(n) if n < 0.0 => IndexKind::Descending,
                    _ => {
                        return Err(QueryError::new(format!("bad index key pattern: {}", other))
                            .at(path.as_str()))
                    }
                },
            };
            Ok(IndexKey {
                path: path.clone(),
                kind,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_implicit_equality_and_ranges() {
        let filter = parse_filter(&doc! { "role": "student", "price": { "$gte": 50, "$lte": 200 } }).unwrap();
        let conjuncts = filter.conjuncts();
        assert_eq!(conjuncts.len(), 2);
        assert_eq!(conjuncts[0].condition, Condition::Eq(Bson::String("student".into())));
        assert!(matches!(&conjuncts[1].condition, Condition::Conjunction(parts) if parts.len() == 2));
    }

    #[test]
    fn test_regex_with_options() {
        let filter = parse_filter(&doc! { "title": { "$regex": "python", "$options": "i" } }).unwrap();
        match filter {
            Filter::Field(FieldFilter { condition: Condition::Regex(p), .. }) => {
                assert!(p.is_match("PYTHON basics"));
            }
            other => panic!("unexpected filter: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_operator_rejected() {
        let err = parse_filter(&doc! { "price": { "$between": [1, 2] } }).unwrap_err();
        assert!(err.message.contains("$between"));
        assert_eq!(err.path.as_deref(), Some("price"));
    }

    #[test]
    fn test_update_add_to_set_each() {
        let update = parse_update(&doc! {
            "$set": { "profile.bio": "hi" },
            "$addToSet": { "profile.skills": { "$each": ["Rust", "SQL"] } }
        })
        .unwrap();
        assert_eq!(update.ops.len(), 2);
        assert!(matches!(&update.ops[1], UpdateOp::AddToSet { values, .. } if values.len() == 2));
    }

    #[test]
    fn test_update_conflicting_paths() {
        let err = parse_update(&doc! {
            "$set": { "profile": {} },
            "$addToSet": { "profile.skills": "Rust" }
        })
        .unwrap_err();
        assert!(err.message.contains("conflict"));
    }

    #[test]
    fn test_update_requires_operators() {
        assert!(parse_update(&doc! { "title": "x" }).is_err());
    }

    #[test]
    fn test_pipeline_stages() {
        let stages = parse_pipeline(&[
            doc! { "$match": { "grade": { "$ne": null } } },
            doc! { "$group": { "_id": "$student_id", "average_grade": { "$avg": "$grade" } } },
            doc! { "$sort": { "average_grade": -1 } },
            doc! { "$limit": 5 },
        ])
        .unwrap();
        assert_eq!(stages.len(), 4);
        assert!(matches!(stages[3], Stage::Limit(5)));
    }

    #[test]
    fn test_unknown_stage() {
        let err = parse_pipeline(&[doc! { "$frobnicate": {} }]).unwrap_err();
        assert!(err.message.contains("$frobnicate"));
        assert_eq!(err.path.as_deref(), Some("stage 0"));
    }

    #[test]
    fn test_projection_modes() {
        let stages = parse_pipeline(&[doc! { "$project": { "_id": 0, "title": 1, "score": { "$meta": "textScore" } } }]).unwrap();
        match &stages[0] {
            Stage::Project(p) => {
                assert!(p.inclusive);
                assert!(!p.keep_id);
                assert_eq!(p.fields.len(), 2);
            }
            other => panic!("unexpected stage: {:?}", other),
        }
        assert!(parse_pipeline(&[doc! { "$project": { "a": 1, "b": 0 } }]).is_err());
    }

    #[test]
    fn test_cond_forms() {
        let array_form = parse_expr(&Bson::Document(doc! { "$cond": [{ "$eq": ["$status", "completed"] }, 1, 0] })).unwrap();
        let doc_form = parse_expr(&Bson::Document(doc! { "$cond": { "if": { "$eq": ["$status", "completed"] }, "then": 1, "else": 0 } })).unwrap();
        assert_eq!(array_form, doc_form);
    }

    #[test]
    fn test_expression_arity() {
        assert!(parse_expr(&Bson::Document(doc! { "$divide": [1] })).is_err());
        assert!(parse_expr(&Bson::Document(doc! { "$round": ["$x", 2] })).is_ok());
    }

    #[test]
    fn test_json_schema() {
        let validator = parse_validator(&doc! {
            "$jsonSchema": {
                "bsonType": "object",
                "required": ["role"],
                "properties": {
                    "role": { "bsonType": "string", "enum": ["student", "instructor"] },
                    "grade": { "bsonType": ["double", "null"], "minimum": 0, "maximum": 100 }
                }
            }
        })
        .unwrap();
        match validator {
            Validator::JsonSchema(schema) => {
                assert_eq!(schema.required, vec!["role".to_string()]);
                assert_eq!(schema.properties.len(), 2);
                assert_eq!(schema.properties[1].1.bson_types, vec![BsonType::Double, BsonType::Null]);
            }
            other => panic!("unexpected validator: {:?}", other),
        }
    }

    #[test]
    fn test_index_keys() {
        let keys = parse_index_keys(&doc! { "title": "text", "description": "text" }).unwrap();
        assert!(keys.iter().all(|k| k.kind == IndexKind::Text));
        assert!(parse_index_keys(&doc! { "x": "hashed" }).is_err());
    }
}
