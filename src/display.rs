//! Console rendering of result sets
//!
//! Documents print one per line with long strings shortened, dates in UTC
//! and GeoJSON points collapsed. Only the first few documents of a result
//! set are shown.

use bson::{Bson, Document};
use serde::Serialize;

use crate::error::Result;

/// Documents shown per result set
pub const DEFAULT_LIMIT: usize = 5;

/// Shorten a string value the way listings show it
///
/// Values over 20 characters keep 17; identifier-like keys (containing
/// "id", other than `_id`) over 10 characters keep 7.
fn shorten(key: &str, value: &str) -> Option<String> {
    let lower = key.to_lowercase();
    let chars = value.chars().count();
    if chars > 20 && !lower.contains("_id") {
        return Some(format!("{}...", value.chars().take(17).collect::<String>()));
    }
    if chars > 10 && lower.contains("id") && key != "_id" {
        return Some(format!("{}...", value.chars().take(7).collect::<String>()));
    }
    None
}

fn geojson(value: &Document) -> Option<String> {
    let kind = value.get_str("type").ok()?;
    let coordinates = value.get_array("coordinates").ok()?;
    let parts: Vec<String> = coordinates.iter().map(render_value).collect();
    Some(format!("GeoJSON({}: [{}])", kind, parts.join(", ")))
}

fn render_value(value: &Bson) -> String {
    match value {
        Bson::String(s) => format!("'{}'", s),
        Bson::Double(f) => format!("{}", f),
        Bson::DateTime(dt) => dt.to_chrono().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        Bson::Null => "None".to_string(),
        Bson::Boolean(b) => (if *b { "True" } else { "False" }).to_string(),
        Bson::Int32(n) => n.to_string(),
        Bson::Int64(n) => n.to_string(),
        Bson::Array(items) => {
            let parts: Vec<String> = items.iter().map(render_value).collect();
            format!("[{}]", parts.join(", "))
        }
        Bson::Document(doc) => render_document(doc),
        other => other.to_string(),
    }
}

fn render_field(key: &str, value: &Bson) -> String {
    match value {
        Bson::DateTime(dt) => format!("'{}'", dt.to_chrono().format("%Y-%m-%d %H:%M:%S UTC")),
        Bson::String(s) => match shorten(key, s) {
            Some(short) => format!("'{}'", short),
            None => render_value(value),
        },
        Bson::Document(doc) => geojson(doc).map_or_else(|| render_value(value), |g| format!("'{}'", g)),
        _ => render_value(value),
    }
}

/// One document on one line
pub fn render_document(doc: &Document) -> String {
    let fields: Vec<String> = doc
        .iter()
        .map(|(key, value)| format!("'{}': {}", key, render_field(key, value)))
        .collect();
    format!("{{{}}}", fields.join(", "))
}

/// A titled listing of up to `limit` documents; `None` marks a missing one
pub fn render_documents(title: &str, docs: &[Option<Document>], limit: usize) -> String {
    let mut out = format!("\n--- {} ---\n", title);
    if docs.is_empty() {
        out.push_str("No documents found.\n");
        return out;
    }

    let mut shown = 0;
    for doc in docs {
        match doc {
            None => out.push_str("  [Document not found or deleted]\n"),
            Some(doc) => {
                out.push_str(&render_document(doc));
                out.push('\n');
                shown += 1;
                if shown >= limit {
                    out.push_str(&format!("... (showing first {} documents, if more exist)\n", limit));
                    break;
                }
            }
        }
    }
    out.push_str(&"-".repeat(title.chars().count() + 8));
    out.push('\n');
    out
}

pub fn print_documents(title: &str, docs: &[Document]) {
    let docs: Vec<Option<Document>> = docs.iter().cloned().map(Some).collect();
    print!("{}", render_documents(title, &docs, DEFAULT_LIMIT));
}

/// Print a single lookup result, which may be missing
pub fn print_lookup(title: &str, doc: Option<Document>) {
    print!("{}", render_documents(title, &[doc], DEFAULT_LIMIT));
}

/// Print typed rows by serializing each one back to a document
pub fn print_rows<T: Serialize>(title: &str, rows: &[T]) -> Result<()> {
    let docs = rows
        .iter()
        .map(bson::to_document)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    print_documents(title, &docs);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn test_shorten_rules() {
        assert_eq!(
            shorten("description", "A comprehensive course covering design").as_deref(),
            Some("A comprehensive c...")
        );
        assert_eq!(shorten("title", "Short"), None);
        assert_eq!(
            shorten("course_id", "3f2a9c1e-0000-4000-8000-000000000000").as_deref(),
            Some("3f2a9c1...")
        );
        assert_eq!(shorten("_id", "3f2a9c1e-0000-4000-8000-000000000000"), None);
    }

    #[test]
    fn test_render_dates_and_geo() {
        let date = bson::DateTime::from_millis(0);
        let doc = doc! {
            "created_at": date,
            "location": { "type": "Point", "coordinates": [-74.006, 40.7128] },
        };
        let line = render_document(&doc);
        assert!(line.contains("'created_at': '1970-01-01 00:00:00 UTC'"));
        assert!(line.contains("GeoJSON(Point: [-74.006, 40.7128])"));
    }

    #[test]
    fn test_listing_limits_and_missing() {
        let docs: Vec<Option<Document>> = (0..7).map(|i| Some(doc! { "n": i })).collect();
        let out = render_documents("Numbers", &docs, 5);
        assert_eq!(out.matches("'n'").count(), 5);
        assert!(out.contains("... (showing first 5 documents, if more exist)"));
        assert!(out.ends_with(&format!("{}\n", "-".repeat(15))));

        let out = render_documents("Gone", &[None], 5);
        assert!(out.contains("[Document not found or deleted]"));

        let out = render_documents("Empty", &[], 5);
        assert!(out.contains("No documents found."));
    }
}
