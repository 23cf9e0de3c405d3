use std::fmt;

use serde_json::{Map, Value};

use crate::DocumentId;

/// Name of the field holding the id of a stored document
pub const ID_FIELD: &str = "_id";

/// A stored document: an arbitrary JSON object
///
/// Field order is preserved, with [`ID_FIELD`] always first.
pub type Document = Map<String, Value>;

/// The two collections the backend serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    /// Product queries posted by users
    Queries,
    /// Recommendations answering a query (linked by their `postID` field)
    Recommendations,
}

impl Collection {
    pub const ALL: [Collection; 2] = [Collection::Queries, Collection::Recommendations];

    pub fn name(self) -> &'static str {
        match self {
            Collection::Queries => "users_queries",
            Collection::Recommendations => "all_recommendations",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Build a document with `id` as its first field, followed by `fields`
///
/// Any `_id` already present in `fields` is dropped.
pub fn with_id(id: DocumentId, fields: Document) -> Document {
    let mut doc = Document::with_capacity(fields.len() + 1);
    doc.insert(ID_FIELD.to_owned(), Value::String(id.to_string()));
    doc.extend(fields.into_iter().filter(|(k, _)| k != ID_FIELD));
    doc
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn with_id_puts_id_first_and_drops_client_id() {
        let id: DocumentId = "65a1b2c3d4e5f60718293a4b".parse().unwrap();
        let fields = json!({ "b": 1, "_id": "forged", "a": 2 })
            .as_object()
            .cloned()
            .unwrap();

        let doc = with_id(id, fields);

        assert_eq!(
            doc.keys().map(String::as_str).collect::<Vec<_>>(),
            ["_id", "b", "a"]
        );
        assert_eq!(doc[ID_FIELD], json!("65a1b2c3d4e5f60718293a4b"));
    }

    #[test]
    fn collection_names_round_trip() {
        for c in Collection::ALL {
            assert_eq!(Collection::from_name(c.name()), Some(c));
        }
        assert_eq!(Collection::from_name("nope"), None);
    }
}
