use pickperfect_core::{Collection, Document, DocumentId, ID_FIELD, with_id};
use redb::ReadableTable as _;
use serde_json::{Number, Value};
use snafu::ResultExt as _;
use tracing::debug;

use crate::tables::{collection_table, documents};
use crate::{
    Database, DbResult, DeleteResult, DocumentDecodingSnafu, IncrementOverflowSnafu,
    InsertOneResult, LOG_TARGET, NonNumericFieldSnafu, UpdateResult,
};

fn decode_document(bytes: &[u8]) -> DbResult<Document> {
    serde_json::from_slice(bytes).context(DocumentDecodingSnafu)
}

fn encode_document(doc: &Document) -> Vec<u8> {
    serde_json::to_vec(doc).expect("Serializing a JSON map can't fail")
}

impl Database {
    /// All documents of a collection, in id order
    pub async fn find_all(&self, collection: Collection) -> DbResult<Vec<Document>> {
        self.read_with(|tx| {
            let table = tx.open_table(collection_table(collection))?;
            Self::find_all_tx(&table)
        })
        .await
    }

    pub async fn find_one(
        &self,
        collection: Collection,
        id: DocumentId,
    ) -> DbResult<Option<Document>> {
        self.read_with(|tx| {
            let table = tx.open_table(collection_table(collection))?;
            Self::find_one_tx(id, &table)
        })
        .await
    }

    /// Store `fields` as a new document under a freshly generated id
    pub async fn insert_one(
        &self,
        collection: Collection,
        fields: Document,
    ) -> DbResult<InsertOneResult> {
        let id = DocumentId::generate();
        let doc = with_id(id, fields);

        self.write_with(|tx| {
            let mut table = tx.open_table(collection_table(collection))?;
            table.insert(id.to_string().as_str(), encode_document(&doc).as_slice())?;
            Ok(())
        })
        .await?;

        debug!(target: LOG_TARGET, %collection, %id, "Document inserted");
        Ok(InsertOneResult {
            acknowledged: true,
            inserted_id: id,
        })
    }

    /// Overwrite the given top-level fields of a document (`$set`)
    pub async fn update_set(
        &self,
        collection: Collection,
        id: DocumentId,
        fields: Document,
    ) -> DbResult<UpdateResult> {
        self.write_with(|tx| {
            let mut table = tx.open_table(collection_table(collection))?;
            Self::modify_document_tx(id, &mut table, |doc| {
                let mut modified = false;
                for (k, v) in fields {
                    if k == ID_FIELD {
                        continue;
                    }
                    if doc.get(&k) != Some(&v) {
                        doc.insert(k, v);
                        modified = true;
                    }
                }
                Ok(modified)
            })
        })
        .await
    }

    /// Add `delta` to a numeric field of a document (`$inc`)
    ///
    /// A missing field is created with the value of `delta`.
    pub async fn increment(
        &self,
        collection: Collection,
        id: DocumentId,
        field: &str,
        delta: i64,
    ) -> DbResult<UpdateResult> {
        self.write_with(|tx| {
            let mut table = tx.open_table(collection_table(collection))?;
            Self::modify_document_tx(id, &mut table, |doc| {
                let new_value = match doc.get(field) {
                    None => Value::from(delta),
                    Some(Value::Number(n)) => increment_number(field, n, delta)?,
                    Some(_) => {
                        return NonNumericFieldSnafu { field }.fail();
                    }
                };
                doc.insert(field.to_owned(), new_value);
                Ok(delta != 0)
            })
        })
        .await
    }

    pub async fn delete_one(&self, collection: Collection, id: DocumentId) -> DbResult<DeleteResult> {
        let deleted = self
            .write_with(|tx| {
                let mut table = tx.open_table(collection_table(collection))?;
                let removed = table.remove(id.to_string().as_str())?.is_some();
                Ok(removed)
            })
            .await?;

        debug!(target: LOG_TARGET, %collection, %id, deleted, "Document delete");
        Ok(DeleteResult::deleted(u64::from(deleted)))
    }

    /// Delete every document whose top-level `field` is the string `value`
    pub async fn delete_many_by_field(
        &self,
        collection: Collection,
        field: &str,
        value: &str,
    ) -> DbResult<DeleteResult> {
        let deleted = self
            .write_with(|tx| {
                let mut table = tx.open_table(collection_table(collection))?;

                let mut matching = vec![];
                for res in table.iter()? {
                    let (k, v) = res?;
                    let doc = decode_document(v.value())?;
                    if doc.get(field).and_then(Value::as_str) == Some(value) {
                        matching.push(k.value().to_owned());
                    }
                }

                for key in &matching {
                    table.remove(key.as_str())?;
                }
                Ok(matching.len() as u64)
            })
            .await?;

        debug!(target: LOG_TARGET, %collection, field, value, deleted, "Documents delete");
        Ok(DeleteResult::deleted(deleted))
    }

    pub fn find_all_tx(table: &impl documents::ReadableTable) -> DbResult<Vec<Document>> {
        table
            .iter()?
            .map(|res| {
                let (_, v) = res?;
                decode_document(v.value())
            })
            .collect()
    }

    pub fn find_one_tx(
        id: DocumentId,
        table: &impl documents::ReadableTable,
    ) -> DbResult<Option<Document>> {
        table
            .get(id.to_string().as_str())?
            .map(|g| decode_document(g.value()))
            .transpose()
    }

    /// Load, modify and store back a document
    ///
    /// `f` returns whether it changed anything; unchanged documents are not
    /// written back.
    fn modify_document_tx(
        id: DocumentId,
        table: &mut documents::Table,
        f: impl FnOnce(&mut Document) -> DbResult<bool>,
    ) -> DbResult<UpdateResult> {
        let Some(mut doc) = Self::find_one_tx(id, &*table)? else {
            return Ok(UpdateResult::unmatched());
        };

        let modified = f(&mut doc)?;
        if modified {
            table.insert(id.to_string().as_str(), encode_document(&doc).as_slice())?;
        }
        Ok(UpdateResult::matched(modified))
    }
}

fn increment_number(field: &str, n: &Number, delta: i64) -> DbResult<Value> {
    if let Some(i) = n.as_i64() {
        return match i.checked_add(delta) {
            Some(sum) => Ok(Value::from(sum)),
            None => IncrementOverflowSnafu { field }.fail(),
        };
    }

    let sum = n.as_f64().unwrap_or(f64::NAN) + delta as f64;
    Number::from_f64(sum)
        .map(Value::Number)
        .ok_or_else(|| IncrementOverflowSnafu { field }.build())
}
