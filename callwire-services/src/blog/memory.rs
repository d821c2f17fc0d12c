use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use futures::stream::BoxStream;
use tokio::sync::RwLock;

use super::store::{BlogDocument, BlogFields, DocumentStore, RecordId, StoreError};

/// Records fetched per lock acquisition while listing.
const PAGE_SIZE: usize = 64;

/// In-process [`DocumentStore`] keyed by [`RecordId`].
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    records: Arc<RwLock<BTreeMap<RecordId, BlogFields>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryStore {
    async fn insert(&self, fields: BlogFields) -> Result<RecordId, StoreError> {
        let id = RecordId::generate()?;
        let mut records = self.records.write().await;
        if records.contains_key(&id) {
            return Err(StoreError::IdAllocation(format!("id {id} already in use")));
        }
        records.insert(id, fields);
        Ok(id)
    }

    async fn find_one(&self, id: RecordId) -> Result<Option<BlogDocument>, StoreError> {
        let records = self.records.read().await;
        Ok(records.get(&id).map(|fields| BlogDocument {
            id,
            fields: fields.clone(),
        }))
    }

    async fn find_one_and_update(
        &self,
        id: RecordId,
        fields: BlogFields,
    ) -> Result<Option<BlogDocument>, StoreError> {
        let mut records = self.records.write().await;
        Ok(records.get_mut(&id).map(|stored| {
            *stored = fields;
            BlogDocument {
                id,
                fields: stored.clone(),
            }
        }))
    }

    async fn find_one_and_delete(&self, id: RecordId) -> Result<Option<BlogDocument>, StoreError> {
        let mut records = self.records.write().await;
        Ok(records.remove(&id).map(|fields| BlogDocument { id, fields }))
    }

    fn find(&self) -> BoxStream<'static, Result<BlogDocument, StoreError>> {
        let records = Arc::clone(&self.records);

        Box::pin(async_stream::stream! {
            let mut after: Option<RecordId> = None;
            loop {
                let page: Vec<BlogDocument> = {
                    let records = records.read().await;
                    let lower = after.map_or(Bound::Unbounded, Bound::Excluded);
                    records
                        .range((lower, Bound::Unbounded))
                        .take(PAGE_SIZE)
                        .map(|(id, fields)| BlogDocument { id: *id, fields: fields.clone() })
                        .collect()
                };

                let Some(last) = page.last() else {
                    break;
                };
                after = Some(last.id);
                let short = page.len() < PAGE_SIZE;

                for doc in page {
                    yield Ok(doc);
                }
                if short {
                    break;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn fields(title: &str) -> BlogFields {
        BlogFields {
            author_id: "author".into(),
            title: title.into(),
            content: "content".into(),
        }
    }

    #[tokio::test]
    async fn test_insert_find_update_delete() {
        let store = MemoryStore::new();
        let id = store.insert(fields("first")).await.unwrap();

        let found = store.find_one(id).await.unwrap().unwrap();
        assert_eq!(found.fields.title, "first");

        let updated = store.find_one_and_update(id, fields("second")).await.unwrap().unwrap();
        assert_eq!(updated.fields.title, "second");
        assert_eq!(store.find_one(id).await.unwrap().unwrap(), updated);

        let removed = store.find_one_and_delete(id).await.unwrap().unwrap();
        assert_eq!(removed.id, id);
        assert!(store.find_one(id).await.unwrap().is_none());
        assert!(store.find_one_and_update(id, fields("third")).await.unwrap().is_none());
        assert!(store.find_one_and_delete(id).await.unwrap().is_none());
        assert_eq!(store.find().count().await, 0);
    }

    #[tokio::test]
    async fn test_find_spans_pages() {
        let store = MemoryStore::new();
        let total = PAGE_SIZE * 2 + 3;
        for i in 0..total {
            store.insert(fields(&format!("post {i}"))).await.unwrap();
        }

        let docs: Vec<BlogDocument> = store.find().map(|doc| doc.unwrap()).collect().await;
        assert_eq!(docs.len(), total);
        assert!(docs.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[tokio::test]
    async fn test_find_on_empty_store() {
        let store = MemoryStore::new();
        assert_eq!(store.find().count().await, 0);
    }
}
