//! Blog service: CRUD over a [`DocumentStore`] plus a streamed listing.

mod memory;
mod store;

pub use memory::MemoryStore;
pub use store::{BlogDocument, BlogFields, DocumentStore, InvalidRecordId, RecordId, StoreError};

use std::sync::Arc;

use callwire::{CallContext, RpcRouter, Sender, Status};
use futures::StreamExt;
use serde::{Deserialize, Serialize};

pub const SERVICE: &str = "blog.BlogService";

pub const CREATE_BLOG: &str = "/blog.BlogService/CreateBlog";
pub const READ_BLOG: &str = "/blog.BlogService/ReadBlog";
pub const UPDATE_BLOG: &str = "/blog.BlogService/UpdateBlog";
pub const DELETE_BLOG: &str = "/blog.BlogService/DeleteBlog";
pub const LIST_BLOG: &str = "/blog.BlogService/ListBlog";

/// Wire form of a record; `id` is empty until the record is stored.
#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Blog {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(string, tag = "2")]
    pub author_id: String,
    #[prost(string, tag = "3")]
    pub title: String,
    #[prost(string, tag = "4")]
    pub content: String,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateBlogRequest {
    #[prost(message, optional, tag = "1")]
    pub blog: Option<Blog>,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateBlogResponse {
    #[prost(message, optional, tag = "1")]
    pub blog: Option<Blog>,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReadBlogRequest {
    #[prost(string, tag = "1")]
    pub blog_id: String,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReadBlogResponse {
    #[prost(message, optional, tag = "1")]
    pub blog: Option<Blog>,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateBlogRequest {
    #[prost(message, optional, tag = "1")]
    pub blog: Option<Blog>,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateBlogResponse {
    #[prost(message, optional, tag = "1")]
    pub blog: Option<Blog>,
}

/// Only `blog.id` is consulted.
#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeleteBlogRequest {
    #[prost(message, optional, tag = "1")]
    pub blog: Option<Blog>,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeleteBlogResponse {
    #[prost(string, tag = "1")]
    pub blog_id: String,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListBlogRequest {}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListBlogResponse {
    #[prost(message, optional, tag = "1")]
    pub blog: Option<Blog>,
}

impl From<BlogDocument> for Blog {
    fn from(doc: BlogDocument) -> Self {
        Blog {
            id: doc.id.to_string(),
            author_id: doc.fields.author_id,
            title: doc.fields.title,
            content: doc.fields.content,
        }
    }
}

impl From<Blog> for BlogFields {
    fn from(blog: Blog) -> Self {
        BlogFields {
            author_id: blog.author_id,
            title: blog.title,
            content: blog.content,
        }
    }
}

fn parse_id(id: &str) -> Result<RecordId, Status> {
    id.parse()
        .map_err(|_| Status::invalid_argument(format!("Cannot parse ID: {id}")))
}

fn not_found(id: RecordId) -> Status {
    Status::not_found(format!("There is no blog with id: {id}"))
}

fn store_failure(err: StoreError) -> Status {
    Status::internal(format!("internal error: {err}"))
}

/// Blog CRUD handlers over a shared store.
pub struct BlogService<S> {
    store: Arc<S>,
}

impl<S: DocumentStore> BlogService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn router(self) -> RpcRouter {
        let service = Arc::new(self);
        let create = Arc::clone(&service);
        let read = Arc::clone(&service);
        let update = Arc::clone(&service);
        let delete = Arc::clone(&service);
        let list = service;

        RpcRouter::new()
            .unary(SERVICE, "CreateBlog", move |ctx, req: CreateBlogRequest| {
                Arc::clone(&create).create_blog(ctx, req)
            })
            .unary(SERVICE, "ReadBlog", move |ctx, req: ReadBlogRequest| {
                Arc::clone(&read).read_blog(ctx, req)
            })
            .unary(SERVICE, "UpdateBlog", move |ctx, req: UpdateBlogRequest| {
                Arc::clone(&update).update_blog(ctx, req)
            })
            .unary(SERVICE, "DeleteBlog", move |ctx, req: DeleteBlogRequest| {
                Arc::clone(&delete).delete_blog(ctx, req)
            })
            .server_stream(
                SERVICE,
                "ListBlog",
                move |ctx, req: ListBlogRequest, tx: Sender<ListBlogResponse>| {
                    Arc::clone(&list).list_blog(ctx, req, tx)
                },
            )
    }

    async fn create_blog(
        self: Arc<Self>,
        _ctx: CallContext,
        req: CreateBlogRequest,
    ) -> Result<CreateBlogResponse, Status> {
        let blog = req
            .blog
            .ok_or_else(|| Status::invalid_argument("request carries no blog"))?;
        let fields = BlogFields::from(blog);

        let id = self.store.insert(fields.clone()).await.map_err(store_failure)?;
        tracing::info!(%id, "blog created");

        Ok(CreateBlogResponse {
            blog: Some(BlogDocument { id, fields }.into()),
        })
    }

    async fn read_blog(
        self: Arc<Self>,
        _ctx: CallContext,
        req: ReadBlogRequest,
    ) -> Result<ReadBlogResponse, Status> {
        let id = parse_id(&req.blog_id)?;
        let doc = self
            .store
            .find_one(id)
            .await
            .map_err(store_failure)?
            .ok_or_else(|| not_found(id))?;

        Ok(ReadBlogResponse {
            blog: Some(doc.into()),
        })
    }

    async fn update_blog(
        self: Arc<Self>,
        _ctx: CallContext,
        req: UpdateBlogRequest,
    ) -> Result<UpdateBlogResponse, Status> {
        let blog = req
            .blog
            .ok_or_else(|| Status::invalid_argument("request carries no blog"))?;
        let id = parse_id(&blog.id)?;

        let doc = self
            .store
            .find_one_and_update(id, blog.into())
            .await
            .map_err(store_failure)?
            .ok_or_else(|| not_found(id))?;
        tracing::info!(%id, "blog updated");

        Ok(UpdateBlogResponse {
            blog: Some(doc.into()),
        })
    }

    async fn delete_blog(
        self: Arc<Self>,
        _ctx: CallContext,
        req: DeleteBlogRequest,
    ) -> Result<DeleteBlogResponse, Status> {
        let id = parse_id(&req.blog.unwrap_or_default().id)?;

        let doc = self
            .store
            .find_one_and_delete(id)
            .await
            .map_err(store_failure)?
            .ok_or_else(|| not_found(id))?;
        tracing::info!(%id, "blog deleted");

        Ok(DeleteBlogResponse {
            blog_id: doc.id.to_string(),
        })
    }

    async fn list_blog(
        self: Arc<Self>,
        _ctx: CallContext,
        _req: ListBlogRequest,
        tx: Sender<ListBlogResponse>,
    ) -> Result<(), Status> {
        let mut docs = self.store.find();
        let mut sent = 0usize;
        while let Some(doc) = docs.next().await {
            let doc = doc.map_err(|e| Status::internal(format!("Error while decoding data: {e}")))?;
            tx.send(ListBlogResponse {
                blog: Some(doc.into()),
            })
            .await?;
            sent += 1;
        }
        tracing::debug!(sent, "blog listing finished");
        Ok(())
    }
}
