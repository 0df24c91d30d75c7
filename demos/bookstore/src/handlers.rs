//! Handlers translate the pipeline's uniform `{"params": ..., "body":
//! ...}` input into domain calls and back (spec §9's "uniform
//! decode/dispatch/encode contract"), the same responsibility the
//! teacher's axum handlers carry with typed extractors instead.

use std::sync::Arc;

use async_trait::async_trait;
use opkit::contracts::{Handler, RequestContext, ResponseWriter};
use opkit::error::HandlerError;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::domain::{Catalog, CatalogError};
use crate::dto::{BookDto, BookListDto, CreateBookRequest, UpdateBookRequest};

fn not_found(err: CatalogError) -> HandlerError {
    let CatalogError::NotFound { id } = err;
    HandlerError::new(404, "book not found").with_detail(format!("no book with id {id}"))
}

fn bad_request(detail: impl Into<String>) -> HandlerError {
    HandlerError::new(400, "malformed request").with_detail(detail.into())
}

fn path_id(input: &Value) -> Result<Uuid, HandlerError> {
    let raw = input["params"]["id"].as_str().unwrap_or_default();
    raw.parse().map_err(|_| bad_request(format!("\"{raw}\" is not a valid UUID")))
}

pub struct ListBooks {
    pub catalog: Arc<Catalog>,
}

#[async_trait]
impl Handler for ListBooks {
    async fn call(
        &self,
        _ctx: Arc<dyn RequestContext>,
        input: Value,
        _writer: &mut dyn ResponseWriter,
    ) -> Result<(u16, Value), HandlerError> {
        let limit = input["params"]["limit"].as_u64().unwrap_or(20) as usize;
        let offset = input["params"]["offset"].as_u64().unwrap_or(0) as usize;
        let books: Vec<BookDto> = self.catalog.list(limit, offset).into_iter().map(BookDto::from).collect();
        let body = BookListDto {
            total: books.len(),
            limit,
            offset,
            books,
        };
        Ok((200, serde_json::to_value(body).map_err(|e| bad_request(e.to_string()))?))
    }
}

pub struct GetBook {
    pub catalog: Arc<Catalog>,
}

#[async_trait]
impl Handler for GetBook {
    async fn call(
        &self,
        _ctx: Arc<dyn RequestContext>,
        input: Value,
        _writer: &mut dyn ResponseWriter,
    ) -> Result<(u16, Value), HandlerError> {
        let id = path_id(&input)?;
        let book = self.catalog.get(id).map_err(not_found)?;
        Ok((200, serde_json::to_value(BookDto::from(book)).unwrap_or(Value::Null)))
    }
}

pub struct CreateBook {
    pub catalog: Arc<Catalog>,
}

#[async_trait]
impl Handler for CreateBook {
    async fn call(
        &self,
        _ctx: Arc<dyn RequestContext>,
        input: Value,
        writer: &mut dyn ResponseWriter,
    ) -> Result<(u16, Value), HandlerError> {
        let req: CreateBookRequest = serde_json::from_value(input["body"].clone())
            .map_err(|e| bad_request(e.to_string()))?;
        let book = self.catalog.create(req.into());
        writer.set_header("location", &format!("/books/{}", book.id));
        Ok((201, serde_json::to_value(BookDto::from(book)).unwrap_or(Value::Null)))
    }
}

pub struct UpdateBook {
    pub catalog: Arc<Catalog>,
}

#[async_trait]
impl Handler for UpdateBook {
    async fn call(
        &self,
        _ctx: Arc<dyn RequestContext>,
        input: Value,
        _writer: &mut dyn ResponseWriter,
    ) -> Result<(u16, Value), HandlerError> {
        let id = path_id(&input)?;
        let patch: UpdateBookRequest = match &input["body"] {
            Value::Null => UpdateBookRequest::default(),
            body => serde_json::from_value(body.clone()).map_err(|e| bad_request(e.to_string()))?,
        };
        let book = self.catalog.update(id, patch.into()).map_err(not_found)?;
        Ok((200, serde_json::to_value(BookDto::from(book)).unwrap_or(Value::Null)))
    }
}

pub struct DeleteBook {
    pub catalog: Arc<Catalog>,
}

#[async_trait]
impl Handler for DeleteBook {
    async fn call(
        &self,
        _ctx: Arc<dyn RequestContext>,
        input: Value,
        _writer: &mut dyn ResponseWriter,
    ) -> Result<(u16, Value), HandlerError> {
        let id = path_id(&input)?;
        self.catalog.delete(id).map_err(not_found)?;
        Ok((204, json!(null)))
    }
}
