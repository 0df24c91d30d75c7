use opkit_macros::Schema;
use serde::{Deserialize, Serialize};

use crate::domain::{Book, BookPatch, NewBook};

/// Wire representation of a catalog entry. `id` is rendered as a plain
/// UUID string rather than a `uuid::Uuid` field: the schema compiler
/// only derives shapes for types that implement `ToSchema`, and this
/// crate isn't the place to add a foreign impl for a foreign type.
#[derive(Debug, Clone, Serialize, Deserialize, Schema)]
pub struct BookDto {
    #[schema(format = "uuid")]
    pub id: String,
    #[schema(min_length = 1, max_length = 200)]
    pub title: String,
    pub author: String,
    #[schema(min = 0.0)]
    pub year: i32,
    pub in_stock: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Schema)]
pub struct BookListDto {
    pub books: Vec<BookDto>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

#[derive(Debug, Clone, Deserialize, Schema)]
pub struct CreateBookRequest {
    #[schema(min_length = 1, max_length = 200)]
    pub title: String,
    #[schema(min_length = 1)]
    pub author: String,
    #[schema(min = 0.0)]
    pub year: i32,
    #[schema(default = "false")]
    pub in_stock: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Schema)]
pub struct UpdateBookRequest {
    #[schema(min_length = 1, max_length = 200)]
    pub title: Option<String>,
    #[schema(min_length = 1)]
    pub author: Option<String>,
    #[schema(min = 0.0)]
    pub year: Option<i32>,
    pub in_stock: Option<bool>,
}

impl From<Book> for BookDto {
    fn from(book: Book) -> Self {
        Self {
            id: book.id.to_string(),
            title: book.title,
            author: book.author,
            year: book.year,
            in_stock: book.in_stock,
        }
    }
}

impl From<CreateBookRequest> for NewBook {
    fn from(req: CreateBookRequest) -> Self {
        Self {
            title: req.title,
            author: req.author,
            year: req.year,
            in_stock: req.in_stock.unwrap_or(false),
        }
    }
}

impl From<UpdateBookRequest> for BookPatch {
    fn from(req: UpdateBookRequest) -> Self {
        Self {
            title: req.title,
            author: req.author,
            year: req.year,
            in_stock: req.in_stock,
        }
    }
}
