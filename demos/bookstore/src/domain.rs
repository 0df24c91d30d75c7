//! In-memory book catalog. No storage layer, no persistence: the demo
//! exists to exercise the request pipeline, not to model a bookstore.

use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    pub author: String,
    pub year: i32,
    pub in_stock: bool,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("book not found: {id}")]
    NotFound { id: Uuid },
}

#[derive(Clone, Debug)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub year: i32,
    pub in_stock: bool,
}

#[derive(Clone, Debug, Default)]
pub struct BookPatch {
    pub title: Option<String>,
    pub author: Option<String>,
    pub year: Option<i32>,
    pub in_stock: Option<bool>,
}

/// A `Mutex<HashMap<_>>` is enough concurrency for a demo; a real
/// storage backend is out of scope here.
#[derive(Default)]
pub struct Catalog {
    books: Mutex<HashMap<Uuid, Book>>,
}

impl Catalog {
    pub fn seeded() -> Self {
        let catalog = Self::default();
        catalog.create(NewBook {
            title: "The Pragmatic Programmer".to_string(),
            author: "David Thomas".to_string(),
            year: 1999,
            in_stock: true,
        });
        catalog.create(NewBook {
            title: "Structure and Interpretation of Computer Programs".to_string(),
            author: "Harold Abelson".to_string(),
            year: 1985,
            in_stock: false,
        });
        catalog
    }

    pub fn list(&self, limit: usize, offset: usize) -> Vec<Book> {
        let books = self.books.lock().unwrap();
        let mut all: Vec<Book> = books.values().cloned().collect();
        all.sort_by(|a, b| a.title.cmp(&b.title));
        all.into_iter().skip(offset).take(limit).collect()
    }

    pub fn get(&self, id: Uuid) -> Result<Book, CatalogError> {
        self.books
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(CatalogError::NotFound { id })
    }

    pub fn create(&self, new_book: NewBook) -> Book {
        let book = Book {
            id: Uuid::new_v4(),
            title: new_book.title,
            author: new_book.author,
            year: new_book.year,
            in_stock: new_book.in_stock,
        };
        self.books.lock().unwrap().insert(book.id, book.clone());
        book
    }

    pub fn update(&self, id: Uuid, patch: BookPatch) -> Result<Book, CatalogError> {
        let mut books = self.books.lock().unwrap();
        let book = books.get_mut(&id).ok_or(CatalogError::NotFound { id })?;
        if let Some(title) = patch.title {
            book.title = title;
        }
        if let Some(author) = patch.author {
            book.author = author;
        }
        if let Some(year) = patch.year {
            book.year = year;
        }
        if let Some(in_stock) = patch.in_stock {
            book.in_stock = in_stock;
        }
        Ok(book.clone())
    }

    pub fn delete(&self, id: Uuid) -> Result<(), CatalogError> {
        let mut books = self.books.lock().unwrap();
        books.remove(&id).map(|_| ()).ok_or(CatalogError::NotFound { id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_get_round_trips() {
        let catalog = Catalog::default();
        let book = catalog.create(NewBook {
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
            year: 1965,
            in_stock: true,
        });
        let fetched = catalog.get(book.id).unwrap();
        assert_eq!(fetched.title, "Dune");
    }

    #[test]
    fn get_missing_returns_not_found() {
        let catalog = Catalog::default();
        let err = catalog.get(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, CatalogError::NotFound { .. }));
    }

    #[test]
    fn list_respects_limit_and_offset() {
        let catalog = Catalog::seeded();
        let page = catalog.list(1, 1);
        assert_eq!(page.len(), 1);
    }

    #[test]
    fn update_patches_only_given_fields() {
        let catalog = Catalog::seeded();
        let id = catalog.list(1, 0)[0].id;
        let before = catalog.get(id).unwrap();
        let after = catalog
            .update(id, BookPatch { in_stock: Some(false), ..Default::default() })
            .unwrap();
        assert_eq!(after.title, before.title);
        assert!(!after.in_stock);
    }

    #[test]
    fn delete_removes_book() {
        let catalog = Catalog::seeded();
        let id = catalog.list(1, 0)[0].id;
        catalog.delete(id).unwrap();
        assert!(matches!(catalog.get(id), Err(CatalogError::NotFound { .. })));
    }
}
