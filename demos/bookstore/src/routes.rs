//! Wires the books CRUD surface into an `opkit::Registry`, one
//! operation built and registered per block via `OperationBuilder` and
//! the `Schema`/`SchemaOrRef` compiler.

use std::sync::Arc;

use opkit::operation::{BodyDescriptor, ParameterDescriptor, ResponseDescriptor};
use opkit::{Group, OperationBuilder, Registry};
use opkit_schema::{Schema, SchemaOrRef, SchemaRegistry, ToSchema};

use crate::domain::Catalog;
use crate::dto::{BookDto, BookListDto, CreateBookRequest, UpdateBookRequest};
use crate::handlers::{CreateBook, DeleteBook, GetBook, ListBooks, UpdateBook};

fn uuid_schema() -> SchemaOrRef {
    SchemaOrRef::inline(
        Schema {
            format: Some("uuid".to_string()),
            ..Schema::string()
        }
        .finish()
        .expect("static uuid schema is well-formed"),
    )
}

/// Registers every book operation under `group`, returning the finished
/// `Registry`. `group` may carry a prefix (e.g. `/api/v1`) and is where
/// a caller installs cross-cutting middleware/transformers.
pub fn register_routes(
    registry: &mut Registry,
    schemas: &mut SchemaRegistry,
    group: &Group,
    catalog: Arc<Catalog>,
) -> anyhow::Result<()> {
    let book_schema = BookDto::to_schema_or_ref(schemas)?;
    let book_list_schema = BookListDto::to_schema_or_ref(schemas)?;
    let create_schema = CreateBookRequest::to_schema_or_ref(schemas)?;
    let update_schema = UpdateBookRequest::to_schema_or_ref(schemas)?;
    let limit_schema = u32::to_schema_or_ref(schemas)?;
    let offset_schema = u32::to_schema_or_ref(schemas)?;

    register_one(
        registry,
        group,
        OperationBuilder::get("/books")
            .operation_id("bookstore.list_books")
            .summary("List books")
            .description("Returns a page of the catalog, ordered by title")
            .tag("books")
            .param(ParameterDescriptor::query("limit", limit_schema).default_value(serde_json::json!(20)))
            .param(ParameterDescriptor::query("offset", offset_schema).default_value(serde_json::json!(0)))
            .response(ResponseDescriptor::new(200, "A page of books").json(book_list_schema))
            .handler(Arc::new(ListBooks { catalog: catalog.clone() })),
    )?;

    register_one(
        registry,
        group,
        OperationBuilder::get("/books/{id}")
            .operation_id("bookstore.get_book")
            .summary("Get a book")
            .tag("books")
            .param(ParameterDescriptor::path("id", uuid_schema()))
            .response(ResponseDescriptor::new(200, "The book").json(book_schema.clone()))
            .response(ResponseDescriptor::new(404, "No book with that id"))
            .handler(Arc::new(GetBook { catalog: catalog.clone() })),
    )?;

    register_one(
        registry,
        group,
        OperationBuilder::post("/books")
            .operation_id("bookstore.create_book")
            .summary("Create a book")
            .tag("books")
            .body(BodyDescriptor::json(create_schema))
            .response(
                ResponseDescriptor::new(201, "Created book")
                    .json(book_schema.clone())
                    .header("location", SchemaOrRef::inline(Schema::string())),
            )
            .response(ResponseDescriptor::new(422, "Validation failed"))
            .handler(Arc::new(CreateBook { catalog: catalog.clone() })),
    )?;

    register_one(
        registry,
        group,
        OperationBuilder::put("/books/{id}")
            .operation_id("bookstore.update_book")
            .summary("Update a book")
            .tag("books")
            .param(ParameterDescriptor::path("id", uuid_schema()))
            .body(BodyDescriptor::json(update_schema).optional())
            .response(ResponseDescriptor::new(200, "Updated book").json(book_schema))
            .response(ResponseDescriptor::new(404, "No book with that id"))
            .response(ResponseDescriptor::new(422, "Validation failed"))
            .handler(Arc::new(UpdateBook { catalog: catalog.clone() })),
    )?;

    register_one(
        registry,
        group,
        OperationBuilder::delete("/books/{id}")
            .operation_id("bookstore.delete_book")
            .summary("Delete a book")
            .tag("books")
            .param(ParameterDescriptor::path("id", uuid_schema()))
            .response(ResponseDescriptor::new(204, "Book deleted"))
            .response(ResponseDescriptor::new(404, "No book with that id"))
            .handler(Arc::new(DeleteBook { catalog })),
    )?;

    Ok(())
}

/// Builds, fans the operation out through `group`, and registers every
/// resulting copy with the same handler and the group's full middleware
/// chain (spec §4.4).
fn register_one(
    registry: &mut Registry,
    group: &Group,
    builder: OperationBuilder<opkit::operation::Present, opkit::operation::Present>,
) -> anyhow::Result<()> {
    let (op, handler, op_middleware) = builder.build()?;
    let middleware = group.full_middleware_chain(&op_middleware);
    for op in group.apply(op) {
        registry.register(op, handler.clone(), middleware.clone())?;
    }
    Ok(())
}
