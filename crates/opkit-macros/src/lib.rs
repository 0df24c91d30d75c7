//! `#[derive(Schema)]`: reads `#[schema(...)]` container and field
//! attributes and emits a `ToSchema` implementation, one attribute per
//! concern via `darling::FromField`.

use darling::{FromDeriveInput, FromField};
use heck::{ToKebabCase, ToLowerCamelCase, ToShoutySnakeCase, ToSnakeCase, ToUpperCamelCase};
use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{parse_macro_input, Data, DeriveInput, Fields};

#[derive(Debug, Default, FromDeriveInput)]
#[darling(attributes(schema), default)]
struct ContainerArgs {
    title: Option<String>,
    description: Option<String>,
    rename_all: Option<String>,
    /// Path to a `fn(opkit_schema::Schema) -> opkit_schema::Schema` run
    /// after derivation (the "transform schema" capability; distinct
    /// from hand-implementing `ToSchema` to override derivation entirely).
    transform: Option<String>,
}

#[derive(Debug, Default, FromField)]
#[darling(attributes(schema), default)]
struct FieldArgs {
    rename: Option<String>,
    skip: bool,
    required: Option<bool>,
    nullable: Option<bool>,
    description: Option<String>,
    default: Option<String>,
    example: Option<String>,
    enum_values: Option<String>,
    format: Option<String>,
    min: Option<f64>,
    max: Option<f64>,
    exclusive_min: Option<f64>,
    exclusive_max: Option<f64>,
    multiple_of: Option<f64>,
    min_length: Option<usize>,
    max_length: Option<usize>,
    pattern: Option<String>,
    pattern_description: Option<String>,
    min_items: Option<usize>,
    max_items: Option<usize>,
    unique: Option<bool>,
    read_only: Option<bool>,
    write_only: Option<bool>,
    deprecated: Option<bool>,
    hidden: Option<bool>,
    content_encoding: Option<String>,
    time_format: Option<String>,
    /// Comma-separated list of sibling field names that become required
    /// whenever this field is present (`dependentRequired`).
    depends_on: Option<String>,
}

fn apply_case(rename_all: &Option<String>, name: &str) -> String {
    match rename_all.as_deref() {
        Some("camelCase") => name.to_lower_camel_case(),
        Some("PascalCase") => name.to_upper_camel_case(),
        Some("snake_case") => name.to_snake_case(),
        Some("SCREAMING_SNAKE_CASE") => name.to_shouty_snake_case(),
        Some("kebab-case") => name.to_kebab_case(),
        _ => name.to_string(),
    }
}

fn is_option_type(ty: &syn::Type) -> bool {
    if let syn::Type::Path(p) = ty {
        if let Some(seg) = p.path.segments.last() {
            return seg.ident == "Option";
        }
    }
    false
}

fn opt_str(s: &Option<String>) -> proc_macro2::TokenStream {
    match s {
        Some(v) => quote! { Some(#v.to_string()) },
        None => quote! { None },
    }
}

fn opt_f64(v: Option<f64>) -> proc_macro2::TokenStream {
    match v {
        Some(v) => quote! { Some(#v) },
        None => quote! { None },
    }
}

fn opt_usize(v: Option<usize>) -> proc_macro2::TokenStream {
    match v {
        Some(v) => quote! { Some(#v) },
        None => quote! { None },
    }
}

fn opt_bool(v: Option<bool>) -> proc_macro2::TokenStream {
    match v {
        Some(v) => quote! { Some(#v) },
        None => quote! { None },
    }
}

#[proc_macro_derive(Schema, attributes(schema))]
pub fn derive_schema(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(input) {
        Ok(ts) => ts.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

fn expand(input: DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let container = ContainerArgs::from_derive_input(&input)
        .map_err(|e| syn::Error::new(proc_macro2::Span::call_site(), e.to_string()))?;
    let ident = &input.ident;

    match &input.data {
        Data::Struct(data) => expand_struct(ident, &container, &data.fields),
        Data::Enum(data) => expand_enum(ident, &container, data),
        Data::Union(_) => Err(syn::Error::new_spanned(
            &input,
            "#[derive(Schema)] does not support unions",
        )),
    }
}

fn expand_struct(
    ident: &syn::Ident,
    container: &ContainerArgs,
    fields: &Fields,
) -> syn::Result<proc_macro2::TokenStream> {
    let title = opt_str(&container.title.clone().or_else(|| Some(ident.to_string())));
    let desc = opt_str(&container.description);

    let named = match fields {
        Fields::Named(n) => &n.named,
        Fields::Unit => {
            return Ok(build_impl(
                ident,
                quote! {
                    opkit_schema::compile_struct(Vec::new(), #title, #desc, ::indexmap::IndexMap::new())
                },
                &container.transform,
            ));
        }
        Fields::Unnamed(_) => {
            return Err(syn::Error::new_spanned(
                ident,
                "#[derive(Schema)] requires named fields (tuple structs are not supported)",
            ))
        }
    };

    let mut field_stmts = Vec::new();
    let mut dependent_required_stmts = Vec::new();

    for field in named {
        let args = FieldArgs::from_field(field)
            .map_err(|e| syn::Error::new_spanned(field, e.to_string()))?;
        if args.skip {
            continue;
        }
        let field_ident = field.ident.clone().expect("named field");
        let rust_name = field_ident.to_string();
        let json_name = args
            .rename
            .clone()
            .unwrap_or_else(|| apply_case(&container.rename_all, &rust_name));

        let ty = &field.ty;
        let is_option = is_option_type(ty);
        let required = args.required.unwrap_or(!is_option);
        let nullable_override = opt_bool(args.nullable);

        let format = opt_str(&args.format);
        let description = opt_str(&args.description);
        let default = match &args.default {
            Some(src) => quote! {
                Some(::serde_json::from_str::<::serde_json::Value>(#src).map_err(|e| {
                    opkit_schema::SchemaError::InvalidFieldMetadata {
                        field: #rust_name.to_string(),
                        detail: format!("invalid `default`: {e}"),
                    }
                })?)
            },
            None => quote! { None },
        };
        let example = match &args.example {
            Some(src) => quote! {
                Some(::serde_json::from_str::<::serde_json::Value>(#src).map_err(|e| {
                    opkit_schema::SchemaError::InvalidFieldMetadata {
                        field: #rust_name.to_string(),
                        detail: format!("invalid `example`: {e}"),
                    }
                })?)
            },
            None => quote! { None },
        };
        let enum_values = match &args.enum_values {
            Some(src) => quote! {
                Some(::serde_json::from_str::<Vec<::serde_json::Value>>(#src).map_err(|e| {
                    opkit_schema::SchemaError::InvalidFieldMetadata {
                        field: #rust_name.to_string(),
                        detail: format!("invalid `enum_values`: {e}"),
                    }
                })?)
            },
            None => quote! { None },
        };
        let minimum = opt_f64(args.min);
        let maximum = opt_f64(args.max);
        let exclusive_minimum = opt_f64(args.exclusive_min);
        let exclusive_maximum = opt_f64(args.exclusive_max);
        let multiple_of = opt_f64(args.multiple_of);
        let min_length = opt_usize(args.min_length);
        let max_length = opt_usize(args.max_length);
        let min_items = opt_usize(args.min_items);
        let max_items = opt_usize(args.max_items);
        let unique_items = opt_bool(args.unique);
        let read_only = opt_bool(args.read_only);
        let write_only = opt_bool(args.write_only);
        let deprecated = opt_bool(args.deprecated);
        let hidden = opt_bool(args.hidden);
        let content_encoding = opt_str(&args.content_encoding);
        let format = match &args.time_format {
            Some(tf) => {
                let mapped = match tf.as_str() {
                    "date" => "date".to_string(),
                    "time" => "time".to_string(),
                    other => other.to_string(),
                };
                quote! { Some(#mapped.to_string()) }
            }
            None => format,
        };
        let pattern = match (&args.pattern, &args.pattern_description) {
            (Some(p), desc) => {
                let desc = opt_str(desc);
                quote! { Some((#p.to_string(), #desc)) }
            }
            (None, _) => quote! { None },
        };

        let field_var = format_ident!("__field_{}", field_ident);
        field_stmts.push(quote! {
            let #field_var = <#ty as opkit_schema::ToSchema>::to_schema_or_ref(registry)?;
            let #field_var = opkit_schema::compile::apply_field_overrides(#field_var, opkit_schema::compile::FieldOverrides {
                description: #description,
                format: #format,
                default: #default,
                example: #example,
                enum_values: #enum_values,
                minimum: #minimum,
                maximum: #maximum,
                exclusive_minimum: #exclusive_minimum,
                exclusive_maximum: #exclusive_maximum,
                multiple_of: #multiple_of,
                min_length: #min_length,
                max_length: #max_length,
                pattern: #pattern,
                min_items: #min_items,
                max_items: #max_items,
                unique_items: #unique_items,
                read_only: #read_only,
                write_only: #write_only,
                deprecated: #deprecated,
                hidden: #hidden,
                content_encoding: #content_encoding,
            })?;
            let #field_var = match #nullable_override {
                Some(true) => opkit_schema::compile::make_nullable(#field_var, std::any::type_name::<#ty>())?,
                Some(false) => #field_var,
                None => #field_var,
            };
            fields.push(opkit_schema::FieldSpec {
                name: #json_name.to_string(),
                schema: #field_var,
                required: #required,
                nullable: false,
            });
        });

        if let Some(deps) = &args.depends_on {
            let dep_names: Vec<&str> = deps.split(',').map(|s| s.trim()).filter(|s| !s.is_empty()).collect();
            dependent_required_stmts.push(quote! {
                dependent_required.insert(#json_name.to_string(), vec![#(#dep_names.to_string()),*]);
            });
        }
    }

    let body = quote! {
        let mut fields: Vec<opkit_schema::FieldSpec> = Vec::new();
        let mut dependent_required: ::indexmap::IndexMap<String, Vec<String>> = ::indexmap::IndexMap::new();
        #(#field_stmts)*
        #(#dependent_required_stmts)*
        opkit_schema::compile_struct(fields, #title, #desc, dependent_required)
    };

    Ok(build_impl(ident, body, &container.transform))
}

fn build_impl(ident: &syn::Ident, body: proc_macro2::TokenStream, transform: &Option<String>) -> proc_macro2::TokenStream {
    let transform_schema_fn = match transform {
        Some(path) => {
            let path: syn::Path = syn::parse_str(path).expect("#[schema(transform = \"...\")] must be a valid path");
            quote! {
                fn transform_schema(schema: opkit_schema::Schema) -> opkit_schema::Schema {
                    #path(schema)
                }
            }
        }
        None => quote! {},
    };

    quote! {
        impl opkit_schema::ToSchema for #ident {
            const NAMED: bool = true;

            fn to_schema(registry: &mut opkit_schema::SchemaRegistry) -> Result<opkit_schema::Schema, opkit_schema::SchemaError> {
                #body
            }

            #transform_schema_fn

            fn to_schema_or_ref(registry: &mut opkit_schema::SchemaRegistry) -> Result<opkit_schema::SchemaOrRef, opkit_schema::SchemaError> {
                opkit_schema::intern_named::<Self>(registry, |registry| {
                    let schema = Self::to_schema(registry)?;
                    Ok(Self::transform_schema(schema).recompute_messages())
                })
            }
        }
    }
}

fn expand_enum(
    ident: &syn::Ident,
    container: &ContainerArgs,
    data: &syn::DataEnum,
) -> syn::Result<proc_macro2::TokenStream> {
    let title = opt_str(&container.title.clone().or_else(|| Some(ident.to_string())));
    let desc = opt_str(&container.description);

    let all_unit = data.variants.iter().all(|v| matches!(v.fields, Fields::Unit));

    if all_unit {
        let variant_names: Vec<String> = data
            .variants
            .iter()
            .map(|v| apply_case(&container.rename_all, &v.ident.to_string()))
            .collect();
        let body = quote! {
            opkit_schema::Schema {
                title: #title,
                description: #desc,
                enum_values: Some(vec![#(::serde_json::Value::String(#variant_names.to_string())),*]),
                ..opkit_schema::Schema::string()
            }
            .finish()
        };
        return Ok(build_impl(ident, body, &container.transform));
    }

    // Data-carrying enum: `oneOf` with a discriminator on an implicit
    // `kind` wrapper is unnecessary here because each variant's payload
    // is itself the named schema; discriminator mapping names each
    // variant's tag string.
    let mut mapping_stmts = Vec::new();
    let mut subschema_stmts = Vec::new();
    for variant in &data.variants {
        let variant_name = apply_case(&container.rename_all, &variant.ident.to_string());
        match &variant.fields {
            Fields::Unnamed(f) if f.unnamed.len() == 1 => {
                let ty = &f.unnamed.first().unwrap().ty;
                subschema_stmts.push(quote! {
                    subschemas.push(<#ty as opkit_schema::ToSchema>::to_schema_or_ref(registry)?);
                });
                mapping_stmts.push(quote! {
                    mapping.insert(#variant_name.to_string(), std::any::type_name::<#ty>().to_string());
                });
            }
            Fields::Unit => {
                subschema_stmts.push(quote! {
                    subschemas.push(opkit_schema::SchemaOrRef::inline(opkit_schema::Schema {
                        enum_values: Some(vec![::serde_json::Value::String(#variant_name.to_string())]),
                        ..opkit_schema::Schema::string()
                    }));
                });
            }
            _ => {
                return Err(syn::Error::new_spanned(
                    &variant.ident,
                    "#[derive(Schema)] enum variants must be unit or a single unnamed field",
                ))
            }
        }
    }

    let body = quote! {
        let mut subschemas: Vec<opkit_schema::SchemaOrRef> = Vec::new();
        let mut mapping: ::indexmap::IndexMap<String, String> = ::indexmap::IndexMap::new();
        #(#subschema_stmts)*
        #(#mapping_stmts)*
        let discriminator = if mapping.is_empty() {
            None
        } else {
            Some(opkit_schema::Discriminator { property_name: "type".to_string(), mapping })
        };
        opkit_schema::Schema {
            title: #title,
            description: #desc,
            composition: opkit_schema::Composition::OneOf,
            subschemas,
            discriminator,
            ..opkit_schema::Schema::default()
        }
        .finish()
    };

    Ok(build_impl(ident, body, &container.transform))
}
