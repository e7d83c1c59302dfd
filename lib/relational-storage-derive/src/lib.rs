use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, parse_macro_input};

/// Convert CamelCase to snake_case
fn to_snake_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 4);

    for (i, c) in s.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.push(c.to_ascii_lowercase());
        } else {
            result.push(c);
        }
    }

    result
}

/// Normalize a type to a comparable string (spaces removed)
fn type_string(ty: &syn::Type) -> String {
    quote::quote!(#ty).to_string().replace(' ', "")
}

/// Extract the inner type of Option<T>, or None for a non-optional type
fn option_inner(ty: &syn::Type) -> Option<&syn::Type> {
    let syn::Type::Path(path) = ty else {
        return None;
    };

    let segment = path.path.segments.last()?;

    if segment.ident != "Option" {
        return None;
    }

    let syn::PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };

    match args.args.first()? {
        syn::GenericArgument::Type(inner) => Some(inner),
        _ => None,
    }
}

/// Map a Rust type to a storage column type variant name, or None
/// when the type is not a supported primitive (i.e. an entity reference).
fn primitive_column(ty: &syn::Type) -> Option<&'static str> {
    let type_str = type_string(ty);

    match type_str.as_str() {
        "String" => Some("Text"),
        "Vec<u8>" => Some("Blob"),
        "i64" | "i32" | "u32" => Some("Integer"),
        "f64" => Some("Real"),
        "bool" => Some("Boolean"),
        s if s.contains("Timestamp") => Some("Timestamp"),
        _ => None,
    }
}

/// Collect `#[unique(a, b, ...)]` attribute groups from a struct definition
fn parse_unique_attrs(input: &DeriveInput) -> Vec<Vec<String>> {
    let mut groups = Vec::new();

    for attr in &input.attrs {
        if !attr.path().is_ident("unique") {
            continue;
        }

        let mut group = Vec::new();
        let _ = attr.parse_nested_meta(|meta| {
            if let Some(ident) = meta.path.get_ident() {
                group.push(ident.to_string());
            }
            Ok(())
        });

        if !group.is_empty() {
            groups.push(group);
        }
    }

    groups
}

/// Derive macro for the `Entity` trait - maps a record struct onto a table.
///
/// The struct must declare an identity field named after the snake_case of
/// the type (`user_id: Option<i64>` for `User`). Every other field is either
/// a supported primitive (`String`, `Vec<u8>`, `i64`, `i32`, `u32`, `f64`,
/// `bool`, `Timestamp`, or `Option` of one of these) or another `Entity`
/// type, which becomes a foreign-key column named after that type's identity
/// column. `Option<OtherEntity>` declares the relationship as nullable.
///
/// Uniqueness groups are declared with struct-level attributes, one group
/// per attribute; names may refer to columns or to relationship fields
/// (resolved to their foreign-key columns at registration):
///
/// ```text
/// #[derive(Clone, Entity)]
/// #[unique(realm_id, username)]
/// pub struct User {
///     pub user_id: Option<i64>,
///     pub username: String,
///     pub password: Vec<u8>,
///     pub realm: Realm,
/// }
/// ```
///
/// The generated implementation provides the field descriptors consumed by
/// `Registry::register`, identity access, value extraction for `store`, and
/// row hydration for `get`/`get_many`/`search`.
#[proc_macro_derive(Entity, attributes(unique))]
pub fn derive_entity(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => panic!("Entity only supports structs with named fields"),
        },
        _ => panic!("Entity only supports structs"),
    };

    let entity_name = name.to_string();
    let id_field = to_snake_case(&entity_name) + "_id";

    let identity = fields
        .iter()
        .find(|f| f.ident.as_ref().is_some_and(|ident| *ident == id_field))
        .unwrap_or_else(|| panic!("Identity field `{id_field}` missing in `{entity_name}`"));

    if type_string(&identity.ty) != "Option<i64>" {
        panic!("Identity field `{id_field}` in `{entity_name}` must be `Option<i64>`");
    }

    let id_ident = identity.ident.as_ref().unwrap();

    let mut field_specs = Vec::new();
    let mut field_values = Vec::new();
    let mut row_inits = Vec::new();

    row_inits.push(quote! { #id_ident: row.column(#id_field)? });

    for field in fields.iter() {
        let field_ident = field.ident.as_ref().unwrap();

        if *field_ident == id_field {
            continue;
        }

        let field_name = field_ident.to_string();
        let nullable = option_inner(&field.ty).is_some();
        let base_ty = option_inner(&field.ty).unwrap_or(&field.ty);

        if let Some(column_type) = primitive_column(base_ty) {
            let variant = quote::format_ident!("{}", column_type);

            field_specs.push(quote! {
                relational_storage::FieldSpec::column(
                    #field_name,
                    relational_storage::ColumnType::#variant,
                    #nullable,
                )
            });
            field_values.push(quote! {
                relational_storage::FieldValue::column(
                    #field_name,
                    relational_storage::Value::from(self.#field_ident.clone()),
                )
            });
            row_inits.push(quote! { #field_ident: row.column(#field_name)? });
        } else {
            field_specs.push(quote! {
                relational_storage::FieldSpec::reference::<#base_ty>(#field_name, #nullable)
            });

            if nullable {
                field_values.push(quote! {
                    relational_storage::FieldValue::related(
                        #field_name,
                        relational_storage::RelatedRef::of_optional(self.#field_ident.as_ref()),
                    )
                });
                row_inits.push(quote! {
                    #field_ident: row.related::<#base_ty>(#field_name)?
                });
            } else {
                field_values.push(quote! {
                    relational_storage::FieldValue::related(
                        #field_name,
                        relational_storage::RelatedRef::of(&self.#field_ident),
                    )
                });
                row_inits.push(quote! {
                    #field_ident: row.related_required::<#base_ty>(#field_name)?
                });
            }
        }
    }

    let unique_groups = parse_unique_attrs(&input);
    let unique_literals: Vec<_> = unique_groups
        .iter()
        .map(|group| {
            let names = group.iter().map(String::as_str);
            quote! { &[#(#names),*] }
        })
        .collect();

    let expanded = quote! {
        impl relational_storage::Entity for #name {
            fn entity_name() -> &'static str {
                #entity_name
            }

            fn identity_column() -> &'static str {
                #id_field
            }

            fn fields() -> Vec<relational_storage::FieldSpec> {
                vec![#(#field_specs),*]
            }

            fn unique_groups() -> &'static [&'static [&'static str]] {
                &[#(#unique_literals),*]
            }

            fn identity(&self) -> Option<i64> {
                self.#id_ident
            }

            fn set_identity(&mut self, id: i64) {
                self.#id_ident = Some(id);
            }

            fn field_values(&self) -> Vec<relational_storage::FieldValue> {
                vec![#(#field_values),*]
            }

            fn from_row(
                row: &mut relational_storage::EntityRow,
            ) -> Result<Self, relational_storage::StorageError> {
                Ok(Self {
                    #(#row_inits),*
                })
            }
        }
    };

    TokenStream::from(expanded)
}

/// Derive macro for the `Association` trait - declares a many-to-many
/// membership table between two entity types.
///
/// The struct must have exactly two named fields; the field types name the
/// left and right entity types, and the struct's name becomes the
/// association table name. The struct itself is never instantiated - it is
/// a declaration consumed by `Registry::register_association`:
///
/// ```text
/// #[derive(Association)]
/// pub struct Vote {
///     pub user: User,
///     pub game: Game,
/// }
/// ```
#[proc_macro_derive(Association)]
pub fn derive_association(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = &input.ident;
    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => panic!("Association only supports structs with named fields"),
        },
        _ => panic!("Association only supports structs"),
    };

    if fields.len() != 2 {
        panic!("Association requires exactly two fields");
    }

    let association_name = name.to_string();
    let mut types = fields.iter().map(|f| &f.ty);
    let left = types.next().unwrap();
    let right = types.next().unwrap();

    let expanded = quote! {
        impl relational_storage::Association for #name {
            type Left = #left;
            type Right = #right;

            fn association_name() -> &'static str {
                #association_name
            }
        }
    };

    TokenStream::from(expanded)
}
