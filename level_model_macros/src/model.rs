use proc_macro::TokenStream;
use quote::quote;
use syn::ext::IdentExt;
use syn::punctuated::Punctuated;
use syn::{Attribute, Data, DeriveInput, Expr, ExprLit, Field, Fields, Lit, LitStr, Meta, Token};

struct IndexAttr {
    field: String,
    unique: bool,
}

pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as DeriveInput);
    let name = &input.ident;

    // Extract #[model(collection = "...")] from struct-level attributes
    let collection = match extract_collection(&input) {
        Ok(collection) => collection,
        Err(err) => return err.to_compile_error().into(),
    };

    let fields = match named_fields(&input) {
        Ok(fields) => fields,
        Err(err) => return err.to_compile_error().into(),
    };

    // Extract the field marked with #[model(id)] or default to "id"
    let id_field = match extract_id_field(&input, &fields) {
        Ok(ident) => ident,
        Err(err) => return err.to_compile_error().into(),
    };

    // Indexes are looked up by the serialized field name
    let rename_all = serde_string(&input.attrs, "rename_all");
    let indexes = match extract_indexes(&fields, rename_all.as_deref()) {
        Ok(indexes) => indexes,
        Err(err) => return err.to_compile_error().into(),
    };

    let index_specs = indexes.iter().map(|index| {
        let field = &index.field;
        if index.unique {
            quote! { level_model::IndexSpec::unique(#field) }
        } else {
            quote! { level_model::IndexSpec::new(#field) }
        }
    });

    let expanded = quote! {
        impl level_model::Model for #name {
            const COLLECTION: &'static str = #collection;

            const INDEXES: &'static [level_model::IndexSpec] = &[#(#index_specs),*];

            fn id(&self) -> &str {
                &self.#id_field
            }
        }
    };

    TokenStream::from(expanded)
}

fn named_fields(input: &DeriveInput) -> syn::Result<Vec<&Field>> {
    if let Data::Struct(data_struct) = &input.data {
        if let Fields::Named(fields) = &data_struct.fields {
            return Ok(fields.named.iter().collect());
        }
    }

    Err(syn::Error::new_spanned(
        &input.ident,
        "Model derive: only structs with named fields are supported",
    ))
}

fn extract_collection(input: &DeriveInput) -> syn::Result<String> {
    for attr in &input.attrs {
        if !attr.path().is_ident("model") {
            continue;
        }

        let mut collection = None;
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("collection") {
                let value: LitStr = meta.value()?.parse()?;
                collection = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("expected `collection = \"...\"`"))
            }
        })?;

        if let Some(c) = collection {
            return Ok(c);
        }
    }

    // Default: the snake_case struct name, one partition per model name
    Ok(to_snake_case(&input.ident.to_string()))
}

fn extract_id_field(input: &DeriveInput, fields: &[&Field]) -> syn::Result<syn::Ident> {
    for field in fields {
        for attr in &field.attrs {
            if !attr.path().is_ident("model") {
                continue;
            }
            let mut is_id = false;
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("id") {
                    is_id = true;
                } else if meta.path.is_ident("index") || meta.path.is_ident("unique") {
                    // handled by extract_indexes
                } else {
                    return Err(meta.error("expected `id`, `index` or `unique`"));
                }
                Ok(())
            })?;
            if is_id {
                if let Some(ident) = &field.ident {
                    return Ok(ident.clone());
                }
            }
        }
    }

    // Default: look for a field named "id"
    for field in fields {
        if let Some(ident) = &field.ident {
            if ident == "id" {
                return Ok(ident.clone());
            }
        }
    }

    Err(syn::Error::new_spanned(
        &input.ident,
        "Model derive: no field marked with #[model(id)] and no field named `id`",
    ))
}

fn extract_indexes(fields: &[&Field], rename_all: Option<&str>) -> syn::Result<Vec<IndexAttr>> {
    let mut indexes = Vec::new();

    for field in fields {
        let Some(ident) = &field.ident else {
            continue;
        };
        for attr in &field.attrs {
            if !attr.path().is_ident("model") {
                continue;
            }
            let mut index = false;
            let mut unique = false;
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("index") {
                    index = true;
                } else if meta.path.is_ident("unique") {
                    unique = true;
                }
                Ok(())
            })?;
            if index || unique {
                let field_name = serde_string(&field.attrs, "rename").unwrap_or_else(|| {
                    let name = ident.unraw().to_string();
                    match rename_all {
                        Some(rule) => apply_rename_rule(&name, rule),
                        None => name,
                    }
                });
                indexes.push(IndexAttr {
                    field: field_name,
                    unique,
                });
            }
        }
    }

    Ok(indexes)
}

/// String value of `key` inside `#[serde(...)]`, either `key = "..."` or the
/// serialize side of `key(serialize = "...")`. Attributes that do not parse
/// are left to serde to report.
fn serde_string(attrs: &[Attribute], key: &str) -> Option<String> {
    attrs
        .iter()
        .filter(|attr| attr.path().is_ident("serde"))
        .filter_map(|attr| {
            attr.parse_args_with(Punctuated::<Meta, Token![,]>::parse_terminated)
                .ok()
        })
        .flatten()
        .find_map(|meta| match meta {
            Meta::NameValue(nv) if nv.path.is_ident(key) => lit_str(&nv.value),
            Meta::List(list) if list.path.is_ident(key) => list
                .parse_args_with(Punctuated::<Meta, Token![,]>::parse_terminated)
                .ok()?
                .into_iter()
                .find_map(|inner| match inner {
                    Meta::NameValue(nv) if nv.path.is_ident("serialize") => lit_str(&nv.value),
                    _ => None,
                }),
            _ => None,
        })
}

fn lit_str(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Lit(ExprLit {
            lit: Lit::Str(s), ..
        }) => Some(s.value()),
        _ => None,
    }
}

/// serde's `rename_all` rules, applied to a snake_case field name.
fn apply_rename_rule(field: &str, rule: &str) -> String {
    match rule {
        "lowercase" => field.to_ascii_lowercase(),
        "UPPERCASE" | "SCREAMING_SNAKE_CASE" => field.to_ascii_uppercase(),
        "kebab-case" => field.replace('_', "-"),
        "SCREAMING-KEBAB-CASE" => field.replace('_', "-").to_ascii_uppercase(),
        "PascalCase" => pascal_case(field),
        "camelCase" => {
            let pascal = pascal_case(field);
            let mut chars = pascal.chars();
            match chars.next() {
                Some(first) => first.to_lowercase().chain(chars).collect(),
                None => pascal,
            }
        }
        _ => field.to_string(),
    }
}

fn pascal_case(field: &str) -> String {
    let mut result = String::new();
    let mut capitalize = true;
    for ch in field.chars() {
        if ch == '_' {
            capitalize = true;
        } else if capitalize {
            result.extend(ch.to_uppercase());
            capitalize = false;
        } else {
            result.push(ch);
        }
    }
    result
}

fn to_snake_case(s: &str) -> String {
    let mut result = String::new();
    for (i, ch) in s.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                result.push('_');
            }
            result.extend(ch.to_lowercase());
        } else {
            result.push(ch);
        }
    }
    result
}
