mod model;

use proc_macro::TokenStream;

// ============================================================================
// #[derive(Model)]
// ============================================================================

/// Derive macro that implements `level_model::Model` for a struct.
///
/// The struct must also derive `Serialize`, `Deserialize` and `Clone`.
///
/// # Usage
///
/// ```ignore
/// #[derive(Clone, Serialize, Deserialize, Model)]
/// #[model(collection = "user")]
/// struct User {
///     #[model(id)]
///     pub id: String,
///     #[model(index, unique)]
///     pub email: String,
///     #[model(index)]
///     pub name: String,
/// }
/// ```
///
/// Attributes:
/// - `#[model(collection = "...")]`: partition name. Defaults to the snake_case
///   struct name (`BlogPost` -> `blog_post`).
/// - `#[model(id)]`: primary key field, must deref to `str`. Defaults to `id`.
/// - `#[model(index)]` / `#[model(index, unique)]`: declare a secondary index on
///   the field. `unique` alone implies `index`.
///
/// Indexes are keyed by the field's serialized name, so `#[serde(rename)]` and
/// `#[serde(rename_all)]` are honoured and `find_by` takes that name.
#[proc_macro_derive(Model, attributes(model))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    model::derive_model(input)
}
