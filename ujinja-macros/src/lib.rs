mod assets;
mod value;

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

/// Embeds every file matching a glob pattern (relative to the crate root) as
/// `(name, source)` pairs for `MemoryLoader::from_assets`. Names are relative
/// to the literal directory prefix of the pattern.
#[proc_macro]
pub fn template_assets(input: TokenStream) -> TokenStream {
    assets::template_assets_impl(input)
}

/// Implements `ToValue` and `FromValue` for a struct with named fields.
///
/// Field attributes: `#[value(rename = "name")]`, `#[value(ignore)]`.
#[proc_macro_derive(ToValue, attributes(value))]
pub fn derive_to_value(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    value::derive_impl(input)
        .unwrap_or_else(|e| e.to_compile_error())
        .into()
}
