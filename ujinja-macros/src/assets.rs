use glob::glob;
use proc_macro::TokenStream;
use quote::quote;
use std::env;
use std::path::{Path, PathBuf};
use syn::{LitStr, parse_macro_input};

/// The directory part of a pattern before its first wildcard component.
fn literal_prefix(pattern: &str) -> PathBuf {
    let mut prefix = PathBuf::new();
    let mut components = Path::new(pattern).components().peekable();
    while let Some(component) = components.next() {
        let text = component.as_os_str().to_string_lossy();
        if text.contains(['*', '?', '[', '{']) || components.peek().is_none() {
            break;
        }
        prefix.push(component);
    }
    prefix
}

pub fn template_assets_impl(input: TokenStream) -> TokenStream {
    let pattern = parse_macro_input!(input as LitStr);
    let pattern_str = pattern.value();

    let Ok(manifest_dir) = env::var("CARGO_MANIFEST_DIR") else {
        return syn::Error::new(pattern.span(), "CARGO_MANIFEST_DIR is not set")
            .to_compile_error()
            .into();
    };
    let root = PathBuf::from(manifest_dir);
    let base = root.join(literal_prefix(&pattern_str));
    let full_pattern = root.join(&pattern_str);

    let mut files: Vec<PathBuf> = match glob(&full_pattern.to_string_lossy()) {
        Ok(paths) => paths
            .filter_map(|entry| entry.ok())
            .filter(|path| path.is_file())
            .collect(),
        Err(e) => {
            return syn::Error::new(pattern.span(), format!("Invalid glob pattern: {}", e))
                .to_compile_error()
                .into();
        }
    };
    files.sort();

    let assets = files.iter().map(|path| {
        let absolute = path.to_string_lossy().to_string();
        let name = path
            .strip_prefix(&base)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join("/");
        quote! { (#name, include_str!(#absolute)) }
    });

    quote! {
        vec![#(#assets),*]
    }
    .into()
}
