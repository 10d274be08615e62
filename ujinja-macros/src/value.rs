use proc_macro2::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, LitStr};

pub fn derive_impl(input: DeriveInput) -> syn::Result<TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "ToValue only supports structs with named fields",
                ));
            }
        },
        _ => return Err(syn::Error::new_spanned(name, "ToValue only supports structs")),
    };

    let mut inserts = Vec::new();
    let mut reads = Vec::new();
    for field in fields {
        let Some(ident) = field.ident.as_ref() else {
            continue;
        };
        let (key, ignore) = parse_field_attrs(field)?;
        if ignore {
            reads.push(quote! { #ident: ::core::default::Default::default(), });
            continue;
        }
        inserts.push(quote! {
            map.insert(#key.to_string(), ::ujinja::value::ToValue::to_value(&self.#ident));
        });
        reads.push(quote! {
            #ident: ::ujinja::value::FromValue::from_value(
                map.get(#key).cloned().unwrap_or(::ujinja::value::Value::NONE),
            )?,
        });
    }

    Ok(quote! {
        impl #impl_generics ::ujinja::value::ToValue for #name #ty_generics #where_clause {
            fn to_value(&self) -> ::ujinja::value::Value {
                let mut map = ::ujinja::value::Map::new();
                #(#inserts)*
                ::ujinja::value::Value::from_map(map)
            }
        }

        impl #impl_generics ::ujinja::value::FromValue for #name #ty_generics #where_clause {
            fn from_value(
                v: ::ujinja::value::Value,
            ) -> ::core::result::Result<Self, ::ujinja::error::Error> {
                let Some(map) = v.as_map() else {
                    return Err(::ujinja::error::Error::TypeMismatch(format!(
                        "Expected mapping for {}, got {:?}",
                        stringify!(#name),
                        v
                    )));
                };
                Ok(Self { #(#reads)* })
            }
        }
    })
}

fn parse_field_attrs(field: &syn::Field) -> syn::Result<(String, bool)> {
    let mut name = field
        .ident
        .as_ref()
        .map(|i| i.to_string().trim_start_matches("r#").to_string())
        .unwrap_or_default();
    let mut ignore = false;

    for attr in &field.attrs {
        if !attr.path().is_ident("value") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("ignore") {
                ignore = true;
                Ok(())
            } else if meta.path.is_ident("rename") {
                let s: LitStr = meta.value()?.parse()?;
                name = s.value();
                Ok(())
            } else {
                Err(meta.error("expected `rename = \"...\"` or `ignore`"))
            }
        })?;
    }
    Ok((name, ignore))
}
