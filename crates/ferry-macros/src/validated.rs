//! `#[derive(Validated)]` implementation.
//!
//! # Generated items
//!
//! 1. `impl FromJson` - reads each field from its object key; `null` leaves
//!    every field uninitialized, any other non-object marks every field
//!    mismatched
//! 2. `impl Validated` - aggregates field states and writes initialized
//!    fields back into an object
//!
//! # Field-level attributes `#[validated(...)]`
//!
//! | Key | Example | Description |
//! |-----|---------|-------------|
//! | `rename` | `"deviceName"` | JSON key (default: the field name) |

use proc_macro2::TokenStream;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, Fields, Ident, LitStr, spanned::Spanned};

// ============================================================================
// Field model
// ============================================================================

struct FieldSpec {
    ident: Ident,
    key: String,
}

// ============================================================================
// Entry point
// ============================================================================

pub fn derive_validated(input: &DeriveInput) -> syn::Result<TokenStream> {
    let name = &input.ident;

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(named) => named
                .named
                .iter()
                .map(|f| {
                    let ident = f.ident.clone().ok_or_else(|| {
                        syn::Error::new(f.span(), "Validated requires named fields")
                    })?;
                    let key = parse_rename(&f.attrs)?.unwrap_or_else(|| ident.to_string());
                    Ok(FieldSpec { ident, key })
                })
                .collect::<syn::Result<Vec<_>>>()?,
            _ => {
                return Err(syn::Error::new(
                    input.span(),
                    "Validated can only be derived for structs with named fields",
                ));
            }
        },
        Data::Enum(_) => {
            return Err(syn::Error::new(
                input.span(),
                "Validated does not support enums. Use ferry_codec::Enum with EnumValue instead.",
            ));
        }
        Data::Union(_) => {
            return Err(syn::Error::new(
                input.span(),
                "Validated cannot be derived for unions",
            ));
        }
    };

    Ok(generate_impl(name, input, &fields))
}

// ============================================================================
// Attribute parsing
// ============================================================================

fn parse_rename(attrs: &[Attribute]) -> syn::Result<Option<String>> {
    let mut rename = None;
    for attr in attrs {
        if attr.path().is_ident("validated") {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("rename") {
                    rename = Some(meta.value()?.parse::<LitStr>()?.value());
                    Ok(())
                } else {
                    Err(meta.error("unsupported validated attribute, expected `rename`"))
                }
            })?;
        }
    }
    Ok(rename)
}

// ============================================================================
// Code generation
// ============================================================================

fn generate_impl(name: &Ident, input: &DeriveInput, fields: &[FieldSpec]) -> TokenStream {
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let codec = quote!(::ferry_codec);

    let idents: Vec<_> = fields.iter().map(|f| &f.ident).collect();
    let keys: Vec<_> = fields.iter().map(|f| &f.key).collect();

    quote! {
        impl #impl_generics #codec::FromJson for #name #ty_generics #where_clause {
            fn from_json(value: &#codec::__private::Value) -> Self {
                match value {
                    #codec::__private::Value::Object(object) => Self {
                        #( #idents: #codec::field(object, #keys), )*
                    },
                    #codec::__private::Value::Null => Self {
                        #( #idents: #codec::FromJson::from_json(&#codec::__private::Value::Null), )*
                    },
                    _ => <Self as #codec::FromJson>::mismatched(),
                }
            }

            fn mismatched() -> Self {
                Self {
                    #( #idents: #codec::FromJson::mismatched(), )*
                }
            }
        }

        impl #impl_generics #codec::Validated for #name #ty_generics #where_clause {
            fn is_initialized(&self) -> bool {
                false #( || #codec::Validated::is_initialized(&self.#idents) )*
            }

            fn is_valid(&self) -> bool {
                true #( && #codec::Validated::is_valid(&self.#idents) )*
            }

            fn to_json(&self) -> #codec::__private::Value {
                if !#codec::Validated::is_initialized(self) {
                    return #codec::__private::Value::Null;
                }
                let mut object = #codec::__private::Map::new();
                #(
                    let value = #codec::Validated::to_json(&self.#idents);
                    if !value.is_null() {
                        object.insert(#keys.to_owned(), value);
                    }
                )*
                #codec::__private::Value::Object(object)
            }
        }
    }
}
