//! Procedural macros for Ferry message types.
//!
//! This crate provides:
//!
//! - `#[derive(Validated)]` - Builds a struct of validated fields from a JSON object
//!
//! # Validated Derive Macro
//!
//! ```rust,ignore
//! use ferry_codec::{BoundedString, Integer, Optional, Validated};
//!
//! #[derive(Debug, Validated)]
//! pub struct SetVolume {
//!     pub level: Integer<u8, 0, 100>,
//!     #[validated(rename = "deviceName")]
//!     pub device_name: Optional<BoundedString<1, 64>>,
//! }
//! ```

mod validated;

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

/// Derives `FromJson` and `Validated` for a struct with named fields.
///
/// Each field is read from the JSON object key of the same name and must
/// itself implement `FromJson` and `Validated`.
///
/// The generated struct:
/// - is initialized when any field is initialized
/// - is valid when every field is valid
/// - becomes initialized but invalid when the input is not a JSON object
///
/// # Attributes
///
/// - `#[validated(rename = "...")]` - Read and write the field under a different key
#[proc_macro_derive(Validated, attributes(validated))]
pub fn derive_validated(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match validated::derive_validated(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
