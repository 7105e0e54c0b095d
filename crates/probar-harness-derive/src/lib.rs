//! Probar Harness Derive Macros
//!
//! `#[derive(ComponentHarness)]` removes the boilerplate every harness
//! otherwise repeats: the host selector constant, the constructor, and the
//! locator factory accessor.
//!
//! # Example
//!
//! ```ignore
//! use probar_harness::prelude::*;
//!
//! #[derive(Debug, ComponentHarness)]
//! #[harness(host = "app-menu", name = "MenuHarness")]
//! struct Menu {
//!     locator_factory: Rc<dyn LocatorFactory>,
//!     // Any other field is initialised with `Default::default()`
//!     opened: std::cell::Cell<bool>,
//! }
//! ```
//!
//! # Attributes
//!
//! - `#[harness(host = "...")]` - CSS selector of the host element (required)
//! - `#[harness(name = "...")]` - name used in query descriptions (defaults to
//!   the type name)

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{parse_macro_input, Attribute, Data, DeriveInput, Fields, Ident, LitStr};

const FACTORY_FIELD: &str = "locator_factory";

/// Derive `probar_harness::ComponentHarness`.
///
/// The struct must have named fields, one of which is
/// `locator_factory: Rc<dyn LocatorFactory>`.
#[proc_macro_derive(ComponentHarness, attributes(harness))]
pub fn derive_component_harness(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_component_harness(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

// ============================================================================
// Expansion
// ============================================================================

fn expand_component_harness(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let attrs = parse_harness_attributes(&input.attrs)?;
    let host = attrs.host.ok_or_else(|| {
        syn::Error::new(
            Span::call_site(),
            "missing host selector: add #[harness(host = \"...\")]",
        )
    })?;
    if host.value().trim().is_empty() {
        return Err(syn::Error::new(host.span(), "host selector must not be empty"));
    }

    let other_fields = other_field_names(input)?;
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let harness_name = attrs.name.map(|custom| {
        quote! {
            fn harness_name() -> &'static str {
                #custom
            }
        }
    });

    Ok(quote! {
        impl #impl_generics ::probar_harness::ComponentHarness for #name #ty_generics #where_clause {
            const HOST_SELECTOR: &'static str = #host;

            fn new(
                locator_factory: ::std::rc::Rc<dyn ::probar_harness::LocatorFactory>,
            ) -> Self {
                Self {
                    locator_factory,
                    #( #other_fields: ::core::default::Default::default(), )*
                }
            }

            fn locator_factory(&self) -> &::std::rc::Rc<dyn ::probar_harness::LocatorFactory> {
                &self.locator_factory
            }

            #harness_name
        }
    })
}

// ============================================================================
// Helper Functions
// ============================================================================

#[derive(Debug, Default)]
struct HarnessAttrs {
    host: Option<LitStr>,
    name: Option<LitStr>,
}

/// Collect every `#[harness(...)]` key, rejecting unknown or repeated keys.
fn parse_harness_attributes(attrs: &[Attribute]) -> syn::Result<HarnessAttrs> {
    let mut parsed = HarnessAttrs::default();
    for attr in attrs.iter().filter(|attr| attr.path().is_ident("harness")) {
        attr.parse_nested_meta(|meta| {
            let slot = if meta.path.is_ident("host") {
                &mut parsed.host
            } else if meta.path.is_ident("name") {
                &mut parsed.name
            } else {
                return Err(meta.error("unsupported harness attribute, expected `host` or `name`"));
            };
            if slot.is_some() {
                return Err(meta.error("duplicate harness attribute"));
            }
            *slot = Some(meta.value()?.parse::<LitStr>()?);
            Ok(())
        })?;
    }
    Ok(parsed)
}

/// Names of every field except the locator factory.
fn other_field_names(input: &DeriveInput) -> syn::Result<Vec<Ident>> {
    let Data::Struct(data) = &input.data else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "ComponentHarness can only be derived for structs",
        ));
    };
    let Fields::Named(fields) = &data.fields else {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "ComponentHarness requires named fields",
        ));
    };

    let mut has_factory = false;
    let mut others = Vec::new();
    for ident in fields.named.iter().filter_map(|field| field.ident.clone()) {
        if ident == FACTORY_FIELD {
            has_factory = true;
        } else {
            others.push(ident);
        }
    }
    if !has_factory {
        return Err(syn::Error::new_spanned(
            &input.ident,
            "ComponentHarness requires a `locator_factory: Rc<dyn LocatorFactory>` field",
        ));
    }
    Ok(others)
}
