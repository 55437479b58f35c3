//! Augment the development of the simulator with procedural macros.

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{parse_macro_input, AttributeArgs, Ident, ItemFn, Lit, LitStr, Meta, NestedMeta};

/// Level used when none is provided.
const DEFAULT_LEVEL: &str = "DEBUG";

/// Levels accepted by `tracing::Level`.
const LEVELS: [&str; 5] = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];

/// Run a test with a `tracing` subscriber that writes to the test harness output.
///
/// The level defaults to `DEBUG` and may be overridden either positionally
/// (`#[test_traced("INFO")]`) or by name (`#[test_traced(level = "INFO")]`).
///
/// The subscriber is only installed for the duration of the test, so tests running
/// in parallel do not interfere with each other.
///
/// Crates using this macro must depend on `tracing` and `tracing-subscriber`.
///
/// # Example
///
/// ```rust,ignore
/// use rdtsim_macros::test_traced;
///
/// #[test_traced("INFO")]
/// fn test_simulation() {
///     tracing::info!("visible");
///     tracing::debug!("hidden");
/// }
/// ```
#[proc_macro_attribute]
pub fn test_traced(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = parse_macro_input!(attr as AttributeArgs);
    let input = parse_macro_input!(item as ItemFn);

    let level = match parse_level(&args) {
        Ok(level) => level,
        Err(err) => return err.to_compile_error().into(),
    };

    let attrs = &input.attrs;
    let vis = &input.vis;
    let sig = &input.sig;
    let block = &input.block;
    let expanded = quote! {
        #[test]
        #(#attrs)*
        #vis #sig {
            let subscriber = ::tracing_subscriber::fmt()
                .with_test_writer()
                .with_max_level(::tracing::Level::#level)
                .with_line_number(true)
                .finish();
            let dispatcher = ::tracing::Dispatch::new(subscriber);
            ::tracing::dispatcher::with_default(&dispatcher, || #block)
        }
    };
    TokenStream::from(expanded)
}

fn parse_level(args: &[NestedMeta]) -> Result<Ident, syn::Error> {
    let literal: &LitStr = match args {
        [] => return Ok(Ident::new(DEFAULT_LEVEL, Span::call_site())),
        [NestedMeta::Lit(Lit::Str(literal))] => literal,
        [NestedMeta::Meta(Meta::NameValue(named))] if named.path.is_ident("level") => {
            match &named.lit {
                Lit::Str(literal) => literal,
                other => return Err(syn::Error::new_spanned(other, "level must be a string")),
            }
        }
        [other, ..] => {
            return Err(syn::Error::new_spanned(
                other,
                "expected a level such as \"INFO\"",
            ))
        }
    };

    let level = literal.value().to_uppercase();
    if !LEVELS.contains(&level.as_str()) {
        return Err(syn::Error::new(
            literal.span(),
            format!("invalid level: {}", literal.value()),
        ));
    }
    Ok(Ident::new(&level, literal.span()))
}
