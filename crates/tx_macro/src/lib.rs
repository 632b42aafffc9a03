extern crate proc_macro;

use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{parse_macro_input, spanned::Spanned as _, FnArg, ItemFn, Pat, PatType};

/// Runs an async service method inside a transaction of its `session` argument.
///
/// The original body is emitted as `<name>_inner`, which callers that already
/// hold a transaction use directly. The wrapper starts the transaction, commits
/// on `Ok` and aborts (rolling back the session journal) on `Err`.
#[proc_macro_attribute]
pub fn tx(_args: TokenStream, input: TokenStream) -> TokenStream {
    let input_fn = parse_macro_input!(input as ItemFn);
    let attrs = &input_fn.attrs;
    let vis = &input_fn.vis;
    let block = &input_fn.block;
    let sig = &input_fn.sig;
    let fn_name = &sig.ident;
    let generics = &sig.generics;
    let where_clause = &sig.generics.where_clause;
    let fn_args = &sig.inputs;
    let fn_return = &sig.output;

    let mut has_session = false;
    let mut arg_list = Vec::with_capacity(fn_args.len());
    for arg in fn_args {
        match arg {
            FnArg::Receiver(_) => arg_list.push(quote!(self)),
            FnArg::Typed(PatType { pat, .. }) => match pat.as_ref() {
                Pat::Ident(ident) => {
                    if ident.ident == "session" {
                        has_session = true;
                    }
                    let ident = &ident.ident;
                    arg_list.push(quote!(#ident));
                }
                other => {
                    return syn::Error::new(other.span(), "#[tx] arguments must be plain identifiers")
                        .to_compile_error()
                        .into();
                }
            },
        }
    }

    if !has_session {
        return syn::Error::new(sig.span(), "#[tx] requires a `session: &mut Session` argument")
            .to_compile_error()
            .into();
    }

    let inner_name = format_ident!("{}_inner", fn_name);
    let gen = quote! {
        #(#attrs)*
        #vis async fn #inner_name #generics (#fn_args) #fn_return #where_clause
        #block

        #(#attrs)*
        #vis async fn #fn_name #generics (#fn_args) #fn_return #where_clause {
            session.start_transaction().await?;
            match Self::#inner_name(#(#arg_list),*).await {
                Ok(result) => {
                    session.commit_transaction().await?;
                    Ok(result)
                }
                Err(err) => {
                    session.abort_transaction().await?;
                    Err(err)
                }
            }
        }
    };

    TokenStream::from(gen)
}
