mod analyze;
mod emit;
mod msgs;
mod parse;

use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, Item};

use analyze::{collect_callbacks, strip_markers};
use emit::emit_registration;
use msgs::{ERR_GENERICS, ERR_SELF_TY, ERR_TARGET, ERR_TRAIT_IMPL};
use parse::{self_ty_ident, ImplArgs};

pub fn entrypoint(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut impl_args = ImplArgs::default();
    let parser = syn::meta::parser(|meta| impl_args.parse(meta));
    parse_macro_input!(args with parser);
    let item_any = parse_macro_input!(input as Item);
    let mut item = match item_any {
        Item::Impl(item) => item,
        other => return syn::Error::new_spanned(other, ERR_TARGET).to_compile_error().into(),
    };
    if let Some((_, path, _)) = &item.trait_ {
        return syn::Error::new_spanned(path, ERR_TRAIT_IMPL).to_compile_error().into();
    }
    if !item.generics.params.is_empty() {
        return syn::Error::new_spanned(&item.generics, ERR_GENERICS).to_compile_error().into();
    }
    let self_ty = (*item.self_ty).clone();
    let Some(ident) = self_ty_ident(&self_ty) else {
        return syn::Error::new_spanned(&self_ty, ERR_SELF_TY).to_compile_error().into();
    };
    let name = impl_args.name.map(|l| l.value()).unwrap_or_else(|| ident.to_string());

    let (callbacks, errors) = collect_callbacks(&item);
    strip_markers(&mut item);
    if !errors.is_empty() {
        let errs = errors.into_iter().map(|e| e.to_compile_error());
        return quote! { #item #(#errs)* }.into();
    }
    let registration = emit_registration(&self_ty, &name, &callbacks);
    quote! {
        #item
        #registration
    }
    .into()
}
