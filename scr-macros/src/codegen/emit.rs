use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};

use super::analyze::{ArgSource, CallbackMethod, RetCase};
use super::parse::CallbackKind;

fn wrap_call(cb: &CallbackMethod) -> TokenStream2 {
    let method = &cb.method;
    let args = cb.args.iter().map(|a| match a {
        ArgSource::Ctx => quote! { _ctx },
        ArgSource::Reason => quote! { _reason },
        ArgSource::Bound => quote! { _svc },
    });
    let call = quote! { this.#method(#(#args),*) };
    match cb.ret {
        RetCase::Unit => quote! {{
            #call;
            ::core::result::Result::Ok(())
        }},
        RetCase::Result => quote! {
            #call.map(|_| ()).map_err(::core::convert::Into::into)
        },
    }
}

pub fn emit_slot(cb: &CallbackMethod, self_ty: &syn::Type) -> TokenStream2 {
    let builder = format_ident!("{}", cb.kind.builder_method());
    let name = &cb.name;
    let body = wrap_call(cb);
    match cb.kind {
        CallbackKind::Activate | CallbackKind::Modified => quote! {
            .#builder(#name, |this: &#self_ty, _ctx: &mmg_scr::context::ComponentContext| #body)
        },
        CallbackKind::Deactivate => quote! {
            .#builder(
                #name,
                |this: &#self_ty,
                 _ctx: &mmg_scr::context::ComponentContext,
                 _reason: mmg_scr::configuration::DeactivationReason| #body,
            )
        },
        CallbackKind::Bind | CallbackKind::Unbind | CallbackKind::Updated => quote! {
            .#builder(#name, |this: &#self_ty, _svc: &mmg_scr::context::BoundService| #body)
        },
    }
}

/// 生成 inventory 注册：实例经 Default 构造，回调按名登记
pub fn emit_registration(self_ty: &syn::Type, name: &str, callbacks: &[CallbackMethod]) -> TokenStream2 {
    let slots = callbacks.iter().map(|cb| emit_slot(cb, self_ty));
    quote! {
        #[doc(hidden)]
        const _: () = {
            fn __mmg_scr_build() -> mmg_scr::implementation::ImplementationType {
                mmg_scr::implementation::ImplementationType::builder::<#self_ty>(
                    #name,
                    |_ctx: &mmg_scr::context::ComponentContext| {
                        ::core::result::Result::Ok(<#self_ty as ::core::default::Default>::default())
                    },
                )
                #(#slots)*
                .build()
            }
            mmg_scr::__inventory::submit! {
                mmg_scr::implementation::RegisteredImplementation { build: __mmg_scr_build }
            }
        };
    }
}
