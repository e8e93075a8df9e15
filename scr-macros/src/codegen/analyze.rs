use std::collections::HashSet;

use super::msgs::{
    ERR_ASYNC, ERR_BINDER_SIG, ERR_DEACTIVATE_SIG, ERR_DUP_CALLBACK, ERR_LIFECYCLE_SIG,
    ERR_METHOD_GENERICS, ERR_MULTI_ATTR, ERR_RECEIVER, ERR_RETURN,
};
use super::parse::{
    callback_kind, callback_name, is_bound_type, is_ctx_type, is_reason_type, CallbackKind,
};
use syn::{FnArg, ImplItem, ImplItemFn, ItemImpl};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RetCase {
    Unit,
    Result,
}

pub fn analyze_return(sig: &syn::Signature) -> Option<RetCase> {
    match &sig.output {
        syn::ReturnType::Default => Some(RetCase::Unit),
        syn::ReturnType::Type(_, ty) => match &**ty {
            syn::Type::Tuple(t) if t.elems.is_empty() => Some(RetCase::Unit),
            syn::Type::Path(tp) => {
                let last = tp.path.segments.last()?;
                (last.ident == "Result").then_some(RetCase::Result)
            }
            _ => None,
        },
    }
}

/// 方法参数在闭包中的来源
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ArgSource {
    Ctx,
    Reason,
    Bound,
}

pub struct CallbackMethod {
    pub kind: CallbackKind,
    pub name: String,
    pub method: syn::Ident,
    pub args: Vec<ArgSource>,
    pub ret: RetCase,
}

fn check_receiver(f: &ImplItemFn) -> syn::Result<()> {
    match f.sig.inputs.first() {
        Some(FnArg::Receiver(r)) if r.reference.is_some() && r.mutability.is_none() => Ok(()),
        Some(other) => Err(syn::Error::new_spanned(other, ERR_RECEIVER)),
        None => Err(syn::Error::new_spanned(&f.sig, ERR_RECEIVER)),
    }
}

fn classify_args(kind: CallbackKind, f: &ImplItemFn) -> syn::Result<Vec<ArgSource>> {
    let mut out = Vec::new();
    for arg in f.sig.inputs.iter().skip(1) {
        let FnArg::Typed(pt) = arg else { continue };
        let ty = &*pt.ty;
        let source = if is_ctx_type(ty) {
            ArgSource::Ctx
        } else if is_reason_type(ty) {
            ArgSource::Reason
        } else if is_bound_type(ty) {
            ArgSource::Bound
        } else {
            return Err(syn::Error::new_spanned(pt, sig_error(kind)));
        };
        if out.contains(&source) {
            return Err(syn::Error::new_spanned(pt, sig_error(kind)));
        }
        out.push(source);
    }
    let ok = match kind {
        CallbackKind::Activate | CallbackKind::Modified => out.iter().all(|a| *a == ArgSource::Ctx),
        CallbackKind::Deactivate => out.iter().all(|a| matches!(a, ArgSource::Ctx | ArgSource::Reason)),
        CallbackKind::Bind | CallbackKind::Unbind | CallbackKind::Updated => out == [ArgSource::Bound],
    };
    if ok {
        Ok(out)
    } else {
        Err(syn::Error::new_spanned(&f.sig.inputs, sig_error(kind)))
    }
}

fn sig_error(kind: CallbackKind) -> &'static str {
    match kind {
        CallbackKind::Activate | CallbackKind::Modified => ERR_LIFECYCLE_SIG,
        CallbackKind::Deactivate => ERR_DEACTIVATE_SIG,
        CallbackKind::Bind | CallbackKind::Unbind | CallbackKind::Updated => ERR_BINDER_SIG,
    }
}

fn analyze_method(kind: CallbackKind, attr: &syn::Attribute, f: &ImplItemFn) -> syn::Result<CallbackMethod> {
    if let Some(tok) = &f.sig.asyncness {
        return Err(syn::Error::new_spanned(tok, ERR_ASYNC));
    }
    if !f.sig.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(&f.sig.generics, ERR_METHOD_GENERICS));
    }
    check_receiver(f)?;
    let args = classify_args(kind, f)?;
    let ret = analyze_return(&f.sig).ok_or_else(|| syn::Error::new_spanned(&f.sig.output, ERR_RETURN))?;
    let name = callback_name(attr)?.unwrap_or_else(|| f.sig.ident.to_string());
    Ok(CallbackMethod {
        kind,
        name,
        method: f.sig.ident.clone(),
        args,
        ret,
    })
}

/// 收集所有带回调标记的方法；错误逐条累积，便于一次性报告
pub fn collect_callbacks(item: &ItemImpl) -> (Vec<CallbackMethod>, Vec<syn::Error>) {
    let mut callbacks = Vec::new();
    let mut errors = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for it in &item.items {
        let ImplItem::Fn(f) = it else { continue };
        let marked: Vec<(CallbackKind, &syn::Attribute)> = f
            .attrs
            .iter()
            .filter_map(|a| callback_kind(a).map(|k| (k, a)))
            .collect();
        let Some(&(kind, attr)) = marked.first() else { continue };
        if marked.len() > 1 {
            errors.push(syn::Error::new_spanned(marked[1].1, ERR_MULTI_ATTR));
            continue;
        }
        match analyze_method(kind, attr, f) {
            Ok(cb) => {
                if !seen.insert(cb.name.clone()) {
                    errors.push(syn::Error::new_spanned(&f.sig.ident, ERR_DUP_CALLBACK));
                    continue;
                }
                callbacks.push(cb);
            }
            Err(e) => errors.push(e),
        }
    }
    (callbacks, errors)
}

/// 去掉方法上的回调标记，保留其余属性
pub fn strip_markers(item: &mut ItemImpl) {
    for it in item.items.iter_mut() {
        if let ImplItem::Fn(f) = it {
            f.attrs.retain(|a| callback_kind(a).is_none());
        }
    }
}
