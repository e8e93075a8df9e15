use super::msgs::{ERR_CALLBACK_ARG, ERR_EMPTY_NAME, ERR_UNKNOWN_ARG};
use syn::{meta::ParseNestedMeta, Attribute, LitStr};

// 低层解析与判别辅助

#[derive(Default)]
pub struct ImplArgs {
    pub name: Option<LitStr>,
}

impl ImplArgs {
    pub fn parse(&mut self, meta: ParseNestedMeta) -> syn::Result<()> {
        if meta.path.is_ident("name") {
            let lit: LitStr = meta.value()?.parse()?;
            if lit.value().is_empty() {
                return Err(syn::Error::new_spanned(&lit, ERR_EMPTY_NAME));
            }
            self.name = Some(lit);
            Ok(())
        } else {
            Err(meta.error(ERR_UNKNOWN_ARG))
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CallbackKind {
    Activate,
    Deactivate,
    Modified,
    Bind,
    Unbind,
    Updated,
}

impl CallbackKind {
    pub fn builder_method(&self) -> &'static str {
        match self {
            CallbackKind::Activate => "activate",
            CallbackKind::Deactivate => "deactivate",
            CallbackKind::Modified => "modified",
            CallbackKind::Bind => "bind",
            CallbackKind::Unbind => "unbind",
            CallbackKind::Updated => "updated",
        }
    }
}

/// 按路径最后一段识别回调标记，兼容 `#[bind]` 与 `#[mmg_scr::bind]`
pub fn callback_kind(a: &Attribute) -> Option<CallbackKind> {
    let last = a.path().segments.last()?.ident.to_string();
    match last.as_str() {
        "activate" => Some(CallbackKind::Activate),
        "deactivate" => Some(CallbackKind::Deactivate),
        "modified" => Some(CallbackKind::Modified),
        "bind" => Some(CallbackKind::Bind),
        "unbind" => Some(CallbackKind::Unbind),
        "updated" => Some(CallbackKind::Updated),
        _ => None,
    }
}

/// `#[bind]` -> None；`#[bind(name = "setLog")]` -> Some("setLog")
pub fn callback_name(a: &Attribute) -> syn::Result<Option<String>> {
    match &a.meta {
        syn::Meta::Path(_) => Ok(None),
        syn::Meta::List(list) if list.tokens.is_empty() => Ok(None),
        syn::Meta::List(_) => {
            let mut name = None;
            a.parse_nested_meta(|meta| {
                if meta.path.is_ident("name") {
                    let lit: LitStr = meta.value()?.parse()?;
                    if lit.value().is_empty() {
                        return Err(syn::Error::new_spanned(&lit, ERR_EMPTY_NAME));
                    }
                    name = Some(lit.value());
                    Ok(())
                } else {
                    Err(meta.error(ERR_CALLBACK_ARG))
                }
            })?;
            Ok(name)
        }
        syn::Meta::NameValue(nv) => Err(syn::Error::new_spanned(nv, ERR_CALLBACK_ARG)),
    }
}

fn ref_last_ident_is(ty: &syn::Type, ident: &str) -> bool {
    if let syn::Type::Reference(r) = ty {
        if r.mutability.is_some() {
            return false;
        }
        if let syn::Type::Path(tp) = &*r.elem {
            return tp.path.segments.last().is_some_and(|s| s.ident == ident);
        }
    }
    false
}

#[inline]
pub fn is_ctx_type(ty: &syn::Type) -> bool {
    ref_last_ident_is(ty, "ComponentContext")
}

#[inline]
pub fn is_bound_type(ty: &syn::Type) -> bool {
    ref_last_ident_is(ty, "BoundService")
}

// 停用原因按值传递
#[inline]
pub fn is_reason_type(ty: &syn::Type) -> bool {
    if let syn::Type::Path(tp) = ty {
        return tp
            .path
            .segments
            .last()
            .is_some_and(|s| s.ident == "DeactivationReason");
    }
    false
}

/// 类型路径最后一段（默认实现名）
pub fn self_ty_ident(ty: &syn::Type) -> Option<syn::Ident> {
    if let syn::Type::Path(tp) = ty {
        if tp.qself.is_none() {
            return tp.path.segments.last().map(|s| s.ident.clone());
        }
    }
    None
}
