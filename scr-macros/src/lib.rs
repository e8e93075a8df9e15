use proc_macro::TokenStream;

mod codegen;

/// 在 `impl` 块上注册实现类型：
///
/// ```ignore
/// #[derive(Default)]
/// struct Greeter { /* ... */ }
///
/// #[mmg_scr::implementation(name = "demo.Greeter")]
/// impl Greeter {
///     #[mmg_scr::activate]
///     fn activate(&self, ctx: &ComponentContext) -> anyhow::Result<()> { Ok(()) }
///
///     #[mmg_scr::bind(name = "setLog")]
///     fn set_log(&self, svc: &BoundService) {}
/// }
/// ```
///
/// - 实例由 `Default` 构造
/// - `name` 缺省为类型名
/// - 每个标记方法以方法名（或 `name = "..."`）登记为回调
/// - 方法接收者必须是 `&self`；状态请使用内部可变性
/// - 返回值为 `()` 或 `Result<_, E>`（`E: Into<anyhow::Error>`）
#[proc_macro_attribute]
pub fn implementation(args: TokenStream, input: TokenStream) -> TokenStream {
    codegen::entrypoint(args, input)
}

/// 激活回调；参数为空或 `&ComponentContext`
#[proc_macro_attribute]
pub fn activate(_args: TokenStream, input: TokenStream) -> TokenStream {
    input
}

/// 停用回调；参数可取 `&ComponentContext` 与 `DeactivationReason`
#[proc_macro_attribute]
pub fn deactivate(_args: TokenStream, input: TokenStream) -> TokenStream {
    input
}

/// 配置更新回调；参数同 activate
#[proc_macro_attribute]
pub fn modified(_args: TokenStream, input: TokenStream) -> TokenStream {
    input
}

#[proc_macro_attribute]
pub fn bind(_args: TokenStream, input: TokenStream) -> TokenStream {
    input
}

#[proc_macro_attribute]
pub fn unbind(_args: TokenStream, input: TokenStream) -> TokenStream {
    input
}

/// 已绑定服务的属性变化
#[proc_macro_attribute]
pub fn updated(_args: TokenStream, input: TokenStream) -> TokenStream {
    input
}
