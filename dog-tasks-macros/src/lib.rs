use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{
    parse_macro_input, spanned::Spanned, Attribute, FnArg, ImplItem, ImplItemMethod, ItemImpl, Lit, LitStr, Meta,
    NestedMeta, ReturnType,
};

/// Implement `dog_tasks::TaskProvider` for an impl block.
///
/// Every method is listed in declaration order; methods carrying
/// `#[task(...)]` become task handlers:
///
/// ```ignore
/// #[task_handlers]
/// impl Images {
///     #[task(name = "resize-image", queue = "media", concurrency = 2, ttl = 30000)]
///     async fn resize(&self, job: Job) -> Result<(), HandlerError> { ... }
///
///     #[task("purge-cache")]
///     async fn purge(&self, job: Job, done: JobDone) -> Result<(), HandlerError> { ... }
/// }
/// ```
///
/// Accepted keys: `name`, `queue`, `concurrency`, `priority` (string or
/// integer), `ttl` (ms),
/// `attempts`, `backoff = bool`, `backoff(delay = ms, strategy = "fixed" |
/// "exponential")` and `backoff_fn = "path::to::fn"`.
#[proc_macro_attribute]
pub fn task_handlers(args: TokenStream, item: TokenStream) -> TokenStream {
    if !args.is_empty() {
        return syn::Error::new(proc_macro2::Span::call_site(), "#[task_handlers] takes no arguments")
            .to_compile_error()
            .into();
    }

    let mut block = parse_macro_input!(item as ItemImpl);

    if let Some((_, path, _)) = &block.trait_ {
        return syn::Error::new(path.span(), "#[task_handlers] goes on an inherent impl block")
            .to_compile_error()
            .into();
    }
    if !block.generics.params.is_empty() {
        return syn::Error::new(block.generics.span(), "#[task_handlers] does not support generic impl blocks")
            .to_compile_error()
            .into();
    }

    let self_ty = block.self_ty.clone();
    let mut entries = Vec::new();

    for item in block.items.iter_mut() {
        let ImplItem::Method(method) = item else { continue };

        let task_attrs: Vec<Attribute> = method.attrs.iter().filter(|a| a.path.is_ident("task")).cloned().collect();
        method.attrs.retain(|a| !a.path.is_ident("task"));

        let method_name = LitStr::new(&method.sig.ident.to_string(), method.sig.ident.span());

        let entry = match task_attrs.as_slice() {
            [] => quote! { ::dog_tasks::TaskMethod::plain(#method_name) },
            [attr] => match gen_task_entry(&self_ty, method, attr, &method_name) {
                Ok(tokens) => tokens,
                Err(err) => return err.to_compile_error().into(),
            },
            [_, extra, ..] => {
                return syn::Error::new(extra.span(), "a method takes at most one #[task] attribute")
                    .to_compile_error()
                    .into();
            }
        };
        entries.push(entry);
    }

    TokenStream::from(quote! {
        #block

        impl ::dog_tasks::TaskProvider for #self_ty {
            fn task_methods() -> ::std::vec::Vec<::dog_tasks::TaskMethod<Self>> {
                ::std::vec![#(#entries),*]
            }
        }
    })
}

#[derive(Default)]
struct TaskArgs {
    name: Option<LitStr>,
    queue: Option<LitStr>,
    concurrency: Option<syn::LitInt>,
    priority: Option<LitStr>,
    ttl: Option<syn::LitInt>,
    attempts: Option<syn::LitInt>,
    backoff: Option<proc_macro2::TokenStream>,
}

fn parse_task_args(attr: &Attribute) -> syn::Result<TaskArgs> {
    let mut args = TaskArgs::default();

    let list = match attr.parse_meta()? {
        Meta::List(list) => list,
        other => return Err(syn::Error::new(other.span(), "expected #[task(\"name\")] or #[task(name = ...)]")),
    };

    for nested in list.nested {
        match nested {
            NestedMeta::Lit(Lit::Str(s)) => args.name = Some(s),
            NestedMeta::Meta(Meta::NameValue(nv)) => {
                let key = nv
                    .path
                    .get_ident()
                    .map(|i| i.to_string())
                    .unwrap_or_default();
                match (key.as_str(), nv.lit) {
                    ("name", Lit::Str(s)) => args.name = Some(s),
                    ("queue", Lit::Str(s)) => args.queue = Some(s),
                    ("priority", Lit::Str(s)) => args.priority = Some(s),
                    ("priority", Lit::Int(n)) => args.priority = Some(LitStr::new(n.base10_digits(), n.span())),
                    ("concurrency", Lit::Int(n)) => args.concurrency = Some(n),
                    ("ttl", Lit::Int(n)) => args.ttl = Some(n),
                    ("attempts", Lit::Int(n)) => args.attempts = Some(n),
                    ("backoff", Lit::Bool(b)) => {
                        let value = b.value;
                        args.backoff = Some(quote! { #value });
                    }
                    ("backoff_fn", Lit::Str(s)) => {
                        let path: syn::ExprPath = s.parse()?;
                        args.backoff = Some(quote! { ::dog_tasks::Backoff::custom(#path) });
                    }
                    (_, lit) => {
                        return Err(syn::Error::new(lit.span(), format!("unsupported #[task] argument `{}`", key)));
                    }
                }
            }
            NestedMeta::Meta(Meta::List(ml)) if ml.path.is_ident("backoff") => {
                args.backoff = Some(parse_backoff_config(&ml)?);
            }
            other => return Err(syn::Error::new(other.span(), "unsupported #[task] argument")),
        }
    }

    Ok(args)
}

fn parse_backoff_config(list: &syn::MetaList) -> syn::Result<proc_macro2::TokenStream> {
    let mut delay = quote! { ::std::option::Option::None };
    let mut strategy = quote! { ::dog_tasks::BackoffStrategy::Fixed };

    for nested in &list.nested {
        match nested {
            NestedMeta::Meta(Meta::NameValue(nv)) if nv.path.is_ident("delay") => match &nv.lit {
                Lit::Int(ms) => {
                    delay = quote! {
                        ::std::option::Option::Some(::std::time::Duration::from_millis(#ms))
                    };
                }
                other => return Err(syn::Error::new(other.span(), "backoff delay is a number of milliseconds")),
            },
            NestedMeta::Meta(Meta::NameValue(nv)) if nv.path.is_ident("strategy") => match &nv.lit {
                Lit::Str(s) => {
                    strategy = match s.value().as_str() {
                        "fixed" => quote! { ::dog_tasks::BackoffStrategy::Fixed },
                        "exponential" => quote! { ::dog_tasks::BackoffStrategy::Exponential },
                        _ => return Err(syn::Error::new(s.span(), "backoff strategy is \"fixed\" or \"exponential\"")),
                    };
                }
                other => return Err(syn::Error::new(other.span(), "backoff strategy is a string")),
            },
            other => return Err(syn::Error::new(other.span(), "unsupported backoff argument")),
        }
    }

    Ok(quote! {
        ::dog_tasks::Backoff::Config { delay: #delay, strategy: #strategy }
    })
}

fn gen_options(args: &TaskArgs) -> proc_macro2::TokenStream {
    let mut options = quote! { ::dog_tasks::TaskOptions::new() };

    if let Some(name) = &args.name {
        options = quote! { #options.name(#name) };
    }
    if let Some(queue) = &args.queue {
        options = quote! { #options.queue(#queue) };
    }
    if let Some(n) = &args.concurrency {
        options = quote! { #options.concurrency(#n) };
    }
    if let Some(priority) = &args.priority {
        options = quote! { #options.priority(#priority) };
    }
    if let Some(ttl) = &args.ttl {
        options = quote! { #options.ttl(#ttl) };
    }
    if let Some(n) = &args.attempts {
        options = quote! { #options.attempts(#n) };
    }
    if let Some(backoff) = &args.backoff {
        options = quote! { #options.backoff(#backoff) };
    }

    options
}

fn gen_task_entry(
    self_ty: &syn::Type,
    method: &ImplItemMethod,
    attr: &Attribute,
    method_name: &LitStr,
) -> syn::Result<proc_macro2::TokenStream> {
    let args = parse_task_args(attr)?;
    if args.name.is_none() {
        return Err(syn::Error::new(attr.span(), "#[task] requires a task name"));
    }

    let sig = &method.sig;
    match sig.inputs.first() {
        Some(FnArg::Receiver(r)) if r.reference.is_some() && r.mutability.is_none() => {}
        _ => return Err(syn::Error::new(sig.span(), "task handlers take `&self`")),
    }

    let ident = &sig.ident;
    let call = match sig.inputs.len() {
        1 => quote! { this.#ident() },
        2 => quote! { this.#ident(job) },
        3 => quote! { this.#ident(job, done) },
        _ => {
            return Err(syn::Error::new(
                sig.inputs.span(),
                "task handlers take `(&self)`, `(&self, Job)` or `(&self, Job, JobDone)`",
            ))
        }
    };
    let call = match sig.asyncness {
        Some(_) => quote! { #call.await },
        None => call,
    };
    let body = match sig.output {
        ReturnType::Default => quote! {
            #call;
            ::std::result::Result::Ok(())
        },
        ReturnType::Type(..) => quote! {
            #call.map_err(::std::convert::Into::<::dog_tasks::HandlerError>::into)
        },
    };

    let options = gen_options(&args);
    let handler = format_ident!("__{}_task_handler", ident);

    Ok(quote! {
        {
            #[allow(unused_variables)]
            fn #handler(
                this: ::std::sync::Arc<#self_ty>,
                job: ::dog_tasks::Job,
                done: ::dog_tasks::JobDone,
            ) -> ::dog_tasks::TaskFuture {
                ::std::boxed::Box::pin(async move { #body })
            }
            ::dog_tasks::TaskMethod::task(#method_name, #options, #handler)
        }
    })
}
