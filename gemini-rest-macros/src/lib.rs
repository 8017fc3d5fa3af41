extern crate proc_macro;

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{ToTokens, quote};
use syn::ext::IdentExt;
use syn::meta::ParseNestedMeta;
use syn::{
    AngleBracketedGenericArguments, Attribute, Data, DeriveInput, Error, Expr, Fields, FnArg,
    GenericArgument, Ident, ImplItem, ImplItemFn, ItemImpl, Lit, LitStr, Meta, MetaNameValue, Pat,
    Path, PathArguments, PathSegment, ReturnType, Token, Type, TypePath, parse_macro_input,
    parse_quote,
};

fn get_description_from_doc_attrs(attrs: &[Attribute]) -> Option<String> {
    let mut doc_lines = Vec::new();
    for attr in attrs {
        if attr.path().is_ident("doc") {
            if let Meta::NameValue(MetaNameValue {
                value: Expr::Lit(expr_lit),
                ..
            }) = &attr.meta
            {
                if let Lit::Str(lit_str) = &expr_lit.lit {
                    let line = lit_str.value().trim().to_string();
                    if !line.is_empty() {
                        doc_lines.push(line);
                    }
                }
            }
        }
    }
    if doc_lines.is_empty() {
        None
    } else {
        Some(doc_lines.join("\n"))
    }
}

fn get_result_types(ty: &Type) -> Option<(&Type, &Type)> {
    if let Type::Path(TypePath {
        path: Path { segments, .. },
        ..
    }) = ty
    {
        if let Some(PathSegment {
            ident,
            arguments: PathArguments::AngleBracketed(AngleBracketedGenericArguments { args, .. }),
        }) = segments.last()
        {
            if ident == "Result" && args.len() == 2 {
                if let (Some(GenericArgument::Type(ok_ty)), Some(GenericArgument::Type(err_ty))) =
                    (args.first(), args.last())
                {
                    return Some((ok_ty, err_ty));
                }
            }
        }
    }
    None
}

fn is_unit(ty: &Type) -> bool {
    matches!(ty, Type::Tuple(tuple) if tuple.elems.is_empty())
}

fn optional_str(value: &Option<String>) -> TokenStream2 {
    match value {
        Some(s) => quote! { ::core::option::Option::Some(#s) },
        None => quote! { ::core::option::Option::None },
    }
}

// --- #[function_target] ---

#[derive(Default)]
struct CallableAttr {
    name: Option<String>,
    description: Option<String>,
}

fn parse_callable_attr(attr: &Attribute) -> syn::Result<CallableAttr> {
    let mut out = CallableAttr::default();
    match &attr.meta {
        Meta::Path(_) => {}
        Meta::List(list) => {
            if let Ok(lit) = syn::parse2::<LitStr>(list.tokens.clone()) {
                out.description = Some(lit.value());
            } else {
                attr.parse_nested_meta(|meta| {
                    if meta.path.is_ident("description") {
                        out.description = Some(meta.value()?.parse::<LitStr>()?.value());
                        Ok(())
                    } else if meta.path.is_ident("name") {
                        out.name = Some(meta.value()?.parse::<LitStr>()?.value());
                        Ok(())
                    } else {
                        Err(meta.error("expected `name` or `description`"))
                    }
                })?;
            }
        }
        Meta::NameValue(nv) => {
            return Err(Error::new_spanned(
                nv,
                "use #[callable] or #[callable(\"description\")]",
            ));
        }
    }
    Ok(out)
}

struct ParamInfo {
    ident: Ident,
    ty: Type,
    name: String,
    description: Option<String>,
    default: Option<Expr>,
}

fn take_param_attrs(attrs: &mut Vec<Attribute>) -> syn::Result<(Option<String>, Option<Expr>)> {
    let mut description = None;
    let mut default = None;
    for attr in attrs.iter().filter(|a| a.path().is_ident("arg")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("description") {
                description = Some(meta.value()?.parse::<LitStr>()?.value());
                Ok(())
            } else if meta.path.is_ident("default") {
                default = Some(meta.value()?.parse::<Expr>()?);
                Ok(())
            } else {
                Err(meta.error("expected `description` or `default`"))
            }
        })?;
    }
    attrs.retain(|a| !a.path().is_ident("arg"));
    Ok((description, default))
}

struct Callable {
    method: Ident,
    name: String,
    description: String,
    is_static: bool,
    params: Vec<ParamInfo>,
    output: ReturnType,
}

/// Strips the marker attributes from `method` and returns its declaration,
/// or `None` when the method is not marked `#[callable]`.
fn take_callable(method: &mut ImplItemFn) -> syn::Result<Option<Callable>> {
    let Some(position) = method
        .attrs
        .iter()
        .position(|a| a.path().is_ident("callable"))
    else {
        return Ok(None);
    };
    let marker = method.attrs.remove(position);
    let callable_attr = parse_callable_attr(&marker)?;

    let sig = &mut method.sig;
    let method_ident = sig.ident.clone();
    let description = match callable_attr
        .description
        .or_else(|| get_description_from_doc_attrs(&method.attrs))
    {
        Some(description) => description,
        None => {
            return Err(Error::new(
                method_ident.span(),
                "Missing function description: add a /// doc comment or use #[callable(\"My description\")]",
            ));
        }
    };

    if let Some(asyncness) = &sig.asyncness {
        return Err(Error::new_spanned(
            asyncness,
            "Callable methods must be synchronous",
        ));
    }
    if !sig.generics.params.is_empty() {
        return Err(Error::new_spanned(
            &sig.generics,
            "Callable methods cannot be generic",
        ));
    }

    let mut is_static = true;
    let mut params = Vec::new();
    for input in sig.inputs.iter_mut() {
        match input {
            FnArg::Receiver(receiver) => {
                if receiver.reference.is_none() || receiver.mutability.is_some() {
                    return Err(Error::new_spanned(
                        receiver,
                        "Callable methods must take `&self` or no receiver",
                    ));
                }
                is_static = false;
            }
            FnArg::Typed(pat_type) => {
                let (description, default) = take_param_attrs(&mut pat_type.attrs)?;
                let ident = match &*pat_type.pat {
                    Pat::Ident(pat_ident) => pat_ident.ident.clone(),
                    other => {
                        return Err(Error::new_spanned(
                            other,
                            "Callable parameters must be simple identifiers (e.g., `city: String`)",
                        ));
                    }
                };
                if let Type::Reference(reference) = &*pat_type.ty {
                    return Err(Error::new_spanned(
                        reference,
                        "Callable parameters must be owned types",
                    ));
                }
                params.push(ParamInfo {
                    name: ident.unraw().to_string(),
                    ident,
                    ty: (*pat_type.ty).clone(),
                    description,
                    default,
                });
            }
        }
    }

    Ok(Some(Callable {
        name: callable_attr
            .name
            .unwrap_or_else(|| method_ident.unraw().to_string()),
        method: method_ident,
        description,
        is_static,
        params,
        output: sig.output.clone(),
    }))
}

fn registration_tokens(callable: &Callable) -> TokenStream2 {
    let Callable {
        method,
        name,
        description,
        is_static,
        params,
        output,
    } = callable;

    let mut declared = Vec::new();
    let mut bindings = Vec::new();
    let mut call_args = Vec::new();
    for param in params {
        let ParamInfo {
            ident,
            ty,
            name: param_name,
            description,
            default,
        } = param;
        let description = optional_str(description);
        match default {
            Some(default) => {
                declared.push(quote! { .optional_param::<#ty>(#param_name, #description) });
                bindings.push(quote! {
                    let #ident: #ty = __args.get_or_else::<#ty, _>(#param_name, || #default)?;
                });
            }
            None => {
                declared.push(quote! { .param::<#ty>(#param_name, #description) });
                bindings.push(quote! {
                    let #ident: #ty = __args.get::<#ty>(#param_name)?;
                });
            }
        }
        call_args.push(quote! { #ident });
    }

    let (target_pat, invocation) = if *is_static {
        (quote! { _ }, quote! { Self::#method(#(#call_args),*) })
    } else {
        (quote! { __target }, quote! { __target.#method(#(#call_args),*) })
    };

    let result_handling = match output {
        ReturnType::Default => quote! {
            #invocation;
            ::gemini_rest_api::codec::to_value(&())
        },
        ReturnType::Type(_, ty) if is_unit(ty) => quote! {
            #invocation;
            ::gemini_rest_api::codec::to_value(&())
        },
        ReturnType::Type(_, ty) => {
            if get_result_types(ty).is_some() {
                quote! {
                    match #invocation {
                        ::core::result::Result::Ok(__value) => {
                            ::gemini_rest_api::codec::to_value(&__value)
                        }
                        ::core::result::Result::Err(__error) => ::core::result::Result::Err(
                            ::gemini_rest_api::GeminiError::FunctionFailed {
                                function: #name.to_string(),
                                message: __error.to_string(),
                            },
                        ),
                    }
                }
            } else {
                quote! {
                    let __value = #invocation;
                    ::gemini_rest_api::codec::to_value(&__value)
                }
            }
        }
    };

    quote! {
        let __registry = __registry.register(
            ::gemini_rest_api::function::FunctionBuilder::<Self>::new(#name, #description)
                #(#declared)*
                .handler(|#target_pat: &Self, __args| {
                    #(#bindings)*
                    #result_handling
                }),
        )?;
    }
}

fn target_name(self_ty: &Type) -> String {
    if let Type::Path(TypePath { path, .. }) = self_ty {
        if let Some(segment) = path.segments.last() {
            return segment.ident.unraw().to_string();
        }
    }
    self_ty.to_token_stream().to_string()
}

/// Exposes the `#[callable]` methods of an impl block to the model.
///
/// ```ignore
/// #[function_target]
/// impl Calculator {
///     /// Adds two numbers.
///     #[callable]
///     fn add(&self, a: f32, b: f32) -> f32 { a + b }
///
///     #[callable("Divides two numbers")]
///     fn divide(
///         numerator: f64,
///         #[arg(description = "Defaults to 1", default = 1.0)] denominator: f64,
///     ) -> Result<f64, String> { .. }
/// }
/// ```
///
/// Generates an implementation of `FunctionTarget` for the type.
#[proc_macro_attribute]
pub fn function_target(attr: TokenStream, item: TokenStream) -> TokenStream {
    let mut item_impl = parse_macro_input!(item as ItemImpl);

    let name_override = if attr.is_empty() {
        None
    } else {
        Some(parse_macro_input!(attr as LitStr).value())
    };

    if let Some((_, trait_path, _)) = &item_impl.trait_ {
        return TokenStream::from(
            Error::new_spanned(
                trait_path,
                "#[function_target] goes on an inherent impl block",
            )
            .to_compile_error(),
        );
    }

    let mut registrations = Vec::new();
    for impl_item in item_impl.items.iter_mut() {
        if let ImplItem::Fn(method) = impl_item {
            match take_callable(method) {
                Ok(Some(callable)) => registrations.push(registration_tokens(&callable)),
                Ok(None) => {}
                Err(e) => return TokenStream::from(e.to_compile_error()),
            }
        }
    }

    let self_ty = &item_impl.self_ty;
    let target = name_override.unwrap_or_else(|| target_name(self_ty));
    let (impl_generics, _, where_clause) = item_impl.generics.split_for_impl();

    let output = quote! {
        #item_impl

        impl #impl_generics ::gemini_rest_api::function::FunctionTarget for #self_ty #where_clause {
            fn function_registry() -> ::core::result::Result<
                ::gemini_rest_api::function::FunctionRegistry<Self>,
                ::gemini_rest_api::GeminiError,
            > {
                let __registry = ::gemini_rest_api::function::FunctionRegistry::<Self>::new(#target);
                #(#registrations)*
                ::core::result::Result::Ok(__registry)
            }
        }
    };
    output.into()
}

// --- #[derive(ToolSchema)] ---

#[derive(Default)]
struct SerdeAttrs {
    rename: Option<String>,
    rename_all: Option<String>,
    skip: bool,
    default: bool,
}

fn skip_meta_value(meta: &ParseNestedMeta) -> syn::Result<()> {
    if meta.input.peek(Token![=]) {
        let _: Expr = meta.value()?.parse()?;
    } else if meta.input.peek(syn::token::Paren) {
        let content;
        syn::parenthesized!(content in meta.input);
        let _: TokenStream2 = content.parse()?;
    }
    Ok(())
}

fn parse_serde_attrs(attrs: &[Attribute]) -> syn::Result<SerdeAttrs> {
    let mut out = SerdeAttrs::default();
    for attr in attrs.iter().filter(|a| a.path().is_ident("serde")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("rename") && meta.input.peek(Token![=]) {
                out.rename = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("rename_all") && meta.input.peek(Token![=]) {
                out.rename_all = Some(meta.value()?.parse::<LitStr>()?.value());
            } else if meta.path.is_ident("skip") || meta.path.is_ident("skip_deserializing") {
                out.skip = true;
            } else if meta.path.is_ident("default") {
                out.default = true;
                skip_meta_value(&meta)?;
            } else {
                skip_meta_value(&meta)?;
            }
            Ok(())
        })?;
    }
    Ok(out)
}

fn pascal_from_snake(name: &str) -> String {
    name.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

fn snake_from_pascal(name: &str) -> String {
    let mut out = String::new();
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            out.push('_');
        }
        out.push(c.to_ascii_lowercase());
    }
    out
}

fn lower_first(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// Applies a serde `rename_all` rule to a snake_case field name.
fn rename_field(name: &str, rule: &str) -> Option<String> {
    Some(match rule {
        "lowercase" | "snake_case" => name.to_string(),
        "UPPERCASE" | "SCREAMING_SNAKE_CASE" => name.to_ascii_uppercase(),
        "PascalCase" => pascal_from_snake(name),
        "camelCase" => lower_first(&pascal_from_snake(name)),
        "kebab-case" => name.replace('_', "-"),
        "SCREAMING-KEBAB-CASE" => name.to_ascii_uppercase().replace('_', "-"),
        _ => return None,
    })
}

/// Applies a serde `rename_all` rule to a PascalCase variant name.
fn rename_variant(name: &str, rule: &str) -> Option<String> {
    Some(match rule {
        "lowercase" => name.to_ascii_lowercase(),
        "UPPERCASE" => name.to_ascii_uppercase(),
        "PascalCase" => name.to_string(),
        "camelCase" => lower_first(name),
        "snake_case" => snake_from_pascal(name),
        "SCREAMING_SNAKE_CASE" => snake_from_pascal(name).to_ascii_uppercase(),
        "kebab-case" => snake_from_pascal(name).replace('_', "-"),
        "SCREAMING-KEBAB-CASE" => snake_from_pascal(name).to_ascii_uppercase().replace('_', "-"),
        _ => return None,
    })
}

fn unknown_rule(span_source: &DeriveInput, rule: &str) -> Error {
    Error::new_spanned(
        &span_source.ident,
        format!("Unsupported rename_all rule: {}", rule),
    )
}

fn derive_struct(
    input: &DeriveInput,
    fields: &syn::FieldsNamed,
    container: &SerdeAttrs,
) -> syn::Result<(TokenStream2, TokenStream2)> {
    let mut entries = Vec::new();
    for field in &fields.named {
        let serde_attrs = parse_serde_attrs(&field.attrs)?;
        if serde_attrs.skip {
            continue;
        }
        let Some(ident) = &field.ident else {
            continue;
        };
        let raw_name = ident.unraw().to_string();
        let name = match (serde_attrs.rename, &container.rename_all) {
            (Some(rename), _) => rename,
            (None, Some(rule)) => {
                rename_field(&raw_name, rule).ok_or_else(|| unknown_rule(input, rule))?
            }
            (None, None) => raw_name,
        };
        let ty = &field.ty;
        let describe = get_description_from_doc_attrs(&field.attrs)
            .map(|doc| quote! { __schema.description = ::core::option::Option::Some(#doc.to_string()); });
        // Fields serde can fill in on its own are never required.
        let require = (!serde_attrs.default && !container.default).then(|| {
            quote! {
                if !__schema.is_nullable() {
                    __required.push(#name.to_string());
                }
            }
        });
        entries.push(quote! {
            let mut __schema = __generator.subschema::<#ty>()?;
            #describe
            #require
            __properties.insert(#name.to_string(), __schema);
        });
    }

    let describe = get_description_from_doc_attrs(&input.attrs)
        .map(|doc| quote! { .with_description(#doc) });
    let schema_body = quote! {
        let mut __properties = ::std::collections::BTreeMap::new();
        let mut __required = ::std::vec::Vec::<::std::string::String>::new();
        #(#entries)*
        ::core::result::Result::Ok(
            ::gemini_rest_api::schema::Schema::object(__properties, __required) #describe
        )
    };

    let type_name = input.ident.to_string();
    let argument_body = quote! {
        ::gemini_rest_api::function::decode_structured(name, #type_name, value)
    };
    Ok((schema_body, argument_body))
}

fn derive_enum(
    input: &DeriveInput,
    data: &syn::DataEnum,
    container: &SerdeAttrs,
) -> syn::Result<(TokenStream2, TokenStream2)> {
    let mut names = Vec::new();
    let mut variants = Vec::new();
    for variant in &data.variants {
        if !matches!(variant.fields, Fields::Unit) {
            return Err(Error::new_spanned(
                variant,
                "ToolSchema can only be derived for enums without fields",
            ));
        }
        let serde_attrs = parse_serde_attrs(&variant.attrs)?;
        if serde_attrs.skip {
            continue;
        }
        let raw_name = variant.ident.unraw().to_string();
        let name = match (serde_attrs.rename, &container.rename_all) {
            (Some(rename), _) => rename,
            (None, Some(rule)) => {
                rename_variant(&raw_name, rule).ok_or_else(|| unknown_rule(input, rule))?
            }
            (None, None) => raw_name,
        };
        names.push(name);
        variants.push(variant.ident.clone());
    }
    if names.is_empty() {
        return Err(Error::new_spanned(
            &input.ident,
            "ToolSchema enums need at least one variant",
        ));
    }

    let describe = get_description_from_doc_attrs(&input.attrs)
        .map(|doc| quote! { .with_description(#doc) });
    let schema_body = quote! {
        ::core::result::Result::Ok(
            ::gemini_rest_api::schema::Schema::enumeration([#(#names),*]) #describe
        )
    };

    let type_name = input.ident.to_string();
    let argument_body = quote! {
        if let ::core::option::Option::Some(__name) = value.as_str() {
            #(
                if __name.eq_ignore_ascii_case(#names) {
                    return ::core::result::Result::Ok(Self::#variants);
                }
            )*
        }
        ::core::result::Result::Err(::gemini_rest_api::function::conversion_error(
            name, #type_name, value,
        ))
    };
    Ok((schema_body, argument_body))
}

fn expand_tool_schema(input: DeriveInput) -> syn::Result<TokenStream2> {
    let container = parse_serde_attrs(&input.attrs)?;
    let (schema_body, argument_body) = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => derive_struct(&input, fields, &container)?,
            other => {
                return Err(Error::new_spanned(
                    other,
                    "ToolSchema can only be derived for structs with named fields",
                ));
            }
        },
        Data::Enum(data) => derive_enum(&input, data, &container)?,
        Data::Union(_) => {
            return Err(Error::new_spanned(
                &input.ident,
                "ToolSchema cannot be derived for unions",
            ));
        }
    };

    let ident = &input.ident;
    let mut generics = input.generics.clone();
    for param in generics.type_params_mut() {
        param
            .bounds
            .push(parse_quote!(::gemini_rest_api::schema::ToolSchema));
    }
    let (impl_generics, ty_generics, where_clause) = generics.split_for_impl();

    let mut argument_generics = input.generics.clone();
    argument_generics
        .make_where_clause()
        .predicates
        .push(parse_quote!(Self: ::gemini_rest_api::__private::DeserializeOwned));
    let (arg_impl_generics, arg_ty_generics, arg_where_clause) =
        argument_generics.split_for_impl();
    // Enums convert by name and need no Deserialize bound.
    let arg_where_clause = match &input.data {
        Data::Enum(_) => input.generics.where_clause.as_ref(),
        _ => arg_where_clause,
    };

    Ok(quote! {
        impl #impl_generics ::gemini_rest_api::schema::ToolSchema for #ident #ty_generics #where_clause {
            fn tool_schema(
                __generator: &mut ::gemini_rest_api::schema::SchemaGenerator,
            ) -> ::core::result::Result<
                ::gemini_rest_api::schema::Schema,
                ::gemini_rest_api::GeminiError,
            > {
                #schema_body
            }
        }

        impl #arg_impl_generics ::gemini_rest_api::function::Argument for #ident #arg_ty_generics #arg_where_clause {
            fn from_argument(
                name: &str,
                value: &::gemini_rest_api::__private::Value,
            ) -> ::core::result::Result<Self, ::gemini_rest_api::GeminiError> {
                #argument_body
            }
        }
    })
}

/// Derives `ToolSchema` and `Argument`.
///
/// Structs with named fields become OBJECT schemas whose properties follow
/// the fields (doc comments become descriptions, `Option` fields are not
/// required) and convert from arguments through serde. Fieldless enums
/// become STRING schemas listing the variant names and convert by name.
/// `#[serde(rename, rename_all, skip, default)]` are honoured.
#[proc_macro_derive(ToolSchema)]
pub fn derive_tool_schema(item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);
    match expand_tool_schema(input) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}
