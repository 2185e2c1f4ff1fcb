mod utils;

use proc_macro::{Delimiter, Group, TokenStream, TokenTree};

/// Polls every future concurrently and resolves to the tuple of their
/// outputs once all of them have finished.
///
/// ```rust,ignore
/// let (a, b) = ice::join!(first(), second());
/// ```
#[proc_macro]
pub fn join(input: TokenStream) -> TokenStream {
    let args = utils::split_args(input);
    let count = args.len();

    if count == 0 {
        return "()".parse().unwrap_or_default();
    }

    if count == 1 {
        let expr = utils::tokens_to_string(&args[0]);
        return format!("{{ ({expr}).await }}").parse().unwrap_or_default();
    }

    let mut output = String::from("{\n");

    for (i, expr_tokens) in args.iter().enumerate() {
        let idx = i + 1;
        let expr = utils::tokens_to_string(expr_tokens);
        output.push_str(&format!(
            "let mut __f{idx} = (::std::boxed::Box::pin({expr}), ::core::option::Option::None::<_>);\n"
        ));
    }

    output.push_str("::std::future::poll_fn(move |cx| {\n");
    output.push_str("    use ::std::future::Future;\n");
    output.push_str("    use ::std::task::Poll;\n");

    for i in 1..=count {
        output.push_str(&format!(
            "    if __f{i}.1.is_none() {{\n\
                    if let Poll::Ready(val) = __f{i}.0.as_mut().poll(cx) {{\n\
                        __f{i}.1 = ::core::option::Option::Some(val);\n\
                    }}\n\
                }}\n"
        ));
    }

    let all_done = (1..=count)
        .map(|i| format!("__f{i}.1.is_some()"))
        .collect::<Vec<_>>()
        .join(" && ");

    output.push_str(&format!("    if {all_done} {{\n"));
    output.push_str("        Poll::Ready((\n");

    for i in 1..=count {
        output.push_str(&format!("            __f{i}.1.take().unwrap(),\n"));
    }

    output.push_str("        ))\n");
    output.push_str("    } else {\n");
    output.push_str("        Poll::Pending\n");
    output.push_str("    }\n");
    output.push_str("}).await\n");
    output.push_str("}\n");

    output
        .parse()
        .unwrap_or_else(|err| utils::compile_error(&format!("join macro error: {err}")))
}

/// Runs an `async fn main` on an ice `Runtime`.
///
/// Accepts an optional `threads = N` argument; by default one thread per
/// logical CPU drives the context.
///
/// ```rust,ignore
/// #[ice::main(threads = 2)]
/// async fn main() {
///     ice::yield_now().await;
/// }
/// ```
#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    expand(attr, item, false)
}

/// Like [`main`], for `async` test functions; also marks them `#[test]`.
///
/// ```rust,ignore
/// #[ice::test(threads = 4)]
/// async fn schedules() {
///     ice::yield_now().await;
/// }
/// ```
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    expand(attr, item, true)
}

fn expand(attr: TokenStream, item: TokenStream, is_test: bool) -> TokenStream {
    let threads = match utils::parse_threads(attr) {
        Ok(threads) => threads,
        Err(message) => return utils::compile_error(&message),
    };

    let mut tokens: Vec<TokenTree> = item.into_iter().collect();

    let Some(pos) = tokens
        .iter()
        .rposition(|t| matches!(t, TokenTree::Group(g) if g.delimiter() == Delimiter::Brace))
    else {
        return utils::compile_error("expected a function body");
    };

    let Some(async_pos) = tokens
        .iter()
        .position(|t| matches!(t, TokenTree::Ident(id) if id.to_string() == "async"))
    else {
        return utils::compile_error("the function must be declared `async`");
    };
    tokens.remove(async_pos);
    let pos = pos - 1;

    let block = match &tokens[pos] {
        TokenTree::Group(g) => g.stream().to_string(),
        _ => unreachable!(),
    };

    let mut builder = String::from("::ice::Builder::new()");
    if let Some(n) = threads {
        builder.push_str(&format!(".threads({n})"));
    }

    let new_block = format!(
        "{{
            let runtime = {builder}
                .build()
                .expect(\"failed to start the ice runtime\");

            match runtime.block_on(async move {{ {block} }}) {{
                ::core::result::Result::Ok(output) => output,
                ::core::result::Result::Err(error) => ::core::panic!(\"ice runtime: {{}}\", error),
            }}
        }}"
    );

    let body = match new_block.parse() {
        Ok(body) => body,
        Err(err) => return utils::compile_error(&format!("failed to expand body: {err}")),
    };
    tokens[pos] = TokenTree::Group(Group::new(Delimiter::Brace, body));

    let mut result: Vec<TokenTree> = Vec::new();
    if is_test {
        let test_attr: TokenStream = "#[::core::prelude::v1::test]".parse().unwrap_or_default();
        result.extend(test_attr);
    }
    result.extend(tokens);

    result.into_iter().collect()
}
