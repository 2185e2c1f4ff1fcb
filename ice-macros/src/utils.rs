use proc_macro::{TokenStream, TokenTree};

/// Splits a `TokenStream` into its top-level comma-separated arguments.
///
/// Groups arrive as single token trees, so commas nested inside
/// parentheses, brackets or braces are left alone.
pub(crate) fn split_args(input: TokenStream) -> Vec<Vec<TokenTree>> {
    let mut args = Vec::new();
    let mut current = Vec::new();

    for token in input {
        match &token {
            TokenTree::Punct(p) if p.as_char() == ',' => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(token),
        }
    }

    if !current.is_empty() {
        args.push(current);
    }

    args
}

/// Converts tokens back into source text.
///
/// Consecutive identifiers get a space between them so `move ||` does not
/// turn into `move||` and `async move` does not merge.
pub(crate) fn tokens_to_string(tokens: &[TokenTree]) -> String {
    let mut out = String::new();
    let mut prev_was_ident = false;

    for t in tokens {
        let is_ident = matches!(t, TokenTree::Ident(_));

        if prev_was_ident && is_ident {
            out.push(' ');
        }

        out.push_str(&t.to_string());
        prev_was_ident = is_ident;
    }

    out
}

/// Parses the attribute arguments of `#[ice::main]` / `#[ice::test]`.
///
/// Accepts nothing or `threads = N` with `N > 0`.
pub(crate) fn parse_threads(attr: TokenStream) -> Result<Option<usize>, String> {
    let mut threads = None;

    for arg in split_args(attr) {
        let (key, value) = match arg.as_slice() {
            [TokenTree::Ident(key), TokenTree::Punct(eq), TokenTree::Literal(value)]
                if eq.as_char() == '=' =>
            {
                (key.to_string(), value.to_string())
            }
            _ => {
                return Err(format!(
                    "expected `threads = N`, found `{}`",
                    tokens_to_string(&arg)
                ));
            }
        };

        if key != "threads" {
            return Err(format!("unknown argument `{key}`"));
        }

        match value.parse::<usize>() {
            Ok(n) if n > 0 => threads = Some(n),
            _ => return Err(format!("`threads` must be a positive integer, found `{value}`")),
        }
    }

    Ok(threads)
}

/// Expands to a `compile_error!` carrying `message`.
pub(crate) fn compile_error(message: &str) -> TokenStream {
    format!("::core::compile_error!({message:?});")
        .parse()
        .unwrap_or_default()
}
