//! Context normalization
//!
//! A context is the routing key files and directories are registered under.
//! Every function here is pure: request paths are untrusted input and are
//! normalized with the same rules as registration keys, without touching the
//! filesystem.

/// Canonicalize `raw` into a slash-delimited context.
///
/// Runs of `/` and `\` collapse into a single `/`, surrounding slashes and
/// whitespace are trimmed, then a leading and/or trailing `/` is re-added as
/// requested. An empty result becomes `/` when either flag is set.
pub fn normalize(raw: &str, leading: bool, trailing: bool) -> String {
    let mut collapsed = String::with_capacity(raw.len());
    let mut in_separator = false;
    for ch in raw.chars() {
        if ch == '/' || ch == '\\' {
            if !in_separator {
                collapsed.push('/');
            }
            in_separator = true;
        } else {
            collapsed.push(ch);
            in_separator = false;
        }
    }

    let stripped = collapsed.trim_matches(|c: char| c == '/' || c.is_whitespace());

    if stripped.is_empty() {
        return if leading || trailing {
            "/".to_string()
        } else {
            String::new()
        };
    }

    let mut out = String::with_capacity(stripped.len() + 2);
    if leading {
        out.push('/');
    }
    out.push_str(stripped);
    if trailing {
        out.push('/');
    }
    out
}

/// Join context fragments, then normalize the result.
pub fn join<S: AsRef<str>>(leading: bool, trailing: bool, parts: &[S]) -> String {
    let mut joined = String::new();
    for part in parts {
        joined.push_str(&normalize(part.as_ref(), true, false));
    }
    normalize(&joined, leading, trailing)
}

/// Strip a registered directory context from a request context.
///
/// Both sides are expected in leading-slash form. Matching is segment-aware:
/// `/doc` prefixes `/doc/a` but not `/docs/a`. The root context `/` prefixes
/// everything. Returns the remainder, which may be empty.
pub fn strip_context<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix == "/" {
        return path.strip_prefix('/').or(Some(path));
    }
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        Some(rest)
    } else {
        rest.strip_prefix('/')
    }
}
