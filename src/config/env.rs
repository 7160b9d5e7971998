//! Environment-variable interpolation for config values.
//!
//! Supports `${VAR}`, `${VAR:-default}` and bare `$VAR`. Unset variables
//! expand to the empty string.

/// Replace `${VAR}`, `${VAR:-default}` and `$VAR` in a string.
pub fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }

        match chars.peek() {
            Some('{') => {
                chars.next(); // consume '{'
                let mut var_expr = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    var_expr.push(c);
                }
                if closed {
                    result.push_str(&resolve_var_expr(&var_expr));
                } else {
                    // Unterminated: keep the text as written.
                    result.push_str("${");
                    result.push_str(&var_expr);
                }
            }
            Some(&c) if c == '_' || c.is_ascii_alphabetic() => {
                let mut name = String::new();
                while let Some(&c) = chars.peek() {
                    if c == '_' || c.is_ascii_alphanumeric() {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                result.push_str(&std::env::var(&name).unwrap_or_default());
            }
            _ => result.push('$'),
        }
    }

    result
}

/// Resolve a variable expression like `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> String {
    if let Some(idx) = expr.find(":-") {
        let var_name = &expr[..idx];
        let default = &expr[idx + 2..];
        std::env::var(var_name).unwrap_or_else(|_| expand_tilde(default))
    } else {
        std::env::var(expr).unwrap_or_default()
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}
