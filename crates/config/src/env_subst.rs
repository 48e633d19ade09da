//! `${ENV_VAR}` expansion in raw config text, applied before parsing.

/// Expand `${NAME}` placeholders from the process environment. Placeholders
/// that do not resolve are kept verbatim so parse errors point at them.
pub fn substitute_env(input: &str) -> String {
    substitute_with(input, |name| std::env::var(name).ok())
}

/// Expansion against an arbitrary lookup, so tests never touch the process
/// environment.
fn substitute_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 2..];
        match tail.find('}') {
            Some(end) if end > 0 => {
                let name = &tail[..end];
                match lookup(name) {
                    Some(value) => out.push_str(&value),
                    None => {
                        out.push_str("${");
                        out.push_str(name);
                        out.push('}');
                    },
                }
                rest = &tail[end + 1..];
            },
            // "${}" or an unterminated opener: copy it through literally.
            _ => {
                out.push_str("${");
                rest = tail;
            },
        }
    }

    out.push_str(rest);
    out
}
