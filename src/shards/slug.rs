use std::collections::HashSet;

/// URL slug for a shard title: lowercase, whitespace becomes `-`, anything
/// outside `[a-z0-9-]` is dropped, dashes are collapsed and trimmed.
pub fn slugify(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    for c in title.trim().chars().flat_map(char::to_lowercase) {
        let c = if c.is_whitespace() { '-' } else { c };
        if !(c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
            continue;
        }
        if c == '-' && (out.is_empty() || out.ends_with('-')) {
            continue;
        }
        out.push(c);
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        "shard".to_string()
    } else {
        out
    }
}

pub fn next_available_slug<S: AsRef<str>>(base: &str, taken: &[S]) -> String {
    let taken: HashSet<&str> = taken.iter().map(AsRef::as_ref).collect();
    if !taken.contains(base) {
        return base.to_string();
    }
    (2u64..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !taken.contains(candidate.as_str()))
        .unwrap_or_else(|| base.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugifies_titles() {
        assert_eq!(slugify("My Project"), "my-project");
        assert_eq!(slugify("  Rust   & WASM!! demo "), "rust-wasm-demo");
        assert_eq!(slugify("a--b"), "a-b");
        assert_eq!(slugify("-lead and trail-"), "lead-and-trail");
        assert_eq!(slugify("Ünïcode Tïtle 2"), "ncode-ttle-2");
    }

    #[test]
    fn empty_slug_falls_back() {
        assert_eq!(slugify(""), "shard");
        assert_eq!(slugify("!!! ???"), "shard");
    }

    #[test]
    fn picks_first_free_suffix() {
        let none: [&str; 0] = [];
        assert_eq!(next_available_slug("my-project", &none), "my-project");
        assert_eq!(next_available_slug("my-project", &["my-project"]), "my-project-2");
        assert_eq!(
            next_available_slug("my-project", &["my-project", "my-project-2", "my-project-4"]),
            "my-project-3"
        );
        // an unrelated slug sharing the prefix does not count
        assert_eq!(next_available_slug("my", &["my-project"]), "my");
    }
}
