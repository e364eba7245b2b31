//! Readable names for legacy-mangled Rust symbols.
//!
//! Legacy symbols follow the Itanium `_ZN … E` envelope: every path segment
//! is prefixed by its decimal length, and the last segment is usually a
//! 17-character hash (`h` + 16 hex digits) that is dropped here. Characters
//! that are not valid in identifiers are escaped as `$…$` tokens.

/// Path separator written between segments.
const SEPARATOR: &str = "::";

/// Length of the trailing `h<16 hex digits>` hash segment.
const HASH_LEN: usize = 17;

/// Decode `name` into a `::`-separated path.
///
/// Names outside the `_ZN…E` / `ZN…E` envelope, or with a malformed length
/// prefix, come back unchanged. Unknown escape tokens are rendered as `???`.
pub fn demangle(name: &str) -> String {
    let Some(inner) = strip_envelope(name) else {
        return name.to_string();
    };
    decode_path(inner).unwrap_or_else(|| name.to_string())
}

fn strip_envelope(name: &str) -> Option<&str> {
    name.strip_prefix("_ZN")
        .or_else(|| name.strip_prefix("ZN"))
        .and_then(|rest| rest.strip_suffix('E'))
}

fn decode_path(inner: &str) -> Option<String> {
    let chars: Vec<char> = inner.chars().collect();
    let mut path = String::with_capacity(inner.len());
    let mut index = 0;

    while index < chars.len() {
        let digits_start = index;
        while index < chars.len() && chars[index].is_ascii_digit() {
            index += 1;
        }
        let length: usize = chars[digits_start..index]
            .iter()
            .collect::<String>()
            .parse()
            .ok()?;

        if length == HASH_LEN && chars.len() - index == HASH_LEN {
            break;
        }

        let end = index.checked_add(length).filter(|end| *end <= chars.len())?;
        decode_segment(&chars, index, end, &mut path);
        path.push_str(SEPARATOR);
        index = end;
    }

    if path.ends_with(SEPARATOR) {
        path.truncate(path.len() - SEPARATOR.len());
    }
    Some(path)
}

/// Append the decoded form of `chars[start..end]` to `path`.
fn decode_segment(chars: &[char], start: usize, end: usize, path: &mut String) {
    let mut escape: Option<String> = None;
    let mut i = start;

    while i < end {
        let c = chars[i];

        // `_$` opens an escaped region; the underscore carries no output.
        if c == '_' && chars.get(i + 1) == Some(&'$') {
            i += 1;
            continue;
        }

        if c == '.' {
            path.push_str(SEPARATOR);
            // `..` is the legacy spelling of a single `::`.
            if i + 1 < end && chars[i + 1] == '.' {
                i += 1;
            }
            i += 1;
            continue;
        }

        if c == '$' {
            match escape.take() {
                Some(token) => path.push_str(&resolve_escape(&token)),
                None => escape = Some(String::new()),
            }
            i += 1;
            continue;
        }

        match escape.as_mut() {
            Some(token) => token.push(c),
            None => path.push(c),
        }
        i += 1;
    }
}

fn resolve_escape(token: &str) -> String {
    if let Some(hex) = token.strip_prefix('u') {
        return u32::from_str_radix(hex, 16)
            .ok()
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| "???".to_string());
    }

    match token {
        "SP" => "@",
        "BP" => "*",
        "RF" => "&",
        "LT" => "<",
        "GT" => ">",
        "LP" => "(",
        "RP" => ")",
        "C" => ",",
        _ => "???",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_trait_impl_with_hash() {
        let mangled =
            "_ZN4core3fmt3num52_$LT$impl$u20$core..fmt..Debug$u20$for$u20$usize$GT$3fmt17h0123456789abcdefE";
        assert_eq!(
            demangle(mangled),
            "core::fmt::num::<impl core::fmt::Debug for usize>::fmt"
        );
    }

    #[test]
    fn decodes_generic_arguments_and_commas() {
        let mangled = "_ZN70_$LT$alloc..vec..Vec$LT$T$C$A$GT$$u20$as$u20$core..ops..drop..Drop$GT$4drop17h1a2b3c4d5e6f7a8bE";
        assert_eq!(
            demangle(mangled),
            "<alloc::vec::Vec<T,A> as core::ops::drop::Drop>::drop"
        );
    }

    #[test]
    fn decodes_without_hash() {
        assert_eq!(demangle("_ZN4main4mainE"), "main::main");
    }

    #[test]
    fn accepts_prefix_without_underscore() {
        assert_eq!(
            demangle("ZN3std2rt10lang_start28_$u7b$$u7b$closure$u7d$$u7d$17h0000000000000000E"),
            "std::rt::lang_start::{{closure}}"
        );
    }

    #[test]
    fn single_dot_becomes_separator() {
        assert_eq!(demangle("_ZN3a.b1cE"), "a::b::c");
    }

    #[test]
    fn all_table_escapes() {
        assert_eq!(demangle("_ZN1x20$RF$$BP$$SP$$LP$$RP$E"), "x::&*@()");
    }

    #[test]
    fn unknown_escape_becomes_placeholder() {
        assert_eq!(demangle("_ZN3foo7$XX$barE"), "foo::???bar");
    }

    #[test]
    fn invalid_unicode_escape_becomes_placeholder() {
        assert_eq!(demangle("_ZN3foo4$uZ$E"), "foo::???");
    }

    #[test]
    fn names_outside_envelope_are_unchanged() {
        for name in ["main", "llvm.dbg.declare", "_ZN4main", "ZN", "", "E", "_Z4mainv"] {
            assert_eq!(demangle(name), name);
        }
    }

    #[test]
    fn malformed_lengths_are_unchanged() {
        assert_eq!(demangle("_ZN99shortE"), "_ZN99shortE");
        assert_eq!(demangle("_ZNabcE"), "_ZNabcE");
    }

    #[test]
    fn empty_envelope_is_empty_path() {
        assert_eq!(demangle("_ZNE"), "");
    }
}
