//! Bracketed Newick comments as node annotations.
//!
//! BEAST-style comments (`[&rate=0.5,hpd={0.1,0.6}]`) become one annotation
//! per key. Any other comment is kept verbatim under [`COMMENT_KEY`].

use crate::phylo::node::Annotations;

pub const COMMENT_KEY: &str = "comment";

/// Adds the entries of one comment body (without the brackets) to `annotations`.
pub fn apply_comment(body: &str, annotations: &mut Annotations) {
    match body.strip_prefix('&') {
        Some(fields) => {
            for field in split_top_level(fields) {
                let field = field.trim();
                if field.is_empty() {
                    continue;
                }
                match field.split_once('=') {
                    Some((key, value)) => {
                        annotations.insert(key.trim().to_string(), value.trim().to_string());
                    }
                    None => {
                        annotations.insert(field.to_string(), String::new());
                    }
                }
            }
        }
        None => {
            annotations.insert(COMMENT_KEY.to_string(), body.to_string());
        }
    }
}

// Splits on commas that are not nested inside {}, [] or () and not quoted.
fn split_top_level(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut in_quotes = false;
    let mut start = 0;
    for (i, ch) in s.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            '{' | '[' | '(' if !in_quotes => depth += 1,
            '}' | ']' | ')' if !in_quotes => depth = depth.saturating_sub(1),
            ',' if !in_quotes && depth == 0 => {
                out.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&s[start..]);
    out
}

/// Renders annotations back into comment form, `None` when there are none.
pub fn format_annotations(annotations: &Annotations) -> Option<String> {
    let mut fields = Vec::new();
    let mut plain = None;
    for (key, value) in annotations.iter() {
        if key.as_str() == COMMENT_KEY {
            plain = Some(value.as_str());
        } else if value.is_empty() {
            fields.push(key.clone());
        } else {
            fields.push(format!("{key}={value}"));
        }
    }
    let mut out = String::new();
    if !fields.is_empty() {
        out.push_str("[&");
        out.push_str(&fields.join(","));
        out.push(']');
    }
    if let Some(plain) = plain {
        out.push('[');
        out.push_str(plain);
        out.push(']');
    }
    (!out.is_empty()).then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get<'a>(a: &'a Annotations, key: &str) -> Option<&'a str> {
        a.get(key).map(String::as_str)
    }

    #[test]
    fn beast_fields_with_nested_braces() {
        let mut a = Annotations::new();
        apply_comment("&rate=0.5,height_95%_HPD={0.1,0.6},name=\"x,y\"", &mut a);
        assert_eq!(get(&a, "rate"), Some("0.5"));
        assert_eq!(get(&a, "height_95%_HPD"), Some("{0.1,0.6}"));
        assert_eq!(get(&a, "name"), Some("\"x,y\""));
    }

    #[test]
    fn plain_comment_kept_verbatim() {
        let mut a = Annotations::new();
        apply_comment("bootstrap run 3", &mut a);
        assert_eq!(get(&a, COMMENT_KEY), Some("bootstrap run 3"));
    }

    #[test]
    fn format_round_trip() {
        let mut a = Annotations::new();
        apply_comment("&rate=0.5,flag", &mut a);
        apply_comment("note", &mut a);
        assert_eq!(format_annotations(&a).as_deref(), Some("[&rate=0.5,flag][note]"));
        assert_eq!(format_annotations(&Annotations::new()), None);
    }
}
