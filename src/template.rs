//! Rendering of message templates such as `"user {UserId} logged in"`
//! against an event's properties.

use std::collections::BTreeMap;

use crate::event::PropertyValue;

/// Render `template`, replacing each `{Name}` hole with the matching property.
///
/// Holes may carry a destructuring prefix (`@`, `$`) and an alignment or
/// format suffix (`{Name,10}`, `{Name:0.00}`); both are accepted and ignored.
/// Holes without a matching property are kept verbatim. `{{` and `}}`
/// render as literal braces.
pub fn render(template: &str, properties: &BTreeMap<String, PropertyValue>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let brace = &rest[pos..];

        if brace.starts_with("{{") || brace.starts_with("}}") {
            out.push_str(&brace[..1]);
            rest = &brace[2..];
            continue;
        }

        if brace.starts_with('}') {
            out.push('}');
            rest = &brace[1..];
            continue;
        }

        let Some(end) = brace.find('}') else {
            out.push_str(brace);
            return out;
        };

        let hole = &brace[..=end];
        match properties.get(hole_name(&hole[1..end])) {
            Some(value) => match render_value(value) {
                Some(text) => out.push_str(&text),
                None => out.push_str(hole),
            },
            None => out.push_str(hole),
        }
        rest = &brace[end + 1..];
    }

    out.push_str(rest);
    out
}

fn hole_name(hole: &str) -> &str {
    let hole = hole.trim_start_matches(['@', '$']);
    let end = hole.find([',', ':']).unwrap_or(hole.len());
    &hole[..end]
}

fn render_value(value: &PropertyValue) -> Option<String> {
    match value {
        PropertyValue::Str(s) => Some(s.clone()),
        other => match other.to_json().ok()? {
            serde_json::Value::String(s) => Some(s),
            json => Some(json.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props() -> BTreeMap<String, PropertyValue> {
        let mut props = BTreeMap::new();
        props.insert("User".to_string(), PropertyValue::from("alice"));
        props.insert("Elapsed".to_string(), PropertyValue::from(34_i64));
        props.insert("Tags".to_string(), PropertyValue::Sequence(vec!["a".into(), "b".into()]));
        props
    }

    #[test]
    fn replaces_known_holes() {
        let out = render("{User} finished in {Elapsed} ms", &props());
        assert_eq!(out, "alice finished in 34 ms");
    }

    #[test]
    fn ignores_prefix_alignment_and_format() {
        let out = render("{@User,-10} {$Elapsed:000} {Tags}", &props());
        assert_eq!(out, r#"alice 34 ["a","b"]"#);
    }

    #[test]
    fn keeps_unknown_and_unterminated_holes() {
        assert_eq!(render("hello {Missing}", &props()), "hello {Missing}");
        assert_eq!(render("open {User", &props()), "open {User");
    }

    #[test]
    fn doubled_braces_are_literal() {
        assert_eq!(render("{{User}} is {User}}", &props()), "{User} is alice}");
    }
}
