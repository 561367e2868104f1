use std::collections::HashMap;

/// Substitute `{{ name }}` placeholders from the VU's variables map.
///
/// Unknown names render as the empty string; surrounding whitespace inside
/// the braces is ignored. Unterminated placeholders are passed through
/// verbatim.
pub fn render(template: &str, vars: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };

        let name = after[..end].trim();
        match vars.get(name) {
            Some(value) => out.push_str(value),
            None => {
                tracing::debug!(name, "template variable not set");
            }
        }

        rest = &after[end + 2..];
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn substitutes_known_variables() {
        let v = vars(&[("user", "ada"), ("id", "7")]);
        assert_eq!(render("hello {{ user }} #{{id}}", &v), "hello ada #7");
    }

    #[test]
    fn unknown_variable_renders_empty() {
        let v = vars(&[]);
        assert_eq!(render("x{{ missing }}y", &v), "xy");
    }

    #[test]
    fn no_placeholders_is_identity() {
        let v = vars(&[("a", "b")]);
        assert_eq!(render("plain text", &v), "plain text");
    }

    #[test]
    fn unterminated_placeholder_passes_through() {
        let v = vars(&[("a", "b")]);
        assert_eq!(render("x {{ a", &v), "x {{ a");
    }
}
