use std::collections::HashMap;

/// Checkbox groups are posted as one `<prefix><value>` field per checked box.
/// Returns the checked values, sorted.
pub fn collect_prefixed(fields: &HashMap<String, String>, prefix: &str) -> Vec<String> {
    let mut values: Vec<String> = fields
        .keys()
        .filter_map(|name| name.strip_prefix(prefix))
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect();
    values.sort_unstable();
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_prefixed_fields_are_collected() {
        let fields: HashMap<String, String> = [
            ("post_b", "on"),
            ("post_a", "on"),
            ("post_", "on"),
            ("action", "duplicate"),
            ("post_type_page", "on"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        assert_eq!(collect_prefixed(&fields, "post_type_"), vec!["page"]);
        assert_eq!(collect_prefixed(&fields, "post_"), vec!["a", "b", "type_page"]);
    }
}
