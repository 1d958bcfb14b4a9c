//! Cache key derivation.
//!
//! A field is stored under its name plus its arguments, formatted canonically:
//! arguments sorted by name, variables substituted, nested objects sorted the
//! same way. The same logical field always lands in the same slot no matter how
//! the arguments were written.

use serde_json::{Map, Value};

use super::field::{Field, Variables};

const VARIABLE_KIND: &str = "Variable";

/// Cache key of `field` under `variables`, e.g. `hero(episode:JEDI)`.
pub fn field_cache_key(field: &Field, variables: &Variables) -> String {
    if field.arguments.is_empty() {
        return field.field_name.clone();
    }
    format!(
        "{}({})",
        field.field_name,
        format_entries(&field.arguments, variables)
    )
}

/// `"<record>.<field>"`, the form used for dependent and changed keys.
pub fn qualified_key(record_key: &str, field_key: &str) -> String {
    format!("{record_key}.{field_key}")
}

/// Resolve a raw argument value, substituting a variable marker by its value.
///
/// A variable the operation was not given resolves to null.
pub fn resolve_argument(value: &Value, variables: &Variables) -> Value {
    match variable_name(value) {
        Some(name) => variables.get(name).cloned().unwrap_or(Value::Null),
        None => value.clone(),
    }
}

fn variable_name(value: &Value) -> Option<&str> {
    let object = value.as_object()?;
    if object.get("kind").and_then(Value::as_str) != Some(VARIABLE_KIND) {
        return None;
    }
    object.get("variableName").and_then(Value::as_str)
}

fn format_entries(entries: &Map<String, Value>, variables: &Variables) -> String {
    let mut sorted: Vec<(&String, &Value)> = entries.iter().collect();
    sorted.sort_by(|(left, _), (right, _)| left.cmp(right));
    sorted
        .into_iter()
        .map(|(name, value)| format!("{name}:{}", format_value(value, variables)))
        .collect::<Vec<_>>()
        .join(",")
}

fn format_value(value: &Value, variables: &Variables) -> String {
    if variable_name(value).is_some() {
        return format_value(&resolve_argument(value, variables), variables);
    }
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.clone(),
        Value::Array(items) => format!(
            "[{}]",
            items
                .iter()
                .map(|item| format_value(item, variables))
                .collect::<Vec<_>>()
                .join(",")
        ),
        Value::Object(entries) => format!("[{}]", format_entries(entries, variables)),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::cache::field::variable_marker;

    fn no_variables() -> Variables {
        Variables::new()
    }

    #[test]
    fn field_without_arguments_uses_name() {
        let field = Field::scalar("name");
        assert_eq!(field_cache_key(&field, &no_variables()), "name");
    }

    #[test]
    fn alias_is_not_part_of_key() {
        let field = Field::scalar("name").with_alias("heroName");
        assert_eq!(field_cache_key(&field, &no_variables()), "name");
    }

    #[test]
    fn single_argument_matches_hand_written_key() {
        let field = Field::object("hero", vec![]).with_argument("episode", json!("JEDI"));
        assert_eq!(field_cache_key(&field, &no_variables()), "hero(episode:JEDI)");
    }

    #[test]
    fn argument_order_does_not_matter() {
        let first = Field::object("hero", vec![])
            .with_argument("episode", json!("JEDI"))
            .with_argument("color", json!("blue"));
        let second = Field::object("hero", vec![])
            .with_argument("color", json!("blue"))
            .with_argument("episode", json!("JEDI"));

        let key = field_cache_key(&first, &no_variables());
        assert_eq!(key, "hero(color:blue,episode:JEDI)");
        assert_eq!(key, field_cache_key(&second, &no_variables()));
    }

    #[test]
    fn nested_objects_are_sorted_recursively() {
        let field = Field::object("reviews", vec![]).with_argument(
            "filter",
            json!({"stars": 5, "author": {"name": "luke", "age": 19}}),
        );
        assert_eq!(
            field_cache_key(&field, &no_variables()),
            "reviews(filter:[author:[age:19,name:luke],stars:5])"
        );
    }

    #[test]
    fn variables_are_substituted_before_formatting() {
        let mut variables = Variables::new();
        variables.insert("ep".to_string(), json!("JEDI"));
        variables.insert("input".to_string(), json!({"z": true, "a": null}));

        let field = Field::object("hero", vec![])
            .with_variable_argument("episode", "ep")
            .with_argument("nested", json!({"input": variable_marker("input")}));

        assert_eq!(
            field_cache_key(&field, &variables),
            "hero(episode:JEDI,nested:[input:[a:null,z:true]])"
        );
    }

    #[test]
    fn missing_variable_formats_as_null() {
        let field = Field::object("hero", vec![]).with_variable_argument("episode", "ep");
        assert_eq!(field_cache_key(&field, &no_variables()), "hero(episode:null)");
    }

    #[test]
    fn list_arguments_keep_their_order() {
        let field = Field::scalar_list("ids").with_argument("in", json!([3, 1, 2]));
        assert_eq!(field_cache_key(&field, &no_variables()), "ids(in:[3,1,2])");
    }

    #[test]
    fn qualified_key_joins_with_dot() {
        assert_eq!(
            qualified_key("QUERY_ROOT", "hero(episode:JEDI)"),
            "QUERY_ROOT.hero(episode:JEDI)"
        );
    }
}
