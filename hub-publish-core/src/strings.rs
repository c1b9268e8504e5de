/// True if there are no values or any value is missing or empty.
pub fn is_empty(values: &[Option<&str>]) -> bool {
    values.is_empty() || values.iter().any(|v| v.map_or(true, str::is_empty))
}

/// Keep only the non-empty values, in order.
pub fn remove_empties<S: AsRef<str>>(values: &[S]) -> Vec<String> {
    values
        .iter()
        .map(AsRef::as_ref)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

/// Treat an empty string the same as an absent one.
pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
