/// Assert a page holds exactly `expected`, comparing as strings for readable failures
pub fn assert_values(backend: &str, actual: &[Vec<u8>], expected: &[&str]) {
    let actual: Vec<String> = actual
        .iter()
        .map(|v| String::from_utf8_lossy(v).into_owned())
        .collect();
    assert_eq!(actual, expected, "backend: {}", backend);
}

/// Expected page of padded items for positions `range`, in order
pub fn padded(range: impl Iterator<Item = usize>) -> Vec<String> {
    range.map(|i| format!("item-{:03}", i)).collect()
}
