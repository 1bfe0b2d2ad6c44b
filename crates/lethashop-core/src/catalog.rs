/// Generate a URL-safe slug from a product or category name.
///
/// Lowercases the input, drops anything outside `[a-z0-9 -]`, turns runs of
/// whitespace into a single `-`, collapses repeated dashes and trims dashes
/// from both ends.
#[must_use]
pub fn slug_from_name(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .filter_map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                Some(c)
            } else if c.is_whitespace() {
                Some('-')
            } else {
                None
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
