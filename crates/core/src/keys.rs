//! Storage key derivation.
//!
//! Resource ids are hierarchical paths (`/subscriptions/.../virtualMachines/vm-1`),
//! but the table store forbids `/` in partition and row keys. Every key is
//! transliterated with [`KEY_DELIMITER`] before it reaches the store.

/// Replacement for `/` in partition and row keys.
pub const KEY_DELIMITER: char = '!';

/// Transliterate path separators into the store-safe delimiter.
pub fn transliterate(path: &str) -> String {
    path.replace('/', &KEY_DELIMITER.to_string())
}

/// Row key for a resource: its id with separators transliterated.
pub fn row_key(resource_id: &str) -> String {
    transliterate(resource_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_key_replaces_every_separator() {
        let id = "/subscriptions/abc/resourceGroups/rg-1/providers/Microsoft.Compute/virtualMachines/vm-1";
        let key = row_key(id);
        assert!(!key.contains('/'));
        assert_eq!(
            key,
            "!subscriptions!abc!resourceGroups!rg-1!providers!Microsoft.Compute!virtualMachines!vm-1"
        );
    }

    #[test]
    fn plain_names_are_untouched() {
        assert_eq!(transliterate("rg-chaos"), "rg-chaos");
    }
}
