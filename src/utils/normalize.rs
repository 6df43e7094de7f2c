//! Key normalization for sailing lookups
//!
//! Ship names and sailing numbers arrive in whatever casing the caller used
//! ("EXPLORER", " explorer "). Every lookup goes through these helpers.

/// Trim surrounding whitespace and lowercase
pub fn normalize_key(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Store key for a sailing: `"{ship}_{sailing_number}"`, normalized
pub fn sailing_key(ship_name: &str, sailing_number: &str) -> String {
    format!("{}_{}", normalize_key(ship_name), normalize_key(sailing_number))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sailing_key_is_case_and_space_insensitive() {
        assert_eq!(sailing_key("Explorer 2", "1"), "explorer 2_1");
        assert_eq!(sailing_key("  EXPLORER 2 ", " 1"), sailing_key("explorer 2", "1"));
        assert_eq!(sailing_key("Voyager", "CR352"), "voyager_cr352");
    }
}
