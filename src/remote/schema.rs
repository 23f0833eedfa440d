//! JSON Schema helpers for MCP-compliant schemas.
//!
//! Generates standard JSON Schema without Rust-specific formats like "uint16"
//! that LLMs may not understand correctly.

use schemars::Schema;
use schemars::json_schema;

/// Unsigned integer schema: `{"type": "integer", "minimum": 0}`
///
/// Use with `#[schemars(schema_with = "crate::remote::schema::uint")]` on unsigned fields.
pub fn uint(_generator: &mut schemars::SchemaGenerator) -> Schema {
    json_schema!({
        "type": "integer",
        "minimum": 0
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::SchemaGenerator;

    fn assert_no_uint_format<T: schemars::JsonSchema>(name: &str) {
        let schema = SchemaGenerator::default().into_root_schema_for::<T>();
        let json_str = serde_json::to_string(&schema).expect("Failed to serialize schema");

        assert!(
            !json_str.contains("\"uint"),
            "{} schema should not contain 'uint' format: {}",
            name,
            json_str
        );
    }

    #[test]
    fn test_uint_schema_structure() {
        let mut generator = SchemaGenerator::default();
        let schema = uint(&mut generator);

        let json = serde_json::to_value(&schema).expect("Failed to serialize schema");

        assert_eq!(json.get("type"), Some(&serde_json::json!("integer")));
        assert_eq!(json.get("minimum"), Some(&serde_json::json!(0)));
        assert!(json.get("format").is_none(), "Should not have format field");
    }

    #[test]
    fn test_server_descriptor_schema_no_uint() {
        assert_no_uint_format::<crate::remote::types::ServerDescriptor>("ServerDescriptor");
    }

    #[test]
    fn test_pool_stats_schema_no_uint() {
        assert_no_uint_format::<crate::remote::types::PoolStats>("PoolStats");
    }

    #[test]
    fn test_directory_listing_schema_no_uint() {
        assert_no_uint_format::<crate::remote::types::DirectoryListing>("DirectoryListing");
    }
}
