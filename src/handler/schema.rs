//! Exported interface description.
//!
//! The wire format carries no type information, so both peers must be
//! built against the same method and event tables. [`Schema`] renders those
//! tables as JSON so the contract can be checked or shared out of band.
//!
//! # Example
//!
//! ```
//! use tinyrpc::config::SelectorEncoding;
//! use tinyrpc::handler::MethodRegistry;
//!
//! let mut registry = MethodRegistry::new();
//! registry.register("Add", |(a, b): (i32, i32)| async move { Ok(a + b) });
//!
//! let json = registry.schema(SelectorEncoding::Ordinal).to_json().unwrap();
//! assert!(json.contains("\"Add\""));
//! ```

use serde::Serialize;

use super::descriptor::{EventDescriptor, MethodDescriptor};
use crate::config::SelectorEncoding;

/// Method and event tables of one interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Schema {
    /// How requests address methods.
    pub selector: SelectorEncoding,
    /// Methods in ordinal order.
    pub methods: Vec<MethodDescriptor>,
    /// Events in ordinal order.
    pub events: Vec<EventDescriptor>,
}

impl Schema {
    /// Get a method by name.
    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Get an event by name.
    pub fn event(&self, name: &str) -> Option<&EventDescriptor> {
        self.events.iter().find(|e| e.name == name)
    }

    /// Check if schema is empty.
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty() && self.events.is_empty()
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::MethodRegistry;

    #[test]
    fn test_schema_lists_tables_in_order() {
        let mut registry = MethodRegistry::new();
        registry.register("Add", |(a, b): (i32, i32)| async move { Ok(a + b) });
        registry.register_void("Hi", |(): ()| async { Ok(()) });
        registry.register_event::<(f64, String)>("OnData");

        let schema = registry.schema(SelectorEncoding::Ordinal);
        assert!(!schema.is_empty());
        assert_eq!(schema.method("Hi").unwrap().ordinal, 1);
        assert_eq!(schema.event("OnData").unwrap().params.len(), 2);
        assert!(schema.method("Nope").is_none());
    }

    #[test]
    fn test_json_shape() {
        let mut registry = MethodRegistry::new();
        registry.register("Add", |(a, b): (i32, i32)| async move { Ok(a + b) });
        registry.register_void("Hi", |(): ()| async { Ok(()) });
        registry.register_event::<(f64, String)>("OnData");

        let json = registry.schema(SelectorEncoding::Name).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["selector"], "name");
        assert_eq!(value["methods"][0]["name"], "Add");
        assert_eq!(value["methods"][0]["params"][1]["kind"], "i32");
        assert_eq!(value["methods"][0]["result"]["kind"], "i32");
        // void methods omit the result
        assert!(value["methods"][1].get("result").is_none());
        assert_eq!(value["events"][0]["params"][1]["kind"], "string");
    }

    #[test]
    fn test_empty_schema() {
        let schema = MethodRegistry::new().schema(SelectorEncoding::Ordinal);
        assert!(schema.is_empty());
        let json = schema.to_json().unwrap();
        assert!(json.contains("\"methods\": []"));
    }
}
