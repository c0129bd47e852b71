use serde_json::{json, Value};
use std::sync::LazyLock;

pub static CONFIG_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {
            "isolation": {
                "type": "object",
                "properties": {
                    "image": { "type": "string", "minLength": 1 },
                    "name_prefix": { "type": "string", "pattern": "^[a-zA-Z0-9][a-zA-Z0-9_.-]*$" },
                    "strict": { "type": "boolean" },
                    "stop_timeout_secs": { "type": "integer", "minimum": 0 }
                },
                "additionalProperties": false
            },
            "evidence": {
                "type": "object",
                "properties": {
                    "directory": { "type": "string" },
                    "syscalls": { "type": "boolean" },
                    "network": { "type": "boolean" },
                    "fs_diff": { "type": "boolean" },
                    "capture_secs": { "type": "integer", "minimum": 1 }
                },
                "additionalProperties": false
            },
            "reproduction": {
                "type": "object",
                "properties": {
                    "timeout_secs": { "type": "integer", "minimum": 1 },
                    "network_enabled": { "type": "boolean" },
                    "interpreter": { "type": "string" },
                    "dependencies": { "type": "array", "items": { "type": "string" } },
                    "script_dir": { "type": "string" }
                },
                "additionalProperties": false
            },
            "classification": {
                "type": "object",
                "properties": {
                    "success_keywords": { "type": "array", "items": { "type": "string" } },
                    "poc_types": {
                        "type": "object",
                        "additionalProperties": { "type": "array", "items": { "type": "string" } }
                    }
                },
                "additionalProperties": false
            },
            "scoring": {
                "type": "object",
                "properties": {
                    "verified_threshold": { "type": "integer", "minimum": 0, "maximum": 100 },
                    "source_weights": {
                        "type": "object",
                        "additionalProperties": { "type": "integer", "minimum": 0, "maximum": 100 }
                    }
                },
                "additionalProperties": false
            }
        },
        "additionalProperties": false
    })
});
