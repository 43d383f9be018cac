use serde_json::json;
use serde_sarif::sarif::{
    Invocation, Location, LogicalLocation, Message, Result as SarifResult, Run, Sarif, Tool,
    ToolComponent, SCHEMA_URL,
};

use crate::classify::demangle;
use crate::engine::ApplicationResult;

pub(crate) const UNMATCHED_EXPORT: &str = "UNMATCHED_EXPORT";
pub(crate) const BIND_FAILURE: &str = "BIND_FAILURE";

pub(crate) fn build_invocation() -> Invocation {
    let arguments: Vec<String> = std::env::args().collect();
    let command_line = arguments.join(" ");

    Invocation::builder()
        .execution_successful(true)
        .arguments(arguments)
        .command_line(command_line)
        .build()
}

/// Build a SARIF log with one result per unmatched export and per failed bind.
pub(crate) fn build_sarif(result: &ApplicationResult, invocation: Invocation) -> Sarif {
    let driver = ToolComponent::builder()
        .name("jni-helper")
        .version(env!("CARGO_PKG_VERSION"))
        .build();
    let tool = Tool {
        driver,
        extensions: None,
        properties: None,
    };

    let mut results = Vec::new();
    for name in &result.unmatched {
        results.push(
            SarifResult::builder()
                .rule_id(UNMATCHED_EXPORT)
                .message(result_message(format!("No signature found for {name}")))
                .locations(vec![function_location(name)])
                .build(),
        );
    }
    for failure in &result.failures {
        results.push(
            SarifResult::builder()
                .rule_id(BIND_FAILURE)
                .message(result_message(format!(
                    "Failed to apply prototype at {:#x}: {}",
                    failure.address, failure.reason
                )))
                .locations(vec![function_location(&failure.name)])
                .build(),
        );
    }

    let run = Run::builder()
        .tool(tool)
        .invocations(vec![invocation])
        .results(results)
        .build();

    Sarif::builder()
        .schema(SCHEMA_URL)
        .runs(vec![run])
        .version(json!("2.1.0"))
        .build()
}

/// Logical location of a native function, labelled with its Java name when it has one.
fn function_location(native_name: &str) -> Location {
    let logical = match demangle(native_name) {
        Some(java) => LogicalLocation::builder()
            .name(native_name)
            .fully_qualified_name(java.qualified())
            .kind("function")
            .build(),
        None => LogicalLocation::builder()
            .name(native_name)
            .kind("function")
            .build(),
    };
    Location::builder().logical_locations(vec![logical]).build()
}

fn result_message(text: impl Into<String>) -> Message {
    Message::builder().text(text.into()).build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::BindFailure;

    fn invocation() -> Invocation {
        Invocation::builder()
            .execution_successful(true)
            .arguments(Vec::<String>::new())
            .build()
    }

    #[test]
    fn sarif_is_minimal_and_valid_shape() {
        let sarif = build_sarif(&ApplicationResult::default(), invocation());
        let value = serde_json::to_value(&sarif).expect("serialize SARIF");

        assert_eq!(value["version"], "2.1.0");
        assert_eq!(value["$schema"], SCHEMA_URL);
        assert_eq!(value["runs"][0]["tool"]["driver"]["name"], "jni-helper");
        assert!(value["runs"][0]["results"]
            .as_array()
            .expect("results array")
            .is_empty());
        assert_eq!(
            value["runs"][0]["invocations"][0]["executionSuccessful"],
            true
        );
    }

    #[test]
    fn sarif_reports_unmatched_exports_and_failures() {
        let result = ApplicationResult {
            successes: 1,
            unmatched: vec!["Java_com_x_Y_foo".to_string()],
            failures: vec![BindFailure {
                address: 0x2000,
                name: "sub_2000".to_string(),
                reason: "no function at 0x2000".to_string(),
            }],
        };

        let sarif = build_sarif(&result, invocation());
        let value = serde_json::to_value(&sarif).expect("serialize SARIF");
        let results = &value["runs"][0]["results"];

        assert_eq!(results[0]["ruleId"], UNMATCHED_EXPORT);
        assert_eq!(
            results[0]["message"]["text"],
            "No signature found for Java_com_x_Y_foo"
        );
        let logical = &results[0]["locations"][0]["logicalLocations"][0];
        assert_eq!(logical["name"], "Java_com_x_Y_foo");
        assert_eq!(logical["fullyQualifiedName"], "com.x.Y.foo");
        assert_eq!(results[1]["ruleId"], BIND_FAILURE);
        assert_eq!(
            results[1]["message"]["text"],
            "Failed to apply prototype at 0x2000: no function at 0x2000"
        );
        assert!(results[1]["locations"][0]["logicalLocations"][0]["fullyQualifiedName"].is_null());
    }
}
