//! Function-calling schemas advertised to the speech backend.
//!
//! One entry per invokable tool, in the backend's function-calling
//! format. These are sent once in the session configuration; the
//! backend decides when to call them.

use serde_json::{json, Value};

/// Returns the full tool definition list for the session configuration.
pub fn definitions() -> Vec<Value> {
    vec![
        json!({
            "type": "function",
            "name": "station_verification",
            "description": "Verify the status of a charging station. Returns whether the station is operative or inoperative. Can search by station name, station ID, or area name.",
            "parameters": {
                "type": "object",
                "properties": {
                    "station_name": {
                        "type": "string",
                        "description": "The name, ID, or area of the charging station to verify"
                    }
                },
                "required": ["station_name"]
            }
        }),
        json!({
            "type": "function",
            "name": "user_management",
            "description": "Look up a user by name or verify their identity using the last 4 digits of their credit card.",
            "parameters": {
                "type": "object",
                "properties": {
                    "name": { "type": "string", "description": "The full name of the user to search for" },
                    "user_id": { "type": "string", "description": "The user ID if already known from a previous lookup" },
                    "last_4_digits": { "type": "string", "description": "The last 4 digits of the credit card for verification" }
                },
                "required": []
            }
        }),
        json!({
            "type": "function",
            "name": "verify_rfid",
            "description": "Verify if an RFID card is active and valid for charging.",
            "parameters": {
                "type": "object",
                "properties": {
                    "rfid_number": { "type": "string", "description": "The RFID card number printed on the card" }
                },
                "required": ["rfid_number"]
            }
        }),
        json!({
            "type": "function",
            "name": "get_rfid",
            "description": "Get RFID and billing status for a user by their user ID.",
            "parameters": {
                "type": "object",
                "properties": {
                    "user_id": { "type": "string", "description": "The user ID to look up" },
                    "station_name": { "type": "string", "description": "The name or ID of the charging station" },
                    "connector_id": { "type": "string", "description": "The connector number" }
                },
                "required": ["user_id", "station_name", "connector_id"]
            }
        }),
        json!({
            "type": "function",
            "name": "remote_control",
            "description": "Remotely start or stop a charging session on a specific connector.",
            "parameters": {
                "type": "object",
                "properties": {
                    "station_id": { "type": "string", "description": "The charging station ID" },
                    "connector_id": { "type": "string", "description": "The connector number to control" },
                    "action": { "type": "string", "enum": ["start", "stop"], "description": "The action to perform" },
                    "user_id": { "type": "string", "description": "The user ID for the charging session" },
                    "rfid_number": { "type": "string", "description": "The RFID card number if applicable" }
                },
                "required": ["station_id", "connector_id", "action", "rfid_number"]
            }
        }),
        json!({
            "type": "function",
            "name": "check_cdrs",
            "description": "Check charging session history (Charge Detail Records) for a user.",
            "parameters": {
                "type": "object",
                "properties": {
                    "user_id": { "type": "string", "description": "The user ID to look up charging history for" },
                    "limit": { "type": "number", "description": "Maximum number of records to return (default: 5)" }
                },
                "required": ["user_id"]
            }
        }),
        json!({
            "type": "function",
            "name": "check_invoice",
            "description": "Retrieve invoice information for a user.",
            "parameters": {
                "type": "object",
                "properties": {
                    "user_id": { "type": "string", "description": "The user ID to look up invoices for" }
                },
                "required": ["user_id"]
            }
        }),
        json!({
            "type": "function",
            "name": "invoice_sending_agent",
            "description": "Send invoice or CDR download link to the user via email or SMS.",
            "parameters": {
                "type": "object",
                "properties": {
                    "user_id": { "type": "string", "description": "The user ID" },
                    "type": { "type": "string", "enum": ["invoice", "cdr"], "description": "Type of document to send" }
                },
                "required": ["user_id", "type"]
            }
        }),
        json!({
            "type": "function",
            "name": "charge_station_tariff",
            "description": "Get the tariff/pricing information for a charging station.",
            "parameters": {
                "type": "object",
                "properties": {
                    "station_id": { "type": "string", "description": "The charging station ID" }
                },
                "required": ["station_id"]
            }
        }),
        json!({
            "type": "function",
            "name": "priority",
            "description": "Escalate the call to a human agent. Use when the user requests human support or when workflows fail.",
            "parameters": {
                "type": "object",
                "properties": {
                    "reason": { "type": "string", "description": "The reason for escalation" },
                    "call_sid": { "type": "string", "description": "The call SID for reference" },
                    "user_id": { "type": "string", "description": "The user ID if known" }
                },
                "required": ["reason"]
            }
        }),
        json!({
            "type": "function",
            "name": "app_guide",
            "description": "Answer questions about using the mobile app (starting or stopping a charge, badges, payment, account, troubleshooting). Resolved locally from the app guide.",
            "parameters": {
                "type": "object",
                "properties": {
                    "topic": { "type": "string", "description": "What the user wants help with, in their own words" }
                },
                "required": ["topic"]
            }
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_definition_is_a_named_function() {
        let defs = definitions();
        assert_eq!(defs.len(), 11);
        for def in &defs {
            assert_eq!(def["type"], "function");
            assert!(def["name"].as_str().is_some_and(|n| !n.is_empty()));
            assert_eq!(def["parameters"]["type"], "object");
        }
    }

    #[test]
    fn definition_names_are_unique() {
        let defs = definitions();
        let mut names: Vec<&str> = defs.iter().filter_map(|d| d["name"].as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), defs.len());
    }
}
