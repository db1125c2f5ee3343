// Beamline Miner - Free and Open Source Software Statement
//
// This project, beamline-miner, is Free and Open Source Software (FOSS)
// licensed under the MIT License. You are free to use, modify, and distribute
// this software in accordance with the license terms. Contributions are
// welcome via pull requests to the project repository.
//
// File: src/pool/messages.rs
// Version: 1.1.0
//
// Wire encoding of the JSON-line stratum dialect: one JSON object per line,
// dispatched on its "method" field.
//
// Tree Location:
// - src/pool/messages.rs (protocol encode/decode)
// - Depends on: serde_json, hex

use serde_json::{json, Value};

use crate::core::{Solution, HEADER_BYTES};

/// Inbound server message.
#[derive(Debug, Clone, PartialEq)]
pub enum StratumMessage {
    /// New job: header input to search, at the given height/difficulty.
    Job {
        id: String,
        input: [u8; HEADER_BYTES],
        height: u64,
        difficulty: u64,
    },
    /// Server response to a request we sent (login or solution).
    Result {
        id: String,
        code: i64,
        description: String,
    },
    /// Anything else; kept for diagnostics.
    Unknown(String),
}

/// Parse one line from the server. Returns `None` for lines that are not
/// JSON objects at all; malformed fields inside a known method degrade to
/// `Unknown` so a single bad message never kills the connection.
pub fn parse_stratum_message(line: &str) -> Option<StratumMessage> {
    let value: Value = serde_json::from_str(line).ok()?;
    let obj = value.as_object()?;
    let method = obj.get("method").and_then(|m| m.as_str()).unwrap_or("");

    match method {
        "job" => {
            let parsed = (|| {
                let id = message_id(obj)?;
                let input_hex = obj.get("input")?.as_str()?;
                let bytes = hex::decode(input_hex).ok()?;
                if bytes.len() != HEADER_BYTES {
                    return None;
                }
                let mut input = [0u8; HEADER_BYTES];
                input.copy_from_slice(&bytes);
                let height = obj.get("height")?.as_u64()?;
                let difficulty = obj.get("difficulty").and_then(|d| d.as_u64()).unwrap_or(0);
                Some(StratumMessage::Job {
                    id,
                    input,
                    height,
                    difficulty,
                })
            })();
            Some(parsed.unwrap_or_else(|| StratumMessage::Unknown(line.to_string())))
        }
        "result" => {
            let id = message_id(obj).unwrap_or_default();
            let code = obj.get("code").and_then(|c| c.as_i64()).unwrap_or(0);
            let description = obj
                .get("description")
                .and_then(|d| d.as_str())
                .unwrap_or("")
                .to_string();
            Some(StratumMessage::Result {
                id,
                code,
                description,
            })
        }
        _ => Some(StratumMessage::Unknown(line.to_string())),
    }
}

/// Servers send ids as strings or numbers; normalize to a string.
fn message_id(obj: &serde_json::Map<String, Value>) -> Option<String> {
    match obj.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Login request, the first line sent on a fresh connection.
pub fn login_line(api_key: &str) -> String {
    json!({
        "method": "login",
        "api_key": api_key,
        "id": "login",
        "jsonrpc": "2.0",
    })
    .to_string()
}

/// Solution submission for a job. The nonce is 8 bytes hex; the output is
/// the 32 index words, each little-endian.
pub fn solution_line(job_id: &str, nonce: u64, solution: &Solution) -> String {
    let mut output = Vec::with_capacity(solution.len() * 4);
    for word in solution {
        output.extend_from_slice(&word.to_le_bytes());
    }
    json!({
        "method": "solution",
        "id": job_id,
        "nonce": hex::encode(nonce.to_le_bytes()),
        "output": hex::encode(output),
        "jsonrpc": "2.0",
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_job() {
        let line = format!(
            r#"{{"method":"job","id":"42","input":"{}","height":1234,"difficulty":25}}"#,
            "ab".repeat(HEADER_BYTES)
        );
        match parse_stratum_message(&line) {
            Some(StratumMessage::Job {
                id,
                input,
                height,
                difficulty,
            }) => {
                assert_eq!(id, "42");
                assert_eq!(input, [0xab; HEADER_BYTES]);
                assert_eq!(height, 1234);
                assert_eq!(difficulty, 25);
            }
            other => panic!("expected job, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_job_numeric_id() {
        let line = format!(
            r#"{{"method":"job","id":7,"input":"{}","height":1}}"#,
            "00".repeat(HEADER_BYTES)
        );
        match parse_stratum_message(&line) {
            Some(StratumMessage::Job { id, .. }) => assert_eq!(id, "7"),
            other => panic!("expected job, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_result() {
        let line = r#"{"method":"result","id":"login","code":0,"description":"Login successful"}"#;
        assert_eq!(
            parse_stratum_message(line),
            Some(StratumMessage::Result {
                id: "login".to_string(),
                code: 0,
                description: "Login successful".to_string(),
            })
        );
    }

    #[test]
    fn test_malformed_job_degrades_to_unknown() {
        let line = r#"{"method":"job","id":"1","input":"zz","height":1}"#;
        assert!(matches!(
            parse_stratum_message(line),
            Some(StratumMessage::Unknown(_))
        ));
        assert_eq!(parse_stratum_message("not json"), None);
    }

    #[test]
    fn test_solution_line_encoding() {
        let mut solution: Solution = [0u32; 32];
        solution[0] = 1;
        let line = solution_line("9", 0x0102030405060708, &solution);
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["method"], "solution");
        assert_eq!(value["id"], "9");
        assert_eq!(value["nonce"], "0807060504030201");
        let output = value["output"].as_str().unwrap();
        assert_eq!(output.len(), 32 * 8);
        assert!(output.starts_with("01000000"));
    }
}
