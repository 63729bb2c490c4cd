//! In-memory data held by a slave

use crate::common::protocol::{self, PING};
use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct SlaveStore {
    data: HashMap<String, String>,
}

impl SlaveStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Apply one line from the coordinator and return the reply, if any.
    ///
    /// Keepalive traffic and lines that are not a READ or WRITE get no reply.
    pub fn handle_line(&mut self, line: &str) -> Option<String> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            ["WRITE", key, value, ..] => {
                self.data.insert(key.to_string(), value.to_string());
                Some(protocol::ack_line(key, value))
            }
            ["READ", key, ..] => Some(match self.data.get(*key) {
                Some(value) => protocol::value_line(key, value),
                None => protocol::not_found_for(key),
            }),
            [single] if *single == PING || *single == "PONG" => None,
            _ => {
                tracing::debug!("ignoring unknown command: {:?}", line);
                None
            }
        }
    }
}
