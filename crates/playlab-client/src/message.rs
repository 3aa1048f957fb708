use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::PlaylabError;

/// Who produced a message in a conversation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageSource {
    /// The app's instructions that open every conversation.
    SystemStart,
    User,
    /// The assistant.
    Provider,
    /// Any source this client does not know yet.
    #[serde(other)]
    Unknown,
}

/// A stored conversation message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub source: MessageSource,
    pub content: String,
}

/// Value of an instruction variable: text, a number or a boolean.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InstructionValue {
    Text(String),
    Number(serde_json::Number),
    Bool(bool),
}

impl From<&str> for InstructionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for InstructionValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for InstructionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for InstructionValue {
    fn from(value: i32) -> Self {
        Self::Number(value.into())
    }
}

impl From<i64> for InstructionValue {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

/// Instruction variables passed when a conversation is created.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct InstructionVariables(BTreeMap<String, InstructionValue>);

impl InstructionVariables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a variable.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<InstructionValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Adds a floating point variable; non-finite values are rejected.
    pub fn set_float(self, key: impl Into<String>, value: f64) -> Result<Self, PlaylabError> {
        let key = key.into();
        let number = serde_json::Number::from_f64(value).ok_or_else(|| {
            PlaylabError::Validation(format!(
                "Invalid instruction variable value for '{key}': {value}. Numbers must be finite."
            ))
        })?;
        Ok(self.set(key, InstructionValue::Number(number)))
    }

    /// Builds variables from a JSON object, rejecting values that are not
    /// strings, numbers or booleans.
    pub fn from_json(value: serde_json::Value) -> Result<Self, PlaylabError> {
        let serde_json::Value::Object(map) = value else {
            return Err(PlaylabError::Validation(
                "instruction variables must be a JSON object".into(),
            ));
        };
        let mut vars = BTreeMap::new();
        for (key, value) in map {
            let value = match value {
                serde_json::Value::String(s) => InstructionValue::Text(s),
                serde_json::Value::Number(n) => InstructionValue::Number(n),
                serde_json::Value::Bool(b) => InstructionValue::Bool(b),
                other => {
                    return Err(PlaylabError::Validation(format!(
                        "Invalid instruction variable value for '{key}': {other}. Values must be strings, numbers, or booleans."
                    )));
                }
            };
            vars.insert(key, value);
        }
        Ok(Self(vars))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreatedConversation {
    pub conversation: ConversationRef,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConversationRef {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessageList {
    pub messages: Vec<Message>,
}
