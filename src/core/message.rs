use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::id::new_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn is_user(self) -> bool {
        self == Role::User
    }

    pub fn is_assistant(self) -> bool {
        self == Role::Assistant
    }
}

impl AsRef<str> for Role {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl TryFrom<&str> for Role {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            _ => Err(format!("invalid message role: {value}")),
        }
    }
}

/// Accumulated state of one tool call, assembled from streamed fragments.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallState {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// JSON argument text; arrives in fragments and is appended verbatim.
    #[serde(default)]
    pub arguments: String,
}

/// One turn in a session transcript.
///
/// Messages are mutated in place while `streaming` is set and treated as
/// immutable once finalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub streaming: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolCallState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            role,
            content: content.into(),
            date: Utc::now(),
            streaming: false,
            is_error: false,
            model: None,
            tools: Vec::new(),
            audio_url: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// An empty assistant message that a stream will fill in.
    pub fn assistant_placeholder(model: impl Into<String>) -> Self {
        let mut message = Self::new(Role::Assistant, "");
        message.streaming = true;
        message.model = Some(model.into());
        message
    }

    pub fn is_user(&self) -> bool {
        self.role.is_user()
    }

    pub fn is_assistant(&self) -> bool {
        self.role.is_assistant()
    }

    pub fn is_finalized(&self) -> bool {
        !self.streaming
    }

    /// Merge one tool-call fragment into the accumulated call at `index`.
    ///
    /// The id and name replace whatever was there; arguments append, since
    /// providers stream the JSON argument text in pieces.
    pub fn merge_tool_call(
        &mut self,
        index: u32,
        id: Option<&str>,
        name: Option<&str>,
        arguments: Option<&str>,
    ) {
        let index = index as usize;
        while self.tools.len() <= index {
            self.tools.push(ToolCallState::default());
        }
        let entry = &mut self.tools[index];
        if let Some(id) = id {
            entry.id = id.to_string();
        }
        if let Some(name) = name {
            entry.name = name.to_string();
        }
        if let Some(arguments) = arguments {
            entry.arguments.push_str(arguments);
        }
    }
}
