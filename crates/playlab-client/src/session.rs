use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info};

use crate::attachment::Attachment;
use crate::config::ClientConfig;
use crate::errors::PlaylabError;
use crate::message::{
    CreatedConversation, InstructionVariables, Message, MessageList, MessageSource,
};
use crate::presenter::Presenter;
use crate::reassembler::StreamReassembler;
use crate::sse::collect_deltas;
use crate::transport::{ApiRequest, BodyEncoding, ReqwestTransport, RequestBody, Transport};

const SYSTEM_RULES_MARKER: &str = "### System Rules";
const NO_CONVERSATION: &str =
    "No conversation loaded. Please create a new conversation or load an existing one.";

/// Options for [`PlaylabClient::send_message`].
#[derive(Clone, Debug, Default)]
pub struct SendOptions {
    /// File uploaded with the message. Attachments are always sent as
    /// multipart form data.
    pub attachment: Option<PathBuf>,
    /// Echo deltas as they arrive instead of rendering the full reply at the end.
    pub streaming: bool,
    /// Encoding of text-only messages.
    pub encoding: BodyEncoding,
}

impl SendOptions {
    pub fn streaming() -> Self {
        Self {
            streaming: true,
            ..Self::default()
        }
    }

    pub fn attachment(mut self, path: impl Into<PathBuf>) -> Self {
        self.attachment = Some(path.into());
        self
    }

    pub fn encoding(mut self, encoding: BodyEncoding) -> Self {
        self.encoding = encoding;
        self
    }
}

/// Builder for a [`PlaylabClient`].
pub struct ClientBuilder {
    config: ClientConfig,
    transport: Option<Arc<dyn Transport>>,
    presenter: Option<Arc<dyn Presenter>>,
    instruction_variables: Option<InstructionVariables>,
}

impl ClientBuilder {
    /// Replaces the default reqwest transport.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replaces the presenter selected from the config's display mode.
    pub fn presenter(mut self, presenter: Arc<dyn Presenter>) -> Self {
        self.presenter = Some(presenter);
        self
    }

    /// Variables for the conversation opened by [`connect`](Self::connect).
    pub fn instruction_variables(mut self, vars: InstructionVariables) -> Self {
        self.instruction_variables = Some(vars);
        self
    }

    /// Builds the client, opens a conversation and shows its introduction.
    pub fn connect(self) -> Result<PlaylabClient, PlaylabError> {
        self.config.validate()?;
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(&self.config)?),
        };
        let presenter = match self.presenter {
            Some(presenter) => presenter,
            None => Arc::from(self.config.display.presenter()),
        };
        let mut client = PlaylabClient {
            config: self.config,
            transport,
            presenter,
            conversation_id: None,
        };
        let id = client
            .create_conversation(self.instruction_variables.as_ref(), BodyEncoding::Json)?;
        client.open(id)?;
        Ok(client)
    }
}

/// A client holding one active conversation.
///
/// Each instance owns its conversation id; independent clients can be used
/// side by side. Operations block until the request, including any stream,
/// has finished.
pub struct PlaylabClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    presenter: Arc<dyn Presenter>,
    conversation_id: Option<String>,
}

impl std::fmt::Debug for PlaylabClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaylabClient")
            .field("project_id", &self.config.project_id)
            .field("base_url", &self.config.base_url)
            .field("conversation_id", &self.conversation_id)
            .finish_non_exhaustive()
    }
}

impl PlaylabClient {
    /// Starts a builder for `config`.
    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder {
            config,
            transport: None,
            presenter: None,
            instruction_variables: None,
        }
    }

    /// Connects with the default transport and presenter.
    pub fn connect(config: ClientConfig) -> Result<Self, PlaylabError> {
        Self::builder(config).connect()
    }

    /// Connects using `PLAYLAB_API_KEY` and `PLAYLAB_PROJECT_ID`.
    pub fn from_env() -> Result<Self, PlaylabError> {
        Self::connect(ClientConfig::from_env()?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn project_id(&self) -> &str {
        &self.config.project_id
    }

    /// The active conversation, if any.
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    /// Creates a conversation and returns its id without switching to it.
    pub fn create_conversation(
        &self,
        vars: Option<&InstructionVariables>,
        encoding: BodyEncoding,
    ) -> Result<String, PlaylabError> {
        let mut body = serde_json::Map::new();
        if let Some(vars) = vars.filter(|vars| !vars.is_empty()) {
            let vars = serde_json::to_value(vars).map_err(|e| {
                PlaylabError::Validation(format!("invalid instruction variables: {e}"))
            })?;
            body.insert("instructionVariables".into(), vars);
        }
        let request = ApiRequest::post(
            self.conversations_path(),
            RequestBody::encoded(serde_json::Value::Object(body), encoding),
        );
        let created: CreatedConversation = self.transport.execute(&request)?.json()?;
        info!(
            event = "conversation.created",
            project_id = %self.config.project_id,
            conversation_id = %created.conversation.id
        );
        Ok(created.conversation.id)
    }

    /// Switches to an existing conversation and, when verbose, replays its
    /// history after the system message.
    pub fn load_conversation(&mut self, conversation_id: &str) -> Result<(), PlaylabError> {
        if conversation_id.trim().is_empty() {
            return Err(PlaylabError::Validation("Invalid conversation ID".into()));
        }
        self.conversation_id = Some(conversation_id.to_string());
        debug!(event = "conversation.loaded", conversation_id);
        if !self.config.verbose {
            return Ok(());
        }
        let messages = self
            .list_messages()
            .map_err(|e| e.context("Failed to load conversation"))?;
        for message in messages.iter().skip(1) {
            let label = match message.source {
                MessageSource::Provider => "AI:",
                _ => "You:",
            };
            self.presenter.write_line("");
            self.presenter.write_chunk(&format!("{label} "));
            self.presenter.render_text(&message.content);
            self.presenter.write_line("");
        }
        Ok(())
    }

    /// Lists the messages of the active conversation in order.
    pub fn list_messages(&self) -> Result<Vec<Message>, PlaylabError> {
        let path = self.messages_path()?;
        let list: MessageList = self.transport.execute(&ApiRequest::get(path))?.json()?;
        Ok(list.messages)
    }

    /// Sends a message and returns the assistant's complete reply.
    ///
    /// Streaming sends echo deltas as they arrive (when verbose); non-streaming
    /// sends drain the whole body first and render the reply once.
    pub fn send_message(&self, text: &str, options: SendOptions) -> Result<String, PlaylabError> {
        let path = self.messages_path()?;
        let attachment = options.attachment.as_ref().map(Attachment::open).transpose()?;
        if self.config.verbose {
            self.presenter.write_line("");
            self.presenter.write_line(&format!("You: {text}"));
        }

        let body = match attachment {
            Some(file) => RequestBody::Multipart {
                fields: vec![
                    ("input.message".into(), text.to_string()),
                    ("originalFileName".into(), file.file_name.clone()),
                ],
                file,
            },
            None => RequestBody::encoded(message_body(text), options.encoding),
        };
        let request = ApiRequest::post(path, body);
        let context = if options.attachment.is_some() {
            "Failed to send message with file"
        } else {
            "Failed to send message"
        };

        let reply = if options.streaming {
            self.send_streaming(&request).map_err(|e| e.context(context))?
        } else {
            self.send_collected(&request).map_err(|e| e.context(context))?
        };
        Ok(reply)
    }

    /// Sends a message and streams the reply, calling `on_chunk` once per delta.
    ///
    /// Nothing is echoed through the presenter; `on_chunk` is the display channel.
    pub fn stream_message(
        &self,
        text: &str,
        on_chunk: Option<&mut dyn FnMut(&str)>,
        encoding: BodyEncoding,
    ) -> Result<String, PlaylabError> {
        let path = self.messages_path()?;
        let request = ApiRequest::post(path, RequestBody::encoded(message_body(text), encoding));
        StreamReassembler::new(self.transport.as_ref())
            .run(&request, on_chunk)
            .map(|acc| acc.into_text())
            .map_err(|e| e.context("Failed to stream message"))
    }

    /// Starts a fresh conversation and shows its introduction.
    pub fn reset_chat(&mut self) -> Result<(), PlaylabError> {
        let id = self
            .create_conversation(None, BodyEncoding::Json)
            .map_err(|e| e.context("Failed to reset chat"))?;
        self.open(id).map_err(|e| e.context("Failed to reset chat"))
    }

    /// Shows the app's instructions (the opening `system-start` message),
    /// without the trailing system rules.
    pub fn display_system_prompt(&self) -> Result<(), PlaylabError> {
        let messages = self
            .list_messages()
            .map_err(|e| e.context("Failed to display system prompt"))?;
        if let Some(first) = messages
            .first()
            .filter(|m| m.source == MessageSource::SystemStart)
        {
            self.presenter.render_text(system_prompt(&first.content));
            self.presenter.write_line("");
        }
        Ok(())
    }

    fn open(&mut self, conversation_id: String) -> Result<(), PlaylabError> {
        self.conversation_id = Some(conversation_id);
        let messages = self.list_messages()?;
        if self.config.verbose
            && let Some(intro) = messages
                .get(1)
                .filter(|m| m.source == MessageSource::Provider)
        {
            self.presenter.render_text(&intro.content);
        }
        Ok(())
    }

    fn send_streaming(&self, request: &ApiRequest) -> Result<String, PlaylabError> {
        let reassembler = StreamReassembler::new(self.transport.as_ref());
        if !self.config.verbose {
            return Ok(reassembler.run(request, None)?.into_text());
        }
        self.presenter.write_line("");
        self.presenter.write_chunk("AI: ");
        let reply = reassembler
            .echo_to(self.presenter.as_ref())
            .run(request, None)?
            .into_text();
        self.presenter.write_line("");
        self.presenter.write_line("");
        Ok(reply)
    }

    fn send_collected(&self, request: &ApiRequest) -> Result<String, PlaylabError> {
        let body = self.transport.execute(request)?.text()?;
        let reply = collect_deltas(&body);
        debug!(
            event = "message.collected",
            body_bytes = body.len() as u64,
            reply_bytes = reply.len() as u64
        );
        if self.config.verbose {
            self.presenter.write_line("");
            self.presenter.write_chunk("AI: ");
            self.presenter.render_text(&reply);
            self.presenter.write_line("");
        }
        Ok(reply)
    }

    fn conversations_path(&self) -> String {
        format!("projects/{}/conversations", self.config.project_id)
    }

    fn messages_path(&self) -> Result<String, PlaylabError> {
        let id = self
            .conversation_id
            .as_deref()
            .ok_or_else(|| PlaylabError::Validation(NO_CONVERSATION.into()))?;
        Ok(format!("{}/{id}/messages", self.conversations_path()))
    }
}

fn message_body(text: &str) -> serde_json::Value {
    serde_json::json!({ "input": { "message": text } })
}

fn system_prompt(content: &str) -> &str {
    content
        .split(SYSTEM_RULES_MARKER)
        .next()
        .unwrap_or(content)
}
