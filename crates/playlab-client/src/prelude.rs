//! Common imports for typical client usage.
pub use crate::{
    BodyEncoding, ClientConfig, DisplayMode, InstructionVariables, Message, MessageSource,
    PlaylabClient, PlaylabError, SendOptions,
};
