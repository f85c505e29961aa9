//! Personal away-message autoresponder.
//!
//! Decides, for each incoming message, whether an automatic reply is sent,
//! which body it carries and when it fires. See [`autoreply::ResponseEngine`]
//! for the core and [`responder::Responder`] for the transport-facing router.

pub mod autoreply;
pub mod channels;
pub mod cli;
pub mod commands;
pub mod config;
pub mod logging;
pub mod messages;
pub mod responder;
pub mod store;
