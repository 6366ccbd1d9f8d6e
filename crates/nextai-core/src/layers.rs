// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! System layers prepended to the effective input before calling the Runner
//! (spec §4.E step 5, §6 `GET /agent/system-layers`, §GLOSSARY "System
//! layer").
//!
//! The concrete wording is an implementation detail out of the spec's
//! core (only the Runner contract and tool semantics are named); these are
//! the fixed constant layers every turn carries, grounded in the same
//! "base + guidelines" shape the teacher's `system_prompt` builds, stripped
//! of the teacher's mode/knowledge/skill sections the spec's data model
//! has no room for.

use nextai_config::{ContentSegment, RuntimeMessage};
use serde::Serialize;

use crate::text::first_runes;

#[derive(Debug, Clone, Serialize)]
pub struct SystemLayer {
    pub name: String,
    pub content: String,
    /// Coarse token estimate (chars / 4), good enough for the inspection
    /// endpoint — no tokenizer dependency is named anywhere in the spec.
    pub token_estimate: usize,
}

fn estimate_tokens(s: &str) -> usize {
    (s.chars().count() + 3) / 4
}

/// The fixed system layers prepended to every turn.
pub fn system_layers() -> Vec<SystemLayer> {
    let layers = [
        (
            "base",
            "You are the agent gateway's turn engine. Answer the user's request \
             directly; call a tool only when it is necessary to fulfil the request.",
        ),
        (
            "guidelines",
            "Keep replies concise. When a tool call fails, read the feedback and \
             decide whether to retry with corrected arguments or answer from what \
             you already know.",
        ),
    ];
    layers
        .into_iter()
        .map(|(name, content)| SystemLayer {
            name: name.to_string(),
            content: content.to_string(),
            token_estimate: estimate_tokens(content),
        })
        .collect()
}

/// Renders the system layers as the leading system messages prepended to
/// the effective input (spec §4.E step 5: "Prepend system layers").
pub fn system_messages() -> Vec<RuntimeMessage> {
    system_layers()
        .into_iter()
        .map(|l| RuntimeMessage::text(nextai_config::Role::System, l.content))
        .collect()
}

/// First `<=20` runes of `text`, used to auto-name a chat still called
/// "New Chat" (spec §3 Chat, §4.E step 6).
pub fn auto_chat_name(text: &str) -> String {
    first_runes(text.trim(), 20)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_layers_are_non_empty_and_have_token_estimates() {
        let layers = system_layers();
        assert!(!layers.is_empty());
        assert!(layers.iter().all(|l| l.token_estimate > 0));
    }

    #[test]
    fn system_messages_are_system_role() {
        let msgs = system_messages();
        assert!(msgs.iter().all(|m| m.role == nextai_config::Role::System));
    }

    #[test]
    fn auto_chat_name_truncates_to_20_runes() {
        let name = auto_chat_name("this is a pretty long opening line of user text");
        assert_eq!(name.chars().count(), 20);
    }
}
