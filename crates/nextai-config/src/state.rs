// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The persisted `State` record (spec §3) and its entity types.
//!
//! `State` is the single snapshot type owned by the state store
//! (`nextai-store`). This crate only defines its shape and the pure
//! invariant-preserving helpers on it; the store owns locking and
//! persistence.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The id of the one cron job that may never be deleted (§3, §6).
pub const DEFAULT_CRON_JOB_ID: &str = "default";
/// Channel name that is enabled unless explicitly turned off (§4.D).
pub const DEFAULT_ENABLED_CHANNEL: &str = "console";

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}

// ── Chat ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chat {
    pub id: String,
    pub name: String,
    pub session_id: String,
    pub user_id: String,
    pub channel: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub meta: HashMap<String, Value>,
}

impl Chat {
    pub fn new(session_id: impl Into<String>, user_id: impl Into<String>, channel: impl Into<String>) -> Self {
        let t = now();
        Self {
            id: new_id(),
            name: "New Chat".to_string(),
            session_id: session_id.into(),
            user_id: user_id.into(),
            channel: channel.into(),
            created_at: t,
            updated_at: t,
            meta: HashMap::new(),
        }
    }

    /// Whether this chat matches the natural `(session_id, user_id, channel)` key (§3).
    pub fn matches_key(&self, session_id: &str, user_id: &str, channel: &str) -> bool {
        self.session_id == session_id && self.user_id == user_id && self.channel == channel
    }
}

// ── Messages ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

/// One content segment of a message. `text` is populated for `type == "text"`;
/// other segment types are carried opaquely in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContentSegment {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl ContentSegment {
    pub fn text(s: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: Some(s.into()),
            extra: HashMap::new(),
        }
    }
}

/// A persisted, ordered history entry (§3 Runtime Message).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeMessage {
    pub id: String,
    pub role: Role,
    #[serde(rename = "type", default = "default_message_type")]
    pub kind: String,
    pub content: Vec<ContentSegment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, Value>>,
}

fn default_message_type() -> String {
    "message".to_string()
}

impl RuntimeMessage {
    pub fn new(role: Role, content: Vec<ContentSegment>) -> Self {
        Self {
            id: new_id(),
            role,
            kind: default_message_type(),
            content,
            metadata: None,
        }
    }

    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self::new(role, vec![ContentSegment::text(text)])
    }

    /// Concatenation of all `text` segments, in order.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| c.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Input to the Runner (§3 Agent Input Message) — same shape as
/// [`RuntimeMessage`], reused directly rather than duplicated; the
/// distinction in the spec is purely about which direction the message
/// flows, not its fields.
pub type AgentInputMessage = RuntimeMessage;

// ── Provider settings ───────────────────────────────────────────────────────

/// Normalizes a provider id the way the spec requires: lowercase, trimmed
/// (§3 invariant: "Provider ids are case-insensitive keys").
pub fn normalize_provider_id(id: &str) -> String {
    id.trim().to_lowercase()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderSetting {
    pub display_name: String,
    pub api_key: String,
    pub base_url: String,
    /// Tri-state: `None` means "enabled" (absent ⇒ true per §3).
    pub enabled: Option<bool>,
    pub headers: HashMap<String, String>,
    pub timeout_ms: u64,
    pub model_aliases: HashMap<String, String>,
}

impl Default for ProviderSetting {
    fn default() -> Self {
        Self {
            display_name: String::new(),
            api_key: String::new(),
            base_url: String::new(),
            enabled: None,
            headers: HashMap::new(),
            timeout_ms: 30_000,
            model_aliases: HashMap::new(),
        }
    }
}

impl ProviderSetting {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    /// Resolves `model` through `model_aliases`, falling back to the input
    /// unchanged when there is no alias entry.
    pub fn resolve_model(&self, model: &str) -> String {
        self.model_aliases
            .get(model)
            .cloned()
            .unwrap_or_else(|| model.to_string())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ActiveLlm {
    #[serde(default)]
    pub provider_id: String,
    #[serde(default)]
    pub model: String,
}

impl ActiveLlm {
    pub fn is_empty(&self) -> bool {
        self.provider_id.is_empty() && self.model.is_empty()
    }
}

// ── Cron ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleType {
    Interval,
    Cron,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CronSchedule {
    #[serde(rename = "type")]
    pub kind: ScheduleType,
    pub cron: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Text,
    Workflow,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DispatchTarget {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub session_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CronDispatch {
    pub channel: String,
    #[serde(default)]
    pub target: DispatchTarget,
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CronRuntime {
    pub max_concurrency: u32,
    pub timeout_seconds: u32,
    pub misfire_grace_seconds: u32,
}

impl Default for CronRuntime {
    fn default() -> Self {
        Self {
            max_concurrency: 1,
            timeout_seconds: 30,
            misfire_grace_seconds: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CronJobSpec {
    pub id: String,
    pub name: String,
    pub enabled: bool,
    pub schedule: CronSchedule,
    pub task_type: TaskType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow: Option<Value>,
    pub dispatch: CronDispatch,
    #[serde(default)]
    pub runtime: CronRuntime,
    #[serde(default)]
    pub meta: HashMap<String, Value>,
}

impl CronJobSpec {
    /// True for the one job flagged by `meta.system_default = true` (§6).
    pub fn is_system_default(&self) -> bool {
        self.meta.get("system_default").and_then(Value::as_bool) == Some(true)
    }

    /// The built-in default system cron job, created on first startup (§4.A).
    pub fn default_system_cron() -> Self {
        let mut meta = HashMap::new();
        meta.insert("system_default".to_string(), Value::Bool(true));
        Self {
            id: DEFAULT_CRON_JOB_ID.to_string(),
            name: "Default System Cron".to_string(),
            enabled: false,
            schedule: CronSchedule {
                kind: ScheduleType::Interval,
                cron: "3600s".to_string(),
                timezone: None,
            },
            task_type: TaskType::Text,
            text: None,
            workflow: None,
            dispatch: CronDispatch {
                channel: DEFAULT_ENABLED_CHANNEL.to_string(),
                target: DispatchTarget::default(),
                extra: HashMap::new(),
            },
            runtime: CronRuntime::default(),
            meta,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CronRunStatus {
    Running,
    Succeeded,
    Failed,
    Paused,
    Resumed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CronJobState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status: Option<CronRunStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default)]
    pub paused: bool,
}

impl CronJobState {
    /// Normalizes a legacy `last_status = "paused"` into `paused = true` and
    /// clears `next_run_at`, matching the §3 invariant
    /// ("a cron state with paused=true MUST have next_run_at=nil").
    pub fn normalize(&mut self) {
        if matches!(self.last_status, Some(CronRunStatus::Paused)) {
            self.paused = true;
        }
        if self.paused {
            self.next_run_at = None;
        }
    }
}

// ── Skills ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SkillSpec {
    pub name: String,
    pub content: String,
    pub source: String,
    pub path: String,
    #[serde(default)]
    pub references: HashMap<String, String>,
    #[serde(default)]
    pub scripts: HashMap<String, String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

// ── State ────────────────────────────────────────────────────────────────

/// The single record owned by the state store (§3, §4.A).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct State {
    pub chats: HashMap<String, Chat>,
    pub histories: HashMap<String, Vec<RuntimeMessage>>,
    pub providers: HashMap<String, ProviderSetting>,
    #[serde(default)]
    pub active_llm: ActiveLlm,
    /// Channel name → opaque JSON config map (§3 Channel Config).
    pub channels: HashMap<String, Value>,
    pub cron_specs: HashMap<String, CronJobSpec>,
    pub cron_states: HashMap<String, CronJobState>,
    pub skills: HashMap<String, SkillSpec>,
}

impl State {
    /// Built-in defaults populated when no state file exists yet (§4.A):
    /// the default cron job and the console channel enabled.
    pub fn with_defaults() -> Self {
        let mut s = Self::default();
        let job = CronJobSpec::default_system_cron();
        s.cron_states
            .insert(job.id.clone(), CronJobState::default());
        s.cron_specs.insert(job.id.clone(), job);
        s.channels.insert(
            DEFAULT_ENABLED_CHANNEL.to_string(),
            serde_json::json!({"enabled": true}),
        );
        s
    }

    pub fn find_chat_by_key(&self, session_id: &str, user_id: &str, channel: &str) -> Option<&Chat> {
        self.chats
            .values()
            .find(|c| c.matches_key(session_id, user_id, channel))
    }

    /// Deletes a chat and its history together (§3 invariant: "deleting a
    /// chat deletes its history").
    pub fn delete_chat(&mut self, chat_id: &str) -> bool {
        let removed = self.chats.remove(chat_id).is_some();
        self.histories.remove(chat_id);
        removed
    }

    /// Deletes every chat matching `(session_id, user_id, channel)` — used
    /// by the `/new` context-reset command (§4.E step 1).
    pub fn delete_chats_by_key(&mut self, session_id: &str, user_id: &str, channel: &str) -> usize {
        let ids: Vec<String> = self
            .chats
            .values()
            .filter(|c| c.matches_key(session_id, user_id, channel))
            .map(|c| c.id.clone())
            .collect();
        for id in &ids {
            self.delete_chat(id);
        }
        ids.len()
    }

    /// Removes a provider, clearing `active_llm` if it pointed at it
    /// (§3 invariant).
    pub fn delete_provider(&mut self, provider_id: &str) -> bool {
        let key = normalize_provider_id(provider_id);
        let removed = self.providers.remove(&key).is_some();
        if removed && normalize_provider_id(&self.active_llm.provider_id) == key {
            self.active_llm = ActiveLlm::default();
        }
        removed
    }

    pub fn get_provider(&self, provider_id: &str) -> Option<&ProviderSetting> {
        self.providers.get(&normalize_provider_id(provider_id))
    }

    /// Ensures a cron state exists for `job_id`, creating a default one on
    /// first write if absent (§3 invariant: "for every cron job id, a cron
    /// state exists").
    pub fn ensure_cron_state(&mut self, job_id: &str) -> &mut CronJobState {
        self.cron_states.entry(job_id.to_string()).or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_include_default_cron_and_console_channel() {
        let s = State::with_defaults();
        assert!(s.cron_specs.contains_key(DEFAULT_CRON_JOB_ID));
        assert!(s.cron_specs[DEFAULT_CRON_JOB_ID].is_system_default());
        assert!(s.cron_states.contains_key(DEFAULT_CRON_JOB_ID));
        assert_eq!(
            s.channels["console"]["enabled"],
            Value::Bool(true)
        );
    }

    #[test]
    fn deleting_chat_deletes_history() {
        let mut s = State::default();
        let chat = Chat::new("sess", "user", "console");
        s.histories.insert(chat.id.clone(), vec![RuntimeMessage::text(Role::User, "hi")]);
        let id = chat.id.clone();
        s.chats.insert(id.clone(), chat);
        assert!(s.delete_chat(&id));
        assert!(!s.histories.contains_key(&id));
    }

    #[test]
    fn deleting_active_provider_clears_active_llm() {
        let mut s = State::default();
        s.providers.insert("openai".to_string(), ProviderSetting::default());
        s.active_llm = ActiveLlm { provider_id: "OpenAI".to_string(), model: "gpt-4o".to_string() };
        assert!(s.delete_provider("OpenAI"));
        assert!(s.active_llm.is_empty());
    }

    #[test]
    fn provider_ids_are_case_insensitive() {
        let mut s = State::default();
        s.providers.insert(normalize_provider_id("OpenAI"), ProviderSetting::default());
        assert!(s.get_provider("  OPENAI ").is_some());
    }

    #[test]
    fn paused_cron_state_normalizes_next_run_to_none() {
        let mut st = CronJobState {
            next_run_at: Some(chrono::Utc::now()),
            paused: true,
            ..Default::default()
        };
        st.normalize();
        assert!(st.next_run_at.is_none());
    }

    #[test]
    fn legacy_paused_status_normalizes_to_paused_flag() {
        let mut st = CronJobState {
            last_status: Some(CronRunStatus::Paused),
            next_run_at: Some(chrono::Utc::now()),
            ..Default::default()
        };
        st.normalize();
        assert!(st.paused);
        assert!(st.next_run_at.is_none());
    }

    #[test]
    fn ensure_cron_state_creates_default_when_absent() {
        let mut s = State::default();
        assert!(s.cron_states.is_empty());
        s.ensure_cron_state("job-1");
        assert!(s.cron_states.contains_key("job-1"));
    }

    #[test]
    fn state_round_trips_through_json() {
        let s = State::with_defaults();
        let json = serde_json::to_string(&s).unwrap();
        let back: State = serde_json::from_str(&json).unwrap();
        assert_eq!(s, back);
    }
}
