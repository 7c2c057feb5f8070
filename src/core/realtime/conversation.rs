//! Conversation reconstruction.
//!
//! The remote service streams a conversation as independent events keyed by
//! item id: creation, transcription results, deltas and terminal events. This
//! module folds them back into one text per logical turn.
//!
//! Each item moves through `Unseen -> Pending -> Streaming -> Complete`.
//! Events may arrive without a prior creation event (deltas first) and in any
//! order relative to commit or speech detection events.

use std::collections::HashMap;
use tracing::{debug, trace};

use super::base::ItemRole;

/// Text shown for captured user audio until its transcript arrives.
pub const TRANSCRIBING_PLACEHOLDER: &str = "Transcribing...";

/// Text shown when transcription of user audio failed.
pub const TRANSCRIPTION_FAILED_TEXT: &str = "(transcription failed)";

/// Where an item's text comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    /// Transcript of spoken audio (user or assistant)
    Transcript,
    /// Streamed assistant text
    Text,
    /// Typed user message
    Message,
}

/// Reconstruction state of a known item. Unknown ids are implicitly unseen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemState {
    /// Created with audio, transcript not yet available
    Pending,
    /// Receiving deltas
    Streaming,
    /// Final text known
    Complete,
}

/// One logical turn of the conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationItem {
    pub id: String,
    pub role: ItemRole,
    pub kind: ItemKind,
    pub state: ItemState,
    pub text: String,
    /// Complete with a transcript taken from the creation event. The first
    /// transcription result may still replace it once.
    pub provisional: bool,
}

impl ConversationItem {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.state == ItemState::Complete
    }
}

/// Content carried by a creation event, reduced to what reconstruction needs.
#[derive(Debug, Clone, PartialEq)]
pub enum CreatedContent {
    /// Audio content, with its transcript when the server already has one
    Audio { transcript: Option<String> },
    /// Text content
    Text(String),
    /// Nothing displayable (function calls, empty items)
    Other,
}

/// Input to the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemEvent {
    Created {
        item_id: String,
        role: ItemRole,
        content: CreatedContent,
    },
    TranscriptionCompleted {
        item_id: String,
        transcript: String,
    },
    TranscriptionFailed {
        item_id: String,
    },
    Delta {
        item_id: String,
        kind: ItemKind,
        delta: String,
    },
    Done {
        item_id: String,
        kind: ItemKind,
        final_text: Option<String>,
    },
    /// Typed message sent by this client
    LocalMessage {
        item_id: String,
        text: String,
    },
}

/// A change to report to the display.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemChange {
    pub item_id: String,
    pub role: ItemRole,
    pub text: String,
    pub is_final: bool,
}

/// Conversation items keyed by id, in first-seen order.
#[derive(Debug, Default)]
pub struct Conversation {
    items: HashMap<String, ConversationItem>,
    order: Vec<String>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, item_id: &str) -> Option<&ConversationItem> {
        self.items.get(item_id)
    }

    /// Items in the order they were first seen.
    pub fn items(&self) -> impl Iterator<Item = &ConversationItem> {
        self.order.iter().filter_map(|id| self.items.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.order.clear();
    }

    /// Apply one event. Returns the change to display, if any.
    pub fn apply(&mut self, event: ItemEvent) -> Option<ItemChange> {
        match event {
            ItemEvent::Created {
                item_id,
                role,
                content,
            } => self.on_created(item_id, role, content),
            ItemEvent::TranscriptionCompleted {
                item_id,
                transcript,
            } => self.on_transcription_completed(item_id, transcript),
            ItemEvent::TranscriptionFailed { item_id } => self.on_transcription_failed(item_id),
            ItemEvent::Delta {
                item_id,
                kind,
                delta,
            } => self.on_delta(item_id, kind, delta),
            ItemEvent::Done {
                item_id,
                kind,
                final_text,
            } => self.on_done(item_id, kind, final_text),
            ItemEvent::LocalMessage { item_id, text } => {
                if self.items.contains_key(&item_id) {
                    return None;
                }
                Some(self.insert(item_id, ItemRole::User, ItemKind::Message, ItemState::Complete, text))
            }
        }
    }

    fn on_created(
        &mut self,
        item_id: String,
        role: ItemRole,
        content: CreatedContent,
    ) -> Option<ItemChange> {
        if self.items.contains_key(&item_id) {
            // Deltas may precede creation; the streamed text wins
            trace!("Item {} already known, ignoring creation", item_id);
            return None;
        }

        match content {
            CreatedContent::Audio {
                transcript: Some(transcript),
            } if !transcript.is_empty() => {
                let change = self.insert(
                    item_id.clone(),
                    role,
                    ItemKind::Transcript,
                    ItemState::Complete,
                    transcript,
                );
                if let Some(item) = self.items.get_mut(&item_id) {
                    item.provisional = true;
                }
                Some(change)
            }
            CreatedContent::Audio { .. } => Some(self.insert(
                item_id,
                role,
                ItemKind::Transcript,
                ItemState::Pending,
                TRANSCRIBING_PLACEHOLDER.to_string(),
            )),
            CreatedContent::Text(text) if !text.is_empty() => Some(self.insert(
                item_id,
                role,
                ItemKind::Message,
                ItemState::Complete,
                text,
            )),
            CreatedContent::Text(_) | CreatedContent::Other => None,
        }
    }

    /// The transcription result replaces a placeholder, a stream in progress
    /// or a provisional creation transcript. Anything later is ignored.
    fn on_transcription_completed(
        &mut self,
        item_id: String,
        transcript: String,
    ) -> Option<ItemChange> {
        match self.items.get_mut(&item_id) {
            Some(item) => {
                if item.kind != ItemKind::Transcript {
                    return None;
                }
                if item.is_complete() && !item.provisional {
                    trace!("Ignoring late transcription for completed item {}", item_id);
                    return None;
                }
                let unchanged = item.is_complete() && item.text == transcript;
                item.state = ItemState::Complete;
                item.provisional = false;
                if unchanged {
                    return None;
                }
                item.text = transcript;
                Some(change(item))
            }
            None => Some(self.insert(
                item_id,
                ItemRole::User,
                ItemKind::Transcript,
                ItemState::Complete,
                transcript,
            )),
        }
    }

    fn on_transcription_failed(&mut self, item_id: String) -> Option<ItemChange> {
        match self.items.get_mut(&item_id) {
            Some(item) => {
                if item.kind != ItemKind::Transcript || item.is_complete() {
                    trace!("Ignoring transcription failure for item {}", item_id);
                    return None;
                }
                item.state = ItemState::Complete;
                item.text = TRANSCRIPTION_FAILED_TEXT.to_string();
                Some(change(item))
            }
            None => Some(self.insert(
                item_id,
                ItemRole::User,
                ItemKind::Transcript,
                ItemState::Complete,
                TRANSCRIPTION_FAILED_TEXT.to_string(),
            )),
        }
    }

    fn on_delta(&mut self, item_id: String, kind: ItemKind, delta: String) -> Option<ItemChange> {
        if delta.is_empty() {
            return None;
        }

        match self.items.get_mut(&item_id) {
            Some(item) => match item.state {
                ItemState::Complete => {
                    trace!("Ignoring delta for completed item {}", item_id);
                    None
                }
                ItemState::Pending => {
                    item.state = ItemState::Streaming;
                    item.text = delta;
                    Some(change(item))
                }
                ItemState::Streaming => {
                    item.text.push_str(&delta);
                    Some(change(item))
                }
            },
            None => {
                debug!("Delta for unseen item {}, starting stream", item_id);
                Some(self.insert(
                    item_id,
                    ItemRole::Assistant,
                    kind,
                    ItemState::Streaming,
                    delta,
                ))
            }
        }
    }

    fn on_done(
        &mut self,
        item_id: String,
        kind: ItemKind,
        final_text: Option<String>,
    ) -> Option<ItemChange> {
        match self.items.get_mut(&item_id) {
            Some(item) => match item.state {
                ItemState::Complete => None,
                ItemState::Streaming => {
                    // Accumulated deltas are authoritative
                    item.state = ItemState::Complete;
                    Some(change(item))
                }
                ItemState::Pending => {
                    item.state = ItemState::Complete;
                    if let Some(text) = final_text.filter(|t| !t.is_empty()) {
                        item.text = text;
                    }
                    Some(change(item))
                }
            },
            None => {
                let text = final_text.filter(|t| !t.is_empty())?;
                Some(self.insert(item_id, ItemRole::Assistant, kind, ItemState::Complete, text))
            }
        }
    }

    fn insert(
        &mut self,
        item_id: String,
        role: ItemRole,
        kind: ItemKind,
        state: ItemState,
        text: String,
    ) -> ItemChange {
        let item = ConversationItem {
            id: item_id.clone(),
            role,
            kind,
            state,
            text,
            provisional: false,
        };
        let result = change(&item);
        self.order.push(item_id.clone());
        self.items.insert(item_id, item);
        result
    }
}

fn change(item: &ConversationItem) -> ItemChange {
    ItemChange {
        item_id: item.id.clone(),
        role: item.role,
        text: item.text.clone(),
        is_final: item.is_complete(),
    }
}
