use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::util::Subscription;

/// Notification permission as reported by the platform.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PermissionState {
    /// The user has not decided yet.
    #[default]
    Default,
    Granted,
    Denied,
}

/// Payload displayed to the user when a notification is shown.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: Option<String>,
    pub body: Option<String>,
    pub image: Option<String>,
    pub icon: Option<String>,
}

/// Message delivered by the push channel.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub notification: Option<NotificationPayload>,
    pub data: Option<HashMap<String, String>>,
    pub from: Option<String>,
    pub collapse_key: Option<String>,
    pub message_id: Option<String>,
}

/// App state in which a message arrived.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageOrigin {
    /// App in the foreground: delivered to [`on_message`](crate::messaging::MessagingAdapter::on_message) streams.
    Foreground,
    /// App in the background: delivered to the background handler.
    Background,
    /// The message opened the app from a terminated state.
    Launch,
}

pub type MessageHandler = Arc<dyn Fn(MessagePayload) + Send + Sync + 'static>;

pub type MessageStream = Subscription<MessagePayload>;

pub type TokenStream = Subscription<String>;
