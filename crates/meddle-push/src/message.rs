//! Multicast message sent to the push provider.
//!
//! One message targets every registered device of a user and carries three
//! platform sub-payloads (web push, Android, APNs) with the same title, body
//! and data. On the wire it becomes one HTTP v1 `messages:send` body per
//! device token.

use std::collections::HashMap;

use meddle_types::NotificationPayload;
use serde::Serialize;

const ANDROID_COLOR: &str = "#4C51BF";
const WEBPUSH_VIBRATE: [u32; 3] = [200, 100, 200];
const APNS_PRIORITY_IMMEDIATE: &str = "10";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MulticastMessage {
    /// Addressed one at a time; see [`MulticastMessage::for_token`].
    #[serde(skip)]
    pub tokens: Vec<String>,
    pub notification: Notification,
    pub data: HashMap<String, String>,
    pub webpush: WebpushConfig,
    pub android: AndroidConfig,
    pub apns: ApnsConfig,
}

/// Body of one `messages:send` call.
#[derive(Debug, Serialize)]
pub struct SendRequest<'a> {
    pub message: TargetedMessage<'a>,
}

/// The shared content addressed to a single device.
#[derive(Debug, Serialize)]
pub struct TargetedMessage<'a> {
    pub token: &'a str,
    #[serde(flatten)]
    pub content: &'a MulticastMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebpushConfig {
    pub data: HashMap<String, String>,
    pub notification: WebpushNotification,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebpushNotification {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub vibrate: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AndroidConfig {
    pub data: HashMap<String, String>,
    pub notification: AndroidNotification,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AndroidNotification {
    pub title: String,
    pub body: String,
    pub color: String,
    pub click_action: String,
    pub default_sound: bool,
    pub default_vibrate_timings: bool,
    pub default_light_settings: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApnsConfig {
    pub headers: HashMap<String, String>,
    pub payload: ApnsPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApnsPayload {
    pub aps: Aps,
    /// Custom keys sit next to `aps` in an APNs payload.
    #[serde(flatten)]
    pub data: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Aps {
    pub alert: ApsAlert,
    pub sound: String,
    #[serde(rename = "category")]
    pub click_action: String,
    #[serde(rename = "content-available")]
    pub content_available: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApsAlert {
    pub title: String,
    pub body: String,
}

impl MulticastMessage {
    pub fn build(tokens: Vec<String>, payload: &NotificationPayload, icon: Option<&str>) -> Self {
        let icon = icon.map(str::to_string);

        let mut apns_headers = HashMap::new();
        apns_headers.insert("apns-priority".to_string(), APNS_PRIORITY_IMMEDIATE.to_string());

        Self {
            tokens,
            notification: Notification {
                title: payload.title.clone(),
                body: payload.body.clone(),
                image: icon.clone(),
            },
            data: payload.data.clone(),
            webpush: WebpushConfig {
                data: payload.data.clone(),
                notification: WebpushNotification {
                    title: payload.title.clone(),
                    body: payload.body.clone(),
                    icon,
                    vibrate: WEBPUSH_VIBRATE.to_vec(),
                },
            },
            android: AndroidConfig {
                data: payload.data.clone(),
                notification: AndroidNotification {
                    title: payload.title.clone(),
                    body: payload.body.clone(),
                    color: ANDROID_COLOR.to_string(),
                    click_action: payload.click_action.clone(),
                    default_sound: true,
                    default_vibrate_timings: true,
                    default_light_settings: true,
                },
            },
            apns: ApnsConfig {
                headers: apns_headers,
                payload: ApnsPayload {
                    aps: Aps {
                        alert: ApsAlert {
                            title: payload.title.clone(),
                            body: payload.body.clone(),
                        },
                        sound: "default".to_string(),
                        click_action: payload.click_action.clone(),
                        content_available: 1,
                    },
                    data: payload.data.clone(),
                },
            },
        }
    }

    pub fn for_token<'a>(&'a self, token: &'a str) -> SendRequest<'a> {
        SendRequest {
            message: TargetedMessage {
                token,
                content: self,
            },
        }
    }
}
