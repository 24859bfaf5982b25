//! Mapping from protocol messages to wacli sync events.

use chrono::{DateTime, TimeZone, Utc};
use wacli_core::event::{HistoryBatch, HistoryConversation, HistoryMessage, LiveMessage};
use wacli_core::media::MediaDescriptor;
use waproto::whatsapp as wa;

/// Unwrap nested wrappers (device_sent, ephemeral, view_once).
fn unwrap_message(msg: &wa::Message) -> &wa::Message {
    msg.device_sent_message
        .as_ref()
        .and_then(|d| d.message.as_deref())
        .or_else(|| {
            msg.ephemeral_message
                .as_ref()
                .and_then(|e| e.message.as_deref())
        })
        .or_else(|| {
            msg.view_once_message
                .as_ref()
                .and_then(|v| v.message.as_deref())
        })
        .unwrap_or(msg)
}

/// Copy the shared media fields out of any of the downloadable message kinds.
macro_rules! descriptor {
    ($m:expr, $kind:literal, $filename:expr) => {
        MediaDescriptor {
            media_type: $kind.to_string(),
            filename: $filename,
            url: $m.url.clone().unwrap_or_default(),
            direct_path: $m.direct_path.clone().unwrap_or_default(),
            mime_type: $m.mimetype.clone().unwrap_or_default(),
            media_key: $m.media_key.clone().unwrap_or_default(),
            file_sha256: $m.file_sha256.clone().unwrap_or_default(),
            file_enc_sha256: $m.file_enc_sha256.clone().unwrap_or_default(),
            file_length: $m.file_length.unwrap_or(0),
        }
    };
}

/// Text content and media metadata of a message.
fn extract(msg: &wa::Message) -> (String, Option<MediaDescriptor>) {
    let inner = unwrap_message(msg);

    let text = inner
        .conversation
        .clone()
        .or_else(|| {
            inner
                .extended_text_message
                .as_ref()
                .and_then(|e| e.text.clone())
        })
        .unwrap_or_default();

    if let Some(img) = inner.image_message.as_deref() {
        let caption = img.caption.clone().unwrap_or_default();
        return (caption, Some(descriptor!(img, "image", String::new())));
    }
    if let Some(video) = inner.video_message.as_deref() {
        let caption = video.caption.clone().unwrap_or_default();
        return (caption, Some(descriptor!(video, "video", String::new())));
    }
    if let Some(audio) = inner.audio_message.as_deref() {
        return (
            "[Audio]".to_string(),
            Some(descriptor!(audio, "audio", String::new())),
        );
    }
    if let Some(doc) = inner.document_message.as_deref() {
        let filename = doc
            .file_name
            .clone()
            .or_else(|| doc.title.clone())
            .unwrap_or_default();
        let caption = doc.caption.clone().unwrap_or_default();
        return (caption, Some(descriptor!(doc, "document", filename)));
    }
    if let Some(sticker) = inner.sticker_message.as_deref() {
        return (
            String::new(),
            Some(descriptor!(sticker, "sticker", String::new())),
        );
    }

    (text, None)
}

pub(super) fn live_message(
    msg: &wa::Message,
    info: &wacore::types::message::MessageInfo,
) -> LiveMessage {
    let (content, media) = extract(msg);
    let push_name = Some(info.push_name.trim())
        .filter(|p| !info.source.is_from_me && !p.is_empty() && *p != "-")
        .map(str::to_string);
    LiveMessage {
        id: info.id.clone(),
        chat_jid: info.source.chat.to_string(),
        sender: info.source.sender.user.clone(),
        content,
        timestamp: info.timestamp,
        is_from_me: info.source.is_from_me,
        push_name,
        media,
    }
}

fn from_unix(secs: u64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs as i64, 0)
        .single()
        .unwrap_or_default()
}

pub(super) fn history_batch(sync: &wa::HistorySync) -> HistoryBatch {
    let conversations = sync
        .conversations
        .iter()
        .map(|conv| {
            let chat_jid = conv.id.clone();
            let messages = conv
                .messages
                .iter()
                .filter_map(|hm| hm.message.as_ref())
                .filter_map(|web| history_message(web, &chat_jid))
                .collect();
            HistoryConversation {
                jid: chat_jid,
                name: conv.name.clone().filter(|n| !n.trim().is_empty()),
                messages,
            }
        })
        .collect();
    HistoryBatch { conversations }
}

/// Skips entries without an id or a message body.
fn history_message(web: &wa::WebMessageInfo, chat_jid: &str) -> Option<HistoryMessage> {
    let key = &web.key;
    let id = key.id.clone().filter(|id| !id.is_empty())?;
    let msg = web.message.as_ref()?;
    let is_from_me = key.from_me.unwrap_or(false);
    // Group members are named by participant, direct chats by the remote JID.
    let sender = key
        .participant
        .clone()
        .filter(|p| !p.is_empty())
        .or_else(|| key.remote_jid.clone())
        .unwrap_or_else(|| chat_jid.to_string());

    let (content, media) = extract(msg);
    Some(HistoryMessage {
        id,
        sender,
        content,
        timestamp: from_unix(web.message_timestamp.unwrap_or(0)),
        is_from_me,
        media,
    })
}
