//! Helpers for WhatsApp JIDs (`{user}@{server}`).

/// Server of individual accounts.
pub const USER_SERVER: &str = "s.whatsapp.net";
/// Server of group chats.
pub const GROUP_SERVER: &str = "g.us";
/// Server of broadcast lists and status updates.
pub const BROADCAST_SERVER: &str = "broadcast";

/// Whether the JID names a group chat.
pub fn is_group(jid: &str) -> bool {
    server(jid) == Some(GROUP_SERVER)
}

/// Whether the JID names a broadcast list.
pub fn is_broadcast(jid: &str) -> bool {
    server(jid) == Some(BROADCAST_SERVER)
}

/// The part after `@`, if any.
pub fn server(jid: &str) -> Option<&str> {
    jid.split_once('@').map(|(_, server)| server)
}

/// The part before `@` (the phone number for individuals); the whole input if there is no `@`.
pub fn user(jid: &str) -> &str {
    jid.split_once('@').map(|(user, _)| user).unwrap_or(jid)
}

/// Turn a send recipient into a chat JID: bare phone numbers become individual JIDs.
pub fn normalize_recipient(recipient: &str) -> String {
    let recipient = recipient.trim();
    if recipient.contains('@') {
        recipient.to_string()
    } else {
        format!("{recipient}@{USER_SERVER}")
    }
}
