use thiserror::Error;

/// Top-level error type for wacli.
#[derive(Debug, Error)]
pub enum WacliError {
    /// Caller supplied an empty or malformed argument. Rejected before any I/O.
    #[error("{0}")]
    Validation(String),

    /// No matching message or chat.
    #[error("{0}")]
    NotFound(String),

    /// A message ID matched rows in more than one chat and no chat was given.
    #[error("multiple messages found with ID {id}; specify chat JID")]
    AmbiguousMessage { id: String, matches: usize },

    /// The message exists but lacks media type, direct path, or media key.
    #[error("message {0} has no downloadable media")]
    NoDownloadableMedia(String),

    /// Error from the WhatsApp protocol layer (connection, auth, media fetch).
    #[error("protocol error: {message}")]
    Protocol {
        message: String,
        /// HTTP-equivalent status code, when the transport reported one.
        status: Option<u16>,
    },

    /// Storage fault (disk, locking, schema).
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// A bounded operation ran out of time.
    #[error("timed out: {0}")]
    Timeout(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Status codes the media CDN answers with once a blob has expired or was deleted.
const EXPIRED_MEDIA_STATUSES: [u16; 3] = [403, 404, 410];

impl WacliError {
    /// Shorthand for a protocol error without a status code.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
            status: None,
        }
    }

    /// Shorthand for a protocol error carrying an HTTP-equivalent status.
    pub fn protocol_status(message: impl Into<String>, status: u16) -> Self {
        Self::Protocol {
            message: message.into(),
            status: Some(status),
        }
    }

    /// Protocol error whose status code, if any, is read from the message text.
    pub fn protocol_from_text(message: impl Into<String>) -> Self {
        let message = message.into();
        let status = status_in_text(&message);
        Self::Protocol { message, status }
    }

    /// Whether this is an expired/deleted-media failure (403/404/410).
    ///
    /// Transports do not always surface a structured status, so the message
    /// text is also searched for one.
    pub fn is_expired_media(&self) -> bool {
        match self {
            Self::Protocol { status, message } => status
                .or_else(|| status_in_text(message))
                .is_some_and(|s| EXPIRED_MEDIA_STATUSES.contains(&s)),
            _ => false,
        }
    }

    /// Whether this is a not-found condition (distinct from storage faults).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Find an HTTP status in text such as `status code 404`, `status: 410`, or `HTTP 403`.
fn status_in_text(text: &str) -> Option<u16> {
    let words: Vec<&str> = text
        .split(|c: char| c.is_whitespace() || c == ':' || c == '=' || c == ',')
        .filter(|w| !w.is_empty())
        .collect();
    words.windows(2).find_map(|pair| {
        let marker = pair[0].to_ascii_lowercase();
        if !(marker.contains("status") || marker == "code" || marker.starts_with("http")) {
            return None;
        }
        let digits = pair[1].trim_matches(|c: char| !c.is_ascii_digit());
        match digits.parse::<u16>() {
            Ok(code) if (100..600).contains(&code) && digits.len() == 3 => Some(code),
            _ => None,
        }
    })
}
