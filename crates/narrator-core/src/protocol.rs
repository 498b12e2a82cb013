//! Narrator wire protocol.
//!
//! Every frame in both directions is a plain WebSocket text frame. The client
//! sends either a liveness probe (`ping`, any case) or a photo encoded as a
//! `data:image/png;base64,...` URI. The server answers with the fixed strings
//! below, the public audio URL, and the narrative text.

/// Sent once, immediately after the connection is established.
pub const GREETING: &str =
    "Please click the \"Take Photo\" button to upload a webcam photo to Sir David!!";

/// Reply to a liveness probe.
pub const PONG: &str = "pong";

/// Sent after the photo is decoded and stored.
pub const ACKNOWLEDGED: &str =
    "Thankyou! Sir David has received your photo and is analysing it now. Please stand by...";

/// Sent when the analysis passed the refusal check and synthesis starts.
pub const GENERATING_AUDIO: &str = "Analysis complete, generating audio...";

/// The single client-visible failure outcome for a submitted photo.
pub const FAILURE: &str = "Oops, there was a problem -- please try again!";

/// Only sent when the malformed-input policy is `notify`.
pub const MALFORMED_INPUT: &str = "Sorry, that didn't look like a PNG photo -- please try again!";

const PING_TOKEN: &str = "ping";

/// Classified inbound text frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMessage<'a> {
    /// Liveness probe; answered with [`PONG`].
    Ping,
    /// Anything else. Handed to the image codec, which decides whether it is a photo.
    Submission(&'a str),
}

impl<'a> ClientMessage<'a> {
    pub fn classify(text: &'a str) -> Self {
        if text.eq_ignore_ascii_case(PING_TOKEN) {
            Self::Ping
        } else {
            Self::Submission(text)
        }
    }
}
