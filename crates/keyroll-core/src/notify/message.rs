//! MIME assembly for the mail send API.

use crate::error::NotificationError;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use lettre::message::{Mailbox, Message, MultiPart, SinglePart, header::ContentType};

fn parse_mailbox(address: &str) -> Result<Mailbox, NotificationError> {
    address
        .parse::<Mailbox>()
        .map_err(|e| NotificationError::Message(format!("Invalid email address '{address}': {e}")))
}

/// Build a `multipart/mixed` message with a single HTML part.
pub fn build_message(
    from: &str,
    to: &str,
    subject: &str,
    html: &str,
) -> Result<Message, NotificationError> {
    Message::builder()
        .from(parse_mailbox(from)?)
        .to(parse_mailbox(to)?)
        .subject(subject)
        .multipart(
            MultiPart::mixed().singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_HTML)
                    .body(html.to_string()),
            ),
        )
        .map_err(|e| NotificationError::Message(e.to_string()))
}

/// RFC 5322 bytes of the message, URL-safe base64 encoded.
pub fn build_raw_message(
    from: &str,
    to: &str,
    subject: &str,
    html: &str,
) -> Result<String, NotificationError> {
    let message = build_message(from, to, subject, html)?;
    Ok(URL_SAFE.encode(message.formatted()))
}
