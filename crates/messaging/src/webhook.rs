use serde::Deserialize;

const WHATSAPP_PREFIX: &str = "whatsapp:";

/// Form payload Twilio posts for an inbound WhatsApp message.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct InboundMessage {
    #[serde(rename = "From", default)]
    pub from: String,
    #[serde(rename = "Body", default)]
    pub body: String,
    #[serde(rename = "ProfileName", default)]
    pub profile_name: Option<String>,
}

impl InboundMessage {
    /// Sender address without the channel prefix.
    pub fn sender(&self) -> &str {
        strip_channel_prefix(&self.from)
    }

    pub fn has_sender(&self) -> bool {
        !self.sender().trim().is_empty()
    }
}

pub fn strip_channel_prefix(address: &str) -> &str {
    let trimmed = address.trim();
    match trimmed.get(..WHATSAPP_PREFIX.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(WHATSAPP_PREFIX) => {
            &trimmed[WHATSAPP_PREFIX.len()..]
        }
        _ => trimmed,
    }
}

/// Adds `whatsapp:` and a leading `+` when missing.
pub fn whatsapp_address(number: &str) -> String {
    let bare = strip_channel_prefix(number);
    if bare.starts_with('+') {
        format!("{WHATSAPP_PREFIX}{bare}")
    } else {
        format!("{WHATSAPP_PREFIX}+{bare}")
    }
}

/// TwiML document answering the webhook; an empty body sends nothing.
pub fn twiml_reply(body: &str) -> String {
    if body.trim().is_empty() {
        return r#"<?xml version="1.0" encoding="UTF-8"?><Response></Response>"#.to_string();
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><Response><Message>{}</Message></Response>"#,
        escape_xml(body)
    )
}

fn escape_xml(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::{strip_channel_prefix, twiml_reply, whatsapp_address, InboundMessage};

    #[test]
    fn sender_drops_the_channel_prefix() {
        let message = InboundMessage {
            from: "whatsapp:+5215512345678".to_string(),
            body: "hola".to_string(),
            profile_name: None,
        };
        assert_eq!(message.sender(), "+5215512345678");
        assert!(message.has_sender());
        assert_eq!(strip_channel_prefix("WhatsApp:+1"), "+1");
        assert!(!InboundMessage::default().has_sender());
    }

    #[test]
    fn addresses_gain_prefix_and_plus_once() {
        assert_eq!(whatsapp_address("5215512345678"), "whatsapp:+5215512345678");
        assert_eq!(whatsapp_address("+5215512345678"), "whatsapp:+5215512345678");
        assert_eq!(whatsapp_address("whatsapp:+5215512345678"), "whatsapp:+5215512345678");
    }

    #[test]
    fn reply_is_escaped_xml() {
        let xml = twiml_reply("Total <estimado> & \"neto\"");
        assert!(xml.contains("<Message>Total &lt;estimado&gt; &amp; &quot;neto&quot;</Message>"));
        assert!(xml.starts_with("<?xml"));
    }

    #[test]
    fn blank_reply_is_an_empty_response() {
        assert!(twiml_reply("  ").ends_with("<Response></Response>"));
    }
}
