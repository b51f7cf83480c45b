//! Call-control (TwiML) builders.
//!
//! These documents tell the telephony provider what to do with a call:
//! open a bidirectional media stream to the relay, transfer to a human,
//! or take a voicemail.

/// Escapes a value for use inside an XML attribute.
fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Call-entry instructions: connect the call to the media-stream
/// endpoint, carry the caller identity into the stream handshake as a
/// custom parameter, and name the action address the provider invokes
/// when the stream ends (coordinated teardown rather than silent drop).
pub fn connect_stream(ws_url: &str, action_url: &str, caller_number: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Connect action="{action}">
    <Stream url="{stream}">
      <Parameter name="callerNumber" value="{caller}" />
    </Stream>
  </Connect>
</Response>"#,
        action = escape_attr(action_url),
        stream = escape_attr(ws_url),
        caller = escape_attr(caller_number),
    )
}

/// Transfer instructions for human escalation.
pub fn transfer(phone_number: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Say>Please hold while I transfer your call.</Say>
  <Dial>{}</Dial>
</Response>"#,
        escape_attr(phone_number)
    )
}

/// Voicemail prompt with transcription enabled.
pub fn voicemail(recording_url: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Say>Please leave a message after the beep.</Say>
  <Record action="{}" maxLength="120" transcribe="true" />
</Response>"#,
        escape_attr(recording_url)
    )
}

/// Empty response acknowledging a provider callback.
pub fn empty() -> String {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<Response></Response>"#
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_stream_carries_caller_and_action() {
        let twiml = connect_stream(
            "wss://relay.example.com/voice/media-stream",
            "https://relay.example.com/voice/stream-ended",
            "+33600000000",
        );
        assert!(twiml.contains(r#"<Stream url="wss://relay.example.com/voice/media-stream">"#));
        assert!(twiml.contains(r#"<Connect action="https://relay.example.com/voice/stream-ended">"#));
        assert!(twiml.contains(r#"<Parameter name="callerNumber" value="+33600000000" />"#));
    }

    #[test]
    fn attribute_values_are_escaped() {
        let twiml = connect_stream("wss://h/ws?a=1&b=2", "https://h/end", "<caller>");
        assert!(twiml.contains("a=1&amp;b=2"));
        assert!(twiml.contains("&lt;caller&gt;"));
    }

    #[test]
    fn transfer_dials_the_number() {
        let twiml = transfer("+33123456789");
        assert!(twiml.contains("<Dial>+33123456789</Dial>"));
    }

    #[test]
    fn voicemail_records_with_transcription() {
        let twiml = voicemail("https://relay.example.com/voicemail");
        assert!(twiml.contains(r#"action="https://relay.example.com/voicemail""#));
        assert!(twiml.contains(r#"transcribe="true""#));
    }
}
