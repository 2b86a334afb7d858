//! NETCONF reply handling on top of quick-xml.
//!
//! The extractor works on text, one tag per line. Devices do not all
//! pretty-print their replies, so `<data>` is re-emitted here with a
//! fixed two-space indentation before any line-based processing happens.

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::Event;

use crate::error::VerifyError;

/// Capabilities and session id announced in a server `<hello>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerHello {
    pub session_id: Option<String>,
    pub capabilities: Vec<String>,
}

fn reader(text: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);
    reader
}

fn malformed(err: impl std::fmt::Display) -> VerifyError {
    VerifyError::MalformedResponse(err.to_string())
}

/// Parses the server `<hello>` message.
pub fn parse_hello(text: &str) -> Result<ServerHello, VerifyError> {
    let mut reader = reader(text);
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut hello = ServerHello::default();
    let mut seen_hello = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if e.local_name().as_ref() == b"hello" {
                    seen_hello = true;
                }
                stack.push(e.local_name().as_ref().to_vec());
            }
            Event::End(_) => {
                stack.pop();
            }
            Event::Text(e) => {
                let text = e.unescape().map_err(malformed)?.trim().to_string();
                match stack.last().map(|v| v.as_slice()) {
                    Some(b"capability") => hello.capabilities.push(text),
                    Some(b"session-id") => hello.session_id = Some(text),
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !seen_hello {
        return Err(VerifyError::MalformedResponse(
            "server message is not a <hello>".to_string(),
        ));
    }
    Ok(hello)
}

/// Fails with [`VerifyError::RpcError`] if the reply carries any `<rpc-error>`.
///
/// The error text is built from each error's `error-message`, falling back
/// to its `error-tag`.
pub fn check_reply(reply: &str) -> Result<(), VerifyError> {
    let mut reader = reader(reply);
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut errors = Vec::new();
    let mut tag = None;
    let mut message = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if e.local_name().as_ref() == b"rpc-error" {
                    tag = None;
                    message = None;
                }
                stack.push(e.local_name().as_ref().to_vec());
            }
            Event::End(e) => {
                stack.pop();
                if e.local_name().as_ref() == b"rpc-error" {
                    let detail = message
                        .take()
                        .or_else(|| tag.take())
                        .unwrap_or_else(|| "unspecified rpc-error".to_string());
                    errors.push(detail);
                }
            }
            Event::Text(e) => {
                let text = e.unescape().map_err(malformed)?.trim().to_string();
                match stack.last().map(|v| v.as_slice()) {
                    Some(b"error-message") => message = Some(text),
                    Some(b"error-tag") => tag = Some(text),
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(VerifyError::RpcError(errors.join("; ")))
    }
}

/// Extracts the `<data>` element of a get-config reply, one tag per line.
///
/// The first line is the `<data>` start tag and the last is its end tag.
/// Text content stays on the line of its element.
pub fn data_document(reply: &str) -> Result<String, VerifyError> {
    check_reply(reply)?;

    let mut reader = reader(reply);
    let mut writer: Option<Writer<Vec<u8>>> = None;
    let mut depth = 0usize;

    loop {
        let event = reader.read_event()?;
        if let Some(w) = writer.as_mut() {
            match &event {
                Event::Start(_) => depth += 1,
                Event::End(_) => depth = depth.saturating_sub(1),
                Event::Eof => {
                    return Err(VerifyError::MalformedResponse(
                        "unterminated <data> element".to_string(),
                    ));
                }
                _ => {}
            }
            match event {
                Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
                other => w.write_event(other)?,
            }
            if depth == 0 {
                break;
            }
            continue;
        }

        match event {
            Event::Start(e) if e.local_name().as_ref() == b"data" => {
                let mut w = Writer::new_with_indent(Vec::new(), b' ', 2);
                w.write_event(Event::Start(e))?;
                depth = 1;
                writer = Some(w);
            }
            Event::Empty(e) if e.local_name().as_ref() == b"data" => {
                let mut w = Writer::new(Vec::new());
                w.write_event(Event::Empty(e))?;
                return String::from_utf8(w.into_inner()).map_err(malformed);
            }
            Event::Eof => {
                return Err(VerifyError::MalformedResponse(
                    "reply carries no <data> element".to_string(),
                ));
            }
            _ => {}
        }
    }

    let bytes = writer.map(|w| w.into_inner()).unwrap_or_default();
    String::from_utf8(bytes).map_err(malformed)
}
