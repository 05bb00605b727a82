//! TwiML writer
//!
//! A small builder over `quick-xml` for the voice verbs the dialer emits.
//! Text and attribute values are escaped by the writer.

use std::io::Cursor;

use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("TwiML write error: {0}")]
pub struct TwimlError(String);

/// A `<Say>` verb.
#[derive(Debug, Clone, Default)]
pub struct Say {
    pub text: String,
    pub voice: Option<String>,
    pub language: Option<String>,
}

impl Say {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = Some(voice.into());
        self
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// A `<Number>` noun nested in `<Dial>`.
#[derive(Debug, Clone, Default)]
pub struct Number {
    pub number: String,
    pub attributes: Vec<(String, String)>,
}

impl Number {
    pub fn new(number: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            attributes: Vec::new(),
        }
    }

    pub fn attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attributes.push((name.to_string(), value.into()));
        self
    }
}

/// A `<Dial>` verb bridging to one number.
#[derive(Debug, Clone, Default)]
pub struct Dial {
    pub attributes: Vec<(String, String)>,
    pub number: Number,
}

impl Dial {
    pub fn new(number: Number) -> Self {
        Self {
            attributes: Vec::new(),
            number,
        }
    }

    pub fn attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attributes.push((name.to_string(), value.into()));
        self
    }
}

#[derive(Debug, Clone)]
enum Verb {
    Say(Say),
    Dial(Dial),
}

/// A `<Response>` document.
#[derive(Debug, Clone, Default)]
pub struct VoiceResponse {
    verbs: Vec<Verb>,
}

impl VoiceResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn say(mut self, say: Say) -> Self {
        self.verbs.push(Verb::Say(say));
        self
    }

    pub fn dial(mut self, dial: Dial) -> Self {
        self.verbs.push(Verb::Dial(dial));
        self
    }

    pub fn has_dial(&self) -> bool {
        self.verbs.iter().any(|verb| matches!(verb, Verb::Dial(_)))
    }

    /// Serialize to an XML document string.
    pub fn to_xml(&self) -> Result<String, TwimlError> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));

        write(
            &mut writer,
            Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
        )?;
        write(&mut writer, Event::Start(BytesStart::new("Response")))?;

        for verb in &self.verbs {
            match verb {
                Verb::Say(say) => write_say(&mut writer, say)?,
                Verb::Dial(dial) => write_dial(&mut writer, dial)?,
            }
        }

        write(&mut writer, Event::End(BytesEnd::new("Response")))?;

        String::from_utf8(writer.into_inner().into_inner()).map_err(|e| TwimlError(e.to_string()))
    }
}

fn write(writer: &mut Writer<Cursor<Vec<u8>>>, event: Event<'_>) -> Result<(), TwimlError> {
    writer
        .write_event(event)
        .map_err(|e| TwimlError(e.to_string()))
}

fn write_say(writer: &mut Writer<Cursor<Vec<u8>>>, say: &Say) -> Result<(), TwimlError> {
    let mut start = BytesStart::new("Say");
    if let Some(voice) = &say.voice {
        start.push_attribute(("voice", voice.as_str()));
    }
    if let Some(language) = &say.language {
        start.push_attribute(("language", language.as_str()));
    }

    write(writer, Event::Start(start))?;
    write(writer, Event::Text(BytesText::new(&say.text)))?;
    write(writer, Event::End(BytesEnd::new("Say")))
}

fn write_dial(writer: &mut Writer<Cursor<Vec<u8>>>, dial: &Dial) -> Result<(), TwimlError> {
    let mut start = BytesStart::new("Dial");
    for (name, value) in &dial.attributes {
        start.push_attribute((name.as_str(), value.as_str()));
    }
    write(writer, Event::Start(start))?;

    let mut number = BytesStart::new("Number");
    for (name, value) in &dial.number.attributes {
        number.push_attribute((name.as_str(), value.as_str()));
    }
    write(writer, Event::Start(number))?;
    write(writer, Event::Text(BytesText::new(&dial.number.number)))?;
    write(writer, Event::End(BytesEnd::new("Number")))?;

    write(writer, Event::End(BytesEnd::new("Dial")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn say_only_document() {
        let xml = VoiceResponse::new()
            .say(Say::new("Hello"))
            .to_xml()
            .unwrap();

        assert_eq!(
            xml,
            r#"<?xml version="1.0" encoding="UTF-8"?><Response><Say>Hello</Say></Response>"#
        );
    }

    #[test]
    fn dial_attributes_are_escaped() {
        let response = VoiceResponse::new().dial(
            Dial::new(Number::new("+919876543210").attr("statusCallback", "http://x/cb?a=1&b=2"))
                .attr("timeout", "60"),
        );
        assert!(response.has_dial());

        let xml = response.to_xml().unwrap();
        assert!(xml.contains(r#"<Dial timeout="60">"#));
        assert!(xml.contains(r#"statusCallback="http://x/cb?a=1&amp;b=2""#));
        assert!(xml.contains(">+919876543210</Number></Dial>"));
    }

    #[test]
    fn say_text_is_escaped() {
        let xml = VoiceResponse::new()
            .say(Say::new("Tom & Jerry <3").voice("alice"))
            .to_xml()
            .unwrap();
        assert!(xml.contains(r#"<Say voice="alice">Tom &amp; Jerry &lt;3</Say>"#));
    }
}
