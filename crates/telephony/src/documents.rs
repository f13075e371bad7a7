//! Voice markup documents returned to the provider from webhook handlers.
//! The provider reads the document top to bottom: speak, gather, hang up.

/// Builder for a voice response document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResponseDocument {
    verbs: Vec<Verb>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Verb {
    Say { text: String },
    Gather { action: String, timeout_secs: u32, prompt: Option<String> },
    Hangup,
}

impl ResponseDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn say(mut self, text: impl Into<String>) -> Self {
        self.verbs.push(Verb::Say { text: text.into() });
        self
    }

    /// Listen for speech and post the transcription to `action`. An optional
    /// prompt is spoken inside the gather so the lead can interrupt it.
    pub fn gather_speech(
        mut self,
        action: impl Into<String>,
        timeout_secs: u32,
        prompt: Option<String>,
    ) -> Self {
        self.verbs.push(Verb::Gather { action: action.into(), timeout_secs, prompt });
        self
    }

    pub fn hangup(mut self) -> Self {
        self.verbs.push(Verb::Hangup);
        self
    }

    pub fn to_xml(&self) -> String {
        let mut output = String::from(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        output.push_str("<Response>");
        for verb in &self.verbs {
            match verb {
                Verb::Say { text } => {
                    output.push_str("<Say>");
                    output.push_str(&escape_xml(text));
                    output.push_str("</Say>");
                }
                Verb::Gather { action, timeout_secs, prompt } => {
                    output.push_str(&format!(
                        r#"<Gather input="speech" action="{}" timeout="{}">"#,
                        escape_xml(action),
                        timeout_secs
                    ));
                    if let Some(prompt) = prompt {
                        output.push_str("<Say>");
                        output.push_str(&escape_xml(prompt));
                        output.push_str("</Say>");
                    }
                    output.push_str("</Gather>");
                }
                Verb::Hangup => output.push_str("<Hangup/>"),
            }
        }
        output.push_str("</Response>");
        output
    }

    /// Speak a line, then listen for the lead's reply.
    pub fn speak_and_listen(text: impl Into<String>, action: impl Into<String>, timeout_secs: u32) -> Self {
        Self::new().say(text).gather_speech(action, timeout_secs, None)
    }

    /// Speak a final line and end the call.
    pub fn speak_and_hangup(text: impl Into<String>) -> Self {
        Self::new().say(text).hangup()
    }

    /// Returned when the handler cannot serve the call at all; the provider
    /// still gets a well-formed document.
    pub fn apology_hangup() -> Self {
        Self::speak_and_hangup("I'm sorry, we're unable to continue this call right now. Goodbye.")
    }
}

fn escape_xml(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => output.push_str("&amp;"),
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            '"' => output.push_str("&quot;"),
            '\'' => output.push_str("&apos;"),
            other => output.push(other),
        }
    }
    output
}
