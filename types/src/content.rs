/// Inline binary payload, base64 encoded, tagged with its mime type.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    mime_type: String,
    data: String,
}

impl Blob {
    pub fn new(mime_type: &str, data: String) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            data,
        }
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn is_audio(&self) -> bool {
        self.mime_type.starts_with("audio/")
    }
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    inline_data: Option<Blob>,
}

impl Part {
    pub fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            inline_data: None,
        }
    }

    pub fn inline(blob: Blob) -> Self {
        Self {
            text: None,
            inline_data: Some(blob),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn inline_data(&self) -> Option<&Blob> {
        self.inline_data.as_ref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Content {
    /// "user" or "model"; omitted for system instructions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

impl Content {
    pub fn new(role: Option<&str>, parts: Vec<Part>) -> Self {
        Self {
            role: role.map(str::to_string),
            parts,
        }
    }

    pub fn user_text(text: &str) -> Self {
        Self::new(Some("user"), vec![Part::text(text)])
    }

    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }
}
