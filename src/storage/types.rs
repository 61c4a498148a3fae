//! Types for image uploads

/// An image picked by the user, not yet uploaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    /// Original file name, used for the extension
    pub file_name: String,

    /// Declared content type, e.g. `image/jpeg`
    pub content_type: String,

    pub bytes: Vec<u8>,
}

impl ImageUpload {
    pub fn new(file_name: &str, content_type: &str, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.to_string(),
            content_type: content_type.to_string(),
            bytes,
        }
    }

    /// File extension for the stored object, from the name or else the
    /// content type
    pub fn extension(&self) -> String {
        let from_name = std::path::Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()));
        if let Some(ext) = from_name {
            return ext.to_ascii_lowercase();
        }
        match self.content_type.split('/').nth(1) {
            Some("jpeg") => "jpg".to_string(),
            Some("svg+xml") => "svg".to_string(),
            Some(subtype) if !subtype.is_empty() => subtype.to_ascii_lowercase(),
            _ => "bin".to_string(),
        }
    }
}

/// Object folder inside the image bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFolder {
    Specimens,
    Profiles,
    Posts,
}

impl ImageFolder {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFolder::Specimens => "specimens",
            ImageFolder::Profiles => "profiles",
            ImageFolder::Posts => "posts",
        }
    }
}
