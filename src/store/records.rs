use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    Uploaded,
    Generated,
}

/// One saved image reference. Serialized field names match the browser-side
/// `viralityAppImages` blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredImageRecord {
    pub url: String,
    pub prompt: String,
    #[serde(rename = "type")]
    pub kind: ImageKind,
    pub timestamp: String,
    pub id: String,
}
