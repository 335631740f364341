pub mod hash;
pub mod records;
pub mod registry;
pub mod storage;

pub use hash::digest_parts;
pub use records::{ImageKind, StoredImageRecord};
pub use registry::{IMAGE_REGISTRY_KEY, ImageRegistry, UPLOADED_PROMPT};
pub use storage::{KeyValueStore, LocalFileStorage, MemoryStorage};

pub const UPLOADS_PREFIX: &str = "uploads/";

pub fn get_extension_from_mime_type(mime_type: &str) -> &'static str {
    match mime_type.to_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/bmp" => "bmp",
        _ => "bin",
    }
}
