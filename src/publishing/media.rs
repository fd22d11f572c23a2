use crate::error::{AppError, AppResult};

pub const FILE_TYPE_IMAGE: &str = "image";
pub const FILE_TYPE_VIDEO: &str = "video";

/// Trims tags, drops blanks and keeps the first occurrence of each tag.
pub fn normalize_intent_tags<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut normalized: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.as_ref().trim();
        if !tag.is_empty() && !normalized.iter().any(|existing| existing == tag) {
            normalized.push(tag.to_string());
        }
    }
    normalized
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaKind {
    pub file_type: String,
    pub mime_type: Option<String>,
}

/// Settles `file_type` and `mime_type` for a new asset. An explicit file type
/// wins; otherwise it comes from the MIME type, guessed from the file name
/// when the client sent none.
pub fn resolve_media_kind(
    file_name: &str,
    file_type: Option<&str>,
    mime_type: Option<&str>,
) -> AppResult<MediaKind> {
    let mime_type = mime_type
        .map(|mime| mime.trim().to_ascii_lowercase())
        .filter(|mime| !mime.is_empty())
        .or_else(|| {
            mime_guess::from_path(file_name)
                .first_raw()
                .map(str::to_string)
        });

    let file_type = match file_type.map(str::trim).filter(|value| !value.is_empty()) {
        Some(explicit) => {
            let explicit = explicit.to_ascii_lowercase();
            if explicit != FILE_TYPE_IMAGE && explicit != FILE_TYPE_VIDEO {
                return Err(AppError::validation("file_type must be 'image' or 'video'"));
            }
            explicit
        }
        None => mime_type
            .as_deref()
            .and_then(top_level_type)
            .ok_or_else(|| {
                AppError::validation(
                    "file_type is required when it cannot be derived from the file",
                )
            })?
            .to_string(),
    };

    Ok(MediaKind {
        file_type,
        mime_type,
    })
}

fn top_level_type(mime: &str) -> Option<&'static str> {
    match mime.split('/').next() {
        Some("image") => Some(FILE_TYPE_IMAGE),
        Some("video") => Some(FILE_TYPE_VIDEO),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_trimmed_and_deduplicated_in_order() {
        let tags = normalize_intent_tags(["  after", "before", "", "after ", "hero", "   "]);
        assert_eq!(tags, vec!["after", "before", "hero"]);
    }

    #[test]
    fn file_type_is_guessed_from_the_name() {
        let kind = resolve_media_kind("kitchen-sink.JPG", None, None).unwrap();
        assert_eq!(kind.file_type, "image");
        assert_eq!(kind.mime_type.as_deref(), Some("image/jpeg"));

        let kind = resolve_media_kind("walkthrough.mp4", None, None).unwrap();
        assert_eq!(kind.file_type, "video");
    }

    #[test]
    fn explicit_values_win() {
        let kind = resolve_media_kind("clip.bin", Some("Video"), Some("video/quicktime")).unwrap();
        assert_eq!(kind.file_type, "video");
        assert_eq!(kind.mime_type.as_deref(), Some("video/quicktime"));
    }

    #[test]
    fn unknown_or_unsupported_types_are_rejected() {
        assert!(resolve_media_kind("notes.pdf", None, None).is_err());
        assert!(resolve_media_kind("mystery", None, None).is_err());
        assert!(resolve_media_kind("a.png", Some("audio"), None).is_err());
    }
}
