//! Local `data:` URL previews of selected images.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::ImageFile;

/// Renders `file` as a `data:<mime>;base64,...` URL. Empty files have no preview.
pub fn render_preview(file: &ImageFile) -> Option<String> {
    if file.bytes.is_empty() {
        return None;
    }
    Some(format!(
        "data:{};base64,{}",
        file.content_type(),
        STANDARD.encode(&file.bytes)
    ))
}

/// Splits a base64 `data:` URL into its media type and decoded bytes.
pub fn decode_data_url(data_url: &str) -> Option<(String, Vec<u8>)> {
    let rest = data_url.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let media_type = header.strip_suffix(";base64")?;
    let bytes = STANDARD.decode(payload.as_bytes()).ok()?;
    Some((media_type.to_string(), bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_data_url_with_guessed_mime_type() {
        let file = ImageFile::new("photo.png", None, vec![0x89, b'P', b'N', b'G']);
        let data_url = render_preview(&file).expect("preview");
        assert_eq!(data_url, "data:image/png;base64,iVBORw==");
    }

    #[test]
    fn explicit_mime_type_wins_over_file_name() {
        let file = ImageFile::new("photo.bin", Some("image/webp".to_string()), vec![1, 2, 3]);
        let data_url = render_preview(&file).expect("preview");
        assert!(data_url.starts_with("data:image/webp;base64,"));
    }

    #[test]
    fn empty_file_has_no_preview() {
        let file = ImageFile::new("empty.jpg", None, Vec::new());
        assert!(render_preview(&file).is_none());
    }

    #[test]
    fn decodes_rendered_preview_back_to_original_bytes() {
        let file = ImageFile::new("x.jpg", None, vec![0xff, 0xd8, 0xff, 0xe0]);
        let data_url = render_preview(&file).expect("preview");
        let (media_type, bytes) = decode_data_url(&data_url).expect("decode");
        assert_eq!(media_type, "image/jpeg");
        assert_eq!(bytes, file.bytes);
    }

    #[test]
    fn rejects_non_base64_data_urls() {
        assert!(decode_data_url("data:text/plain,hello").is_none());
        assert!(decode_data_url("https://store/x.jpg").is_none());
    }
}
