//! `multipart/form-data` bodies
//!
//! Bodies are buffered by [`Request::from_hyper`](super::Request::from_hyper),
//! so parsing works on the complete byte slice. Text parts become form
//! fields; parts carrying a `filename` are kept as [`FilePart`]s.

use crate::error::{Error, Result};
use std::collections::HashMap;

/// A file submitted through a multipart form
#[derive(Debug, Clone, PartialEq)]
pub struct FilePart {
    pub field_name: String,
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Parsed multipart body
#[derive(Debug, Clone, Default)]
pub struct MultipartForm {
    pub fields: HashMap<String, String>,
    pub files: Vec<FilePart>,
}

impl MultipartForm {
    /// Parse `body` using the boundary from its Content-Type
    pub fn parse(body: &[u8], boundary: &str) -> Result<Self> {
        if boundary.is_empty() {
            return Err(Error::InvalidInput("multipart boundary is empty".to_string()));
        }

        // Every delimiter after the first is preceded by CRLF; prefixing one
        // lets the first delimiter be found the same way.
        let mut buffer = Vec::with_capacity(body.len() + 2);
        buffer.extend_from_slice(b"\r\n");
        buffer.extend_from_slice(body);
        let delimiter = format!("\r\n--{}", boundary).into_bytes();

        let mut form = MultipartForm::default();
        let mut closed = false;
        let mut chunks = split_on(&buffer, &delimiter).into_iter();
        // preamble
        chunks.next();

        for chunk in chunks {
            if chunk.starts_with(b"--") {
                closed = true;
                break;
            }
            let chunk = chunk.strip_prefix(b"\r\n").unwrap_or(chunk);
            form.add_part(chunk)?;
        }

        if !closed {
            return Err(Error::InvalidInput(
                "multipart body is missing its closing boundary".to_string(),
            ));
        }
        Ok(form)
    }

    fn add_part(&mut self, part: &[u8]) -> Result<()> {
        let split = find(part, b"\r\n\r\n", 0)
            .ok_or_else(|| Error::InvalidInput("multipart part has no header block".to_string()))?;
        let head = String::from_utf8_lossy(&part[..split]);
        let data = &part[split + 4..];

        let mut disposition = None;
        let mut content_type = None;
        for line in head.lines() {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            match name.trim().to_ascii_lowercase().as_str() {
                "content-disposition" => disposition = Some(value.trim().to_string()),
                "content-type" => content_type = Some(value.trim().to_string()),
                _ => {}
            }
        }

        let Some(disposition) = disposition else {
            log::debug!("Skipping multipart part without Content-Disposition");
            return Ok(());
        };
        let Some(field_name) = disposition_param(&disposition, "name") else {
            log::debug!("Skipping multipart part without a field name");
            return Ok(());
        };

        match disposition_param(&disposition, "filename") {
            Some(filename) => self.files.push(FilePart {
                field_name,
                filename,
                content_type,
                data: data.to_vec(),
            }),
            None => {
                let value = String::from_utf8(data.to_vec()).map_err(|_| {
                    Error::InvalidInput(format!("multipart field '{}' is not valid UTF-8", field_name))
                })?;
                self.fields.insert(field_name, value);
            }
        }
        Ok(())
    }

    pub fn file(&self, field_name: &str) -> Option<&FilePart> {
        self.files.iter().find(|file| file.field_name == field_name)
    }
}

/// `boundary` parameter of a `multipart/*` Content-Type
pub fn boundary_of(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.trim().split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("boundary")
            .then(|| value.trim().trim_matches('"').to_string())
    })
}

fn disposition_param(disposition: &str, key: &str) -> Option<String> {
    disposition.split(';').skip(1).find_map(|param| {
        let (name, value) = param.trim().split_once('=')?;
        (name.trim().eq_ignore_ascii_case(key)).then(|| value.trim().trim_matches('"').to_string())
    })
}

fn split_on<'a>(haystack: &'a [u8], needle: &[u8]) -> Vec<&'a [u8]> {
    let mut pieces = Vec::new();
    let mut start = 0;
    while let Some(pos) = find(haystack, needle, start) {
        pieces.push(&haystack[start..pos]);
        start = pos + needle.len();
    }
    pieces.push(&haystack[start..]);
    pieces
}

fn find(haystack: &[u8], needle: &[u8], start: usize) -> Option<usize> {
    if needle.is_empty() || start >= haystack.len() {
        return None;
    }
    haystack[start..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|offset| start + offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    const UPLOAD: &str = "--XyZ\r\n\
        Content-Disposition: form-data; name=\"_token\"\r\n\
        \r\n\
        abcdefghijklmnop\r\n\
        --XyZ\r\n\
        Content-Disposition: form-data; name=\"title\"\r\n\
        \r\n\
        Line one\r\nLine two\r\n\
        --XyZ\r\n\
        Content-Disposition: form-data; name=\"avatar\"; filename=\"me.png\"\r\n\
        Content-Type: image/png\r\n\
        \r\n\
        PNGDATA\r\n\
        --XyZ--\r\n";

    #[test]
    fn test_fields_and_files() {
        let form = MultipartForm::parse(UPLOAD.as_bytes(), "XyZ").unwrap();

        assert_eq!(form.fields["_token"], "abcdefghijklmnop");
        assert_eq!(form.fields["title"], "Line one\r\nLine two");
        assert!(!form.fields.contains_key("avatar"));

        let avatar = form.file("avatar").unwrap();
        assert_eq!(avatar.filename, "me.png");
        assert_eq!(avatar.content_type.as_deref(), Some("image/png"));
        assert_eq!(avatar.data, b"PNGDATA");
    }

    #[test]
    fn test_boundary_parameter() {
        assert_eq!(
            boundary_of("multipart/form-data; boundary=XyZ").as_deref(),
            Some("XyZ")
        );
        assert_eq!(
            boundary_of("multipart/form-data; charset=utf-8; Boundary=\"a b\"").as_deref(),
            Some("a b")
        );
        assert_eq!(boundary_of("multipart/form-data"), None);
    }

    #[test]
    fn test_truncated_body_is_rejected() {
        let truncated = &UPLOAD[..UPLOAD.len() - 9];
        assert!(MultipartForm::parse(truncated.as_bytes(), "XyZ").is_err());
        assert!(MultipartForm::parse(UPLOAD.as_bytes(), "").is_err());
    }
}
