//! multipart/form-data construction for the localization query.
//!
//! `LocalizeRequest` is the typed builder: it always yields the same field set for a
//! given map target, so the query shape cannot drift between call sites.

use rand::Rng;

use crate::capture::{CameraIntrinsics, CapturedFrame};
use crate::config::MapType;

#[derive(Clone, Debug, PartialEq)]
pub struct Part {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MultipartForm {
    boundary: String,
    parts: Vec<Part>,
}

impl MultipartForm {
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..24)
            .map(|_| char::from(b"0123456789abcdef"[rng.gen_range(0..16)]))
            .collect();
        Self::with_boundary(format!("----arlocFormBoundary{}", suffix))
    }

    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            parts: Vec::new(),
        }
    }

    pub fn text(mut self, name: &str, value: impl ToString) -> Self {
        self.parts.push(Part {
            name: name.to_string(),
            filename: None,
            content_type: None,
            data: value.to_string().into_bytes(),
        });
        self
    }

    pub fn file(mut self, name: &str, filename: &str, content_type: &str, data: Vec<u8>) -> Self {
        self.parts.push(Part {
            name: name.to_string(),
            filename: Some(filename.to_string()),
            content_type: Some(content_type.to_string()),
            data,
        });
        self
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn field(&self, name: &str) -> Option<&[u8]> {
        self.parts
            .iter()
            .find(|part| part.name == name)
            .map(|part| part.data.as_slice())
    }

    /// Text value of `name`, if present and UTF-8.
    pub fn text_field(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(|data| std::str::from_utf8(data).ok())
    }

    /// Returns the `Content-Type` header value and the encoded body.
    pub fn encode(&self) -> (String, Vec<u8>) {
        let mut body = Vec::new();
        for part in &self.parts {
            body.extend_from_slice(format!("--{}\r\n", self.boundary).as_bytes());
            match &part.filename {
                Some(filename) => body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        part.name, filename
                    )
                    .as_bytes(),
                ),
                None => body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n", part.name)
                        .as_bytes(),
                ),
            }
            if let Some(content_type) = &part.content_type {
                body.extend_from_slice(format!("Content-Type: {}\r\n", content_type).as_bytes());
            }
            body.extend_from_slice(b"\r\n");
            body.extend_from_slice(&part.data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        (
            format!("multipart/form-data; boundary={}", self.boundary),
            body,
        )
    }
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new()
    }
}

/// Map or map set the query is matched against.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MapTarget {
    pub map_type: MapType,
    pub code: String,
}

impl MapTarget {
    pub fn field_name(&self) -> &'static str {
        match self.map_type {
            MapType::Map => "mapCode",
            MapType::MapSet => "mapSetCode",
        }
    }
}

/// One localization query: a frame, its intrinsics and the map target.
pub struct LocalizeRequest<'a> {
    frame: &'a CapturedFrame,
    intrinsics: &'a CameraIntrinsics,
    target: &'a MapTarget,
}

impl<'a> LocalizeRequest<'a> {
    pub fn new(frame: &'a CapturedFrame, intrinsics: &'a CameraIntrinsics, target: &'a MapTarget) -> Self {
        Self {
            frame,
            intrinsics,
            target,
        }
    }

    pub fn into_form(self) -> MultipartForm {
        MultipartForm::new()
            .text("isRightHanded", true)
            .text("width", self.frame.width)
            .text("height", self.frame.height)
            .text("px", self.intrinsics.px)
            .text("py", self.intrinsics.py)
            .text("fx", self.intrinsics.fx)
            .text("fy", self.intrinsics.fy)
            .file(
                "queryImage",
                "frame.jpg",
                "image/jpeg",
                self.frame.jpeg_bytes().to_vec(),
            )
            .text(self.target.field_name(), &self.target.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (CapturedFrame, CameraIntrinsics) {
        let frame = CapturedFrame::new(vec![0xFF, 0xD8, 0x00, 0xFF, 0xD9], 640, 480);
        let k = CameraIntrinsics {
            fx: 415.5,
            fy: 415.5,
            px: 320.0,
            py: 240.0,
            width: 640,
            height: 480,
        };
        (frame, k)
    }

    #[test]
    fn map_query_has_fixed_field_set() {
        let (frame, k) = sample();
        let target = MapTarget {
            map_type: MapType::Map,
            code: "MAP_1".into(),
        };
        let form = LocalizeRequest::new(&frame, &k, &target).into_form();
        let names: Vec<&str> = form.parts().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["isRightHanded", "width", "height", "px", "py", "fx", "fy", "queryImage", "mapCode"]
        );
        assert_eq!(form.text_field("isRightHanded"), Some("true"));
        assert_eq!(form.text_field("width"), Some("640"));
        assert_eq!(form.text_field("px"), Some("320"));
        assert_eq!(form.text_field("fx"), Some("415.5"));
        assert_eq!(form.text_field("mapCode"), Some("MAP_1"));
        assert!(form.field("mapSetCode").is_none());
        assert_eq!(form.field("queryImage").map(|d| d.len()), Some(5));
    }

    #[test]
    fn map_set_query_uses_map_set_code() {
        let (frame, k) = sample();
        let target = MapTarget {
            map_type: MapType::MapSet,
            code: "SET_9".into(),
        };
        let form = LocalizeRequest::new(&frame, &k, &target).into_form();
        assert_eq!(form.text_field("mapSetCode"), Some("SET_9"));
        assert!(form.field("mapCode").is_none());
    }

    #[test]
    fn encoding_frames_each_part() {
        let form = MultipartForm::with_boundary("XYZ")
            .text("width", 2)
            .file("queryImage", "frame.jpg", "image/jpeg", vec![1, 2, 3]);
        let (content_type, body) = form.encode();
        assert_eq!(content_type, "multipart/form-data; boundary=XYZ");
        let mut expected = Vec::new();
        expected.extend_from_slice(
            b"--XYZ\r\nContent-Disposition: form-data; name=\"width\"\r\n\r\n2\r\n",
        );
        expected.extend_from_slice(
            b"--XYZ\r\nContent-Disposition: form-data; name=\"queryImage\"; filename=\"frame.jpg\"\r\nContent-Type: image/jpeg\r\n\r\n",
        );
        expected.extend_from_slice(&[1, 2, 3]);
        expected.extend_from_slice(b"\r\n--XYZ--\r\n");
        assert_eq!(body, expected);
    }

    #[test]
    fn random_boundaries_differ() {
        assert_ne!(MultipartForm::new().encode().0, MultipartForm::new().encode().0);
    }
}
