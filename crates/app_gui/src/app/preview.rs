//! Turns image references from the service into something egui can draw.

use eframe::egui;
use mole_core::ImageRef;

pub(crate) enum Preview {
    /// Decoded `data:` URI, served to egui under a `bytes://` URI.
    Embedded {
        uri: String,
        bytes: egui::load::Bytes,
    },
    /// Remote image, fetched by the `http` loader of egui_extras.
    Remote(String),
    Broken(String),
}

impl Preview {
    pub(crate) fn from_ref(image: &ImageRef, name: &str, seq: u64) -> Self {
        if !image.is_embedded() {
            return Preview::Remote(image.as_str().to_string());
        }
        match image.decode_embedded() {
            Ok(decoded) => {
                let ext = extension_for(&decoded.bytes, &decoded.media_type);
                Preview::Embedded {
                    uri: format!("bytes://{name}-{seq}.{ext}"),
                    bytes: decoded.bytes.into(),
                }
            }
            Err(e) => {
                tracing::warn!("cannot decode {name} image: {e}");
                Preview::Broken(e.to_string())
            }
        }
    }

    /// Where egui loads the image from, `None` when there is nothing to draw.
    fn source(&self) -> Option<egui::ImageSource<'static>> {
        match self {
            Preview::Embedded { uri, bytes } => Some(egui::ImageSource::Bytes {
                uri: uri.clone().into(),
                bytes: bytes.clone(),
            }),
            Preview::Remote(url) => Some(egui::ImageSource::Uri(url.clone().into())),
            Preview::Broken(_) => None,
        }
    }

    pub(crate) fn show(&self, ui: &mut egui::Ui, max_width: f32) {
        if let Some(source) = self.source() {
            ui.add(egui::Image::new(source).max_width(max_width));
        }
        match self {
            Preview::Embedded { .. } => {}
            Preview::Remote(url) => {
                ui.hyperlink_to("Open image in browser", url);
            }
            Preview::Broken(reason) => {
                ui.colored_label(egui::Color32::LIGHT_RED, format!("Image unavailable: {reason}"));
            }
        }
    }

    /// Drops the loaded image from egui's caches.
    pub(crate) fn forget(&self, ctx: &egui::Context) {
        match self {
            Preview::Embedded { uri, .. } | Preview::Remote(uri) => ctx.forget_image(uri),
            Preview::Broken(_) => {}
        }
    }
}

/// File extension egui's image loader should use for `bytes`. Sniffs the
/// content first and falls back to the declared media type.
fn extension_for(bytes: &[u8], media_type: &str) -> &'static str {
    if let Some(ext) = image::guess_format(bytes)
        .ok()
        .and_then(|format| format.extensions_str().first().copied())
    {
        return ext;
    }
    match media_type.to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        _ => "png",
    }
}
