//! Flattening the layer stack into one map-sized image, used for the map
//! preview sent with every save.

use crate::error::ExportError;
use crate::map::MapFile;
use image::{ImageFormat, RgbaImage, imageops};
use std::borrow::Cow;
use std::io::Cursor;

/// Composite every visible layer, bottom of the stack first, into an image
/// of `width * tile` × `height * tile` pixels. Content outside the map is
/// clipped.
#[must_use]
pub fn composite(map: &MapFile) -> RgbaImage {
    let tile = map.tile_dimension;
    let mut out = RgbaImage::new(map.width * tile, map.height * tile);
    for id in map.tree.layers_bottom_up() {
        let Ok(layer) = map.tree.layer(id) else {
            continue;
        };
        if !layer.visible || layer.opacity <= 0.0 {
            continue;
        }
        let Some(buffer) = layer.buffer() else {
            continue;
        };
        let raster = with_opacity(buffer.raster(), layer.opacity);
        imageops::overlay(
            &mut out,
            raster.as_ref(),
            layer.position.x as i64,
            layer.position.y as i64,
        );
    }
    out
}

fn with_opacity(raster: &RgbaImage, opacity: f32) -> Cow<'_, RgbaImage> {
    if opacity >= 1.0 {
        return Cow::Borrowed(raster);
    }
    let mut faded = raster.clone();
    for px in faded.pixels_mut() {
        px[3] = (px[3] as f32 * opacity).round() as u8;
    }
    Cow::Owned(faded)
}

/// Encode an image as PNG bytes.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, ExportError> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

/// The composited map as PNG bytes.
pub fn map_image_png(map: &MapFile) -> Result<Vec<u8>, ExportError> {
    encode_png(&composite(map))
}
