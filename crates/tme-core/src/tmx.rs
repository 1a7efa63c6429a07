//! Tiled XML writer: `.tmx` maps with CSV layer data and `.tsx` tilesets.

use crate::export::{ExportConfig, ExportDocument, ExportLayer, TILED_FORMAT_VERSION, TilesetRef};
use std::fmt::Write;

/// Emit the map document.
#[must_use]
pub fn write_map(doc: &ExportDocument, config: &ExportConfig) -> String {
    let mut out = String::with_capacity(256 + doc.layers.len() * (doc.width * doc.height * 2) as usize);
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = writeln!(
        out,
        "<map version=\"{TILED_FORMAT_VERSION}\" tiledversion=\"{}\" orientation=\"orthogonal\" \
         renderorder=\"right-down\" width=\"{}\" height=\"{}\" tilewidth=\"{}\" tileheight=\"{}\" \
         infinite=\"0\" nextlayerid=\"{}\" nextobjectid=\"1\">",
        escape(&config.tiled_version),
        doc.width,
        doc.height,
        doc.tile,
        doc.tile,
        doc.next_layer_id,
    );
    for ts in &doc.tilesets {
        let _ = writeln!(
            out,
            " <tileset firstgid=\"{}\" source=\"{}.tsx\"/>",
            ts.firstgid,
            escape(&ts.stem)
        );
    }
    for layer in &doc.layers {
        emit_layer(&mut out, doc, layer, 1);
    }
    out.push_str("</map>\n");
    out
}

/// Emit one external tileset document.
#[must_use]
pub fn write_tileset(ts: &TilesetRef, config: &ExportConfig) -> String {
    let mut out = String::with_capacity(256);
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = writeln!(
        out,
        "<tileset version=\"{TILED_FORMAT_VERSION}\" tiledversion=\"{}\" name=\"{}\" tilewidth=\"{}\" \
         tileheight=\"{}\" tilecount=\"{}\" columns=\"{}\">",
        escape(&config.tiled_version),
        escape(&ts.name),
        ts.tile,
        ts.tile,
        ts.tilecount,
        ts.columns,
    );
    let _ = writeln!(
        out,
        " <image source=\"{}.png\" width=\"{}\" height=\"{}\"/>",
        escape(&ts.stem),
        ts.image_width,
        ts.image_height
    );
    out.push_str("</tileset>\n");
    out
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push(' ');
    }
}

fn emit_layer(out: &mut String, doc: &ExportDocument, layer: &ExportLayer, depth: usize) {
    indent(out, depth);
    match layer {
        ExportLayer::Group { id, name, layers } => {
            let _ = writeln!(out, "<group id=\"{id}\" name=\"{}\">", escape(name));
            for child in layers {
                emit_layer(out, doc, child, depth + 1);
            }
            indent(out, depth);
            out.push_str("</group>\n");
        }
        ExportLayer::Tiles {
            id,
            name,
            opacity,
            visible,
            data,
        } => {
            let _ = write!(
                out,
                "<layer id=\"{id}\" name=\"{}\" width=\"{}\" height=\"{}\"",
                escape(name),
                doc.width,
                doc.height
            );
            if *opacity < 1.0 {
                let _ = write!(out, " opacity=\"{}\"", format_opacity(*opacity));
            }
            if !visible {
                out.push_str(" visible=\"0\"");
            }
            out.push_str(">\n");
            indent(out, depth + 1);
            out.push_str("<data encoding=\"csv\">\n");
            emit_csv(out, data, doc.width);
            out.push_str("</data>\n");
            indent(out, depth);
            out.push_str("</layer>\n");
        }
    }
}

/// One line per map row; every row but the last ends with a comma.
fn emit_csv(out: &mut String, data: &[u32], width: u32) {
    let width = width.max(1) as usize;
    let rows = data.len().div_ceil(width);
    for (i, row) in data.chunks(width).enumerate() {
        for (j, gid) in row.iter().enumerate() {
            if j > 0 {
                out.push(',');
            }
            let _ = write!(out, "{gid}");
        }
        if i + 1 < rows {
            out.push(',');
        }
        out.push('\n');
    }
}

/// Opacity with at most three decimals and no trailing zeros.
fn format_opacity(opacity: f32) -> String {
    let s = format!("{:.3}", opacity.clamp(0.0, 1.0));
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

/// Escape text for an XML attribute value.
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
