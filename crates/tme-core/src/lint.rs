//! Lint diagnostics for map files.
//!
//! Reports structural issues without modifying the map. The editor shows
//! them in its problems panel; `tme-export` logs them before writing.

use crate::id::LayerId;
use crate::map::MapFile;
use crate::model::NodeKind;

// ─── Diagnostic types ────────────────────────────────────────────────────

/// Severity of a lint finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LintSeverity {
    /// Likely corrupt or lossy on export.
    Warning,
    /// Harmless, but probably not intended.
    Info,
}

/// A single lint diagnostic.
#[derive(Debug, Clone, PartialEq)]
pub struct LintDiagnostic {
    /// The node this diagnostic refers to (the root for map-wide findings).
    pub node_id: LayerId,
    pub message: String,
    pub severity: LintSeverity,
    /// Short rule identifier (e.g. "unknown-gid", "empty-group").
    pub rule: &'static str,
}

// ─── Public API ───────────────────────────────────────────────────────────

/// Run all lint rules over the map and return diagnostics.
#[must_use]
pub fn lint_map(map: &MapFile) -> Vec<LintDiagnostic> {
    let mut diags = Vec::new();
    lint_overlapping_ranges(map, &mut diags);
    for id in map.tree.document_order() {
        let Some(node) = map.tree.get(id) else {
            continue;
        };
        match &node.kind {
            NodeKind::Group { .. } => lint_empty_group(map, id, &mut diags),
            NodeKind::Layer(_) => lint_layer(map, id, &mut diags),
        }
    }
    diags
}

// ─── Rules ────────────────────────────────────────────────────────────────

fn lint_overlapping_ranges(map: &MapFile, diags: &mut Vec<LintDiagnostic>) {
    let ranges = map.sorted_ranges();
    for pair in ranges.windows(2) {
        if pair[0].overlaps(&pair[1]) {
            diags.push(LintDiagnostic {
                node_id: map.tree.root_id(),
                message: format!(
                    "Tileset id ranges {}..={} and {}..={} overlap.",
                    pair[0].first, pair[0].last, pair[1].first, pair[1].last
                ),
                severity: LintSeverity::Warning,
                rule: "overlapping-ranges",
            });
        }
    }
}

fn lint_empty_group(map: &MapFile, id: LayerId, diags: &mut Vec<LintDiagnostic>) {
    if map.tree.children(id).is_ok_and(|c| c.is_empty()) {
        diags.push(LintDiagnostic {
            node_id: id,
            message: format!("Group `{id}` has no layers."),
            severity: LintSeverity::Info,
            rule: "empty-group",
        });
    }
}

fn lint_layer(map: &MapFile, id: LayerId, diags: &mut Vec<LintDiagnostic>) {
    let Ok(layer) = map.tree.layer(id) else {
        return;
    };
    let tile = map.tile_dimension.max(1) as i32;

    if layer.position.x % tile != 0 || layer.position.y % tile != 0 {
        diags.push(LintDiagnostic {
            node_id: id,
            message: format!(
                "Layer `{id}` sits at ({}, {}), not on the {tile}px grid.",
                layer.position.x, layer.position.y
            ),
            severity: LintSeverity::Warning,
            rule: "unaligned-position",
        });
    }

    let Some(buffer) = layer.buffer() else {
        diags.push(LintDiagnostic {
            node_id: id,
            message: format!("Layer `{id}` is empty."),
            severity: LintSeverity::Info,
            rule: "empty-layer",
        });
        return;
    };

    if !buffer.is_consistent() {
        diags.push(LintDiagnostic {
            node_id: id,
            message: format!(
                "Layer `{id}` raster is {}x{} but its grid is {}x{} tiles.",
                buffer.raster().width(),
                buffer.raster().height(),
                buffer.cols(),
                buffer.rows()
            ),
            severity: LintSeverity::Warning,
            rule: "inconsistent-buffer",
        });
        return;
    }

    let mut unknown = Vec::new();
    let mut blank = 0;
    for (col, row, gid) in buffer.tiles().occupied() {
        if map.tileset_for_gid(gid.get()).is_none() && !unknown.contains(&gid.get()) {
            unknown.push(gid.get());
        }
        if buffer.tile_is_transparent(col, row) {
            blank += 1;
        }
    }
    if !unknown.is_empty() {
        unknown.sort_unstable();
        diags.push(LintDiagnostic {
            node_id: id,
            message: format!("Layer `{id}` uses tile ids {unknown:?} that no tileset covers."),
            severity: LintSeverity::Warning,
            rule: "unknown-gid",
        });
    }
    if blank > 0 {
        diags.push(LintDiagnostic {
            node_id: id,
            message: format!("Layer `{id}` has {blank} tile(s) with no visible pixels."),
            severity: LintSeverity::Info,
            rule: "blank-tile",
        });
    }

    let origin = layer.position.to_tiles(map.tile_dimension);
    let inside_x = origin.x < map.width as i32 && origin.x + buffer.cols() as i32 > 0;
    let inside_y = origin.y < map.height as i32 && origin.y + buffer.rows() as i32 > 0;
    if !(inside_x && inside_y) {
        diags.push(LintDiagnostic {
            node_id: id,
            message: format!("Layer `{id}` lies entirely outside the map and exports empty."),
            severity: LintSeverity::Info,
            rule: "offmap-layer",
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brush::{Brush, PaintMode};
    use crate::buffer::{Gid, TileGrid, TilePoint};
    use crate::model::{LayerNode, Position};
    use image::{Rgba, RgbaImage};
    use pretty_assertions::assert_eq;

    fn rules(diags: &[LintDiagnostic]) -> Vec<&'static str> {
        diags.iter().map(|d| d.rule).collect()
    }

    fn brush(gid: u32, color: Rgba<u8>) -> Brush {
        let mut tiles = TileGrid::new(1, 1);
        tiles.set(0, 0, Gid::new(gid));
        Brush::new(RgbaImage::from_pixel(4, 4, color), tiles, 4).unwrap()
    }

    #[test]
    fn clean_map_has_no_findings() {
        let mut map = MapFile::new(4, 4, 4);
        map.add_tileset(crate::map::Tileset {
            file_id: "ln_ts".into(),
            name: "ts".into(),
            image_url: "ts.png".into(),
            tile_dimension: 4,
            width: 2,
            height: 2,
        })
        .unwrap();
        let id = LayerId::intern("ln_clean");
        map.tree.insert(map.tree.root_id(), None, LayerNode::layer(id, "clean")).unwrap();
        map.paint(id, TilePoint::new(1, 1), &brush(3, Rgba([1, 2, 3, 255])), PaintMode::Draw, false)
            .unwrap();
        let diags = lint_map(&map);
        assert!(diags.is_empty(), "{diags:?}");
    }

    #[test]
    fn reports_layer_problems() {
        let mut map = MapFile::new(4, 4, 4);
        let root = map.tree.root_id();
        let (empty, stray, group) = (
            LayerId::intern("ln_empty"),
            LayerId::intern("ln_stray"),
            LayerId::intern("ln_group"),
        );
        map.tree.insert(root, Some(0), LayerNode::layer(empty, "empty")).unwrap();
        map.tree.insert(root, Some(1), LayerNode::layer(stray, "stray")).unwrap();
        map.tree.insert(root, Some(2), LayerNode::group(group, "group")).unwrap();
        map.paint(stray, TilePoint::new(9, 0), &brush(42, Rgba([0, 0, 0, 0])), PaintMode::Draw, false)
            .unwrap();
        map.tree.layer_mut(empty).unwrap().position = Position::new(3, 0);

        let diags = lint_map(&map);
        assert_eq!(
            rules(&diags),
            ["unaligned-position", "empty-layer", "unknown-gid", "blank-tile", "offmap-layer", "empty-group"]
        );
        assert_eq!(diags[2].node_id, stray);
        assert_eq!(diags[2].severity, LintSeverity::Warning);
    }
}
