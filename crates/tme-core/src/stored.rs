//! Stored (wire) schema of a map file, as the persistence service returns
//! it and as saves send it back.
//!
//! Buffers are not part of this schema: each layer's tile grid is a
//! separate JSON document fetched through `signed_urls`, and rasters are
//! rebuilt from tileset images on load.

use crate::error::EditError;
use crate::guid::{self, GuidRange};
use crate::id::LayerId;
use crate::map::{MapFile, MapTileset, Tileset};
use crate::model::{LayerData, LayerNode, LayerTree, NodeKind, Position};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One node of the stored layer tree. Children are topmost first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoredNode {
    Group {
        id: LayerId,
        name: String,
        #[serde(default = "default_true")]
        expanded: bool,
        #[serde(default)]
        children: Vec<StoredNode>,
    },
    Layer {
        id: LayerId,
        name: String,
        #[serde(default = "default_opacity")]
        opacity: f32,
        #[serde(default = "default_true")]
        visible: bool,
        #[serde(default)]
        position: Position,
    },
}

fn default_true() -> bool {
    true
}

fn default_opacity() -> f32 {
    1.0
}

impl StoredNode {
    pub fn id(&self) -> LayerId {
        match self {
            StoredNode::Group { id, .. } | StoredNode::Layer { id, .. } => *id,
        }
    }

    /// Snapshot `tree` from its root. Selection and buffers are not stored.
    pub fn from_tree(tree: &LayerTree) -> Self {
        Self::from_node(tree, tree.root_id())
    }

    fn from_node(tree: &LayerTree, id: LayerId) -> Self {
        let Some(node) = tree.get(id) else {
            return StoredNode::Group {
                id,
                name: String::new(),
                expanded: true,
                children: Vec::new(),
            };
        };
        match &node.kind {
            NodeKind::Group { expanded } => StoredNode::Group {
                id,
                name: node.name.clone(),
                expanded: *expanded,
                children: tree
                    .children(id)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|c| Self::from_node(tree, c))
                    .collect(),
            },
            NodeKind::Layer(data) => StoredNode::Layer {
                id,
                name: node.name.clone(),
                opacity: data.opacity,
                visible: data.visible,
                position: data.position,
            },
        }
    }

    /// Rebuild a layer tree with this node as its root.
    ///
    /// # Errors
    /// `NotAGroup` when the root is a layer, `DuplicateId` when an id
    /// appears twice.
    pub fn to_tree(&self) -> Result<LayerTree, EditError> {
        let StoredNode::Group {
            id,
            name,
            expanded,
            children,
        } = self
        else {
            return Err(EditError::NotAGroup(self.id()));
        };
        let mut tree = LayerTree::with_root(*id, name.clone(), *expanded);
        for (i, child) in children.iter().enumerate() {
            child.insert_into(&mut tree, *id, i)?;
        }
        Ok(tree)
    }

    fn insert_into(&self, tree: &mut LayerTree, parent: LayerId, index: usize) -> Result<(), EditError> {
        match self {
            StoredNode::Group {
                id,
                name,
                expanded,
                children,
            } => {
                let mut node = LayerNode::group(*id, name.clone());
                node.kind = NodeKind::Group {
                    expanded: *expanded,
                };
                tree.insert(parent, Some(index), node)?;
                for (i, child) in children.iter().enumerate() {
                    child.insert_into(tree, *id, i)?;
                }
                Ok(())
            }
            StoredNode::Layer {
                id,
                name,
                opacity,
                visible,
                position,
            } => {
                let mut node = LayerNode::layer(*id, name.clone());
                node.kind = NodeKind::Layer(LayerData {
                    opacity: opacity.clamp(0.0, 1.0),
                    visible: *visible,
                    position: *position,
                    ..LayerData::default()
                });
                tree.insert(parent, Some(index), node)
            }
        }
    }
}

/// A tileset entry of a stored map. `first_guid` is present once a map
/// has been saved by this engine; older files omit it and get sequential
/// ranges in list order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredTileset {
    #[serde(flatten)]
    pub tileset: Tileset,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_guid: Option<u32>,
}

/// The stored map document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMap {
    pub tile_dimension: u32,
    pub width: u32,
    pub height: u32,
    pub root_layer: StoredNode,
    #[serde(default)]
    pub tilesets: Vec<StoredTileset>,
}

impl StoredMap {
    pub fn from_map(map: &MapFile) -> Self {
        Self {
            tile_dimension: map.tile_dimension,
            width: map.width,
            height: map.height,
            root_layer: StoredNode::from_tree(&map.tree),
            tilesets: map
                .tilesets
                .iter()
                .map(|t| StoredTileset {
                    tileset: t.tileset.clone(),
                    first_guid: Some(t.range.first),
                })
                .collect(),
        }
    }

    /// Id ranges for the stored tilesets, in list order. Stored
    /// `first_guid`s are kept when every tileset has one, its range fits in
    /// `u32`, and none overlap; otherwise ranges are assigned sequentially.
    ///
    /// # Errors
    /// `GuidSpaceExhausted` when even sequential ranges do not fit.
    pub fn tileset_ranges(&self) -> Result<Vec<GuidRange>, EditError> {
        let stored: Option<Vec<GuidRange>> = self
            .tilesets
            .iter()
            .map(|t| {
                let first = t.first_guid.filter(|f| *f > 0)?;
                let last = first.checked_add(t.tileset.tile_count().max(1) - 1)?;
                Some(GuidRange::new(first, last))
            })
            .collect();
        match stored {
            Some(ranges) => {
                let overlapping = ranges
                    .iter()
                    .enumerate()
                    .any(|(i, a)| ranges[i + 1..].iter().any(|b| a.overlaps(b)));
                if !overlapping {
                    return Ok(ranges);
                }
                log::warn!("stored tileset ranges overlap; reassigning sequentially");
            }
            None if self.tilesets.iter().any(|t| t.first_guid.is_some()) => {
                log::warn!("stored tileset ranges are incomplete or out of range; reassigning sequentially");
            }
            None => {}
        }
        let counts: Vec<u32> = self.tilesets.iter().map(|t| t.tileset.tile_count()).collect();
        guid::assign_sequential(&counts).ok_or(EditError::GuidSpaceExhausted {
            tile_count: counts.iter().fold(0u32, |sum, c| sum.saturating_add(*c)),
        })
    }

    /// Build the in-memory map without buffers.
    pub fn to_map(&self) -> Result<MapFile, EditError> {
        let tree = self.root_layer.to_tree()?;
        let tilesets = self
            .tilesets
            .iter()
            .zip(self.tileset_ranges()?)
            .map(|(t, range)| MapTileset {
                tileset: t.tileset.clone(),
                range,
            })
            .collect();
        Ok(MapFile {
            tile_dimension: self.tile_dimension,
            width: self.width,
            height: self.height,
            tree,
            tilesets,
        })
    }
}

/// Response of the persistence service for one file id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMapResponse {
    pub file: StoredMap,
    /// Resource id (tileset file id or layer id) → fetch URL.
    #[serde(default)]
    pub signed_urls: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DOC: &str = r#"{
        "file": {
            "tileDimension": 16,
            "width": 20,
            "height": 10,
            "rootLayer": {
                "type": "group",
                "id": "st_root",
                "name": "root",
                "children": [
                    { "type": "layer", "id": "st_top", "name": "Top", "opacity": 0.5,
                      "position": { "x": 32, "y": -16 } },
                    { "type": "group", "id": "st_g", "name": "Ground", "expanded": false,
                      "children": [ { "type": "layer", "id": "st_base", "name": "Base" } ] }
                ]
            },
            "tilesets": [
                { "fileId": "t1", "name": "grass", "imageUrl": "grass.png",
                  "tileDimension": 16, "width": 4, "height": 2 },
                { "fileId": "t2", "name": "rock", "imageUrl": "rock.png",
                  "tileDimension": 16, "width": 2, "height": 2 }
            ]
        },
        "signedUrls": { "t1": "https://cdn/t1", "st_base": "https://cdn/base" }
    }"#;

    #[test]
    fn parses_stored_response() {
        let resp: StoredMapResponse = serde_json::from_str(DOC).unwrap();
        assert_eq!(resp.signed_urls.len(), 2);
        let map = resp.file.to_map().unwrap();
        assert_eq!(map.tree.root_id(), LayerId::intern("st_root"));
        let order_ids = map.tree.document_order();
        let order: Vec<&str> = order_ids.iter().map(|i| i.as_str()).collect();
        assert_eq!(order, ["st_top", "st_g", "st_base"]);

        let top = map.tree.layer(LayerId::intern("st_top")).unwrap();
        assert_eq!(top.opacity, 0.5);
        assert_eq!(top.position, Position::new(32, -16));
        assert!(top.visible);

        let ranges: Vec<GuidRange> = map.tilesets.iter().map(|t| t.range).collect();
        assert_eq!(ranges, vec![GuidRange::new(1, 8), GuidRange::new(9, 12)]);
    }

    #[test]
    fn tree_survives_round_trip() {
        let resp: StoredMapResponse = serde_json::from_str(DOC).unwrap();
        let map = resp.file.to_map().unwrap();
        let stored = StoredNode::from_tree(&map.tree);
        assert_eq!(stored, resp.file.root_layer);
    }

    #[test]
    fn stored_first_guids_are_kept() {
        let mut resp: StoredMapResponse = serde_json::from_str(DOC).unwrap();
        resp.file.tilesets[0].first_guid = Some(20);
        resp.file.tilesets[1].first_guid = Some(3);
        assert_eq!(
            resp.file.tileset_ranges(),
            Ok(vec![GuidRange::new(20, 27), GuidRange::new(3, 6)])
        );
        resp.file.tilesets[1].first_guid = Some(25);
        assert_eq!(
            resp.file.tileset_ranges(),
            Ok(vec![GuidRange::new(1, 8), GuidRange::new(9, 12)])
        );
    }

    #[test]
    fn first_guid_near_the_id_limit_is_reassigned() {
        let mut resp: StoredMapResponse = serde_json::from_str(DOC).unwrap();
        resp.file.tilesets[0].first_guid = Some(u32::MAX);
        resp.file.tilesets[1].first_guid = Some(1);
        let map = resp.file.to_map().unwrap();
        let ranges: Vec<GuidRange> = map.tilesets.iter().map(|t| t.range).collect();
        assert_eq!(ranges, vec![GuidRange::new(1, 8), GuidRange::new(9, 12)]);

        resp.file.tilesets[0].first_guid = Some(u32::MAX - 7);
        assert_eq!(
            resp.file.tileset_ranges(),
            Ok(vec![GuidRange::new(u32::MAX - 7, u32::MAX), GuidRange::new(1, 4)])
        );
    }

    #[test]
    fn oversized_tilesets_fail_to_load() {
        let mut resp: StoredMapResponse = serde_json::from_str(DOC).unwrap();
        resp.file.tilesets[0].tileset.width = u32::MAX;
        resp.file.tilesets[0].tileset.height = 2;
        assert!(matches!(
            resp.file.to_map(),
            Err(EditError::GuidSpaceExhausted { .. })
        ));
    }

    #[test]
    fn root_name_and_expanded_survive_loading() {
        let root = StoredNode::Group {
            id: LayerId::intern("st_named_root"),
            name: "World".into(),
            expanded: false,
            children: Vec::new(),
        };
        let tree = root.to_tree().unwrap();
        assert_eq!(tree.get(tree.root_id()).unwrap().name, "World");
        assert_eq!(StoredNode::from_tree(&tree), root);
    }

    #[test]
    fn layer_root_is_rejected() {
        let node = StoredNode::Layer {
            id: LayerId::intern("st_leaf_root"),
            name: "x".into(),
            opacity: 1.0,
            visible: true,
            position: Position::default(),
        };
        assert_eq!(
            node.to_tree().unwrap_err(),
            EditError::NotAGroup(LayerId::intern("st_leaf_root"))
        );
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let leaf = |name: &str| StoredNode::Layer {
            id: LayerId::intern("st_dup"),
            name: name.into(),
            opacity: 1.0,
            visible: true,
            position: Position::default(),
        };
        let root = StoredNode::Group {
            id: LayerId::intern("st_dup_root"),
            name: "root".into(),
            expanded: true,
            children: vec![leaf("a"), leaf("b")],
        };
        assert_eq!(
            root.to_tree().unwrap_err(),
            EditError::DuplicateId(LayerId::intern("st_dup"))
        );
    }
}
